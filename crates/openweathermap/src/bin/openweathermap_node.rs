use argh::FromArgs;
use openweathermap::shutdown::setup_shutdown;
use openweathermap::zenoh_session::open_zenoh_session;
use openweathermap::{Config, WeatherNode};

#[derive(FromArgs)]
/// OpenWeatherMap weather publisher for Zenoh
struct Args {
    /// path to the configuration file
    #[argh(option, short = 'c', default = "String::from(\"config.yaml\")")]
    config: String,

    /// zenoh router endpoint to connect to
    /// Default: tcp/127.0.0.1:7447 (local zenohd router)
    #[argh(option, short = 'e')]
    endpoint: Option<String>,

    /// run every pass once and exit
    #[argh(switch)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let args: Args = argh::from_env();

    let config = Config::from_file(&args.config)
        .map_err(|e| anyhow::anyhow!("Failed to load config from '{}': {}", args.config, e))?;

    let session = open_zenoh_session(args.endpoint.as_deref()).await?;
    let node = WeatherNode::new(session.clone(), &config)?;

    if args.once {
        node.run_once().await;
        session
            .close()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to close Zenoh session: {}", e))?;
        return Ok(());
    }

    let (_shutdown_tx, shutdown_rx) = setup_shutdown()?;
    node.run(shutdown_rx).await?;

    session
        .close()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to close Zenoh session: {}", e))?;
    log::info!("Weather node shut down, exiting");
    Ok(())
}
