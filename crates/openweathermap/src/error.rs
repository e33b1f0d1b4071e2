//! Error types for the weather node runtime.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can stop the node itself.
///
/// Per-location fetch failures never surface here; they are turned into
/// health status updates inside the sync cycle.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Configuration file missing, unreadable or invalid
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Zenoh communication error
    #[error("Zenoh error: {0}")]
    Zenoh(String),

    /// Node initialization failed
    #[error("Init error: {0}")]
    Init(String),
}
