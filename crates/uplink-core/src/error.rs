//! Error types for the uplink system
//!
//! The arbitration state machine itself never fails: every unmet expectation
//! is a timeout. These errors cover the ambient surfaces around it
//! (configuration, adapter plumbing, config files).

use thiserror::Error;

/// Result type alias for uplink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the uplink system
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network interface driver errors
    #[error("Interface error ({interface}): {message}")]
    Interface {
        /// Interface name (e.g. "eth0")
        interface: String,
        /// Error message
        message: String,
    },

    /// Cloud session errors
    #[error("Cloud session error: {0}")]
    Cloud(String),

    /// I/O errors (sysfs reads, sockets, spawned commands)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an interface error
    pub fn interface(interface: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Interface {
            interface: interface.into(),
            message: message.into(),
        }
    }

    /// Create a cloud session error
    pub fn cloud(msg: impl Into<String>) -> Self {
        Self::Cloud(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
