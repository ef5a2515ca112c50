//! Error types for SetuIO

use crate::protocol::DecodeError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// SetuIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A listener endpoint could not be bound
    #[error("Failed to bind {endpoint} listener on {address}: {source}")]
    Bind {
        /// Endpoint name (position, metadata, image, step, telemetry)
        endpoint: &'static str,
        /// Requested bind address
        address: String,
        /// Underlying socket error
        source: std::io::Error,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed wire message
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Camera could not produce an image
    #[error("Render error: {0}")]
    Render(String),

    /// Scene could not be loaded
    #[error("Scene error: {0}")]
    Scene(String),

    /// Worker thread could not be started
    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        /// Thread name
        name: String,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
