//! Error types for the Banter engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, BanterError>;

/// Main error type for the Banter engine.
#[derive(Debug, Error)]
pub enum BanterError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Service returned {status}: {message}")]
    Service { status: u16, message: String },

    // Streaming errors
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Stream stalled: no data for {seconds}s")]
    StreamStalled { seconds: u64 },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // File system errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BanterError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a service status error.
    pub fn service(status: u16, message: impl Into<String>) -> Self {
        Self::Service {
            status,
            message: message.into(),
        }
    }

    /// Create a mid-stream transport error.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }

    /// Check if this error originated below the protocol layer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Service { .. } | Self::Stream(_) | Self::StreamStalled { .. }
        )
    }
}
