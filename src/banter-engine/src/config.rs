//! Engine configuration.
//!
//! Loaded from a TOML file when one exists; every field has a default
//! so an empty or missing section still yields a working config.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Service root the stock deployment serves under.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";

/// Configuration for the chat backend and stream handling.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatConfig {
    /// Service root, e.g. `http://localhost:8000/api/v1`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Seconds allowed for establishing the connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Overall seconds allowed for non-streaming requests.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Longest the stream may go silent before the turn fails.
    /// Streaming turns carry no overall deadline.
    #[serde(default = "default_chunk_timeout")]
    pub chunk_timeout_secs: u64,

    /// Whether the conversation panel starts visible.
    #[serde(default)]
    pub panel_visible_on_start: bool,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_chunk_timeout() -> u64 {
    60
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            chunk_timeout_secs: default_chunk_timeout(),
            panel_visible_on_start: false,
        }
    }
}

impl ChatConfig {
    /// Build a config pointing at the given service root, defaults
    /// everywhere else.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from TOML text. Missing fields fall back to
    /// their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }
}
