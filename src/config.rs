// src/config.rs
use crate::error::ConfigError;

pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8080";
pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_EXPORT_PATH: &str = "chess_history.json";

pub const SERVER_URL_VAR: &str = "CHESS_SERVER_URL";
pub const LOG_FILTER_VAR: &str = "CHESS_LOG";
pub const EXPORT_PATH_VAR: &str = "CHESS_EXPORT_PATH";

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Game server endpoint. Default: `ws://localhost:8080`.
    pub server_url: String,
    /// `tracing` filter directive, used when `RUST_LOG` is unset. Default: `info`.
    pub log_filter: String,
    /// Where `export` writes the move history. Default: `chess_history.json`.
    pub export_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server_url: DEFAULT_SERVER_URL.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            export_path: DEFAULT_EXPORT_PATH.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup, falling back to defaults for
    /// missing or blank values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = ClientConfig::default();
        if let Some(url) = value(SERVER_URL_VAR) { config.server_url = url; }
        if let Some(filter) = value(LOG_FILTER_VAR) { config.log_filter = filter; }
        if let Some(path) = value(EXPORT_PATH_VAR) { config.export_path = path; }
        config.validate()?;
        Ok(config)
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn with_export_path(mut self, path: impl Into<String>) -> Self {
        self.export_path = path.into();
        self
    }

    /// The server must be a plain `ws://` endpoint (the client is built without TLS),
    /// and exports need somewhere to go.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.server_url.starts_with("ws://") {
            return Err(ConfigError::Invalid {
                reason: format!("{} must be a ws:// URL, got '{}'", SERVER_URL_VAR, self.server_url),
            });
        }
        if self.export_path.trim().is_empty() {
            return Err(ConfigError::Invalid { reason: format!("{} must not be empty", EXPORT_PATH_VAR) });
        }
        Ok(())
    }
}
