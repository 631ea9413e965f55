//! Client configuration
//!
//! Implements the 3-layer configuration merge:
//! 1. Built-in defaults
//! 2. Config file (~/.config/virtlink/config.toml or an explicit path)
//! 3. Environment variables (`VIRTLINK_*`)
//!
//! The merged configuration is validated before a client is built.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::client::transport::HttpConfig;
use crate::task::PollerConfig;

/// Config file location below the user's config directory.
pub const USER_CONFIG_SUBPATH: &str = ".config/virtlink/config.toml";

/// Effective client configuration after the merge.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// API root, e.g. `https://cluster.example:8006/api2/json`.
    pub endpoint: String,
    /// Static API token (`user@realm!tokenid=secret` form). Takes
    /// precedence over ticket login when both are configured.
    pub api_token: Option<String>,
    /// Username for ticket login.
    pub username: Option<String>,
    /// Password for ticket login. Prefer `VIRTLINK_PASSWORD` over
    /// writing this into the file.
    pub password: Option<String>,
    /// TCP connect timeout in seconds.
    pub connect_timeout_seconds: u64,
    /// Whole-request timeout in seconds.
    pub request_timeout_seconds: u64,
    /// Poll interval for task waits, milliseconds.
    pub poll_interval_ms: u64,
    /// Wait budget for task waits, seconds; 0 waits indefinitely.
    pub wait_timeout_seconds: u64,
    /// Consecutive transient transport failures tolerated while polling.
    pub max_transient_errors: u32,
}

/// One configuration layer as read from disk; every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    endpoint: Option<String>,
    api_token: Option<String>,
    username: Option<String>,
    password: Option<String>,
    connect_timeout_seconds: Option<u64>,
    request_timeout_seconds: Option<u64>,
    poll_interval_ms: Option<u64>,
    wait_timeout_seconds: Option<u64>,
    max_transient_errors: Option<u32>,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("endpoint is not configured")]
    MissingEndpoint,

    #[error("endpoint must be http(s), got {0:?}")]
    InvalidEndpoint(String),

    #[error("{field} must be in (0, {max}], got {value}")]
    OutOfBounds {
        field: &'static str,
        value: u64,
        max: u64,
    },
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_token: None,
            username: None,
            password: None,
            connect_timeout_seconds: 10,
            request_timeout_seconds: 30,
            poll_interval_ms: 1000,
            wait_timeout_seconds: 0,
            max_transient_errors: 3,
        }
    }
}

impl ClientConfig {
    /// Merge defaults, the config file (explicit path, or the user
    /// config file if present) and the environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match path {
            Some(path) => config.merge_file(path)?,
            None => {
                if let Some(path) = Self::user_config_path() {
                    if path.exists() {
                        config.merge_file(&path)?;
                    }
                }
            }
        }

        config.merge_env();
        config.validate()?;
        Ok(config)
    }

    /// Default per-user config file path.
    pub fn user_config_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(USER_CONFIG_SUBPATH))
    }

    fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let layer: ConfigFile = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        self.apply(layer);
        Ok(())
    }

    fn apply(&mut self, layer: ConfigFile) {
        if let Some(endpoint) = layer.endpoint {
            self.endpoint = endpoint;
        }
        if layer.api_token.is_some() {
            self.api_token = layer.api_token;
        }
        if layer.username.is_some() {
            self.username = layer.username;
        }
        if layer.password.is_some() {
            self.password = layer.password;
        }
        if let Some(value) = layer.connect_timeout_seconds {
            self.connect_timeout_seconds = value;
        }
        if let Some(value) = layer.request_timeout_seconds {
            self.request_timeout_seconds = value;
        }
        if let Some(value) = layer.poll_interval_ms {
            self.poll_interval_ms = value;
        }
        if let Some(value) = layer.wait_timeout_seconds {
            self.wait_timeout_seconds = value;
        }
        if let Some(value) = layer.max_transient_errors {
            self.max_transient_errors = value;
        }
    }

    fn merge_env(&mut self) {
        self.apply(ConfigFile {
            endpoint: std::env::var("VIRTLINK_ENDPOINT").ok(),
            api_token: std::env::var("VIRTLINK_API_TOKEN").ok(),
            username: std::env::var("VIRTLINK_USERNAME").ok(),
            password: std::env::var("VIRTLINK_PASSWORD").ok(),
            poll_interval_ms: std::env::var("VIRTLINK_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok()),
            wait_timeout_seconds: std::env::var("VIRTLINK_WAIT_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok()),
            ..ConfigFile::default()
        });
    }

    /// Validate the merged configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ConfigError::InvalidEndpoint(self.endpoint.clone()));
        }

        // connect timeout must be in (0, 300]
        if self.connect_timeout_seconds == 0 || self.connect_timeout_seconds > 300 {
            return Err(ConfigError::OutOfBounds {
                field: "connect_timeout_seconds",
                value: self.connect_timeout_seconds,
                max: 300,
            });
        }

        // request timeout must be in (0, 3600]
        if self.request_timeout_seconds == 0 || self.request_timeout_seconds > 3600 {
            return Err(ConfigError::OutOfBounds {
                field: "request_timeout_seconds",
                value: self.request_timeout_seconds,
                max: 3600,
            });
        }

        // poll interval must be in (0, 3600000]
        if self.poll_interval_ms == 0 || self.poll_interval_ms > 3_600_000 {
            return Err(ConfigError::OutOfBounds {
                field: "poll_interval_ms",
                value: self.poll_interval_ms,
                max: 3_600_000,
            });
        }

        Ok(())
    }

    /// Transport configuration for this endpoint.
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            base_url: self.endpoint.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_seconds),
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            ..HttpConfig::default()
        }
    }

    /// Poller configuration for task waits.
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            timeout: (self.wait_timeout_seconds > 0)
                .then(|| Duration::from_secs(self.wait_timeout_seconds)),
            max_transient_errors: self.max_transient_errors,
        }
    }
}
