//! Client configuration and its JSON file form.
//!
//! ```json
//! {
//!   "host": "127.0.0.1",
//!   "port": 7000,
//!   "auto_reconnect": true,
//!   "reconnect_period_ms": 2000
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::{Client, ClientBuilder};
use crate::error::ClientError;
use crate::models::{Endpoint, ReconnectPolicy, DEFAULT_RECONNECT_PERIOD};

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "JSONLINK_CONFIG";

/// Construction parameters for a [`Client`], as stored on disk.
///
/// The port is kept wide so an out-of-range value in a file is reported as
/// a configuration error instead of a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub host: String,
    pub port: u32,
    #[serde(default)]
    pub auto_reconnect: bool,
    /// Only used when `auto_reconnect` is on. Defaults to 2000.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_period_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port: u32::from(port),
            auto_reconnect: false,
            reconnect_period_ms: None,
            connect_timeout_ms: None,
        }
    }

    /// Validated endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` for an empty host or a port
    /// above 65535.
    pub fn endpoint(&self) -> Result<Endpoint, ClientError> {
        Endpoint::from_raw(self.host.clone(), i64::from(self.port))
    }

    /// Reconnect policy, with the 2s default period when none is set.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        if self.auto_reconnect {
            ReconnectPolicy::every(
                self.reconnect_period_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_RECONNECT_PERIOD),
            )
        } else {
            ReconnectPolicy::disabled()
        }
    }

    /// A builder pre-filled from this config.
    ///
    /// # Errors
    ///
    /// Fails like [`ClientConfig::endpoint`].
    pub fn client_builder(&self) -> Result<ClientBuilder, ClientError> {
        let endpoint = self.endpoint()?;
        let policy = self.reconnect_policy();

        let mut builder = Client::builder(endpoint.host(), endpoint.port())
            .auto_reconnect(policy.enabled)
            .reconnect_period(policy.period);
        if let Some(ms) = self.connect_timeout_ms {
            builder = builder.connect_timeout(Duration::from_millis(ms));
        }
        Ok(builder)
    }

    /// Read a config from a UTF-8 JSON file.
    ///
    /// # Errors
    ///
    /// `ClientError::ConfigIo` if the file cannot be read,
    /// `ClientError::ConfigParse` if it is not a valid config.
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let text = std::fs::read_to_string(path).map_err(|source| ClientError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    fn parse(path: &Path, text: &str) -> Result<Self, ClientError> {
        serde_json::from_str(text).map_err(|source| ClientError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn to_pretty_json(&self, path: &Path) -> Result<String, ClientError> {
        serde_json::to_string_pretty(self).map_err(|source| ClientError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the config as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ClientError> {
        let json = self.to_pretty_json(path)?;
        let io_err = |source: std::io::Error| ClientError::ConfigIo {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, json).map_err(io_err)
    }

    /// Async variant of [`ClientConfig::save`] for use inside the runtime.
    pub async fn save_async(&self, path: &Path) -> Result<(), ClientError> {
        let json = self.to_pretty_json(path)?;
        let io_err = |source: std::io::Error| ClientError::ConfigIo {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(path, json).await.map_err(io_err)
    }
}

/// Resolve the default config file location.
///
/// Resolution order:
/// 1. `$JSONLINK_CONFIG`
/// 2. `<config dir>/jsonlink/client.json` (`~/.config` on Linux,
///    `~/Library/Application Support` on macOS)
/// 3. `/tmp/jsonlink/client.json` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("jsonlink").join("client.json");
    }

    PathBuf::from("/tmp/jsonlink/client.json")
}
