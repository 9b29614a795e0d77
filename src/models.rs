//! Data models shared by the client engine, the config file and the wire.
//!
//! Wire-facing types use serde so they serialize to the JSON documents the
//! peer expects.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Reconnect delay applied when auto-reconnect is on and no period is given.
pub const DEFAULT_RECONNECT_PERIOD: Duration = Duration::from_millis(2000);

/// Remote address the client connects to. Validated once, then immutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Build an endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if `host` is empty or blank.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, ClientError> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(ClientError::Configuration(
                "host must not be empty".to_string(),
            ));
        }
        Ok(Self { host, port })
    }

    /// Build an endpoint from an unchecked port number, as read from a
    /// config file or command line.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the host is empty or the
    /// port lies outside `0..=65535`.
    pub fn from_raw(host: impl Into<String>, port: i64) -> Result<Self, ClientError> {
        let port = u16::try_from(port).map_err(|_| {
            ClientError::Configuration(format!("port {} is outside 0..=65535", port))
        })?;
        Self::new(host, port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Whether, and how often, the engine retries after a lost or failed
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    /// Delay before every reconnect attempt. Ignored when `enabled` is false.
    pub period: Duration,
}

impl ReconnectPolicy {
    /// Never reconnect; the engine stops after the first loss or failure.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            period: DEFAULT_RECONNECT_PERIOD,
        }
    }

    /// Reconnect forever, sleeping `period` before each attempt.
    pub fn every(period: Duration) -> Self {
        Self {
            enabled: true,
            period,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Why a voluntary disconnect happened. Sent to the peer ahead of teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisconnectReason {
    ClientClosing,
    ServerClosing,
    Timeout,
    Kicked,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::ClientClosing => "client closing",
            DisconnectReason::ServerClosing => "server closing",
            DisconnectReason::Timeout => "timeout",
            DisconnectReason::Kicked => "kicked",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed control messages the client itself puts on the wire.
///
/// Serialized with an internal `type` tag, e.g.
/// `{"type":"disconnect","reason":"CLIENT_CLOSING"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Disconnect { reason: DisconnectReason },
}
