//! Error types for the jsonlink client.

use std::path::PathBuf;

use thiserror::Error;

use crate::client::ConnectionState;

/// Errors surfaced synchronously to callers of the client.
///
/// Connect failures and read faults never show up here: they are absorbed
/// by the connection state machine and reported through the
/// [`Logger`](crate::logger::Logger) port instead.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Bad construction arguments. Fatal, never retried.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The operation needs a live connection.
    #[error("Not connected (state: {0})")]
    InvalidState(ConnectionState),

    /// Payload rejected before it reached the transport.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A structured value could not be converted to JSON.
    #[error("Cannot serialize message: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The transport failed while sending.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),

    /// `start()` was called while the engine task is still running.
    #[error("Client engine is already running")]
    AlreadyRunning,

    /// Reading or writing a config file failed.
    #[error("Config file {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config file did not contain valid JSON for the expected shape.
    #[error("Config file {path} is malformed: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    /// True for errors caused by misuse on the caller's side.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ClientError::Configuration(_)
                | ClientError::InvalidState(_)
                | ClientError::InvalidArgument(_)
                | ClientError::Serialization(_)
                | ClientError::AlreadyRunning
        )
    }

    /// True when the transport itself failed.
    pub fn is_io(&self) -> bool {
        matches!(self, ClientError::Io(_))
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err)
    }
}
