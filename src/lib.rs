//! jsonlink library
//!
//! A long-lived, self-healing TCP client that exchanges UTF-8 JSON messages
//! with a remote peer:
//!
//! - `client` - connection engine, read loop, write path and disconnect protocol
//! - `events` - event sink port (`Connected`, `Disconnected`, `MessageReceived`, `MessageSent`)
//! - `logger` - logger port and its default `tracing` implementation
//! - `models` - endpoint, reconnect policy and wire control messages
//! - `config` - JSON config file load/save
//!
//! # Usage
//!
//! ```ignore
//! use jsonlink::{Client, ClientConfig, default_config_path};
//!
//! let config = ClientConfig::load(&default_config_path())?;
//! let client = config.client_builder()?.build()?;
//! client.start()?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod logger;
pub mod models;

pub use client::{Client, ClientBuilder, ConnectionState};
pub use config::{default_config_path, ClientConfig};
pub use error::ClientError;
pub use events::{ClientEvent, EventSink, NullSink};
pub use logger::{Logger, TracingLogger};
pub use models::{ControlMessage, DisconnectReason, Endpoint, ReconnectPolicy};
