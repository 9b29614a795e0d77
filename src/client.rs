//! Self-healing TCP client for JSON messages.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐            TCP            ┌─────────────────────┐
//! │   Host app      │  ◄──────────────────────► │     Remote peer     │
//! │   (Client)      │   UTF-8 JSON, unframed    │                     │
//! └─────────────────┘                           └─────────────────────┘
//! ```
//!
//! The engine task owns the read side of the socket and runs
//! connect → read → teardown → reconnect. Hosts call `write`, `send` and
//! `disconnect` concurrently from their own tasks; those share the write
//! side behind a mutex and observe the connection through an atomic state
//! cell.
//!
//! # Protocol
//!
//! No length prefix and no delimiter: each payload is written as-is, and
//! every read from the socket is published as one `MessageReceived` chunk.
//! The peer is expected to send one self-contained JSON document per write.
//!
//! # Usage
//!
//! ```ignore
//! use jsonlink::{Client, ClientEvent, DisconnectReason};
//! use serde_json::json;
//!
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let client = Client::builder("game.example.org", 4000)
//!     .auto_reconnect(true)
//!     .events(tx)
//!     .build()?;
//! client.start()?;
//!
//! if let Some(ClientEvent::Connected) = rx.recv().await {
//!     client.send(&json!({"type": "hello"})).await?;
//! }
//! client.disconnect(DisconnectReason::ClientClosing).await;
//! ```

mod engine;
mod inbound;
mod outbound;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{Client, ClientBuilder};
pub use state::ConnectionState;
