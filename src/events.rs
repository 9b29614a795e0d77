//! Event sink port: how the client publishes connection events to the host.

/// Events published by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A transport was established.
    Connected,
    /// The transport was torn down (peer closed, fault, or voluntary disconnect).
    Disconnected,
    /// One read's worth of decoded text arrived from the peer.
    MessageReceived { text: String },
    /// A payload was handed to the transport.
    MessageSent { text: String },
}

impl ClientEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::Connected => "connected",
            ClientEvent::Disconnected => "disconnected",
            ClientEvent::MessageReceived { .. } => "message-received",
            ClientEvent::MessageSent { .. } => "message-sent",
        }
    }
}

// =============================================================================
// Service Trait for Dependency Injection
// =============================================================================

/// Receiver of [`ClientEvent`]s.
///
/// `publish` is called from the engine task for `Connected`,
/// `Disconnected` and `MessageReceived`, and from the caller's task for
/// `MessageSent`. It must not block for long.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ClientEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: ClientEvent) {}
}

impl EventSink for std::sync::mpsc::Sender<ClientEvent> {
    fn publish(&self, event: ClientEvent) {
        if let Err(e) = self.send(event) {
            tracing::debug!("Event receiver gone, dropping {} event", e.0.kind());
        }
    }
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<ClientEvent> {
    fn publish(&self, event: ClientEvent) {
        if let Err(e) = self.send(event) {
            tracing::debug!("Event receiver gone, dropping {} event", e.0.kind());
        }
    }
}
