//! Write path and the voluntary disconnect protocol.

use serde::de::IgnoredAny;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::engine::Client;
use super::state::ConnectionState;
use crate::error::ClientError;
use crate::events::ClientEvent;
use crate::models::{ControlMessage, DisconnectReason};

/// Reject blank payloads and anything that is not one JSON document.
pub(crate) fn validate_payload(payload: &str) -> Result<(), ClientError> {
    if payload.trim().is_empty() {
        return Err(ClientError::InvalidArgument(
            "payload must not be blank".to_string(),
        ));
    }
    serde_json::from_str::<IgnoredAny>(payload)
        .map_err(|e| ClientError::InvalidArgument(format!("payload is not valid JSON: {}", e)))?;
    Ok(())
}

impl Client {
    /// Send a pre-built JSON payload to the peer.
    ///
    /// The bytes go out unframed, exactly as given. On success a
    /// `MessageSent` event carrying `payload` is published.
    ///
    /// # Errors
    ///
    /// - `ClientError::InvalidState` if the client is not connected
    /// - `ClientError::InvalidArgument` if the payload is blank or not JSON
    /// - `ClientError::Io` if the send fails; the connection is then
    ///   treated as lost and the state is already `Disconnected`
    pub async fn write(&self, payload: &str) -> Result<(), ClientError> {
        let state = self.state();
        if state != ConnectionState::Connected {
            return Err(ClientError::InvalidState(state));
        }
        validate_payload(payload)?;

        self.push(payload).await?;
        self.shared.events.publish(ClientEvent::MessageSent {
            text: payload.to_string(),
        });
        Ok(())
    }

    /// Serialize `value` to JSON and [`write`](Client::write) it.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Serialization` if `value` has no JSON form
    /// (e.g. a map with non-string keys); no state changes in that case.
    /// Otherwise fails like `write`.
    pub async fn send<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), ClientError> {
        let payload = serde_json::to_string(value).map_err(ClientError::Serialization)?;
        self.write(&payload).await
    }

    /// Hand the bytes to the transport, treating any failure as a lost
    /// connection.
    async fn push(&self, payload: &str) -> Result<(), ClientError> {
        let mut transport = self.shared.transport.lock().await;
        let Some(live) = transport.as_mut() else {
            return Err(ClientError::InvalidState(self.state()));
        };

        let result = match live.writer.write_all(payload.as_bytes()).await {
            Ok(()) => live.writer.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            drop(transport);
            self.connection_lost().await;
            return Err(ClientError::Io(e));
        }
        Ok(())
    }

    /// Force `Disconnected` after a failed write and close the transport.
    ///
    /// The engine's read loop wakes up and finds the connection already
    /// disconnected, so the engine stops without reconnecting.
    async fn connection_lost(&self) {
        let shared = &self.shared;
        if shared.state.swap(ConnectionState::Disconnected) == ConnectionState::Connected {
            shared
                .logger
                .info(&format!("Connection to {} lost while writing", shared.endpoint));
            shared.events.publish(ClientEvent::Disconnected);
        }
        self.close_transport().await;
    }

    /// Tell the peer why we are leaving, then tear the connection down.
    ///
    /// The notification is best effort: if it cannot be sent (for instance
    /// because the client is already disconnected) the failure is logged and
    /// teardown goes ahead. Afterwards the state is `Disconnected`, a
    /// `Disconnected` event has been published and the engine will not
    /// reconnect. Calling this twice is harmless.
    pub async fn disconnect(&self, reason: DisconnectReason) {
        let shared = &self.shared;
        shared
            .logger
            .info(&format!("Disconnecting from {} ({})", shared.endpoint, reason));
        shared.stop.send_replace(true);

        if let Err(e) = self.send(&ControlMessage::Disconnect { reason }).await {
            shared.logger.exception(&e);
        }

        let transport = shared.transport.lock().await.take();
        shared.state.set(ConnectionState::Disconnected);
        shared
            .logger
            .info(&format!("Disconnected from {}", shared.endpoint));
        shared.events.publish(ClientEvent::Disconnected);
        if let Some(transport) = transport {
            transport.close().await;
        }
        debug!("Transport to {} released", shared.endpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{recv_event, RecordingLogger};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
    use tokio::time::timeout;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    async fn connected_pair(
        auto_reconnect: bool,
    ) -> (
        Client,
        UnboundedReceiver<ClientEvent>,
        TcpStream,
        TcpListener,
        RecordingLogger,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let logger = RecordingLogger::default();
        let (tx, mut rx) = unbounded_channel();
        let client = Client::builder("127.0.0.1", port)
            .logger(logger.clone())
            .events(tx)
            .auto_reconnect(auto_reconnect)
            .reconnect_period(Duration::from_millis(20))
            .build()
            .unwrap();

        client.start().unwrap();
        let (peer, _) = timeout(TEST_TIMEOUT, listener.accept())
            .await
            .expect("Test timed out")
            .unwrap();
        assert_eq!(recv_event(&mut rx).await, ClientEvent::Connected);
        (client, rx, peer, listener, logger)
    }

    async fn read_some(peer: &mut TcpStream) -> String {
        let mut buf = vec![0u8; 1024];
        let n = timeout(TEST_TIMEOUT, peer.read(&mut buf))
            .await
            .expect("Test timed out")
            .unwrap();
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    #[test]
    fn test_validate_payload() {
        assert!(validate_payload(r#"{"a":[1,2,3]}"#).is_ok());
        assert!(validate_payload("42").is_ok());

        for bad in ["", "   \n", "{", r#"{"a":1} trailing"#, "not json"] {
            assert!(
                matches!(validate_payload(bad), Err(ClientError::InvalidArgument(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_write_while_disconnected_fails_without_event() {
        let (tx, mut rx) = unbounded_channel();
        let client = Client::builder("127.0.0.1", 1)
            .events(tx)
            .build()
            .unwrap();

        let err = client.write(r#"{"a":1}"#).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidState(ConnectionState::Disconnected)
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_write_delivers_payload_unchanged() {
        let (client, mut rx, mut peer, _listener, _logger) = connected_pair(false).await;

        let payload = r#"{"kind":"chat","text":"héllo"}"#;
        client.write(payload).await.unwrap();

        assert_eq!(read_some(&mut peer).await, payload);
        assert_eq!(
            recv_event(&mut rx).await,
            ClientEvent::MessageSent {
                text: payload.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_write_rejects_invalid_payload_without_event() {
        let (client, mut rx, _peer, _listener, _logger) = connected_pair(false).await;

        let err = client.write("{oops").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
        assert!(client.is_connected());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_serializes_value() {
        #[derive(Serialize)]
        struct Chat<'a> {
            channel: &'a str,
            body: &'a str,
        }

        let (client, mut rx, mut peer, _listener, _logger) = connected_pair(false).await;
        client
            .send(&Chat {
                channel: "general",
                body: "hi",
            })
            .await
            .unwrap();

        let expected = r#"{"channel":"general","body":"hi"}"#;
        assert_eq!(read_some(&mut peer).await, expected);
        assert_eq!(
            recv_event(&mut rx).await,
            ClientEvent::MessageSent {
                text: expected.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_send_unserializable_value_is_rejected() {
        let (client, mut rx, _peer, _listener, _logger) = connected_pair(false).await;

        let mut value: HashMap<Vec<u8>, u32> = HashMap::new();
        value.insert(vec![1, 2], 3);

        let err = client.send(&value).await.unwrap_err();
        assert!(matches!(err, ClientError::Serialization(_)));
        assert!(err.is_caller_error());
        assert!(client.is_connected());
        assert!(rx.try_recv().is_err());
    }

    /// Shut our write half so the next write hits a real transport error.
    async fn break_writer(client: &Client) {
        let mut transport = client.shared.transport.lock().await;
        let live = transport.as_mut().expect("client should be connected");
        live.writer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_failure_surfaces_io_error_and_disconnects() {
        let (client, mut rx, _peer, _listener, logger) = connected_pair(false).await;
        break_writer(&client).await;

        let err = client.write(r#"{"a":1}"#).await.unwrap_err();
        assert!(matches!(err, ClientError::Io(_)), "got {:?}", err);
        assert!(err.is_io());
        assert_eq!(client.state(), ConnectionState::Disconnected);

        assert_eq!(recv_event(&mut rx).await, ClientEvent::Disconnected);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        assert!(logger.infos().iter().any(|m| m.contains("lost while writing")));

        let err = client.write(r#"{"late":true}"#).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_write_failure_stops_engine_even_with_policy() {
        let (client, mut rx, _peer, listener, logger) = connected_pair(true).await;
        break_writer(&client).await;

        assert!(client.write(r#"{"a":1}"#).await.is_err());
        assert_eq!(recv_event(&mut rx).await, ClientEvent::Disconnected);

        // The teardown finds the state already disconnected: no reconnect
        assert!(timeout(Duration::from_millis(300), listener.accept())
            .await
            .is_err());
        assert!(rx.try_recv().is_err());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!logger.infos().iter().any(|m| m.starts_with("Reconnecting")));
    }

    #[tokio::test]
    async fn test_disconnect_notifies_peer_then_tears_down() {
        let (client, mut rx, mut peer, _listener, logger) = connected_pair(true).await;

        client.disconnect(DisconnectReason::ClientClosing).await;

        let notice = read_some(&mut peer).await;
        let notice: serde_json::Value = serde_json::from_str(&notice).unwrap();
        assert_eq!(
            notice,
            serde_json::json!({"type": "disconnect", "reason": "CLIENT_CLOSING"})
        );

        assert_eq!(
            recv_event(&mut rx).await,
            ClientEvent::MessageSent {
                text: r#"{"type":"disconnect","reason":"CLIENT_CLOSING"}"#.to_string()
            }
        );
        assert_eq!(recv_event(&mut rx).await, ClientEvent::Disconnected);
        assert_eq!(client.state(), ConnectionState::Disconnected);

        // No reconnect after a voluntary disconnect
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        assert!(!logger.infos().iter().any(|m| m.starts_with("Reconnecting")));
    }

    #[tokio::test]
    async fn test_disconnect_twice_is_harmless() {
        let (client, mut rx, _peer, _listener, logger) = connected_pair(false).await;

        client.disconnect(DisconnectReason::Kicked).await;
        client.disconnect(DisconnectReason::Kicked).await;

        assert_eq!(client.state(), ConnectionState::Disconnected);
        let events: Vec<ClientEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events
                .iter()
                .filter(|e| **e == ClientEvent::Disconnected)
                .count(),
            2
        );
        // The second notification could not be sent and was only logged
        assert_eq!(logger.exceptions().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected_still_publishes() {
        let (tx, mut rx) = unbounded_channel();
        let client = Client::builder("127.0.0.1", 1)
            .events(tx)
            .build()
            .unwrap();

        client.disconnect(DisconnectReason::Timeout).await;
        assert_eq!(recv_event(&mut rx).await, ClientEvent::Disconnected);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
