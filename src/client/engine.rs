//! Connect/reconnect engine and read loop.
//!
//! One spawned task drives the whole cycle:
//!
//! ```text
//! attempt_connect ──ok──► read_loop ──► finish_connection ─┐
//!        │                                                 │
//!        └──fail──► (policy enabled?) ◄────────────────────┘
//!                        │ yes: sleep(period), loop
//!                        └ no:  engine stops
//! ```

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

use super::inbound::InboundBuffer;
use super::state::{ConnectionState, StateCell};
use crate::error::ClientError;
use crate::events::{ClientEvent, EventSink, NullSink};
use crate::logger::{Logger, TracingLogger};
use crate::models::{Endpoint, ReconnectPolicy, DEFAULT_RECONNECT_PERIOD};

/// Write side of a live connection.
pub(crate) struct Transport {
    pub(crate) writer: OwnedWriteHalf,
    /// Wakes the read loop when the transport is closed from another task.
    closed: Arc<Notify>,
}

/// Read side of a live connection, owned by the read loop.
pub(crate) struct Connection {
    reader: OwnedReadHalf,
    closed: Arc<Notify>,
}

/// State shared between the engine task and every `Client` handle.
pub(crate) struct Shared {
    pub(crate) endpoint: Endpoint,
    pub(crate) policy: ReconnectPolicy,
    connect_timeout: Option<Duration>,
    pub(crate) logger: Arc<dyn Logger>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) state: StateCell,
    /// Cleared by the first connect attempt this client ever makes.
    first_attempt: AtomicBool,
    pub(crate) transport: Mutex<Option<Transport>>,
    /// `true` once `disconnect()` asked the engine to stop.
    pub(crate) stop: watch::Sender<bool>,
    running: AtomicBool,
}

/// Self-healing client for the line-oriented JSON protocol.
///
/// `Client` is a cheap handle; clones share one connection. The engine runs
/// on its own task once [`Client::start`] is called, while `write`, `send`
/// and `disconnect` may be called from any task.
///
/// # Example
///
/// ```ignore
/// use jsonlink::{Client, DisconnectReason};
///
/// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
/// let client = Client::builder("127.0.0.1", 7000)
///     .auto_reconnect(true)
///     .events(tx)
///     .build()?;
/// client.start()?;
///
/// while let Some(event) = rx.recv().await {
///     println!("{:?}", event);
/// }
/// client.disconnect(DisconnectReason::ClientClosing).await;
/// ```
#[derive(Clone)]
pub struct Client {
    pub(crate) shared: Arc<Shared>,
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    host: String,
    port: u16,
    logger: Arc<dyn Logger>,
    events: Arc<dyn EventSink>,
    auto_reconnect: bool,
    reconnect_period: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl ClientBuilder {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            logger: Arc::new(TracingLogger),
            events: Arc::new(NullSink),
            auto_reconnect: false,
            reconnect_period: None,
            connect_timeout: None,
        }
    }

    /// Replace the default `tracing` logger.
    pub fn logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    /// Same as [`ClientBuilder::logger`] for an already shared logger.
    pub fn shared_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Where connection events go. Events are dropped by default.
    pub fn events(mut self, sink: impl EventSink + 'static) -> Self {
        self.events = Arc::new(sink);
        self
    }

    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Delay before each reconnect attempt (default 2s).
    pub fn reconnect_period(mut self, period: Duration) -> Self {
        self.reconnect_period = Some(period);
        self
    }

    /// Give up on a connect attempt after `timeout`. Unbounded by default.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Validate the endpoint and build the client. Nothing is connected yet.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the host is empty.
    pub fn build(self) -> Result<Client, ClientError> {
        let endpoint = Endpoint::new(self.host, self.port)?;
        let policy = if self.auto_reconnect {
            ReconnectPolicy::every(self.reconnect_period.unwrap_or(DEFAULT_RECONNECT_PERIOD))
        } else {
            ReconnectPolicy::disabled()
        };
        let (stop, _) = watch::channel(false);

        Ok(Client {
            shared: Arc::new(Shared {
                endpoint,
                policy,
                connect_timeout: self.connect_timeout,
                logger: self.logger,
                events: self.events,
                state: StateCell::new(ConnectionState::Disconnected),
                first_attempt: AtomicBool::new(true),
                transport: Mutex::new(None),
                stop,
                running: AtomicBool::new(false),
            }),
        })
    }
}

/// Clears the running flag when the engine task ends, even if it is aborted.
struct RunningGuard(Arc<Shared>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
    }
}

impl Client {
    pub fn builder(host: impl Into<String>, port: u16) -> ClientBuilder {
        ClientBuilder::new(host, port)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.shared.policy
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Spawn the engine task on the current tokio runtime.
    ///
    /// The task connects, reads until the connection ends and, if the
    /// reconnect policy allows, keeps reconnecting. Once it has stopped
    /// (policy disabled, or after `disconnect()`), calling `start` again
    /// restarts it.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::AlreadyRunning` if the engine task is alive.
    pub fn start(&self) -> Result<JoinHandle<()>, ClientError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadyRunning);
        }
        self.shared.stop.send_replace(false);

        let client = self.clone();
        Ok(tokio::spawn(async move {
            let _running = RunningGuard(Arc::clone(&client.shared));
            client.run().await;
        }))
    }

    /// Connect → read → teardown → delay, until the policy or a voluntary
    /// disconnect says stop.
    async fn run(&self) {
        loop {
            let retry = match self.attempt_connect().await {
                Some(connection) => self.read_loop(connection).await,
                None => self.shared.policy.enabled,
            };

            if !retry || self.stop_requested() {
                break;
            }
            self.reconnect_delay().await;
            if self.stop_requested() {
                break;
            }
        }
        debug!("Engine for {} stopped", self.shared.endpoint);
    }

    fn stop_requested(&self) -> bool {
        *self.shared.stop.borrow()
    }

    /// Sleep for the reconnect period. A disconnect cuts the sleep short.
    async fn reconnect_delay(&self) {
        let mut stop = self.shared.stop.subscribe();
        let stopped = async move {
            loop {
                if *stop.borrow_and_update() {
                    break;
                }
                if stop.changed().await.is_err() {
                    break;
                }
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(self.shared.policy.period) => {}
            _ = stopped => debug!("Reconnect delay interrupted"),
        }
    }

    /// Open a fresh transport to the endpoint.
    ///
    /// On success the state is `Connected`, a `Connected` event has been
    /// published and the read side is returned for the read loop. On failure
    /// the state is `Disconnected`; the failure is logged as severe unless
    /// this was the client's very first attempt.
    pub(crate) async fn attempt_connect(&self) -> Option<Connection> {
        let shared = &self.shared;
        let first = shared.first_attempt.swap(false, Ordering::SeqCst);
        shared.state.set(ConnectionState::Connecting);

        let stream = match connect_endpoint(&shared.endpoint, shared.connect_timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                shared.state.set(ConnectionState::Disconnected);
                if first {
                    debug!("First connect to {} failed: {}", shared.endpoint, e);
                } else {
                    shared
                        .logger
                        .severe(&format!("Could not connect to {}: {}", shared.endpoint, e));
                }
                return None;
            }
        };

        let (reader, writer) = stream.into_split();
        let closed = Arc::new(Notify::new());

        // Held until `Connected` is published; `disconnect()` takes it before
        // publishing `Disconnected`.
        let mut transport = shared.transport.lock().await;
        let previous = transport.replace(Transport {
            writer,
            closed: Arc::clone(&closed),
        });
        if let Some(previous) = previous {
            previous.close().await;
        }

        let live = !self.stop_requested()
            && shared
                .state
                .transition(ConnectionState::Connecting, ConnectionState::Connected);
        if !live {
            debug!("Disconnect requested while connecting to {}", shared.endpoint);
            shared.state.set(ConnectionState::Disconnected);
            if let Some(fresh) = transport.take() {
                fresh.close().await;
            }
            return None;
        }

        shared
            .logger
            .info(&format!("Connected to {}", shared.endpoint));
        shared.events.publish(ClientEvent::Connected);
        drop(transport);

        Some(Connection { reader, closed })
    }

    /// Publish one `MessageReceived` per read until the stream ends.
    ///
    /// Returns whether the engine should reconnect.
    async fn read_loop(&self, mut connection: Connection) -> bool {
        let shared = &self.shared;
        let mut buffer = InboundBuffer::new();

        loop {
            let read = tokio::select! {
                result = connection.reader.read(buffer.spare_mut()) => result,
                _ = connection.closed.notified() => {
                    debug!("Transport to {} closed locally", shared.endpoint);
                    break;
                }
            };

            let n = match read {
                Ok(0) => {
                    debug!("{} closed the connection", shared.endpoint);
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    shared.logger.exception(&e);
                    break;
                }
            };

            buffer.advance(n);
            let decoded = buffer.decode();
            for err in &decoded.errors {
                shared.logger.exception(err);
            }

            if shared.state.get() == ConnectionState::Disconnected {
                debug!("Connection marked disconnected, dropping {} bytes", n);
                break;
            }

            if !decoded.text.is_empty() {
                shared
                    .events
                    .publish(ClientEvent::MessageReceived { text: decoded.text });
            }
            buffer.consume(decoded.consumed);
            if !buffer.is_empty() {
                debug!("Holding {} bytes of a split character", buffer.len());
            }
        }

        self.finish_connection().await
    }

    /// Teardown after the read loop exits.
    ///
    /// Only a connection that was still `Connected` here leads to a
    /// reconnect. A failed write or `disconnect()` already moved the state
    /// to `Disconnected`, so the engine stops.
    async fn finish_connection(&self) -> bool {
        let shared = &self.shared;
        let was_connected =
            shared.state.swap(ConnectionState::Disconnected) == ConnectionState::Connected;

        if was_connected {
            shared
                .logger
                .info(&format!("Connection to {} lost", shared.endpoint));
            shared.events.publish(ClientEvent::Disconnected);
            self.close_transport().await;
        }

        if was_connected && shared.policy.enabled && !self.stop_requested() {
            shared
                .logger
                .info(&format!("Reconnecting to {}", shared.endpoint));
            return true;
        }
        false
    }

    /// Take the transport, shut it down and wake its read loop.
    ///
    /// A no-op when there is no transport.
    pub(crate) async fn close_transport(&self) {
        let transport = self.shared.transport.lock().await.take();
        if let Some(transport) = transport {
            transport.close().await;
        }
    }
}

impl Transport {
    pub(crate) async fn close(mut self) {
        if let Err(e) = self.writer.shutdown().await {
            debug!("Ignoring error while closing transport: {}", e);
        }
        self.closed.notify_one();
    }
}

/// Resolve the endpoint and connect to the first address that accepts.
async fn connect_endpoint(
    endpoint: &Endpoint,
    connect_timeout: Option<Duration>,
) -> io::Result<TcpStream> {
    match connect_timeout {
        Some(limit) => tokio::time::timeout(limit, open_stream(endpoint))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {}ms", limit.as_millis()),
                )
            })?,
        None => open_stream(endpoint).await,
    }
}

async fn open_stream(endpoint: &Endpoint) -> io::Result<TcpStream> {
    let mut last_error = None;

    for addr in lookup_host((endpoint.host(), endpoint.port())).await? {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;

        match socket.connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{} resolved to no addresses", endpoint.host()),
        )
    }))
}
