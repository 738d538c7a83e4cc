//! WebSocket transport and its connection lifecycle.
//!
//! # State Machine
//!
//! ```text
//! Idle ──connect──► Connecting ──Open──► Open ──close()──► Closing
//!                        │                 │                  │
//!                        │        Closed/Failure/abort        │
//!                        ▼                 ▼                  ▼
//!                        └─────────────► Draining ◄───────────┘
//!                                           │
//!                                  on_disconnect returned
//!                                           ▼
//!                                        Closed
//! ```
//!
//! `connect` may be called again from `Closed` to start a new attempt. A
//! `connect` made while `Draining`, including one made from inside
//! `on_disconnect`, is deferred until that callback has returned.
//!
//! # Delivery
//!
//! Each attempt gets a dispatch task that receives [`SocketEvent`]s, applies
//! them to the shared state under a lock, then invokes the handler with the
//! lock released. The next attempt is only started once the previous
//! dispatcher has delivered `on_disconnect`, so callbacks of two attempts
//! never run concurrently or out of order.
//!
//! `abort` wakes the dispatcher directly; it reports `on_disconnect(false)`
//! without waiting for the socket task to notice the cancel.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::serializer::{JsonSerializer, Serializer};

use super::contract::{Transport, TransportHandler};
use super::endpoint::Endpoint;
use super::frame::Frame;
use super::options::TransportOptions;
use super::socket::{
    Connector, GOING_AWAY, HandshakeRequest, NO_STATUS_RECEIVED, NORMAL_CLOSURE, SocketChannels,
    SocketCommand, SocketEvent, TungsteniteConnector,
};

// ============================================================================
// TransportState
// ============================================================================

/// Lifecycle state of the current attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportState {
    /// No attempt made yet.
    Idle,
    /// Waiting for the socket to open.
    Connecting,
    /// Ready to send and receive.
    Open,
    /// Close handshake in progress.
    Closing,
    /// Attempt ended; `on_disconnect` not yet delivered.
    Draining,
    /// Attempt finished.
    Closed,
}

// ============================================================================
// Link
// ============================================================================

/// What the dispatcher must do after applying an event.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Connected,
    Deliver(Frame),
    Disconnected { was_clean: bool },
    Ignore,
}

/// A started attempt, ready to hand to the connector.
struct Launch {
    attempt: u64,
    commands: mpsc::UnboundedReceiver<SocketCommand>,
    aborted: Arc<Notify>,
}

/// State shared between callers and the dispatch task.
struct Link {
    /// Number of the current attempt.
    attempt: u64,
    state: TransportState,
    /// Command channel of the current socket. `None` once the attempt ends.
    handle: Option<mpsc::UnboundedSender<SocketCommand>>,
    /// Wakes the current dispatcher on abort.
    aborted: Arc<Notify>,
    /// `close()` was called on the current attempt.
    close_requested: bool,
    /// Handler of a `connect` made while `Draining`.
    deferred: Option<Arc<dyn TransportHandler>>,
}

impl Link {
    fn new() -> Self {
        Self {
            attempt: 0,
            state: TransportState::Idle,
            handle: None,
            aborted: Arc::new(Notify::new()),
            close_requested: false,
            deferred: None,
        }
    }

    #[inline]
    const fn is_active(&self) -> bool {
        matches!(
            self.state,
            TransportState::Connecting | TransportState::Open | TransportState::Closing
        )
    }

    #[inline]
    const fn is_open(&self) -> bool {
        matches!(self.state, TransportState::Open | TransportState::Closing)
    }

    /// Whether a completed close handshake with `code` counts as clean.
    ///
    /// A close without status is only clean when we asked for it.
    #[inline]
    const fn is_clean_close(&self, code: u16) -> bool {
        match code {
            NORMAL_CLOSURE | GOING_AWAY => true,
            NO_STATUS_RECEIVED => self.close_requested,
            _ => false,
        }
    }

    /// Starts a new attempt.
    fn begin(&mut self) -> Launch {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        self.attempt += 1;
        self.state = TransportState::Connecting;
        self.handle = Some(command_tx);
        self.aborted = Arc::new(Notify::new());
        self.close_requested = false;

        Launch {
            attempt: self.attempt,
            commands: command_rx,
            aborted: Arc::clone(&self.aborted),
        }
    }

    fn drain(&mut self) {
        self.state = TransportState::Draining;
        self.handle = None;
    }

    /// Cancels the current socket and wakes its dispatcher.
    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.send(SocketCommand::Cancel);
        }
        self.drain();
        self.aborted.notify_one();
    }

    /// Marks `attempt` closed after its `on_disconnect` returned.
    ///
    /// Returns the deferred attempt to start, if any.
    fn settle(&mut self, attempt: u64) -> Option<(Launch, Arc<dyn TransportHandler>)> {
        if attempt != self.attempt || self.state != TransportState::Draining {
            return None;
        }

        self.state = TransportState::Closed;
        let handler = self.deferred.take()?;
        Some((self.begin(), handler))
    }

    /// Applies a socket event from `attempt` to the state.
    fn apply(&mut self, attempt: u64, event: SocketEvent) -> Step {
        let current = attempt == self.attempt;

        match event {
            SocketEvent::Open if current && self.state == TransportState::Connecting => {
                self.state = TransportState::Open;
                Step::Connected
            }

            SocketEvent::Message(frame) if current && self.is_open() => Step::Deliver(frame),

            SocketEvent::Closing { code, reason } => {
                if current && self.state == TransportState::Open {
                    debug!(attempt, code, %reason, "Peer started close handshake");
                    self.state = TransportState::Closing;
                }
                Step::Ignore
            }

            SocketEvent::Closed { code, .. } => {
                let was_clean = current && self.is_open() && self.is_clean_close(code);
                if current {
                    self.drain();
                }
                debug!(attempt, code, was_clean, "Socket closed");
                Step::Disconnected { was_clean }
            }

            SocketEvent::Failure { message } => {
                if current {
                    self.drain();
                }
                debug!(attempt, %message, "Socket failed");
                Step::Disconnected { was_clean: false }
            }

            // Open or Message after abort, or from a superseded attempt
            _ => {
                trace!(attempt, "Dropping event for inactive attempt");
                Step::Ignore
            }
        }
    }
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// WAMP transport over a WebSocket.
///
/// Cheap to clone; clones share the same connection.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use wamp_websocket::{Serializer, Transport, TransportHandler, WebSocketTransport};
///
/// struct Printer;
///
/// impl TransportHandler for Printer {
///     fn on_connect(
///         &self,
///         transport: Arc<dyn Transport>,
///         _serializer: Arc<dyn Serializer>,
///     ) -> wamp_websocket::Result<()> {
///         transport.send(br#"[1,"realm1",{"roles":{"caller":{}}}]"#, false)
///     }
///
///     fn on_message(&self, payload: Vec<u8>, _is_binary: bool) -> wamp_websocket::Result<()> {
///         println!("{}", String::from_utf8_lossy(&payload));
///         Ok(())
///     }
///
///     fn on_disconnect(&self, was_clean: bool) {
///         println!("disconnected (clean: {was_clean})");
///     }
/// }
///
/// # async fn example() -> wamp_websocket::Result<()> {
/// let transport = WebSocketTransport::new("ws://127.0.0.1:8080/ws")?;
/// transport.connect(Arc::new(Printer));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct WebSocketTransport {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: Endpoint,
    serializer: Arc<dyn Serializer>,
    options: TransportOptions,
    connector: Arc<dyn Connector>,
    runtime: Handle,
    link: Mutex<Link>,
}

impl WebSocketTransport {
    /// Creates a transport for `endpoint` with the JSON serializer and
    /// default options.
    ///
    /// # Errors
    ///
    /// See [`WebSocketTransportBuilder::build`].
    pub fn new(endpoint: &str) -> Result<Self> {
        Self::builder().endpoint(endpoint).build()
    }

    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> WebSocketTransportBuilder {
        WebSocketTransportBuilder::new()
    }

    /// Returns the configured endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Returns the serializer reported to handlers.
    #[inline]
    #[must_use]
    pub fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.inner.serializer
    }

    /// Returns the transport options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &TransportOptions {
        &self.inner.options
    }

    /// Hands a started attempt to the connector and spawns its dispatcher.
    fn launch(&self, launch: Launch, handler: Arc<dyn TransportHandler>) {
        let Launch {
            attempt,
            commands,
            aborted,
        } = launch;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let request = HandshakeRequest {
            endpoint: self.inner.endpoint.clone(),
            subprotocol: self.inner.serializer.subprotocol().to_owned(),
            options: self.inner.options.clone(),
        };

        debug!(endpoint = %self.inner.endpoint, attempt, "Connecting transport");

        self.inner.connector.open(
            &self.inner.runtime,
            request,
            SocketChannels {
                commands,
                events: event_tx,
            },
        );
        self.inner
            .runtime
            .spawn(self.clone().dispatch(attempt, handler, event_rx, aborted));
    }

    /// Aborts `attempt` if it is still the current one.
    fn abort_attempt(&self, attempt: u64) {
        let mut link = self.inner.link.lock();
        if link.attempt == attempt && link.is_active() {
            link.cancel();
        }
    }

    /// Closes out `attempt` and starts a deferred `connect`, if any.
    fn settle(&self, attempt: u64) {
        let next = self.inner.link.lock().settle(attempt);
        if let Some((launch, handler)) = next {
            debug!(attempt = launch.attempt, "Starting deferred connect");
            self.launch(launch, handler);
        }
    }

    /// Relays socket events of one attempt to the handler.
    async fn dispatch(
        self,
        attempt: u64,
        handler: Arc<dyn TransportHandler>,
        mut events: mpsc::UnboundedReceiver<SocketEvent>,
        aborted: Arc<Notify>,
    ) {
        loop {
            let event = tokio::select! {
                event = events.recv() => event.unwrap_or_else(|| {
                    warn!(attempt, "Socket ended without terminal event");
                    SocketEvent::Failure {
                        message: "socket ended without terminal event".into(),
                    }
                }),
                () = aborted.notified() => SocketEvent::Failure {
                    message: "aborted".into(),
                },
            };

            let step = self.inner.link.lock().apply(attempt, event);

            match step {
                Step::Connected => {
                    info!(endpoint = %self.inner.endpoint, attempt, "Transport open");
                    let transport: Arc<dyn Transport> = Arc::new(self.clone());
                    if let Err(e) =
                        handler.on_connect(transport, Arc::clone(&self.inner.serializer))
                    {
                        error!(attempt, error = %e, "on_connect failed, aborting");
                        self.abort_attempt(attempt);
                    }
                }

                Step::Deliver(frame) => {
                    let is_binary = frame.is_binary();
                    if let Err(e) = handler.on_message(frame.into_payload(), is_binary) {
                        error!(attempt, error = %e, "on_message failed, aborting");
                        self.abort_attempt(attempt);
                    }
                }

                Step::Disconnected { was_clean } => {
                    info!(endpoint = %self.inner.endpoint, attempt, was_clean, "Transport closed");
                    handler.on_disconnect(was_clean);
                    self.settle(attempt);
                    return;
                }

                Step::Ignore => {}
            }
        }
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self, handler: Arc<dyn TransportHandler>) {
        let launch = {
            let mut link = self.inner.link.lock();
            match link.state {
                TransportState::Idle | TransportState::Closed => link.begin(),

                TransportState::Draining => {
                    if link.deferred.is_some() {
                        warn!(
                            attempt = link.attempt,
                            "connect() already deferred until disconnect, ignoring"
                        );
                    } else {
                        debug!(attempt = link.attempt, "Deferring connect until disconnect");
                        link.deferred = Some(handler);
                    }
                    return;
                }

                TransportState::Connecting | TransportState::Open | TransportState::Closing => {
                    warn!(
                        attempt = link.attempt,
                        state = ?link.state,
                        "connect() called while an attempt is active, ignoring"
                    );
                    return;
                }
            }
        };

        self.launch(launch, handler);
    }

    fn send_frame(&self, frame: Frame) -> Result<()> {
        let link = self.inner.link.lock();

        match &link.handle {
            Some(handle) if link.state == TransportState::Open => handle
                .send(SocketCommand::Send(frame))
                .map_err(|_| Error::NotConnected),
            _ => {
                trace!(state = ?link.state, "Dropping frame, transport not open");
                Err(Error::NotConnected)
            }
        }
    }

    fn is_open(&self) -> bool {
        self.inner.link.lock().is_open()
    }

    fn close(&self) {
        let mut link = self.inner.link.lock();
        if link.state != TransportState::Open {
            return;
        }

        if let Some(handle) = &link.handle {
            debug!(attempt = link.attempt, "Closing transport");
            let _ = handle.send(SocketCommand::Close {
                code: NORMAL_CLOSURE,
                reason: None,
            });
        }
        link.state = TransportState::Closing;
        link.close_requested = true;
    }

    fn abort(&self) {
        let mut link = self.inner.link.lock();
        if !link.is_active() {
            return;
        }

        debug!(attempt = link.attempt, state = ?link.state, "Aborting transport");
        link.cancel();
    }
}

impl fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let link = self.inner.link.lock();
        f.debug_struct("WebSocketTransport")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("serializer", &self.inner.serializer)
            .field("attempt", &link.attempt)
            .field("state", &link.state)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// WebSocketTransportBuilder
// ============================================================================

/// Builder for [`WebSocketTransport`].
#[derive(Default)]
pub struct WebSocketTransportBuilder {
    endpoint: Option<String>,
    serializer: Option<Arc<dyn Serializer>>,
    options: TransportOptions,
    connector: Option<Arc<dyn Connector>>,
    runtime: Option<Handle>,
}

impl WebSocketTransportBuilder {
    /// Creates a builder with no endpoint.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the endpoint address (`ws://` or `wss://`).
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the serializer. Defaults to [`JsonSerializer`].
    #[inline]
    #[must_use]
    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Sets the transport options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the connector. Defaults to [`TungsteniteConnector`].
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Sets the runtime used for socket and dispatch tasks. Defaults to the
    /// runtime `build` is called from.
    #[inline]
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Builds the transport.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no endpoint is set, the options are invalid,
    ///   no Tokio runtime is available, or a `wss://` endpoint is used with
    ///   the default connector while the `tls` feature is disabled
    /// - [`Error::InvalidEndpoint`] if the endpoint is not a `ws`/`wss` URL
    pub fn build(self) -> Result<WebSocketTransport> {
        let endpoint = self.endpoint.ok_or_else(|| {
            Error::config(
                "Endpoint is required. Use .endpoint() to set it.\n\
                 Example: WebSocketTransport::builder().endpoint(\"ws://127.0.0.1:8080/ws\")",
            )
        })?;
        let endpoint = Endpoint::parse(&endpoint)?;

        self.options.validate()?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| {
                Error::config("No Tokio runtime available. Build inside a runtime or use .runtime()")
            })?,
        };

        let connector = match self.connector {
            Some(connector) => connector,
            None => {
                if endpoint.is_secure() && !cfg!(feature = "tls") {
                    return Err(Error::config(
                        "wss:// endpoints require the `tls` feature",
                    ));
                }
                Arc::new(TungsteniteConnector)
            }
        };

        let serializer = self
            .serializer
            .unwrap_or_else(|| Arc::new(JsonSerializer));

        debug!(
            endpoint = %endpoint,
            subprotocol = serializer.subprotocol(),
            "Transport created"
        );

        Ok(WebSocketTransport {
            inner: Arc::new(Inner {
                endpoint,
                serializer,
                options: self.options,
                connector,
                runtime,
                link: Mutex::new(Link::new()),
            }),
        })
    }
}

impl fmt::Debug for WebSocketTransportBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketTransportBuilder")
            .field("endpoint", &self.endpoint)
            .field("serializer", &self.serializer)
            .field("options", &self.options)
            .field("custom_connector", &self.connector.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
