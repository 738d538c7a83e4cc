//! Underlying WebSocket connection.
//!
//! A [`Connector`] opens one socket per connection attempt and runs it on its
//! own delivery context. The transport talks to it through a pair of
//! channels: [`SocketCommand`]s go in, [`SocketEvent`]s come out.
//!
//! # Event Contract
//!
//! For every attempt the connector emits, in order:
//!
//! - at most one [`SocketEvent::Open`]
//! - zero or more [`SocketEvent::Message`] / [`SocketEvent::Closing`]
//! - exactly one terminal [`SocketEvent::Closed`] or [`SocketEvent::Failure`]
//!
//! [`TungsteniteConnector`] is the default implementation.

// ============================================================================
// Imports
// ============================================================================

use std::future::pending;

use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

use super::endpoint::Endpoint;
use super::frame::Frame;
use super::options::TransportOptions;

// ============================================================================
// Constants
// ============================================================================

/// Close code for a normal, caller-initiated closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code for an endpoint going away (server shutdown, page navigation).
pub const GOING_AWAY: u16 = 1001;

/// Close code reported when the peer's close frame carried no status.
pub const NO_STATUS_RECEIVED: u16 = 1005;

// ============================================================================
// Commands & Events
// ============================================================================

/// Instruction from the transport to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketCommand {
    /// Queue a frame for transmission.
    Send(Frame),
    /// Start the close handshake.
    Close {
        /// Close status code.
        code: u16,
        /// Optional close reason.
        reason: Option<String>,
    },
    /// Drop the connection without a close handshake.
    Cancel,
}

/// Notification from the socket to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Handshake completed, the socket is ready.
    Open,
    /// Inbound data frame.
    Message(Frame),
    /// The peer sent a close frame.
    Closing {
        /// Close status code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// The close handshake completed.
    Closed {
        /// Close status code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// The connection failed or was cancelled.
    Failure {
        /// Description of the failure.
        message: String,
    },
}

impl SocketEvent {
    /// Returns `true` for [`Closed`](Self::Closed) and [`Failure`](Self::Failure).
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed { .. } | Self::Failure { .. })
    }
}

/// Channel ends handed to a [`Connector`] for one attempt.
#[derive(Debug)]
pub struct SocketChannels {
    /// Commands issued by the transport.
    pub commands: mpsc::UnboundedReceiver<SocketCommand>,
    /// Events consumed by the transport.
    pub events: mpsc::UnboundedSender<SocketEvent>,
}

// ============================================================================
// HandshakeRequest
// ============================================================================

/// Everything a connector needs to open one socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Endpoint to connect to.
    pub endpoint: Endpoint,
    /// Subprotocol token announced in `Sec-WebSocket-Protocol`.
    pub subprotocol: String,
    /// Socket options.
    pub options: TransportOptions,
}

impl HandshakeRequest {
    /// Builds the HTTP upgrade request.
    ///
    /// # Errors
    ///
    /// - [`Error::WebSocket`] if the endpoint cannot form a request
    /// - [`Error::Config`] if the subprotocol is not a valid header value
    pub fn to_client_request(&self) -> Result<Request> {
        let mut request = self.endpoint.as_str().into_client_request()?;

        let protocol = HeaderValue::from_str(&self.subprotocol).map_err(|e| {
            Error::config(format!("invalid subprotocol '{}': {e}", self.subprotocol))
        })?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);

        Ok(request)
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Opens the underlying connection for an attempt.
///
/// Implementations must return immediately and deliver all events
/// asynchronously through `channels.events`.
pub trait Connector: Send + Sync + 'static {
    /// Starts connecting. Never blocks.
    fn open(&self, runtime: &Handle, request: HandshakeRequest, channels: SocketChannels);
}

/// Connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn open(&self, runtime: &Handle, request: HandshakeRequest, channels: SocketChannels) {
        runtime.spawn(run_socket(request, channels));
    }
}

// ============================================================================
// Socket Task
// ============================================================================

/// Runs one socket to completion and reports its terminal event.
async fn run_socket(request: HandshakeRequest, channels: SocketChannels) {
    let SocketChannels {
        mut commands,
        events,
    } = channels;

    let terminal = match drive_socket(&request, &mut commands, &events).await {
        Ok((code, reason)) => {
            debug!(endpoint = %request.endpoint, code, %reason, "WebSocket closed");
            SocketEvent::Closed { code, reason }
        }
        Err(e) => {
            debug!(endpoint = %request.endpoint, error = %e, "WebSocket failed");
            SocketEvent::Failure {
                message: e.to_string(),
            }
        }
    };

    let _ = events.send(terminal);
    trace!("Socket task terminated");
}

/// Connects, then pumps frames until the socket ends.
///
/// Returns the close code and reason on a completed close handshake.
async fn drive_socket(
    request: &HandshakeRequest,
    commands: &mut mpsc::UnboundedReceiver<SocketCommand>,
    events: &mpsc::UnboundedSender<SocketEvent>,
) -> Result<(u16, String)> {
    let options = &request.options;
    let client_request = request.to_client_request()?;

    debug!(
        endpoint = %request.endpoint,
        subprotocol = %request.subprotocol,
        "Connecting"
    );

    let connect =
        connect_async_with_config(client_request, Some(options.to_websocket_config()), false);
    tokio::pin!(connect);

    // Commands can still arrive while the handshake is in flight
    let ws_stream = loop {
        tokio::select! {
            result = &mut connect => {
                let (stream, response) = result?;
                debug!(status = %response.status(), "WebSocket handshake completed");
                break stream;
            }

            command = commands.recv() => match command {
                Some(SocketCommand::Send(_)) => trace!("Dropping frame queued before open"),
                Some(SocketCommand::Close { .. } | SocketCommand::Cancel) => {
                    return Err(Error::connection("cancelled before open"));
                }
                None => return Err(Error::connection("transport dropped")),
            }
        }
    };

    let _ = events.send(SocketEvent::Open);

    let (mut ws_write, mut ws_read) = ws_stream.split();

    let mut next_ping = options.auto_ping_interval.map(|interval| Instant::now() + interval);
    let mut pong_deadline: Option<Instant> = None;
    let mut close_deadline: Option<Instant> = None;
    let mut peer_close: Option<(u16, String)> = None;

    loop {
        tokio::select! {
            // Incoming frames from the peer
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame.map_or_else(
                            || (NO_STATUS_RECEIVED, String::new()),
                            |frame| (u16::from(frame.code), frame.reason.as_str().to_owned()),
                        );
                        debug!(code, %reason, "Close frame received");

                        let _ = events.send(SocketEvent::Closing {
                            code,
                            reason: reason.clone(),
                        });
                        peer_close = Some((code, reason));
                        next_ping = None;
                        pong_deadline = None;
                    }

                    Some(Ok(Message::Pong(_))) => {
                        trace!("Pong received");
                        pong_deadline = None;
                    }

                    Some(Ok(message)) => {
                        // Pings are answered by tungstenite itself
                        if let Some(frame) = Frame::from_message(message) {
                            trace!(len = frame.len(), binary = frame.is_binary(), "Frame received");
                            let _ = events.send(SocketEvent::Message(frame));
                        }
                    }

                    Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                        return peer_close.ok_or_else(|| {
                            Error::connection("connection ended without close handshake")
                        });
                    }

                    Some(Err(e)) => return Err(e.into()),
                }
            }

            // Commands from the transport
            command = commands.recv() => {
                match command {
                    Some(SocketCommand::Send(frame)) => {
                        if peer_close.is_some() || close_deadline.is_some() {
                            trace!("Dropping frame sent while closing");
                            continue;
                        }
                        ws_write.send(frame.into_message()).await?;
                    }

                    Some(SocketCommand::Close { code, reason }) => {
                        if peer_close.is_some() || close_deadline.is_some() {
                            continue;
                        }
                        debug!(code, "Sending close frame");
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.unwrap_or_default().into(),
                        };
                        ws_write.send(Message::Close(Some(frame))).await?;
                        close_deadline = Some(Instant::now() + options.close_timeout);
                        next_ping = None;
                        pong_deadline = None;
                    }

                    Some(SocketCommand::Cancel) => return Err(Error::connection("cancelled")),

                    None => return Err(Error::connection("transport dropped")),
                }
            }

            // Keep-alive
            () = sleep_until_opt(next_ping) => {
                trace!("Sending ping");
                ws_write.send(Message::Ping(Vec::new().into())).await?;
                if pong_deadline.is_none() {
                    pong_deadline = Some(Instant::now() + options.auto_ping_timeout);
                }
                next_ping = options.auto_ping_interval.map(|interval| Instant::now() + interval);
            }

            () = sleep_until_opt(pong_deadline) => {
                warn!(timeout = ?options.auto_ping_timeout, "No pong received");
                return Err(Error::connection("ping timeout"));
            }

            () = sleep_until_opt(close_deadline) => {
                warn!(timeout = ?options.close_timeout, "Peer did not answer close frame");
                return Err(Error::connection("close handshake timed out"));
            }
        }
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================
