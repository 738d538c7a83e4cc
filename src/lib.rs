//! WAMP WebSocket transport.
//!
//! Moves opaque, already-serialized WAMP messages over a WebSocket and reports
//! the connection lifecycle to a protocol-level [`TransportHandler`]. The
//! transport never interprets payloads.
//!
//! # Architecture
//!
//! - [`WebSocketTransport`] owns at most one socket at a time and runs its
//!   lifecycle: `Idle → Connecting → Open → Closing → Draining → Closed`
//! - The socket runs on its own Tokio task; events are relayed to the
//!   handler on a per-attempt dispatch task, in receipt order
//! - The [`Serializer`] is fixed at construction; its subprotocol token is
//!   announced in the handshake and the instance is handed to `on_connect`
//! - Failures never surface as errors from transport methods; every attempt
//!   ends with exactly one `on_disconnect(was_clean)`
//! - Reconnection is the caller's job: call [`Transport::connect`] again
//!   after `on_disconnect`
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use wamp_websocket::{Result, Serializer, Transport, TransportHandler, WebSocketTransport};
//!
//! struct Session;
//!
//! impl TransportHandler for Session {
//!     fn on_connect(&self, transport: Arc<dyn Transport>, _: Arc<dyn Serializer>) -> Result<()> {
//!         transport.send(br#"[1,"realm1",{"roles":{"subscriber":{}}}]"#, false)
//!     }
//!
//!     fn on_message(&self, payload: Vec<u8>, is_binary: bool) -> Result<()> {
//!         println!("{} bytes (binary: {is_binary})", payload.len());
//!         Ok(())
//!     }
//!
//!     fn on_disconnect(&self, was_clean: bool) {
//!         println!("disconnected, clean: {was_clean}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = WebSocketTransport::new("ws://127.0.0.1:8080/ws")?;
//!     transport.connect(Arc::new(Session));
//!     # Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`serializer`] | Wire-format serializers |
//! | [`transport`] | Transport contracts and the WebSocket transport |
//!
//! # Features
//!
//! - `tls`: enables `wss://` endpoints (rustls with native roots)

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
pub mod error;

/// WAMP wire-format serializers.
pub mod serializer;

/// Transport contracts and the WebSocket transport.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Serializers
pub use serializer::{JsonSerializer, Serializer};

// Transport types
pub use transport::{
    Connector, Endpoint, Frame, HandshakeRequest, SocketChannels, SocketCommand, SocketEvent,
    Transport, TransportHandler, TransportOptions, TungsteniteConnector, WebSocketTransport,
    WebSocketTransportBuilder,
};
