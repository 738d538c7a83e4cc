//! WebSocket transport layer.
//!
//! Moves opaque WAMP frames between a WebSocket and a [`TransportHandler`].
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐   SocketCommand   ┌─────────────────────┐
//! │ WebSocketTransport │ ────────────────► │ socket task         │
//! │ (state + handle)   │                   │ (tokio-tungstenite) │ ◄──► peer
//! │                    │ ◄──────────────── │                     │
//! └─────────┬──────────┘    SocketEvent    └─────────────────────┘
//!           │ dispatch task
//!           ▼
//!   TransportHandler (on_connect / on_message / on_disconnect)
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `contract` | [`Transport`] and [`TransportHandler`] traits |
//! | `endpoint` | `ws://` / `wss://` endpoint validation |
//! | `frame` | Binary/text tagged frames |
//! | `options` | Transport configuration |
//! | `socket` | Underlying connection and its event loop |
//! | `websocket` | Lifecycle state machine |

// ============================================================================
// Submodules
// ============================================================================

/// Transport and handler traits.
pub mod contract;

/// Endpoint address.
pub mod endpoint;

/// Tagged frames.
pub mod frame;

/// Transport options.
pub mod options;

/// Underlying WebSocket connection.
pub mod socket;

/// WebSocket transport state machine.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use contract::{Transport, TransportHandler};
pub use endpoint::Endpoint;
pub use frame::Frame;
pub use options::TransportOptions;
pub use socket::{
    Connector, HandshakeRequest, SocketChannels, SocketCommand, SocketEvent, TungsteniteConnector,
};
pub use websocket::{WebSocketTransport, WebSocketTransportBuilder};
