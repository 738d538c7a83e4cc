//! Error types for the WAMP WebSocket transport.
//!
//! Connection failures are never returned from transport methods; they are
//! reported through [`TransportHandler::on_disconnect`] with `was_clean = false`.
//! The errors here cover construction-time misconfiguration, frame validation
//! and the documented [`Transport::send`] conditions.
//!
//! [`TransportHandler::on_disconnect`]: crate::TransportHandler::on_disconnect
//! [`Transport::send`]: crate::Transport::send
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidEndpoint`] |
//! | Frames | [`Error::InvalidFrame`] |
//! | Connection | [`Error::NotConnected`], [`Error::Connection`] |
//! | Handler | [`Error::Handler`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when transport options or the builder are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Endpoint address could not be used.
    #[error("Invalid endpoint '{endpoint}': {message}")]
    InvalidEndpoint {
        /// The rejected endpoint string.
        endpoint: String,
        /// Why it was rejected.
        message: String,
    },

    // ========================================================================
    // Frame Errors
    // ========================================================================
    /// Payload cannot be carried by the requested frame type.
    ///
    /// Returned when a text frame payload is not valid UTF-8.
    #[error("Invalid frame: {message}")]
    InvalidFrame {
        /// Description of the problem.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// No open connection.
    ///
    /// Returned by `send` when the transport is not open. The frame was not
    /// handed to the socket.
    #[error("Transport is not connected")]
    NotConnected,

    /// WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    // ========================================================================
    // Handler Errors
    // ========================================================================
    /// A transport handler callback failed.
    ///
    /// Returned by handler implementations; the transport aborts the
    /// connection when it sees one.
    #[error("Handler error: {message}")]
    Handler {
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid endpoint error.
    #[inline]
    pub fn invalid_endpoint(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid frame error.
    #[inline]
    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a handler error.
    #[inline]
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::Connection { .. } | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed once the caller reconnects.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Connection { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
