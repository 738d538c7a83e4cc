//! Transport and handler contracts.
//!
//! A [`Transport`] moves opaque frames; a [`TransportHandler`] interprets
//! them. Handler callbacks run on the transport's delivery context, one at a
//! time and in order, also across attempts: a new attempt only starts once
//! the previous one's `on_disconnect` has returned.
//!
//! ```text
//! connect() ──► on_connect ──► on_message* ──► on_disconnect
//!          └──────────── (failure before open) ─► on_disconnect(false)
//! ```
//!
//! Callbacks must not block; they stall delivery of every later frame.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::error::Result;
use crate::serializer::Serializer;

use super::frame::Frame;

// ============================================================================
// TransportHandler
// ============================================================================

/// Consumer of transport events.
pub trait TransportHandler: Send + Sync {
    /// Called once when the connection opens, before any message.
    ///
    /// The handler may keep `transport` to send frames.
    ///
    /// # Errors
    ///
    /// An error aborts the connection.
    fn on_connect(
        &self,
        transport: Arc<dyn Transport>,
        serializer: Arc<dyn Serializer>,
    ) -> Result<()>;

    /// Called once per inbound frame, in receipt order.
    ///
    /// # Errors
    ///
    /// An error aborts the connection.
    fn on_message(&self, payload: Vec<u8>, is_binary: bool) -> Result<()>;

    /// Called exactly once per connection attempt when it terminates.
    ///
    /// `was_clean` is `true` only when a close handshake completed with a
    /// normal code (1000 or 1001, or no status after our own `close`).
    fn on_disconnect(&self, was_clean: bool);
}

// ============================================================================
// Transport
// ============================================================================

/// Frame transport over a single connection at a time.
///
/// No method blocks and no method reports connection failures; those arrive
/// through [`TransportHandler::on_disconnect`].
pub trait Transport: Send + Sync {
    /// Starts a connection attempt. Returns immediately.
    ///
    /// Ignored while an attempt is connecting or open. While the previous
    /// attempt's `on_disconnect` is still pending (after `abort`, or from
    /// inside the callback) the new attempt starts once it has returned.
    fn connect(&self, handler: Arc<dyn TransportHandler>);

    /// Sends a payload as a binary or text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`](crate::Error::NotConnected) if the transport
    ///   is not open or a close handshake has started; nothing reaches the
    ///   socket
    /// - [`Error::InvalidFrame`](crate::Error::InvalidFrame) if a text payload
    ///   is not UTF-8
    fn send(&self, payload: &[u8], is_binary: bool) -> Result<()> {
        self.send_frame(Frame::from_payload(payload.to_vec(), is_binary)?)
    }

    /// Sends a tagged frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`](crate::Error::NotConnected) if the
    /// transport is not open or a close handshake has started.
    fn send_frame(&self, frame: Frame) -> Result<()>;

    /// Returns `true` from `on_connect` until the connection closes, fails or
    /// is aborted. Stays `true` during a close handshake, although `send` is
    /// refused by then. Always `false` once `on_disconnect` has been called.
    fn is_open(&self) -> bool;

    /// Starts a clean close (code 1000, no reason). No-op unless open.
    fn close(&self);

    /// Drops the connection without a close handshake. No-op unless
    /// connecting or open.
    fn abort(&self);
}
