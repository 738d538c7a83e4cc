//! Tagged frames exchanged with the WebSocket.
//!
//! A frame is either binary or text. The tag travels unchanged from
//! [`Transport::send`](crate::Transport::send) to the socket, and inbound text
//! is handed to the handler as its UTF-8 bytes with `is_binary = false`.

// ============================================================================
// Imports
// ============================================================================

use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};

// ============================================================================
// Frame
// ============================================================================

/// One discrete message unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Raw bytes, sent as a binary WebSocket frame.
    Binary(Vec<u8>),
    /// UTF-8 text, sent as a text WebSocket frame.
    Text(String),
}

impl Frame {
    /// Builds a frame from a payload and its type tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFrame`] if `is_binary` is `false` and the
    /// payload is not valid UTF-8.
    pub fn from_payload(payload: Vec<u8>, is_binary: bool) -> Result<Self> {
        if is_binary {
            return Ok(Self::Binary(payload));
        }

        String::from_utf8(payload)
            .map(Self::Text)
            .map_err(|e| Error::invalid_frame(format!("text payload is not UTF-8: {e}")))
    }

    /// Returns `true` for binary frames.
    #[inline]
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    /// Payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Binary(bytes) => bytes.len(),
            Self::Text(text) => text.len(),
        }
    }

    /// Returns `true` if the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the frame and returns its bytes (text as UTF-8).
    #[inline]
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        match self {
            Self::Binary(bytes) => bytes,
            Self::Text(text) => text.into_bytes(),
        }
    }

    /// Extracts a data frame from a WebSocket message.
    ///
    /// Control messages (ping, pong, close, raw frames) return `None`.
    #[must_use]
    pub fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Self::Text(text.as_str().to_owned())),
            Message::Binary(bytes) => Some(Self::Binary(bytes.to_vec())),
            _ => None,
        }
    }

    /// Converts the frame into a WebSocket message with the same tag.
    #[must_use]
    pub fn into_message(self) -> Message {
        match self {
            Self::Binary(bytes) => Message::Binary(bytes.into()),
            Self::Text(text) => Message::Text(text.into()),
        }
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
