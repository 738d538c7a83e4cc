//! WAMP wire-format serializers.
//!
//! The transport treats a serializer as opaque. It reads the
//! [`subprotocol`](Serializer::subprotocol) token for the WebSocket handshake
//! and hands the instance to the handler in `on_connect`; payloads pass
//! through the transport untouched.

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Debug;

use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Serializer
// ============================================================================

/// Codec for WAMP messages (lists of values).
pub trait Serializer: Send + Sync + Debug {
    /// `Sec-WebSocket-Protocol` token for this wire format.
    fn subprotocol(&self) -> &str;

    /// Returns `true` if encoded messages should travel as binary frames.
    fn is_binary(&self) -> bool;

    /// Encodes one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be encoded.
    fn serialize(&self, message: &[Value]) -> Result<Vec<u8>>;

    /// Decodes one message received in a frame with the given tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a valid message.
    fn deserialize(&self, payload: &[u8], is_binary: bool) -> Result<Vec<Value>>;
}

// ============================================================================
// JsonSerializer
// ============================================================================

/// JSON wire format (`wamp.2.json`), carried in text frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonSerializer;

impl JsonSerializer {
    /// Subprotocol token for the JSON wire format.
    pub const SUBPROTOCOL: &'static str = "wamp.2.json";
}

impl Serializer for JsonSerializer {
    fn subprotocol(&self) -> &str {
        Self::SUBPROTOCOL
    }

    fn is_binary(&self) -> bool {
        false
    }

    fn serialize(&self, message: &[Value]) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(message)?)
    }

    fn deserialize(&self, payload: &[u8], _is_binary: bool) -> Result<Vec<Value>> {
        Ok(serde_json::from_slice(payload)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::error::Error;

    #[test]
    fn test_subprotocol() {
        assert_eq!(JsonSerializer.subprotocol(), "wamp.2.json");
        assert!(!JsonSerializer.is_binary());
    }

    #[test]
    fn test_serialize_hello() {
        let message = vec![json!(1), json!("realm1"), json!({ "roles": {} })];
        let bytes = JsonSerializer.serialize(&message).expect("serialize");
        assert_eq!(bytes, br#"[1,"realm1",{"roles":{}}]"#);
    }

    #[test]
    fn test_deserialize() {
        let message = JsonSerializer
            .deserialize(br#"[2,9129137332,{}]"#, false)
            .expect("deserialize");
        assert_eq!(message, vec![json!(2), json!(9_129_137_332_u64), json!({})]);
    }

    #[test]
    fn test_deserialize_rejects_non_list() {
        let err = JsonSerializer.deserialize(br#"{"a":1}"#, false).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
