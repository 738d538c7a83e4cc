//! Transport configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use wamp_websocket::TransportOptions;
//!
//! let options = TransportOptions::new()
//!     .with_max_frame_payload_size(1024 * 1024)
//!     .with_auto_ping_interval(Duration::from_secs(30))
//!     .with_auto_ping_timeout(Duration::from_secs(10));
//!
//! assert!(options.validate().is_ok());
//! ```
//!
//! Options can also be loaded from JSON; durations are whole milliseconds
//! under `*_ms` keys and missing fields keep their defaults:
//!
//! ```
//! use std::time::Duration;
//! use wamp_websocket::TransportOptions;
//!
//! let options: TransportOptions = serde_json::from_str(
//!     r#"{ "auto_ping_interval_ms": null, "close_timeout_ms": 500 }"#,
//! )
//! .unwrap();
//! assert!(options.auto_ping_interval.is_none());
//! assert_eq!(options.close_timeout, Duration::from_millis(500));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default maximum inbound frame payload (128 KiB).
pub const DEFAULT_MAX_FRAME_PAYLOAD_SIZE: usize = 128 * 1024;

/// Default keep-alive ping interval.
pub const DEFAULT_AUTO_PING_INTERVAL: Duration = Duration::from_secs(10);

/// Default time to wait for a pong.
pub const DEFAULT_AUTO_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time to wait for the peer's close reply.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// TransportOptions
// ============================================================================

/// WebSocket transport options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Largest inbound frame (and message) accepted, in bytes.
    pub max_frame_payload_size: usize,

    /// Interval between keep-alive pings. `None` disables pings.
    #[serde(rename = "auto_ping_interval_ms", with = "opt_millis")]
    pub auto_ping_interval: Option<Duration>,

    /// How long to wait for a pong before failing the connection.
    #[serde(rename = "auto_ping_timeout_ms", with = "millis")]
    pub auto_ping_timeout: Duration,

    /// How long to wait for the peer to answer a close request.
    #[serde(rename = "close_timeout_ms", with = "millis")]
    pub close_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl TransportOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_frame_payload_size: DEFAULT_MAX_FRAME_PAYLOAD_SIZE,
            auto_ping_interval: Some(DEFAULT_AUTO_PING_INTERVAL),
            auto_ping_timeout: DEFAULT_AUTO_PING_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl TransportOptions {
    /// Sets the maximum inbound frame payload size.
    #[inline]
    #[must_use]
    pub fn with_max_frame_payload_size(mut self, size: usize) -> Self {
        self.max_frame_payload_size = size;
        self
    }

    /// Sets the keep-alive ping interval.
    #[inline]
    #[must_use]
    pub fn with_auto_ping_interval(mut self, interval: Duration) -> Self {
        self.auto_ping_interval = Some(interval);
        self
    }

    /// Disables keep-alive pings.
    #[inline]
    #[must_use]
    pub fn without_auto_ping(mut self) -> Self {
        self.auto_ping_interval = None;
        self
    }

    /// Sets the pong timeout.
    #[inline]
    #[must_use]
    pub fn with_auto_ping_timeout(mut self, timeout: Duration) -> Self {
        self.auto_ping_timeout = timeout;
        self
    }

    /// Sets the close reply timeout.
    #[inline]
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl TransportOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero payload size, or for a duration
    /// that is zero or not a whole number of milliseconds.
    pub fn validate(&self) -> Result<()> {
        if self.max_frame_payload_size == 0 {
            return Err(Error::config("max_frame_payload_size must be greater than zero"));
        }

        if let Some(interval) = self.auto_ping_interval {
            validate_duration("auto_ping_interval", interval)?;
        }
        validate_duration("auto_ping_timeout", self.auto_ping_timeout)?;
        validate_duration("close_timeout", self.close_timeout)?;

        Ok(())
    }

    /// Builds the tungstenite socket configuration.
    #[must_use]
    pub fn to_websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .max_frame_size(Some(self.max_frame_payload_size))
            .max_message_size(Some(self.max_frame_payload_size))
    }
}

fn validate_duration(name: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(Error::config(format!("{name} must be greater than zero")));
    }

    if value.subsec_nanos() % 1_000_000 != 0 {
        return Err(Error::config(format!(
            "{name} must be a whole number of milliseconds, got {value:?}"
        )));
    }

    Ok(())
}

// ============================================================================
// Serde Helpers
// ============================================================================

mod millis {
    use std::time::Duration;

    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis())
            .map_err(|_| S::Error::custom(format!("duration {value:?} is out of range")))?;
        if Duration::from_millis(millis) != *value {
            return Err(S::Error::custom(format!(
                "duration {value:?} is not a whole number of milliseconds"
            )));
        }
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => super::millis::serialize(duration, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|millis| millis.map(Duration::from_millis))
    }
}

// ============================================================================
// Tests
// ============================================================================
