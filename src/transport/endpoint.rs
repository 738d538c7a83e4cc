//! WebSocket endpoint address.
//!
//! Only `ws://` and `wss://` URLs are accepted.
//!
//! # Example
//!
//! ```
//! use wamp_websocket::Endpoint;
//!
//! let endpoint = Endpoint::parse("ws://router.local/ws").unwrap();
//! assert_eq!(endpoint.port(), 80);
//! assert!(!endpoint.is_secure());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default port for `ws://`.
const WS_DEFAULT_PORT: u16 = 80;

/// Default port for `wss://`.
const WSS_DEFAULT_PORT: u16 = 443;

// ============================================================================
// Endpoint
// ============================================================================

/// Validated WebSocket endpoint (scheme, host, optional port, path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Parses and validates an endpoint address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if the string is not a URL, the
    /// scheme is not `ws`/`wss`, or the host is missing.
    pub fn parse(endpoint: &str) -> Result<Self> {
        let url = Url::parse(endpoint)
            .map_err(|e| Error::invalid_endpoint(endpoint, e.to_string()))?;

        // Url lowercases the scheme
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::invalid_endpoint(
                endpoint,
                format!("unsupported scheme '{}', only ws and wss are supported", url.scheme()),
            ));
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(Error::invalid_endpoint(endpoint, "missing host"));
        }

        Ok(Self { url })
    }

    /// Returns `true` for `wss://` endpoints.
    #[inline]
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "wss"
    }

    /// Returns the host name or address.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Returns the explicit port, or the scheme default.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.url.port().unwrap_or(if self.is_secure() {
            WSS_DEFAULT_PORT
        } else {
            WS_DEFAULT_PORT
        })
    }

    /// Returns the request path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Returns the full URL string.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Endpoint {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
