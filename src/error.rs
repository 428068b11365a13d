//! Transport Error Taxonomy
//!
//! One error type covers the whole transport layer. Variants carry the
//! endpoint and stage context the caller needs to log meaningfully, and they
//! split cleanly into caller-configuration defects (`Configuration`,
//! `UnsupportedPlatform`, lifecycle violations) and transient network
//! conditions (`ConnectionRefused`, `ConnectionTimeout`). The transport never
//! retries on its own; every failure propagates to the caller that requested
//! the connection.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while selecting a transport or opening a connection
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint descriptor is missing or invalid for its scheme
    ///
    /// Always a caller defect (bad URI, missing port, empty host). Never
    /// retried: the same input will fail the same way.
    #[error("invalid endpoint configuration: {0}")]
    Configuration(String),

    /// The local-socket transport is not available on this platform
    ///
    /// Surfaced at initialization rather than silently falling back to a
    /// network transport.
    #[error("local socket transport is not supported on this platform")]
    UnsupportedPlatform,

    /// No listener accepted the connection
    #[error("connection refused by {endpoint}: {source}")]
    ConnectionRefused {
        /// The endpoint the connect was aimed at
        endpoint: String,
        /// The underlying OS error
        source: std::io::Error,
    },

    /// The connect attempt did not complete within the configured timeout
    ///
    /// The partially-opened socket is dropped before this is returned.
    #[error("timed out connecting to {endpoint} after {timeout:?}")]
    ConnectionTimeout {
        /// The endpoint the connect was aimed at
        endpoint: String,
        /// The timeout that elapsed
        timeout: Duration,
    },

    /// Building or negotiating the secure session failed
    ///
    /// Covers bad certificate material, engine construction failures, and
    /// handshake failures including peer identity mismatch. The connection
    /// attempt is aborted; there is no fallback to plaintext.
    #[error("TLS setup failed for {endpoint}: {reason}")]
    TlsSetup {
        /// The endpoint the secure session was aimed at
        endpoint: String,
        /// What went wrong
        reason: String,
    },

    /// A connection was requested before the transport was initialized,
    /// or after it was shut down
    #[error("transport manager is not initialized")]
    NotInitialized,

    /// The transport was initialized more than once
    ///
    /// Strategy selection is fixed at initialization; the lifecycle is
    /// one-shot.
    #[error("transport manager is already initialized")]
    AlreadyInitialized,

    /// The peer sent bytes that do not form a valid HTTP message
    #[error("malformed message framing: {0}")]
    Frame(String),

    /// The requested operation exists in the daemon API but is not
    /// implemented by this client
    ///
    /// Returned explicitly so callers cannot mistake a missing feature for
    /// a valid empty result.
    #[error("operation not implemented: {0}")]
    UnsupportedOperation(&'static str),

    /// I/O error from the underlying transport
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the error is a transient network condition worth retrying
    /// by the caller
    ///
    /// The transport itself never retries; this only classifies the failure
    /// for the layer above.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused { .. } | Self::ConnectionTimeout { .. } | Self::Io(_)
        )
    }
}
