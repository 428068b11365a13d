//! Transport Configuration
//!
//! Tuning knobs for the transport layer: connect and handshake timeouts,
//! shutdown grace period, and worker pool sizing. The endpoint itself is not
//! configured here; it arrives already resolved as an
//! [`Endpoint`](crate::endpoint::Endpoint).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Transport configuration
///
/// All durations are stored in milliseconds so the type serializes cleanly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Connect timeout in milliseconds
    ///
    /// Bounds the physical socket connect (local or network). On expiry the
    /// attempt fails and any partially-opened socket is closed.
    pub connect_timeout_ms: u64,

    /// TLS handshake timeout in milliseconds
    ///
    /// Bounds the secure-session negotiation on top of an already-open
    /// network socket.
    pub tls_handshake_timeout_ms: u64,

    /// Shutdown grace period in milliseconds
    ///
    /// How long in-flight connects are allowed to drain before the worker
    /// pool threads are stopped.
    pub shutdown_grace_ms: u64,

    /// Number of worker pool threads (0 = one per available core)
    pub workers: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            tls_handshake_timeout_ms: 10_000,
            shutdown_grace_ms: 2000,
            workers: 0,
        }
    }
}

impl TransportConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `STEVEDORE_CONNECT_TIMEOUT`: connect timeout in ms
    /// - `STEVEDORE_TLS_HANDSHAKE_TIMEOUT`: TLS handshake timeout in ms
    /// - `STEVEDORE_SHUTDOWN_GRACE`: shutdown grace period in ms
    /// - `STEVEDORE_WORKERS`: worker pool thread count
    ///
    /// Unset or unparsable variables fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            connect_timeout_ms: env_u64("STEVEDORE_CONNECT_TIMEOUT", defaults.connect_timeout_ms),
            tls_handshake_timeout_ms: env_u64(
                "STEVEDORE_TLS_HANDSHAKE_TIMEOUT",
                defaults.tls_handshake_timeout_ms,
            ),
            shutdown_grace_ms: env_u64("STEVEDORE_SHUTDOWN_GRACE", defaults.shutdown_grace_ms),
            workers: env_u64("STEVEDORE_WORKERS", 0) as usize,
        }
    }

    /// Set the connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the worker pool thread count
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Connect timeout as a [`Duration`]
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// TLS handshake timeout as a [`Duration`]
    #[must_use]
    pub fn tls_handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.tls_handshake_timeout_ms)
    }

    /// Shutdown grace period as a [`Duration`]
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn env_u64(var: &str, default: u64) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
