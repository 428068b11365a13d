//! Transport Manager
//!
//! The root object of the transport layer. Initialized exactly once with an
//! endpoint descriptor, it selects the matching strategy, owns that
//! strategy's worker pool for the client's lifetime, hands out fresh
//! connections on demand, and releases the pool on shutdown. There is no
//! process-wide singleton: the embedding application constructs a manager,
//! passes it (typically as an `Arc`) to the command layer, and shuts it down
//! before exit.
//!
//! Lifecycle is one-shot: initialize once, acquire any number of times,
//! shut down once (further shutdowns are quiet no-ops).

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::TransportConfig;
use crate::connection::Connection;
use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::strategy::{self, TransportKind, TransportStrategy};

enum State {
    Idle,
    Ready(Arc<dyn TransportStrategy>),
    ShutDown,
}

/// Owns the active transport strategy and its connection lifecycle
pub struct TransportManager {
    state: RwLock<State>,
    config: TransportConfig,
}

impl TransportManager {
    /// Create an inert manager; no strategy is selected and no worker pool
    /// exists until [`initialize`](Self::initialize)
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self {
            state: RwLock::new(State::Idle),
            config,
        }
    }

    /// Select and start the transport strategy for the endpoint
    ///
    /// Must be called exactly once. The winning caller allocates the
    /// strategy's worker pool (and, for secured endpoints, the TLS engine);
    /// everyone else gets [`TransportError::AlreadyInitialized`].
    ///
    /// # Errors
    ///
    /// [`TransportError::Configuration`] for invalid endpoints,
    /// [`TransportError::UnsupportedPlatform`] when the local-socket
    /// facility is unavailable, [`TransportError::TlsSetup`] for unusable
    /// certificate material, and [`TransportError::AlreadyInitialized`] on
    /// repeat calls, including after shutdown.
    pub fn initialize(&self, endpoint: Endpoint) -> Result<(), TransportError> {
        let mut state = self.state.write();
        if !matches!(*state, State::Idle) {
            return Err(TransportError::AlreadyInitialized);
        }

        // strategy selection happens under the write lock so exactly one
        // concurrent initializer can win
        let strategy = strategy::select(endpoint, &self.config)?;
        tracing::info!(kind = %strategy.kind(), "transport initialized");
        *state = State::Ready(strategy);
        Ok(())
    }

    /// Acquire one fresh connection from the active strategy
    ///
    /// Suspends until the connect (and TLS handshake, when applicable)
    /// completes or times out. Ownership of the connection transfers to the
    /// caller, which closes it after its single exchange.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotInitialized`] before initialization or after
    /// shutdown; otherwise whatever the strategy's connect reports.
    pub async fn acquire_connection(&self) -> Result<Connection, TransportError> {
        let strategy = match &*self.state.read() {
            State::Ready(strategy) => Arc::clone(strategy),
            State::Idle | State::ShutDown => return Err(TransportError::NotInitialized),
        };
        strategy.open().await
    }

    /// The active strategy's kind, if initialized
    #[must_use]
    pub fn strategy_kind(&self) -> Option<TransportKind> {
        match &*self.state.read() {
            State::Ready(strategy) => Some(strategy.kind()),
            State::Idle | State::ShutDown => None,
        }
    }

    /// Whether the manager currently has an active strategy
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        matches!(*self.state.read(), State::Ready(_))
    }

    /// Release the worker pool gracefully
    ///
    /// Stops accepting new connections, lets in-flight connects drain for
    /// the configured grace period, then stops the worker threads.
    /// Idempotent: repeat calls (and calls before initialization) do
    /// nothing.
    pub fn shutdown(&self) {
        let strategy = {
            let mut state = self.state.write();
            match std::mem::replace(&mut *state, State::ShutDown) {
                State::Ready(strategy) => Some(strategy),
                State::Idle | State::ShutDown => None,
            }
        };

        if let Some(strategy) = strategy {
            strategy.shutdown(self.config.shutdown_grace());
            tracing::info!("transport shut down");
        }
    }
}

impl Drop for TransportManager {
    fn drop(&mut self) {
        // releases the worker pool threads even if the owner forgot
        self.shutdown();
    }
}
