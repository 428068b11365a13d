//! Connection Provider
//!
//! The call-site-facing facade for the command layer. Every call acquires a
//! fresh connection from the transport manager and attaches the diagnostic
//! observer before handing it over. The provider keeps no state between
//! calls beyond the manager reference, so two connections from two calls
//! share nothing.

use std::sync::Arc;

use crate::connection::Connection;
use crate::error::TransportError;
use crate::manager::TransportManager;

/// Hands out instrumented single-use connections
#[derive(Clone)]
pub struct ConnectionProvider {
    manager: Arc<TransportManager>,
}

impl ConnectionProvider {
    /// Create a provider delegating to the given manager
    #[must_use]
    pub fn new(manager: Arc<TransportManager>) -> Self {
        Self { manager }
    }

    /// Acquire one fresh connection with the logging stage attached
    ///
    /// The observer only counts bytes; it never alters the stream.
    /// Ownership of the connection transfers to the caller.
    ///
    /// # Errors
    ///
    /// Whatever [`TransportManager::acquire_connection`] reports.
    pub async fn get_connection(&self) -> Result<Connection, TransportError> {
        let connection = self.manager.acquire_connection().await?.instrument();
        tracing::debug!(conn = %connection.id(), peer = connection.peer(), "connection ready");
        Ok(connection)
    }
}
