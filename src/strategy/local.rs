//! Local-Socket Strategy
//!
//! Connects over the daemon's filesystem-addressed interprocess socket.
//! Local sockets are trusted by filesystem permissions, so no secure session
//! wrapper is ever installed here; the pipeline is HTTP framing only. On
//! platforms without the facility, initialization fails fast instead of
//! silently falling back to a network transport.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::TransportConfig;
use crate::connection::{Connection, TransportStage};
use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::pool::WorkerPool;

use super::{map_connect_error, map_join_error, TransportKind, TransportStrategy};

/// Strategy for endpoints with the local-socket scheme
pub struct LocalSocketStrategy {
    endpoint: Endpoint,
    pool: WorkerPool,
    connect_timeout: Duration,
}

impl LocalSocketStrategy {
    /// Allocate the worker pool for local-socket I/O
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnsupportedPlatform`] on targets without
    /// unix domain sockets, or [`TransportError::Io`] if the pool cannot be
    /// started.
    pub fn new(endpoint: Endpoint, config: &TransportConfig) -> Result<Self, TransportError> {
        if cfg!(not(unix)) {
            return Err(TransportError::UnsupportedPlatform);
        }

        let pool = WorkerPool::new("local-socket", config.workers)?;
        tracing::info!(path = %endpoint.socket_path.display(), "local-socket transport initialized");

        Ok(Self {
            endpoint,
            pool,
            connect_timeout: config.connect_timeout(),
        })
    }

    /// The socket path this strategy connects to
    #[must_use]
    pub fn socket_path(&self) -> &std::path::Path {
        &self.endpoint.socket_path
    }
}

#[async_trait]
impl TransportStrategy for LocalSocketStrategy {
    fn kind(&self) -> TransportKind {
        TransportKind::LocalSocket
    }

    #[cfg(unix)]
    async fn open(&self) -> Result<Connection, TransportError> {
        let path = self.endpoint.socket_path.clone();
        let peer = self.endpoint.to_string();
        let timeout = self.connect_timeout;

        let task = self.pool.spawn(async move {
            match tokio::time::timeout(timeout, tokio::net::UnixStream::connect(&path)).await {
                Ok(Ok(stream)) => Ok(stream),
                Ok(Err(e)) => Err(map_connect_error(&peer, e)),
                Err(_) => Err(TransportError::ConnectionTimeout {
                    endpoint: peer.clone(),
                    timeout,
                }),
            }
        })?;

        let stream = task.await.map_err(map_join_error)??;
        tracing::debug!(endpoint = %self.endpoint, "local socket connected");

        Ok(Connection::new(
            Box::new(stream),
            self.endpoint.to_string(),
            vec![TransportStage::HttpFraming],
        ))
    }

    #[cfg(not(unix))]
    async fn open(&self) -> Result<Connection, TransportError> {
        Err(TransportError::UnsupportedPlatform)
    }

    fn shutdown(&self, grace: Duration) {
        self.pool.shutdown(grace);
    }
}
