//! Network Strategy
//!
//! Connects over TCP, optionally negotiating a secure session. When the
//! endpoint scheme requires security the TLS wrapper becomes the first stage
//! of the connection's pipeline, ahead of the HTTP framing, so nothing
//! observes plaintext application bytes on the wire side. A missing port is
//! a configuration defect and is reported before any socket is opened.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::config::TransportConfig;
use crate::connection::{Connection, TransportStage};
use crate::endpoint::{Endpoint, EndpointScheme};
use crate::error::TransportError;
use crate::pool::WorkerPool;
use crate::tls::TlsNegotiator;

use super::{map_connect_error, map_join_error, TransportKind, TransportStrategy};

/// Strategy for endpoints with the plain or secured network scheme
pub struct NetworkStrategy {
    endpoint: Endpoint,
    pool: WorkerPool,
    negotiator: Option<Arc<TlsNegotiator>>,
    connect_timeout: Duration,
}

impl NetworkStrategy {
    /// Allocate the worker pool and, for secured endpoints, build the TLS
    /// engine
    ///
    /// The engine is built once here so invalid certificate material fails
    /// the client at initialization. Endpoints with the plain scheme never
    /// touch TLS material, even if the descriptor carries some.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::TlsSetup`] for unusable certificate
    /// material and [`TransportError::Io`] if the pool cannot be started.
    pub fn new(endpoint: Endpoint, config: &TransportConfig) -> Result<Self, TransportError> {
        let pool = WorkerPool::new("network", config.workers)?;

        let negotiator = if endpoint.scheme == EndpointScheme::NetworkSecure {
            let material = endpoint.tls.clone().unwrap_or_default();
            Some(Arc::new(TlsNegotiator::new(
                &material,
                config.tls_handshake_timeout(),
                &endpoint.to_string(),
            )?))
        } else {
            None
        };

        tracing::info!(endpoint = %endpoint, secured = negotiator.is_some(), "network transport initialized");

        Ok(Self {
            endpoint,
            pool,
            negotiator,
            connect_timeout: config.connect_timeout(),
        })
    }
}

#[async_trait]
impl TransportStrategy for NetworkStrategy {
    fn kind(&self) -> TransportKind {
        TransportKind::Network
    }

    async fn open(&self) -> Result<Connection, TransportError> {
        let host = self.endpoint.host.clone();
        let port = self.endpoint.port.ok_or_else(|| {
            TransportError::Configuration(format!("no port configured for {host}"))
        })?;

        let peer = self.endpoint.to_string();
        let timeout = self.connect_timeout;
        let negotiator = self.negotiator.clone();

        let task = self.pool.spawn(async move {
            let stream =
                match tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port)))
                    .await
                {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(e)) => return Err(map_connect_error(&peer, e)),
                    Err(_) => {
                        return Err(TransportError::ConnectionTimeout {
                            endpoint: peer,
                            timeout,
                        })
                    }
                };
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(endpoint = %peer, error = %e, "could not set TCP_NODELAY");
            }

            match negotiator {
                Some(negotiator) => {
                    let tls = negotiator.negotiate(stream, &host, &peer).await?;
                    Ok(Connection::new(
                        Box::new(tls),
                        peer,
                        vec![TransportStage::Tls, TransportStage::HttpFraming],
                    ))
                }
                None => Ok(Connection::new(
                    Box::new(stream),
                    peer,
                    vec![TransportStage::HttpFraming],
                )),
            }
        })?;

        let connection = task.await.map_err(map_join_error)??;
        tracing::debug!(endpoint = %self.endpoint, conn = %connection.id(), "network connection ready");
        Ok(connection)
    }

    fn shutdown(&self, grace: Duration) {
        self.pool.shutdown(grace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TransportConfig {
        TransportConfig::default()
            .with_workers(1)
            .with_connect_timeout(Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_missing_port_is_configuration_error() {
        let mut endpoint = Endpoint::network("localhost", 2375);
        endpoint.port = None;
        let strategy = NetworkStrategy::new(endpoint, &test_config()).unwrap();

        let result = strategy.open().await;
        assert!(matches!(
            result.map(|_| ()),
            Err(TransportError::Configuration(_))
        ));

        strategy.shutdown(Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_plain_connect_pipeline() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let endpoint = Endpoint::network("127.0.0.1", addr.port());
        let strategy = NetworkStrategy::new(endpoint, &test_config()).unwrap();
        let conn = strategy.open().await.unwrap();

        assert_eq!(conn.stages(), &[TransportStage::HttpFraming]);
        assert!(!conn.is_secure());

        drop(accept.await.unwrap());
        strategy.shutdown(Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // bind then drop to get a port with no listener
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = Endpoint::network("127.0.0.1", addr.port());
        let strategy = NetworkStrategy::new(endpoint, &test_config()).unwrap();

        let result = strategy.open().await;
        assert!(matches!(
            result.map(|_| ()),
            Err(TransportError::ConnectionRefused { .. })
        ));

        strategy.shutdown(Duration::from_millis(100));
    }
}
