//! Transport Strategies
//!
//! One strategy per transport kind, selected once when the transport
//! manager initializes and fixed for the client's lifetime:
//!
//! - [`LocalSocketStrategy`]: interprocess socket on the daemon's host
//! - [`NetworkStrategy`]: TCP, with the secure session wrapper prepended
//!   when the endpoint requires it
//!
//! A strategy owns its worker pool exclusively; opening a connection
//! submits the connect to that pool and suspends the caller until it
//! completes or times out.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::TransportConfig;
use crate::connection::Connection;
use crate::endpoint::{Endpoint, EndpointScheme};
use crate::error::TransportError;

pub mod local;
pub mod network;

pub use local::LocalSocketStrategy;
pub use network::NetworkStrategy;

/// Which strategy variant is active
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// Local interprocess socket
    LocalSocket,
    /// Network socket, plain or secured
    Network,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalSocket => write!(f, "local-socket"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// One way of opening connections to the daemon
#[async_trait]
pub trait TransportStrategy: Send + Sync {
    /// The strategy's variant
    fn kind(&self) -> TransportKind;

    /// Open one fresh connection
    ///
    /// Suspends until the physical connect (and the TLS handshake, when the
    /// endpoint is secured) completes, fails, or times out.
    async fn open(&self) -> Result<Connection, TransportError>;

    /// Release the strategy's worker pool
    fn shutdown(&self, grace: Duration);
}

/// Select and initialize the strategy matching the endpoint's scheme
///
/// # Errors
///
/// Returns [`TransportError::Configuration`] for invalid endpoints,
/// [`TransportError::UnsupportedPlatform`] when the local-socket facility is
/// unavailable, and [`TransportError::TlsSetup`] when secure-endpoint
/// material cannot be loaded.
pub(crate) fn select(
    endpoint: Endpoint,
    config: &TransportConfig,
) -> Result<Arc<dyn TransportStrategy>, TransportError> {
    endpoint.validate()?;
    match endpoint.scheme {
        EndpointScheme::Local => Ok(Arc::new(LocalSocketStrategy::new(endpoint, config)?)),
        EndpointScheme::Network | EndpointScheme::NetworkSecure => {
            Ok(Arc::new(NetworkStrategy::new(endpoint, config)?))
        }
    }
}

/// Map a connect-time I/O error, attaching the endpoint for context
pub(crate) fn map_connect_error(endpoint: &str, err: std::io::Error) -> TransportError {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::ConnectionRefused | ErrorKind::NotFound | ErrorKind::AddrNotAvailable => {
            TransportError::ConnectionRefused {
                endpoint: endpoint.to_string(),
                source: err,
            }
        }
        _ => TransportError::Io(err),
    }
}

/// Map a worker pool join failure (task panicked or pool shut down mid-connect)
pub(crate) fn map_join_error(err: tokio::task::JoinError) -> TransportError {
    TransportError::Io(std::io::Error::other(format!(
        "connect task did not complete: {err}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::TlsMaterial;

    #[test]
    fn test_select_local_strategy() {
        let config = TransportConfig::default().with_workers(1);
        let endpoint = Endpoint::local("/tmp/missing.sock");
        let strategy = select(endpoint, &config).unwrap();
        assert_eq!(strategy.kind(), TransportKind::LocalSocket);
        strategy.shutdown(Duration::from_millis(100));
    }

    #[test]
    fn test_select_local_strategy_ignores_tls_material() {
        let config = TransportConfig::default().with_workers(1);
        // TLS material on a local endpoint is irrelevant and must not be touched;
        // a nonexistent CA path would fail the negotiator if it were built
        let endpoint = Endpoint::local("/tmp/missing.sock")
            .with_tls(TlsMaterial::new().with_ca_file("/does/not/exist.pem"));
        let strategy = select(endpoint, &config).unwrap();
        assert_eq!(strategy.kind(), TransportKind::LocalSocket);
        strategy.shutdown(Duration::from_millis(100));
    }

    #[test]
    fn test_select_network_strategy() {
        let config = TransportConfig::default().with_workers(1);
        let endpoint = Endpoint::network("localhost", 2375);
        let strategy = select(endpoint, &config).unwrap();
        assert_eq!(strategy.kind(), TransportKind::Network);
        strategy.shutdown(Duration::from_millis(100));
    }

    #[test]
    fn test_select_rejects_invalid_endpoint() {
        let config = TransportConfig::default().with_workers(1);
        let endpoint = Endpoint::network("", 2375);
        assert!(matches!(
            select(endpoint, &config).map(|_| ()),
            Err(TransportError::Configuration(_))
        ));
    }

    #[test]
    fn test_map_connect_error_classification() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            map_connect_error("tcp://h:1", refused),
            TransportError::ConnectionRefused { .. }
        ));

        let broken = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(matches!(
            map_connect_error("tcp://h:1", broken),
            TransportError::Io(_)
        ));
    }
}
