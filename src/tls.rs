//! TLS Negotiation
//!
//! Builds the secure session wrapper for network endpoints using rustls in
//! client mode. Peer identity verification against the target host (DNS name
//! or IP literal) is rustls's built-in WebPKI verifier and cannot be turned
//! off: a daemon that can run arbitrary containers must never be reachable
//! through an unverified channel, so this module deliberately exposes no
//! "accept invalid certs" switch.
//!
//! Certificate material follows the daemon's usual layout: a CA bundle to
//! trust (`ca.pem`) and, for mutual TLS, a client certificate and key
//! (`cert.pem` / `key.pem`). When no CA file is supplied the Mozilla root
//! set from `webpki-roots` is used.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::error::TransportError;

/// Certificate, key and trust material for a secured network endpoint
///
/// All fields are optional: an empty `TlsMaterial` verifies the daemon
/// against the public root set with no client authentication.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TlsMaterial {
    /// CA bundle used to verify the daemon's certificate
    pub ca_file: Option<PathBuf>,
    /// Client certificate presented to the daemon (mutual TLS)
    pub cert_file: Option<PathBuf>,
    /// Private key for the client certificate
    pub key_file: Option<PathBuf>,
}

impl TlsMaterial {
    /// Create empty material (public roots, no client authentication)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load material from a certificate directory using the daemon's
    /// conventional file names: `ca.pem`, `cert.pem`, `key.pem`
    ///
    /// Files that do not exist are simply left unset.
    #[must_use]
    pub fn from_cert_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let existing = |name: &str| {
            let path = dir.join(name);
            path.exists().then_some(path)
        };
        Self {
            ca_file: existing("ca.pem"),
            cert_file: existing("cert.pem"),
            key_file: existing("key.pem"),
        }
    }

    /// Set the CA bundle path
    #[must_use]
    pub fn with_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    /// Set the client certificate path
    #[must_use]
    pub fn with_cert_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_file = Some(path.into());
        self
    }

    /// Set the client key path
    #[must_use]
    pub fn with_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self
    }
}

/// Negotiates secure sessions for one endpoint
///
/// Built once when the network strategy initializes, so invalid certificate
/// material fails the client at startup rather than on the Nth connection.
pub struct TlsNegotiator {
    connector: TlsConnector,
    handshake_timeout: Duration,
}

impl std::fmt::Debug for TlsNegotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsNegotiator")
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

impl TlsNegotiator {
    /// Build a client-mode TLS engine from the given material
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::TlsSetup`] if the material cannot be read
    /// or parsed, or if only one of certificate and key is supplied.
    pub fn new(
        material: &TlsMaterial,
        handshake_timeout: Duration,
        endpoint: &str,
    ) -> Result<Self, TransportError> {
        let setup = |reason: String| TransportError::TlsSetup {
            endpoint: endpoint.to_string(),
            reason,
        };

        let roots = match &material.ca_file {
            Some(path) => {
                let certs = load_certs(path).map_err(|e| setup(e.to_string()))?;
                if certs.is_empty() {
                    return Err(setup(format!("no certificates found in {}", path.display())));
                }
                let mut store = RootCertStore::empty();
                for cert in certs {
                    store
                        .add(cert)
                        .map_err(|e| setup(format!("invalid root certificate: {e}")))?;
                }
                store
            }
            None => RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
        };

        let builder = ClientConfig::builder().with_root_certificates(roots);

        let config = match (&material.cert_file, &material.key_file) {
            (Some(cert_path), Some(key_path)) => {
                let cert_chain = load_certs(cert_path).map_err(|e| setup(e.to_string()))?;
                if cert_chain.is_empty() {
                    return Err(setup(format!(
                        "no certificates found in {}",
                        cert_path.display()
                    )));
                }
                let key = load_private_key(key_path).map_err(|e| setup(e.to_string()))?;
                builder
                    .with_client_auth_cert(cert_chain, key)
                    .map_err(|e| setup(format!("invalid client certificate: {e}")))?
            }
            (None, None) => builder.with_no_client_auth(),
            _ => {
                return Err(setup(
                    "client certificate and key must both be provided".to_string(),
                ));
            }
        };

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            handshake_timeout,
        })
    }

    /// Negotiate a secure session over an open network connection
    ///
    /// `host` is the target the peer certificate must identify as; both DNS
    /// names and IP literals are accepted. The handshake is bounded by the
    /// configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::TlsSetup`] on any handshake failure,
    /// including peer identity mismatch or timeout. The underlying stream is
    /// dropped; a failed negotiation never yields a plaintext connection.
    pub async fn negotiate(
        &self,
        stream: TcpStream,
        host: &str,
        endpoint: &str,
    ) -> Result<TlsStream<TcpStream>, TransportError> {
        let name = ServerName::try_from(host.to_string()).map_err(|e| TransportError::TlsSetup {
            endpoint: endpoint.to_string(),
            reason: format!("invalid server name {host:?}: {e}"),
        })?;

        match tokio::time::timeout(self.handshake_timeout, self.connector.connect(name, stream))
            .await
        {
            Ok(Ok(tls)) => {
                tracing::debug!(endpoint, host, "TLS session established");
                Ok(tls)
            }
            Ok(Err(e)) => Err(TransportError::TlsSetup {
                endpoint: endpoint.to_string(),
                reason: format!("handshake failed: {e}"),
            }),
            Err(_) => Err(TransportError::TlsSetup {
                endpoint: endpoint.to_string(),
                reason: format!("handshake timed out after {:?}", self.handshake_timeout),
            }),
        }
    }
}

/// Load certificates from a PEM file
fn load_certs(path: impl AsRef<Path>) -> io::Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader).collect()
}

/// Load a private key from a PEM file
fn load_private_key(path: impl AsRef<Path>) -> io::Result<PrivateKeyDer<'static>> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| {
        io::Error::other(format!(
            "no private key found in {}",
            path.as_ref().display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    #[test]
    fn test_negotiator_with_public_roots() {
        let material = TlsMaterial::new();
        assert!(TlsNegotiator::new(&material, TIMEOUT, "tls://example:443").is_ok());
    }

    #[test]
    fn test_negotiator_with_ca_file() {
        let material = TlsMaterial::new().with_ca_file(fixture("ca.pem"));
        assert!(TlsNegotiator::new(&material, TIMEOUT, "tls://example:443").is_ok());
    }

    #[test]
    fn test_negotiator_with_client_cert() {
        let material = TlsMaterial::new()
            .with_ca_file(fixture("ca.pem"))
            .with_cert_file(fixture("client.pem"))
            .with_key_file(fixture("client.key"));
        assert!(TlsNegotiator::new(&material, TIMEOUT, "tls://example:443").is_ok());
    }

    #[test]
    fn test_cert_without_key_rejected() {
        let material = TlsMaterial::new()
            .with_ca_file(fixture("ca.pem"))
            .with_cert_file(fixture("client.pem"));
        let result = TlsNegotiator::new(&material, TIMEOUT, "tls://example:443");
        assert!(matches!(result, Err(TransportError::TlsSetup { .. })));
    }

    #[test]
    fn test_garbage_ca_rejected() {
        let material = TlsMaterial::new().with_ca_file(fixture("garbage.pem"));
        let result = TlsNegotiator::new(&material, TIMEOUT, "tls://example:443");
        assert!(matches!(result, Err(TransportError::TlsSetup { .. })));
    }

    #[test]
    fn test_missing_ca_file_rejected() {
        let material = TlsMaterial::new().with_ca_file(fixture("does-not-exist.pem"));
        let result = TlsNegotiator::new(&material, TIMEOUT, "tls://example:443");
        assert!(matches!(result, Err(TransportError::TlsSetup { .. })));
    }

    #[test]
    fn test_from_cert_dir_picks_up_existing_files() {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
        let material = TlsMaterial::from_cert_dir(&dir);
        assert!(material.ca_file.is_some());
        // fixtures use server.pem/client.pem, not the conventional cert.pem
        assert!(material.cert_file.is_none());
    }
}
