//! Endpoint Descriptor
//!
//! The resolved target a transport connects to: a local interprocess socket,
//! a plain network address, or a TLS-secured network address. Pure data;
//! which of the fields is meaningful is determined by the scheme. The
//! descriptor is constructed by the configuration layer of the embedding
//! application and becomes immutable once handed to the transport manager.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::TransportError;
use crate::tls::TlsMaterial;

/// The daemon's well-known local socket path, used when a `unix://` URI
/// carries no explicit path
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/docker.sock";

/// Which transport the endpoint requires
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointScheme {
    /// Local interprocess socket (`unix://`)
    Local,
    /// Plain network socket (`tcp://` or `http://`)
    Network,
    /// TLS-secured network socket (`tls://` or `https://`)
    NetworkSecure,
}

/// A resolved connection target
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Endpoint {
    /// Transport selector
    pub scheme: EndpointScheme,
    /// Target host; meaningful for the network schemes
    pub host: String,
    /// Target port; `None` means the URI carried no port, which is a
    /// configuration defect surfaced when a connection is requested
    pub port: Option<u16>,
    /// Local socket path; meaningful for the local scheme
    pub socket_path: PathBuf,
    /// Certificate material for the secured scheme
    pub tls: Option<TlsMaterial>,
}

impl Endpoint {
    /// Endpoint for the daemon's local socket
    #[must_use]
    pub fn local(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            scheme: EndpointScheme::Local,
            host: String::new(),
            port: None,
            socket_path: socket_path.into(),
            tls: None,
        }
    }

    /// Endpoint for a plain network address
    #[must_use]
    pub fn network(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: EndpointScheme::Network,
            host: host.into(),
            port: Some(port),
            socket_path: PathBuf::new(),
            tls: None,
        }
    }

    /// Endpoint for a TLS-secured network address
    #[must_use]
    pub fn network_secure(host: impl Into<String>, port: u16, tls: TlsMaterial) -> Self {
        Self {
            scheme: EndpointScheme::NetworkSecure,
            host: host.into(),
            port: Some(port),
            socket_path: PathBuf::new(),
            tls: Some(tls),
        }
    }

    /// Parse an endpoint from a daemon URI
    ///
    /// Recognized schemes: `unix` (local socket, defaulting to
    /// [`DEFAULT_SOCKET_PATH`] when the URI has no path), `tcp`/`http`
    /// (plain network) and `tls`/`https` (secured network). `http`/`https`
    /// URIs fall back to their scheme-default port; a `tcp`/`tls` URI
    /// without a port parses successfully and the missing port is reported
    /// when a connection is requested.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Configuration`] for unparsable URIs,
    /// unrecognized schemes, or network URIs without a host.
    pub fn from_uri(uri: &str) -> Result<Self, TransportError> {
        let url = Url::parse(uri)
            .map_err(|e| TransportError::Configuration(format!("invalid endpoint uri {uri}: {e}")))?;

        match url.scheme() {
            "unix" => {
                let path = url.path();
                if path.is_empty() || path == "/" {
                    Ok(Self::local(DEFAULT_SOCKET_PATH))
                } else {
                    Ok(Self::local(path))
                }
            }
            "tcp" | "http" => {
                let host = require_host(&url, uri)?;
                Ok(Self {
                    scheme: EndpointScheme::Network,
                    host,
                    port: scheme_port(&url),
                    socket_path: PathBuf::new(),
                    tls: None,
                })
            }
            "tls" | "https" => {
                let host = require_host(&url, uri)?;
                Ok(Self {
                    scheme: EndpointScheme::NetworkSecure,
                    host,
                    port: scheme_port(&url),
                    socket_path: PathBuf::new(),
                    tls: None,
                })
            }
            other => Err(TransportError::Configuration(format!(
                "unrecognized endpoint scheme {other:?} in {uri}"
            ))),
        }
    }

    /// Attach TLS material to the endpoint
    #[must_use]
    pub fn with_tls(mut self, tls: TlsMaterial) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Whether the endpoint requires a secure session
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.scheme == EndpointScheme::NetworkSecure
    }

    /// Check the fields that must be present for the endpoint's scheme
    ///
    /// A missing port is deliberately not checked here: it is surfaced per
    /// connection attempt, matching where the defect bites.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Configuration`] if a required field is
    /// empty.
    pub fn validate(&self) -> Result<(), TransportError> {
        match self.scheme {
            EndpointScheme::Local => {
                if self.socket_path.as_os_str().is_empty() {
                    return Err(TransportError::Configuration(
                        "local endpoint has no socket path".to_string(),
                    ));
                }
            }
            EndpointScheme::Network | EndpointScheme::NetworkSecure => {
                if self.host.is_empty() {
                    return Err(TransportError::Configuration(
                        "network endpoint has no host".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Port for a network URI
///
/// `Url::port()` reports a scheme-default port as absent even when the URI
/// spells it out, so `http://host:80` would lose its port; fall back to the
/// scheme default for the schemes that have one. `tcp` and `tls` have no
/// default, so an absent port stays `None` there.
fn scheme_port(url: &Url) -> Option<u16> {
    match url.scheme() {
        "http" | "https" => url.port_or_known_default(),
        _ => url.port(),
    }
}

fn require_host(url: &Url, uri: &str) -> Result<String, TransportError> {
    url.host_str()
        .map(str::to_string)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| TransportError::Configuration(format!("no host in endpoint uri {uri}")))
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            EndpointScheme::Local => write!(f, "unix://{}", self.socket_path.display()),
            EndpointScheme::Network => match self.port {
                Some(port) => write!(f, "tcp://{}:{}", self.host, port),
                None => write!(f, "tcp://{}", self.host),
            },
            EndpointScheme::NetworkSecure => match self.port {
                Some(port) => write!(f, "tls://{}:{}", self.host, port),
                None => write!(f, "tls://{}", self.host),
            },
        }
    }
}
