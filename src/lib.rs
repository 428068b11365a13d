//! Stevedore - Transport Layer for a Container-Daemon API Client
//!
//! This crate is the transport-selection and connection-lifecycle layer of a
//! client that drives a container/image management daemon. Given a resolved
//! endpoint, it picks the right low-level transport, establishes connections
//! on demand, negotiates a secure channel with strict peer identity
//! verification where required, and hands usable bidirectional byte streams
//! to the command layer above.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Command layer                        │
//! │   (container/image/exec operations - not in this crate)  │
//! └────────────────────────────┬─────────────────────────────┘
//!                              │ get_connection()
//! ┌────────────────────────────┼─────────────────────────────┐
//! │                   ConnectionProvider                     │
//! │            acquire + attach logging observer             │
//! │  ┌─────────────────────────┴────────────────────────┐    │
//! │  │                TransportManager                  │    │
//! │  │  initialize(endpoint) -> one TransportStrategy   │    │
//! │  │  ┌──────────────────┐  ┌──────────────────────┐  │    │
//! │  │  │ LocalSocket      │  │ Network              │  │    │
//! │  │  │ unix socket      │  │ TCP [+ TLS first]    │  │    │
//! │  │  │ + HTTP framing   │  │ + HTTP framing       │  │    │
//! │  │  └────────┬─────────┘  └──────────┬───────────┘  │    │
//! │  │           │   owned worker pool   │              │    │
//! │  └───────────┼───────────────────────┼──────────────┘    │
//! └──────────────┼───────────────────────┼───────────────────┘
//!                ▼                       ▼
//!       unix:///var/run/...      tcp://host:port / tls://host:port
//! ```
//!
//! # Design
//!
//! - **One strategy for the client's lifetime.** The manager selects the
//!   strategy from the endpoint scheme exactly once; the strategy owns a
//!   fixed worker pool that drives all of its connections and is joined at
//!   shutdown.
//! - **Fresh connection per operation.** Connections are single-use and
//!   never pooled. Simplicity over throughput: a failed exchange can only
//!   poison itself, and no stale keep-alive state exists anywhere.
//! - **TLS is first or absent.** Secured endpoints get the secure session
//!   wrapper as the first pipeline stage with mandatory hostname
//!   verification; there is no way to downgrade to plaintext.
//! - **No internal retries.** Every failure propagates to the caller, which
//!   owns the retry decision.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use stevedore::{
//!     ConnectionProvider, Endpoint, HttpRequest, TransportConfig, TransportManager,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), stevedore::TransportError> {
//!     let manager = Arc::new(TransportManager::new(TransportConfig::from_env()));
//!     manager.initialize(Endpoint::from_uri("unix:///var/run/docker.sock")?)?;
//!
//!     let provider = ConnectionProvider::new(Arc::clone(&manager));
//!     let mut conn = provider.get_connection().await?;
//!     conn.send_request(&HttpRequest::get("/_ping").header("Host", "daemon")).await?;
//!     let response = conn.read_response().await?;
//!     println!("daemon says: {}", String::from_utf8_lossy(&response.body));
//!     conn.close().await?;
//!
//!     manager.shutdown();
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod manager;
mod pool;
pub mod provider;
pub mod strategy;
pub mod tls;

pub use config::TransportConfig;
pub use connection::{Connection, ConnectionId, TransportStage};
pub use endpoint::{Endpoint, EndpointScheme, DEFAULT_SOCKET_PATH};
pub use error::TransportError;
pub use http::{HttpDecoder, HttpRequest, HttpResponse};
pub use manager::TransportManager;
pub use provider::ConnectionProvider;
pub use strategy::{TransportKind, TransportStrategy};
pub use tls::{TlsMaterial, TlsNegotiator};
