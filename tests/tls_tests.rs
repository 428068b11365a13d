//! Secure-endpoint tests
//!
//! Runs a real TLS server from committed fixture certificates and verifies
//! the negotiated pipeline, peer identity enforcement, and the failure modes
//! for unusable certificate material. Fixtures live in `tests/fixtures/`:
//! a private CA, a server certificate for `localhost`/`127.0.0.1`, one for
//! an unrelated name, and a client certificate pair.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use stevedore::{
    ConnectionProvider, Endpoint, HttpRequest, TlsMaterial, TransportConfig, TransportError,
    TransportManager, TransportStage,
};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn test_config() -> TransportConfig {
    init_tracing();
    TransportConfig::default()
        .with_workers(1)
        .with_connect_timeout(Duration::from_millis(500))
}

/// Route transport tracing through the test harness; `RUST_LOG` selects
/// verbosity when a test needs it
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Spawn a TLS server that answers one HTTP exchange with the given
/// certificate; handshake failures are swallowed so mismatch tests can
/// observe the client-side error
async fn tls_server(cert: &str, key: &str) -> (SocketAddr, JoinHandle<()>) {
    let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(fixture(cert)).unwrap()))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(fixture(key)).unwrap()))
        .unwrap()
        .unwrap();
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        if let Ok(mut tls) = acceptor.accept(stream).await {
            let mut buf = vec![0u8; 4096];
            let _ = tls.read(&mut buf).await;
            let _ = tls
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK")
                .await;
            let _ = tls.shutdown().await;
        }
    });
    (addr, handle)
}

#[tokio::test]
async fn secure_connection_has_tls_as_first_stage() {
    let (addr, server) = tls_server("server.pem", "server.key").await;

    let material = TlsMaterial::new().with_ca_file(fixture("ca.pem"));
    let manager = Arc::new(TransportManager::new(test_config()));
    manager
        .initialize(Endpoint::network_secure("localhost", addr.port(), material))
        .unwrap();
    let provider = ConnectionProvider::new(Arc::clone(&manager));

    let mut conn = provider.get_connection().await.unwrap();
    assert_eq!(
        conn.stages(),
        &[
            TransportStage::Tls,
            TransportStage::HttpFraming,
            TransportStage::Logging
        ]
    );
    assert!(conn.is_secure());

    conn.send_request(&HttpRequest::get("/_ping").header("Host", "localhost"))
        .await
        .unwrap();
    let response = conn.read_response().await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"OK");
    conn.close().await.unwrap();

    server.await.unwrap();
    manager.shutdown();
}

#[tokio::test]
async fn peer_identity_mismatch_yields_no_connection() {
    // certificate names an unrelated host; verification must reject it
    let (addr, server) = tls_server("mismatch.pem", "mismatch.key").await;

    let material = TlsMaterial::new().with_ca_file(fixture("ca.pem"));
    let manager = Arc::new(TransportManager::new(test_config()));
    manager
        .initialize(Endpoint::network_secure("localhost", addr.port(), material))
        .unwrap();
    let provider = ConnectionProvider::new(Arc::clone(&manager));

    let result = provider.get_connection().await;
    assert!(matches!(
        result.map(|_| ()),
        Err(TransportError::TlsSetup { .. })
    ));

    server.await.unwrap();
    manager.shutdown();
}

#[tokio::test]
async fn untrusted_ca_yields_no_connection() {
    let (addr, server) = tls_server("server.pem", "server.key").await;

    // empty material trusts only the public roots, not the fixture CA
    let manager = Arc::new(TransportManager::new(test_config()));
    manager
        .initialize(Endpoint::network_secure(
            "localhost",
            addr.port(),
            TlsMaterial::new(),
        ))
        .unwrap();
    let provider = ConnectionProvider::new(Arc::clone(&manager));

    let result = provider.get_connection().await;
    assert!(matches!(
        result.map(|_| ()),
        Err(TransportError::TlsSetup { .. })
    ));

    server.await.unwrap();
    manager.shutdown();
}

#[tokio::test]
async fn garbage_certificate_material_fails_initialize() {
    let material = TlsMaterial::new().with_ca_file(fixture("garbage.pem"));
    let manager = TransportManager::new(test_config());

    let result = manager.initialize(Endpoint::network_secure("localhost", 2376, material));
    assert!(matches!(result, Err(TransportError::TlsSetup { .. })));
    assert!(!manager.is_initialized());
}

#[tokio::test]
async fn client_cert_without_key_fails_initialize() {
    let material = TlsMaterial::new()
        .with_ca_file(fixture("ca.pem"))
        .with_cert_file(fixture("client.pem"));
    let manager = TransportManager::new(test_config());

    let result = manager.initialize(Endpoint::network_secure("localhost", 2376, material));
    assert!(matches!(result, Err(TransportError::TlsSetup { .. })));
}

#[tokio::test]
async fn mutual_tls_material_builds() {
    let material = TlsMaterial::new()
        .with_ca_file(fixture("ca.pem"))
        .with_cert_file(fixture("client.pem"))
        .with_key_file(fixture("client.key"));
    let manager = TransportManager::new(test_config());

    manager
        .initialize(Endpoint::network_secure("localhost", 2376, material))
        .unwrap();
    assert!(manager.is_initialized());
    manager.shutdown();
}
