//! Integration tests for the HTTPS front end.
//!
//! These tests start a real server on a free port with a freshly generated
//! certificate and talk to it through a rustls client that trusts only that
//! certificate.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use chime_server::tls::read_certificates;
use chime_server::{HttpRequest, HttpResponse, RequestHandler, ServerConfig, WebServer};

/// Answers with the method, path and body length it saw.
struct EchoHandler;

impl RequestHandler for EchoHandler {
    async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let body = format!(
            "{{\"method\":\"{}\",\"path\":\"{}\",\"body_len\":{}}}",
            request.method,
            request.path,
            request.body.len()
        );
        HttpResponse::new(200).with_body("application/json; charset=utf-8", body)
    }
}

/// Find an available port for testing.
async fn find_available_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Start a test server and return its address and certificate directory.
async fn start_test_server() -> (SocketAddr, tempfile::TempDir, tokio::task::JoinHandle<()>) {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        bind_addr: find_available_port().await,
        cert_path: dir.path().join("cert.pem"),
        key_path: dir.path().join("key.pem"),
        read_timeout: Duration::from_secs(5),
    };

    let server = WebServer::bind(config, EchoHandler).await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = tokio::spawn(server.run());

    (addr, dir, handle)
}

fn connector(cert_path: &Path) -> TlsConnector {
    let mut roots = RootCertStore::empty();
    for cert in read_certificates(cert_path).unwrap() {
        roots.add(cert).unwrap();
    }
    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Send raw request bytes and return the whole response as text.
async fn exchange(addr: SocketAddr, cert_path: &Path, raw: &[u8]) -> String {
    let stream = TcpStream::connect(addr).await.unwrap();
    let name = ServerName::try_from("chime.local").unwrap();
    let mut tls = connector(cert_path).connect(name, stream).await.unwrap();

    tls.write_all(raw).await.unwrap();
    let mut response = Vec::new();
    timeout(Duration::from_secs(5), tls.read_to_end(&mut response))
        .await
        .expect("Timeout waiting for response")
        .unwrap();
    String::from_utf8(response).unwrap()
}

#[tokio::test]
async fn test_get_request_round_trip() {
    let (addr, dir, handle) = start_test_server().await;

    let response = exchange(
        addr,
        &dir.path().join("cert.pem"),
        b"GET /api/v1/config/core?refresh=1 HTTP/1.1\r\nHost: chime.local\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Connection: close\r\n"));
    assert!(response.contains("Cache-Control: no-store\r\n"));
    assert!(response.ends_with(r#"{"method":"GET","path":"/api/v1/config/core","body_len":0}"#));

    handle.abort();
}

#[tokio::test]
async fn test_post_body_is_delivered() {
    let (addr, dir, handle) = start_test_server().await;

    let response = exchange(
        addr,
        &dir.path().join("cert.pem"),
        b"POST /api/v1/config/core HTTP/1.1\r\nContent-Length: 11\r\n\r\n{\"a\":true}\n",
    )
    .await;

    assert!(response.ends_with(r#""body_len":11}"#));

    handle.abort();
}

#[tokio::test]
async fn test_malformed_requests_get_error_bodies() {
    let (addr, dir, handle) = start_test_server().await;
    let cert = dir.path().join("cert.pem");

    let response = exchange(addr, &cert, b"POST / HTTP/1.1\r\nContent-Length: nope\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(response.ends_with(r#"{"error":"bad_request","message":"invalid Content-Length"}"#));

    let response = exchange(addr, &cert, b"PUT /x HTTP/1.1\r\nContent-Length: 99999999\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
    assert!(response.contains(r#""error":"payload_too_large""#));

    handle.abort();
}

#[tokio::test]
async fn test_certificate_is_persisted() {
    let (_addr, dir, handle) = start_test_server().await;

    assert!(dir.path().join("cert.pem").exists());
    assert!(dir.path().join("key.pem").exists());

    handle.abort();
}
