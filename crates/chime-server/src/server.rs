//! HTTPS accept loop.
//!
//! One task per connection, no admission limit. A connection lives for
//! exactly one request: handshake, read, dispatch, write, close. Transport
//! failures drop the connection and are only logged.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::http::{read_request, write_response, HttpError, HttpRequest, HttpResponse};
use crate::tls::{self, TlsError};

/// Configuration for the HTTPS server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// PEM certificate, generated if unloadable.
    pub cert_path: PathBuf,
    /// PEM private key, generated if unloadable.
    pub key_path: PathBuf,
    /// Limit on handshake plus request read.
    pub read_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8443)),
            cert_path: PathBuf::from("/etc/chime-web/tls/cert.pem"),
            key_path: PathBuf::from("/etc/chime-web/tls/key.pem"),
            read_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("certificate setup task failed: {0}")]
    Setup(String),
}

/// Turns a request into a response. Implemented by the router.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: HttpRequest) -> impl Future<Output = HttpResponse> + Send;
}

/// A bound, not yet running, HTTPS server.
pub struct WebServer<H> {
    config: ServerConfig,
    listener: TcpListener,
    acceptor: TlsAcceptor,
    handler: Arc<H>,
}

impl<H: RequestHandler> WebServer<H> {
    /// Prepare the certificate and bind the listener.
    pub async fn bind(config: ServerConfig, handler: H) -> Result<Self, ServerError> {
        let cert_path = config.cert_path.clone();
        let key_path = config.key_path.clone();
        // RSA key generation takes a while; keep it off the async workers.
        let tls_config = tokio::task::spawn_blocking(move || tls::load_or_generate(&cert_path, &key_path))
            .await
            .map_err(|e| ServerError::Setup(e.to_string()))??;

        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr,
                source,
            })?;

        Ok(Self {
            config,
            listener,
            acceptor: TlsAcceptor::from(tls_config),
            handler: Arc::new(handler),
        })
    }

    /// The address actually bound, useful with port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the task is dropped.
    pub async fn run(self) {
        match self.listener.local_addr() {
            Ok(addr) => info!("HTTPS server listening on https://{}", addr),
            Err(_) => info!("HTTPS server listening on https://{}", self.config.bind_addr),
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let acceptor = self.acceptor.clone();
                    let handler = self.handler.clone();
                    let read_timeout = self.config.read_timeout;
                    tokio::spawn(async move {
                        handle_connection(stream, addr, acceptor, handler, read_timeout).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection<H: RequestHandler>(
    stream: TcpStream,
    addr: SocketAddr,
    acceptor: TlsAcceptor,
    handler: Arc<H>,
    read_timeout: Duration,
) {
    let accepted = tokio::time::timeout(read_timeout, async {
        let mut tls = acceptor.accept(stream).await.map_err(HttpError::Io)?;
        let request = read_request(&mut tls).await;
        Ok::<_, HttpError>((tls, request))
    })
    .await;

    let (mut tls, request) = match accepted {
        Ok(Ok(accepted)) => accepted,
        Ok(Err(e)) => {
            debug!(%addr, error = %e, "TLS handshake failed");
            return;
        }
        Err(_) => {
            debug!(%addr, "connection timed out before a request was read");
            return;
        }
    };

    let response = match request {
        Ok(request) => {
            debug!(%addr, method = %request.method, path = %request.path, "request");
            let method = request.method.clone();
            let path = request.path.clone();
            let response = handler.handle(request).await;
            info!(%addr, %method, %path, status = response.status, "handled request");
            response
        }
        Err(HttpError::Empty) => {
            debug!(%addr, "connection closed without a request");
            return;
        }
        Err(e) => {
            warn!(%addr, error = %e, "rejected malformed request");
            e.to_response()
        }
    };

    if let Err(e) = write_response(&mut tls, &response).await {
        debug!(%addr, error = %e, "failed to write response");
        return;
    }
    let _ = tls.shutdown().await;
}
