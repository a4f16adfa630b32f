//! # chime-server
//!
//! The HTTPS front end of chime-webd.
//!
//! Each accepted connection gets its own task which performs the TLS
//! handshake, reads exactly one request, hands it to a [`RequestHandler`]
//! and writes one response before closing. There is no keep-alive, no
//! pipelining and no chunked encoding.
//!
//! - [`http`] - request parsing and response serialization
//! - [`tls`] - certificate loading and self-signed bootstrap
//! - [`server`] - the accept loop

pub mod http;
pub mod server;
pub mod tls;

pub use http::{HttpError, HttpRequest, HttpResponse};
pub use server::{RequestHandler, ServerConfig, ServerError, WebServer};
pub use tls::TlsError;
