//! One-shot HTTP/1.1 request parsing and response writing.

use std::collections::HashMap;
use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use chime_protocol::codec::{error_body, error_with_message};
use chime_protocol::JsonValue;

/// Upper bound on the request line plus headers.
pub const MAX_HEADER_BYTES: usize = 65_536;

/// Upper bound on a request body.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";
pub const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";
pub const CACHE_NO_STORE: &str = "no-store";

const READ_CHUNK: usize = 2048;

#[derive(Debug, Error)]
pub enum HttpError {
    /// The peer closed the connection without sending anything.
    #[error("connection closed before request")]
    Empty,

    #[error("request too large")]
    HeaderTooLarge,

    #[error("failed to read request")]
    ConnectionClosed,

    #[error("failed to read request: {0}")]
    Io(#[from] io::Error),

    #[error("invalid request line")]
    InvalidRequestLine,

    #[error("invalid Content-Length")]
    InvalidContentLength,

    #[error("request body too large")]
    BodyTooLarge,

    #[error("failed to read request body")]
    IncompleteBody,
}

impl HttpError {
    pub fn status(&self) -> u16 {
        match self {
            HttpError::BodyTooLarge => 413,
            _ => 400,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            HttpError::BodyTooLarge => "payload_too_large",
            _ => "bad_request",
        }
    }

    /// The response sent back for a request that could not be read.
    pub fn to_response(&self) -> HttpResponse {
        HttpResponse::error_message(self.status(), self.code(), &self.to_string())
    }
}

// ============================================================================
// Request
// ============================================================================

/// A fully read request. Header names are lower-cased and the query string
/// is already stripped from `path`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Look up a header by lower-case name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|window| window == b"\r\n\r\n")
}

/// Read one request from `reader`.
pub async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> Result<HttpRequest, HttpError> {
    let mut data = Vec::with_capacity(READ_CHUNK);
    let mut buf = [0u8; READ_CHUNK];

    let header_end = loop {
        if let Some(end) = find_header_end(&data) {
            // The cap covers the request line, the headers and the blank line.
            if end + 4 > MAX_HEADER_BYTES {
                return Err(HttpError::HeaderTooLarge);
            }
            break end;
        }
        if data.len() >= MAX_HEADER_BYTES {
            return Err(HttpError::HeaderTooLarge);
        }
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(if data.is_empty() {
                HttpError::Empty
            } else {
                HttpError::ConnectionClosed
            });
        }
        data.extend_from_slice(&buf[..n]);
    };

    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = head.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));

    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target), Some(_version)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(HttpError::InvalidRequestLine);
    };

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value.parse::<usize>().map_err(|_| HttpError::InvalidContentLength)?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(HttpError::BodyTooLarge);
    }

    let mut body = data.split_off(header_end + 4);
    while body.len() < content_length {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(HttpError::IncompleteBody);
        }
        body.extend_from_slice(&buf[..n]);
        if body.len() > MAX_BODY_BYTES {
            return Err(HttpError::BodyTooLarge);
        }
    }
    body.truncate(content_length);

    let path = target.split('?').next().unwrap_or(target).to_string();

    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body,
    })
}

// ============================================================================
// Response
// ============================================================================

/// A complete response. Every response is sent with `Connection: close`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: String,
    pub cache_control: String,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// An empty JSON response with `Cache-Control: no-store`.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            content_type: CONTENT_TYPE_JSON.to_string(),
            cache_control: CACHE_NO_STORE.to_string(),
            body: Vec::new(),
        }
    }

    pub fn json(status: u16, body: &JsonValue) -> Self {
        Self::new(status).with_body(CONTENT_TYPE_JSON, body.to_string())
    }

    /// `{"error":code}`
    pub fn error(status: u16, code: &str) -> Self {
        Self::json(status, &error_body(code))
    }

    /// `{"error":code,"message":message}`
    pub fn error_message(status: u16, code: &str, message: &str) -> Self {
        Self::json(status, &error_with_message(code, message))
    }

    pub fn html(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self::new(status).with_body(CONTENT_TYPE_HTML, body)
    }

    pub fn with_body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.content_type = content_type.to_string();
        self.body = body.into();
        self
    }

    pub fn with_cache_control(mut self, cache_control: &str) -> Self {
        self.cache_control = cache_control.to_string();
        self
    }

    /// Status line, headers and body as sent on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nCache-Control: {}\r\nConnection: close\r\n\r\n",
            self.status,
            status_text(self.status),
            self.content_type,
            self.body.len(),
            self.cache_control,
        );
        let mut raw = head.into_bytes();
        raw.extend_from_slice(&self.body);
        raw
    }
}

pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

pub async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &HttpResponse) -> io::Result<()> {
    writer.write_all(&response.to_bytes()).await?;
    writer.flush().await
}
