//! HTTP/1.1 request parsing using the [`httparse`] crate.

use std::str::{self, FromStr};

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Maximum number of header fields accepted per request.
const MAX_HEADERS: usize = 64;

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("incomplete request, need more data")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("header {name} contains invalid UTF-8")]
    InvalidHeaderValue { name: String },
}

/// A parsed HTTP/1.1 request.
///
/// Created by [`Request::parse`] from a raw byte buffer. The original
/// request-target (path plus query, exactly as received) is kept verbatim in
/// [`target`](Self::target) so cache keys derived from it are stable and
/// order-sensitive.
///
/// # Examples
///
/// ```
/// use cacheflight::http::Request;
///
/// let raw = b"GET /search?q=rust HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _body_offset) = Request::parse(raw).unwrap();
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.target(), "/search?q=rust");
/// assert_eq!(request.path(), "/search");
/// assert_eq!(request.query(), Some("q=rust"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    target: String,
    version: u8,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Parses the request line and headers out of `buf`.
    ///
    /// On success returns the request and the byte offset where the body
    /// starts. The body is not consumed here; callers that have buffered it
    /// attach it with [`set_body`](Self::set_body) once `Content-Length`
    /// bytes are available.
    ///
    /// # Errors
    ///
    /// [`RequestError::Incomplete`] when the header section has not fully
    /// arrived yet, [`RequestError::Parse`] for malformed input.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut header_storage);

        let body_offset = match parsed.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = parsed
            .method
            .ok_or(RequestError::MissingField { field: "method" })?;
        let target = parsed
            .path
            .ok_or(RequestError::MissingField { field: "target" })?;
        let version = parsed
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut headers = Headers::new();
        for header in parsed.headers.iter() {
            let value =
                str::from_utf8(header.value).map_err(|_| RequestError::InvalidHeaderValue {
                    name: header.name.to_owned(),
                })?;
            headers.append(header.name, value);
        }

        // Method::from_str is infallible.
        let method = match Method::from_str(method) {
            Ok(method) => method,
            Err(never) => match never {},
        };

        let request = Self {
            method,
            target: target.to_owned(),
            version,
            headers,
            body: Bytes::new(),
        };
        Ok((request, body_offset))
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request-target exactly as received, including the query.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the path component of the target, without the query.
    pub fn path(&self) -> &str {
        match self.target.split_once('?') {
            Some((path, _)) => path,
            None => &self.target,
        }
    }

    /// Returns the raw query string, if the target has one.
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, q)| q)
    }

    /// Returns the minor HTTP version (`0` for HTTP/1.0, `1` for HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the request body. Empty until [`set_body`](Self::set_body)
    /// is called.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Attaches the buffered request body.
    pub fn set_body(&mut self, body: Bytes) {
        self.body = body;
    }

    /// Returns the `Content-Length` header parsed as `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.trim().parse().ok()
    }

    /// Whether the connection should stay open after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive unless `Connection: close`; HTTP/1.0
    /// defaults to close unless `Connection: keep-alive`.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(value) if value.eq_ignore_ascii_case("close") => false,
            Some(value) if value.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version == 1,
        }
    }
}
