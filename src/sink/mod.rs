//! Response sinks: where a handler's status, headers, and body go.
//!
//! A [`ResponseSink`] is the write side of one HTTP exchange. Handlers write
//! into a sink incrementally (headers, then a status, then body chunks)
//! instead of returning a response value, which is what lets the capture shim
//! in [`crate::capture`] observe every write without changing behavior.
//!
//! [`BufferedSink`] is the concrete sink used by the bundled server: it
//! accumulates the response and serializes it as HTTP/1.1 wire bytes in one
//! shot, so `Content-Length` is always known.

use std::io;

use bytes::{BufMut, BytesMut};

use crate::http::{Headers, StatusCode};

/// The write side of a single HTTP response.
///
/// Object-safe so middleware can wrap any sink behind `&mut dyn ResponseSink`.
/// Implementations must be `Send`; sinks cross `.await` points inside
/// handler futures.
///
/// # Contract
///
/// - The first [`write_status`](Self::write_status) decides the status line;
///   implementations treat later calls as no-ops.
/// - If body bytes are written without an explicit status, the response is
///   an implicit `200 OK`, mirroring standard HTTP server behavior.
/// - Header mutations after the response has begun streaming may be ignored
///   by transport-backed implementations; [`BufferedSink`] accepts them until
///   serialization.
pub trait ResponseSink: Send {
    /// Appends a header field, keeping existing values for the same name.
    fn append_header(&mut self, name: &str, value: &str);

    /// Replaces all values for a header name with a single value.
    fn set_header(&mut self, name: &str, value: &str);

    /// Sets the response status. Only the first call takes effect.
    fn write_status(&mut self, status: StatusCode);

    /// Appends a chunk of body bytes.
    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()>;
}

/// A [`ResponseSink`] that accumulates the full response in memory.
///
/// Used by [`crate::server::Server`] as the real sink behind each request,
/// and convenient in tests as a recorder of exactly what a handler (or a
/// cache replay) produced.
///
/// # Examples
///
/// ```
/// use cacheflight::http::StatusCode;
/// use cacheflight::sink::{BufferedSink, ResponseSink};
///
/// let mut sink = BufferedSink::new();
/// sink.append_header("X-Test", "v");
/// sink.write_status(StatusCode::NOT_FOUND);
/// sink.write_body(b"missing").unwrap();
///
/// let wire = sink.into_bytes();
/// let text = std::str::from_utf8(&wire).unwrap();
/// assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
/// assert!(text.contains("Content-Length: 7\r\n"));
/// ```
#[derive(Debug, Default)]
pub struct BufferedSink {
    status: Option<StatusCode>,
    headers: Headers,
    body: BytesMut,
    keep_alive: bool,
}

impl BufferedSink {
    /// Creates an empty sink with keep-alive enabled.
    pub fn new() -> Self {
        Self {
            status: None,
            headers: Headers::new(),
            body: BytesMut::new(),
            keep_alive: true,
        }
    }

    /// Controls the `Connection` header written at serialization time.
    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        self.keep_alive = keep_alive;
    }

    /// The status written so far, or `None` if the handler never set one.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Headers accumulated so far.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Body bytes accumulated so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serializes the response into HTTP/1.1 wire format.
    ///
    /// An unset status becomes `200 OK`. Adds `Content-Type: text/plain;
    /// charset=utf-8` when a non-empty body has no content type, and always
    /// writes `Content-Length` and `Connection`.
    pub fn into_bytes(mut self) -> BytesMut {
        let status = self.status.unwrap_or(StatusCode::OK);
        let content_length = self.body.len();

        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .append("Content-Type", "text/plain; charset=utf-8");
        }
        self.headers.set(
            "Connection",
            if self.keep_alive { "keep-alive" } else { "close" },
        );

        let estimated = 64 + self.headers.len() * 48 + content_length;
        let mut wire = BytesMut::with_capacity(estimated);

        wire.put(format!("HTTP/1.1 {status}\r\n").as_bytes());
        for (name, value) in self.headers.iter() {
            wire.put(format!("{name}: {value}\r\n").as_bytes());
        }
        wire.put(format!("Content-Length: {content_length}\r\n").as_bytes());
        wire.put(&b"\r\n"[..]);
        wire.put(&self.body[..]);

        wire
    }
}

impl ResponseSink for BufferedSink {
    fn append_header(&mut self, name: &str, value: &str) {
        self.headers.append(name, value);
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.headers.set(name, value);
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.body.extend_from_slice(chunk);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn default_status_is_200() {
        let mut sink = BufferedSink::new();
        sink.write_body(b"hello").unwrap();
        let s = to_string(sink.into_bytes());
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn first_status_wins() {
        let mut sink = BufferedSink::new();
        sink.write_status(StatusCode::INTERNAL_SERVER_ERROR);
        sink.write_status(StatusCode::OK);
        assert_eq!(sink.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn custom_header_serialized() {
        let mut sink = BufferedSink::new();
        sink.append_header("X-Request-Id", "abc-123");
        sink.write_body(b"ok").unwrap();
        let s = to_string(sink.into_bytes());
        assert!(s.contains("X-Request-Id: abc-123\r\n"));
    }

    #[test]
    fn empty_body_has_no_content_type() {
        let sink = BufferedSink::new();
        let s = to_string(sink.into_bytes());
        assert!(!s.contains("Content-Type"));
        assert!(s.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn connection_close() {
        let mut sink = BufferedSink::new();
        sink.set_keep_alive(false);
        let s = to_string(sink.into_bytes());
        assert!(s.contains("Connection: close\r\n"));
    }

    #[test]
    fn body_chunks_concatenate_in_order() {
        let mut sink = BufferedSink::new();
        sink.write_body(b"abc").unwrap();
        sink.write_body(b"defg").unwrap();
        assert_eq!(sink.body(), b"abcdefg");
    }
}
