//! Captured responses: the value the cache stores and replays.

use std::io;

use bytes::Bytes;

use crate::http::{Headers, StatusCode};
use crate::sink::ResponseSink;

/// An immutable snapshot of one handler execution's response.
///
/// Holds the headers the handler produced (in order), the status of the
/// first status write (defaulting to `200 OK` when the handler never set
/// one), and the concatenation of all body writes. Once constructed a record
/// never changes; the cache hands out `Arc<ResponseRecord>` clones and every
/// replay reproduces the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRecord {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
}

impl ResponseRecord {
    /// Builds a record from captured parts.
    pub fn new(status: StatusCode, headers: Headers, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// The recorded status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The recorded headers, in the order the handler wrote them.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The recorded body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Writes this record onto `sink`: each header pair appended in stored
    /// order, then the status, then the body in one write.
    ///
    /// Used both for cache hits and for delivering a coalesced leader's
    /// response to a follower's own sink.
    ///
    /// # Errors
    ///
    /// Propagates the sink's body-write error.
    pub fn replay(&self, sink: &mut dyn ResponseSink) -> io::Result<()> {
        for (name, value) in self.headers.iter() {
            sink.append_header(name, value);
        }
        sink.write_status(self.status);
        sink.write_body(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::BufferedSink;

    fn sample() -> ResponseRecord {
        let mut headers = Headers::new();
        headers.append("X-Test", "test-value");
        headers.append("Set-Cookie", "a=1");
        headers.append("Set-Cookie", "b=2");
        ResponseRecord::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            headers,
            Bytes::from_static(b"abcdefg"),
        )
    }

    #[test]
    fn replay_reproduces_all_parts() {
        let record = sample();
        let mut sink = BufferedSink::new();
        record.replay(&mut sink).unwrap();

        assert_eq!(sink.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(sink.headers().get("x-test"), Some("test-value"));
        let cookies: Vec<_> = sink.headers().get_all("set-cookie").collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert_eq!(sink.body(), b"abcdefg");
    }

    #[test]
    fn repeated_replays_are_identical() {
        let record = sample();

        let mut first = BufferedSink::new();
        record.replay(&mut first).unwrap();
        let mut second = BufferedSink::new();
        record.replay(&mut second).unwrap();

        assert_eq!(first.into_bytes(), second.into_bytes());
    }
}
