//! HTTP/1.1 protocol types.
//!
//! This module provides the primitives the rest of the crate is built on:
//! [`Method`], [`StatusCode`], [`Headers`], and [`Request`].

use std::fmt;

pub mod headers;
pub mod request;

pub use headers::Headers;
pub use request::Request;

/// An HTTP response status code.
///
/// Stored as a plain `u16` so handlers can emit any code a request handler
/// might produce, not only the ones this crate names. Well-known codes are
/// available as associated constants.
///
/// # Examples
///
/// ```
/// use cacheflight::http::StatusCode;
///
/// assert_eq!(StatusCode::OK.as_u16(), 200);
/// assert_eq!(StatusCode::NOT_FOUND.to_string(), "404 Not Found");
/// assert!(StatusCode::OK.is_success());
/// assert!(!StatusCode::INTERNAL_SERVER_ERROR.is_success());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const OK: Self = Self(200);
    pub const CREATED: Self = Self(201);
    pub const ACCEPTED: Self = Self(202);
    pub const NO_CONTENT: Self = Self(204);
    pub const MOVED_PERMANENTLY: Self = Self(301);
    pub const FOUND: Self = Self(302);
    pub const NOT_MODIFIED: Self = Self(304);
    pub const BAD_REQUEST: Self = Self(400);
    pub const UNAUTHORIZED: Self = Self(401);
    pub const FORBIDDEN: Self = Self(403);
    pub const NOT_FOUND: Self = Self(404);
    pub const METHOD_NOT_ALLOWED: Self = Self(405);
    pub const PAYLOAD_TOO_LARGE: Self = Self(413);
    pub const TOO_MANY_REQUESTS: Self = Self(429);
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);
    pub const BAD_GATEWAY: Self = Self(502);
    pub const SERVICE_UNAVAILABLE: Self = Self(503);

    /// Creates a status code from a raw `u16`, accepting the registered
    /// HTTP range `100..=599`.
    pub fn from_u16(code: u16) -> Option<Self> {
        if (100..=599).contains(&code) {
            Some(Self(code))
        } else {
            None
        }
    }

    /// Returns the numeric status code.
    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns `true` for `2xx` codes.
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.0)
    }

    /// Returns the canonical reason phrase, or `"Unknown"` for codes this
    /// crate does not name.
    pub fn canonical_reason(self) -> &'static str {
        match self.0 {
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            304 => "Not Modified",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            413 => "Payload Too Large",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.canonical_reason())
    }
}

impl From<StatusCode> for u16 {
    fn from(status: StatusCode) -> u16 {
        status.as_u16()
    }
}

/// An HTTP request method.
///
/// Standard methods are unit variants; anything else lands in
/// [`Method::Custom`]. Parsing never fails, matching how HTTP extension
/// methods appear on the wire.
///
/// # Examples
///
/// ```
/// use cacheflight::http::Method;
///
/// let method: Method = "GET".parse().unwrap();
/// assert_eq!(method, Method::Get);
/// assert_eq!(method.as_str(), "GET");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    /// A non-standard extension method, stored verbatim.
    Custom(String),
}

impl Method {
    /// Returns the method as its wire string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            other => Self::Custom(other.to_owned()),
        })
    }
}

impl AsRef<str> for Method {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_constants() {
        assert_eq!(StatusCode::OK.as_u16(), 200);
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR.as_u16(), 500);
        assert_eq!(StatusCode::NOT_FOUND.canonical_reason(), "Not Found");
    }

    #[test]
    fn status_from_u16_bounds() {
        assert_eq!(StatusCode::from_u16(200), Some(StatusCode::OK));
        assert_eq!(StatusCode::from_u16(599).map(StatusCode::as_u16), Some(599));
        assert!(StatusCode::from_u16(99).is_none());
        assert!(StatusCode::from_u16(600).is_none());
    }

    #[test]
    fn status_unknown_reason() {
        let status = StatusCode::from_u16(418).unwrap();
        assert_eq!(status.canonical_reason(), "Unknown");
        assert_eq!(status.to_string(), "418 Unknown");
    }

    #[test]
    fn method_parse_roundtrip() {
        let m: Method = "DELETE".parse().unwrap();
        assert_eq!(m, Method::Delete);
        assert_eq!(m.as_str(), "DELETE");
    }

    #[test]
    fn method_custom() {
        let m: Method = "PURGE".parse().unwrap();
        assert_eq!(m, Method::Custom("PURGE".to_owned()));
        assert_eq!(m.as_str(), "PURGE");
    }
}
