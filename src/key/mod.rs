//! Cache key derivation from request attributes.
//!
//! A key function decides, per request, both the cache key and whether the
//! request should be handled at all. Returning `None` absorbs the request
//! entirely: the cache is neither read nor written and the wrapped handler
//! is never invoked, which lets a key function double as an access filter.

use std::sync::Arc;

use crate::http::Request;

/// Derives a cache key from a request, or `None` to absorb the request.
///
/// Key functions must be pure: two requests that derive equal keys are
/// treated as cache-equivalent, so any attribute that should distinguish
/// responses must be part of the key.
pub type KeyFunc = Arc<dyn Fn(&Request) -> Option<String> + Send + Sync>;

/// The default key function: `method + request-target`, verbatim.
///
/// Order- and case-sensitive exactly as the request arrived, so
/// `GET /a?x=1&y=2` and `GET /a?y=2&x=1` are distinct keys.
///
/// # Examples
///
/// ```
/// use cacheflight::http::Request;
/// use cacheflight::key::basic_key;
///
/// let (req, _) = Request::parse(b"GET /foo?a=1 HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
/// let key_fn = basic_key();
/// assert_eq!(key_fn(&req), Some("GET/foo?a=1".to_owned()));
/// ```
pub fn basic_key() -> KeyFunc {
    Arc::new(|req: &Request| Some(format!("{}{}", req.method(), req.target())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(raw: &[u8]) -> Request {
        let (req, _) = Request::parse(raw).unwrap();
        req
    }

    #[test]
    fn method_and_target_form_the_key() {
        let key_fn = basic_key();
        let req = request(b"GET /foo HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(key_fn(&req), Some("GET/foo".to_owned()));
    }

    #[test]
    fn different_methods_derive_different_keys() {
        let key_fn = basic_key();
        let get = request(b"GET /foo/bar HTTP/1.1\r\nHost: x\r\n\r\n");
        let delete = request(b"DELETE /foo/bar HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_ne!(key_fn(&get), key_fn(&delete));
    }

    #[test]
    fn query_order_is_significant() {
        let key_fn = basic_key();
        let a = request(b"GET /a?x=1&y=2 HTTP/1.1\r\nHost: x\r\n\r\n");
        let b = request(b"GET /a?y=2&x=1 HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_ne!(key_fn(&a), key_fn(&b));
    }

    #[test]
    fn custom_key_fn_can_absorb_requests() {
        let key_fn: KeyFunc = Arc::new(|req: &Request| {
            if req.path().starts_with("/private") {
                None
            } else {
                Some(req.target().to_owned())
            }
        });
        let public = request(b"GET /foo HTTP/1.1\r\nHost: x\r\n\r\n");
        let private = request(b"GET /private/x HTTP/1.1\r\nHost: x\r\n\r\n");
        assert!(key_fn(&public).is_some());
        assert!(key_fn(&private).is_none());
    }
}
