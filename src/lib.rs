//! # cacheflight
//!
//! Response-caching HTTP middleware with request coalescing.
//!
//! `cacheflight` sits in front of an async request handler. It derives a
//! cache key per request, replays a previously captured response when a
//! fresh entry exists, and otherwise runs the wrapped handler behind a
//! transparent capture shim that records status, headers, and body for
//! storage. Concurrent requests with the same key are coalesced so the
//! wrapped handler runs at most once per key at a time, which protects
//! expensive backends from request stampedes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use cacheflight::http::Request;
//! use cacheflight::key::basic_key;
//! use cacheflight::middleware::{handler_fn, CacheMiddleware, HandlerFuture};
//! use cacheflight::server::Server;
//! use cacheflight::sink::ResponseSink;
//!
//! fn slow_hello<'a>(_req: &'a Request, sink: &'a mut dyn ResponseSink) -> HandlerFuture<'a> {
//!     Box::pin(async move {
//!         tokio::time::sleep(Duration::from_millis(200)).await;
//!         sink.write_body(b"Hello, World!")?;
//!         Ok(())
//!     })
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = CacheMiddleware::new(1000, Duration::from_secs(60), basic_key())?;
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.run(cache.wrap(handler_fn(slow_hello))).await?;
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod flight;
pub mod http;
pub mod key;
pub mod middleware;
pub mod record;
pub mod server;
pub mod sink;
pub mod store;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, StatusCode};
pub use key::{basic_key, KeyFunc};
pub use middleware::{handler_fn, CacheError, CacheMiddleware, ConfigError, Handler};
pub use record::ResponseRecord;
pub use server::{Server, ServerError};
pub use sink::{BufferedSink, ResponseSink};
pub use store::CacheStats;
