//! The caching middleware: key derivation, lookup, coalesced execution,
//! capture, and replay, tied together per request.
//!
//! [`CacheMiddleware::wrap`] decorates a [`Handler`] with a response cache:
//!
//! - the key function maps the request to a cache key, or absorbs it;
//! - a fresh cached record is replayed straight onto the caller's sink and
//!   the wrapped handler never runs;
//! - on a miss, same-key executions are coalesced through
//!   [`crate::flight::Group`]: one leader runs the handler behind a
//!   [`CaptureSink`] (its caller receives the response through pass-through
//!   writes), stores the captured record, and every follower gets the same
//!   record replayed onto its own sink.
//!
//! Each middleware instance owns its store, coordinator, and buffer pool;
//! wrapping several handlers with one instance shares the cache between
//! them, while separate instances share nothing.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::capture::{BufferPool, CaptureSink};
use crate::flight::Group;
use crate::http::Request;
use crate::key::KeyFunc;
use crate::record::ResponseRecord;
use crate::sink::ResponseSink;
use crate::store::{CacheStats, CacheStore};

/// Configuration rejected at construction time.
///
/// The middleware refuses to start in an invalid state rather than
/// misbehaving at request time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_entries must be at least 1")]
    InvalidCapacity,

    #[error("ttl must be non-zero, got {0:?}")]
    InvalidTtl(Duration),
}

/// Errors surfaced while processing a request through the cache layer.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handler error: {0}")]
    Handler(Box<dyn std::error::Error + Send + Sync>),

    /// The outcome of a coalesced execution, delivered to every caller of
    /// the round. Displays as the underlying error.
    #[error("{0}")]
    Shared(Arc<CacheError>),
}

impl CacheError {
    /// Wraps an arbitrary handler failure.
    pub fn handler(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Handler(err.into())
    }
}

/// An async request handler that writes its response into a [`ResponseSink`].
///
/// This is the unit the middleware decorates: [`CacheMiddleware::wrap`]
/// takes a handler and returns a caching handler of the same shape, so
/// wrapped and unwrapped handlers are interchangeable to a server.
///
/// Implementations are shared across Tokio tasks and must not assume
/// exclusive execution; per-request state belongs in the sink or in locals.
///
/// # Examples
///
/// ```
/// use std::pin::Pin;
/// use cacheflight::http::{Request, StatusCode};
/// use cacheflight::middleware::{CacheError, Handler};
/// use cacheflight::sink::ResponseSink;
///
/// struct Hello;
///
/// impl Handler for Hello {
///     fn call<'a>(
///         &'a self,
///         _req: &'a Request,
///         sink: &'a mut dyn ResponseSink,
///     ) -> Pin<Box<dyn std::future::Future<Output = Result<(), CacheError>> + Send + 'a>> {
///         Box::pin(async move {
///             sink.write_status(StatusCode::OK);
///             sink.write_body(b"hello")?;
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Handler: Send + Sync {
    /// Processes one request, writing the response into `sink`.
    fn call<'a>(
        &'a self,
        req: &'a Request,
        sink: &'a mut dyn ResponseSink,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + 'a>>;
}

/// Boxed future returned by [`Handler::call`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + 'a>>;

/// Adapts a plain function (or closure) into an `Arc<dyn Handler>`.
///
/// # Examples
///
/// ```
/// use cacheflight::http::Request;
/// use cacheflight::middleware::{handler_fn, CacheError, HandlerFuture};
/// use cacheflight::sink::ResponseSink;
///
/// fn hello<'a>(_req: &'a Request, sink: &'a mut dyn ResponseSink) -> HandlerFuture<'a> {
///     Box::pin(async move {
///         sink.write_body(b"hello")?;
///         Ok(())
///     })
/// }
///
/// let handler = handler_fn(hello);
/// ```
pub fn handler_fn<F>(f: F) -> Arc<dyn Handler>
where
    F: for<'a> Fn(&'a Request, &'a mut dyn ResponseSink) -> HandlerFuture<'a>
        + Send
        + Sync
        + 'static,
{
    struct FnHandler<F>(F);

    impl<F> Handler for FnHandler<F>
    where
        F: for<'a> Fn(&'a Request, &'a mut dyn ResponseSink) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        fn call<'a>(&'a self, req: &'a Request, sink: &'a mut dyn ResponseSink) -> HandlerFuture<'a> {
            (self.0)(req, sink)
        }
    }

    Arc::new(FnHandler(f))
}

/// Outcome of one coalesced execution, cloneable to every waiter.
type FlightResult = Result<Arc<ResponseRecord>, Arc<CacheError>>;

/// Response-caching middleware with request coalescing.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use cacheflight::key::basic_key;
/// use cacheflight::middleware::CacheMiddleware;
///
/// let middleware = CacheMiddleware::new(1000, Duration::from_secs(3600), basic_key()).unwrap();
/// assert_eq!(middleware.stats().hits, 0);
/// ```
pub struct CacheMiddleware {
    ttl: Duration,
    key_fn: KeyFunc,
    store: Arc<CacheStore>,
    group: Arc<Group<FlightResult>>,
    pool: Arc<BufferPool>,
}

impl CacheMiddleware {
    /// Creates a middleware instance with its own cache state.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidCapacity`] when `max_entries` is zero and
    /// [`ConfigError::InvalidTtl`] when `ttl` is zero; both are fatal
    /// configuration mistakes and must not reach request time.
    pub fn new(max_entries: usize, ttl: Duration, key_fn: KeyFunc) -> Result<Self, ConfigError> {
        if max_entries == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        if ttl.is_zero() {
            return Err(ConfigError::InvalidTtl(ttl));
        }
        Ok(Self {
            ttl,
            key_fn,
            store: Arc::new(CacheStore::new(max_entries)),
            group: Arc::new(Group::new()),
            pool: Arc::new(BufferPool::new()),
        })
    }

    /// Decorates `next` with this middleware's cache.
    ///
    /// May be called several times; all returned handlers share this
    /// instance's store, coordinator, and buffer pool.
    pub fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(CachedHandler {
            ttl: self.ttl,
            key_fn: Arc::clone(&self.key_fn),
            store: Arc::clone(&self.store),
            group: Arc::clone(&self.group),
            pool: Arc::clone(&self.pool),
            next,
        })
    }

    /// Snapshot of the cache counters, for external monitoring.
    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }
}

// The key function is an opaque closure, so Debug is written by hand.
impl fmt::Debug for CacheMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheMiddleware")
            .field("ttl", &self.ttl)
            .field("stats", &self.store.stats())
            .finish_non_exhaustive()
    }
}

struct CachedHandler {
    ttl: Duration,
    key_fn: KeyFunc,
    store: Arc<CacheStore>,
    group: Arc<Group<FlightResult>>,
    pool: Arc<BufferPool>,
    next: Arc<dyn Handler>,
}

impl Handler for CachedHandler {
    fn call<'a>(&'a self, req: &'a Request, sink: &'a mut dyn ResponseSink) -> HandlerFuture<'a> {
        Box::pin(async move {
            // KEY_DERIVED, or absorbed: no cache access, no handler call,
            // no response.
            let Some(key) = (self.key_fn)(req) else {
                debug!(path = req.target(), "request absorbed by key function");
                return Ok(());
            };

            // HIT: replay the stored record onto the caller's sink.
            if let Some(record) = self.store.get(&key) {
                debug!(key = %key, "cache hit");
                record.replay(sink)?;
                return Ok(());
            }

            // MISS: coalesce. Only the leader's closure runs; its sink
            // receives the response through the capture shim's pass-through
            // writes while the record accumulates for storage.
            debug!(key = %key, "cache miss");
            let ttl = self.ttl;
            let store = &self.store;
            let pool = &self.pool;
            let next = &self.next;
            let flight_key = key.clone();
            // Reborrow so the sink is usable again for follower replay once
            // the coalesced round completes.
            let leader_sink: &mut dyn ResponseSink = &mut *sink;
            let (outcome, leader) = self
                .group
                .run(&key, move || async move {
                    let mut capture = CaptureSink::new(leader_sink, pool);
                    match next.call(req, &mut capture).await {
                        Ok(()) => {
                            let record = Arc::new(capture.into_record());
                            store.insert(flight_key, Arc::clone(&record), ttl);
                            Ok(record)
                        }
                        Err(err) => Err(Arc::new(err)),
                    }
                })
                .await;

            match outcome {
                // Leader already delivered its response via pass-through.
                Ok(_) if leader => Ok(()),
                // Follower: deliver the leader's record onto this caller's
                // own sink.
                Ok(record) => {
                    debug!(key = %key, "coalesced with in-flight execution");
                    record.replay(sink)?;
                    Ok(())
                }
                Err(shared) => Err(CacheError::Shared(shared)),
            }
        })
    }
}
