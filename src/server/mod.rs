//! Async TCP server using Tokio.
//!
//! Accepts connections and dispatches parsed HTTP/1.1 requests to a
//! [`Handler`] through a [`BufferedSink`]. HTTP/1.1 persistent connections
//! (keep-alive) are supported out of the box. The server is deliberately
//! small; it exists so the caching middleware has a real transport to ride
//! on, and anything that can drive a `Handler` with a `ResponseSink` works
//! just as well.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{Request, StatusCode, request::RequestError};
use crate::middleware::Handler;
use crate::sink::{BufferedSink, ResponseSink};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete request buffered before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// A minimal HTTP/1.1 server front for [`Handler`]s.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use cacheflight::key::basic_key;
/// use cacheflight::middleware::{handler_fn, CacheMiddleware, HandlerFuture};
/// use cacheflight::server::Server;
/// use cacheflight::http::Request;
/// use cacheflight::sink::ResponseSink;
///
/// fn hello<'a>(_req: &'a Request, sink: &'a mut dyn ResponseSink) -> HandlerFuture<'a> {
///     Box::pin(async move {
///         sink.write_body(b"hello")?;
///         Ok(())
///     })
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let cache = CacheMiddleware::new(1000, Duration::from_secs(60), basic_key())?;
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.run(cache.wrap(handler_fn(hello))).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] when the address cannot be bound
    /// (port in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            ServerError::Bind {
                addr: addr.to_owned(),
                source,
            }
        })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections forever, dispatching each request to `handler`.
    ///
    /// A handler error becomes a `500 Internal Server Error` on that
    /// connection; nothing the handler wrote for the failed request is sent.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the listener itself fails.
    pub async fn run(self, handler: Arc<dyn Handler>) -> Result<(), ServerError> {
        info!(address = %self.local_addr, "cacheflight server listening");

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    continue;
                }
            };

            debug!(%peer, "connection accepted");
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let conn = Connection {
                    stream,
                    peer,
                    buf: BytesMut::with_capacity(INITIAL_BUF_SIZE),
                };
                if let Err(e) = conn.serve(handler).await {
                    warn!(%peer, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// One accepted connection and its read buffer.
struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    buf: BytesMut,
}

/// Outcome of trying to cut one complete request out of the read buffer.
enum Framed {
    /// A full request (head and body) is available.
    Request(Request, usize),
    /// More bytes are needed.
    Partial,
    /// The request is unusable; the response to send before closing.
    Reject(StatusCode, String),
}

impl Connection {
    /// Serves requests until the peer disconnects or asks to close.
    async fn serve(mut self, handler: Arc<dyn Handler>) -> Result<(), std::io::Error> {
        loop {
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                debug!(peer = %self.peer, "peer disconnected");
                return Ok(());
            }

            loop {
                let (request, consumed) = match self.frame() {
                    Framed::Request(request, consumed) => (request, consumed),
                    Framed::Partial => break,
                    Framed::Reject(status, message) => {
                        warn!(peer = %self.peer, %status, "rejecting request");
                        return self.respond_and_close(status, &message).await;
                    }
                };

                let keep_alive = request.is_keep_alive();
                debug!(
                    peer = %self.peer,
                    method = %request.method(),
                    path = request.path(),
                    "dispatching request"
                );

                let mut sink = BufferedSink::new();
                sink.set_keep_alive(keep_alive);
                let wire = match handler.call(&request, &mut sink).await {
                    Ok(()) => sink.into_bytes(),
                    Err(e) => {
                        error!(peer = %self.peer, error = %e, "handler failed, sending 500");
                        let mut failure = BufferedSink::new();
                        failure.set_keep_alive(keep_alive);
                        failure.write_status(StatusCode::INTERNAL_SERVER_ERROR);
                        failure.write_body(b"Internal Server Error")?;
                        failure.into_bytes()
                    }
                };
                self.stream.write_all(&wire).await?;
                self.stream.flush().await?;

                let _ = self.buf.split_to(consumed);

                if !keep_alive {
                    debug!(peer = %self.peer, "Connection: close, shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Tries to frame one complete request from the buffered bytes.
    fn frame(&self) -> Framed {
        if self.buf.len() > MAX_REQUEST_SIZE {
            return Framed::Reject(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request entity too large".to_owned(),
            );
        }

        let (mut request, body_offset) = match Request::parse(&self.buf) {
            Ok(parsed) => parsed,
            Err(RequestError::Incomplete) => return Framed::Partial,
            Err(e) => return Framed::Reject(StatusCode::BAD_REQUEST, format!("Bad Request: {e}")),
        };

        // Wait for the full body when Content-Length says more is coming.
        let consumed = body_offset + request.content_length().unwrap_or(0);
        if self.buf.len() < consumed {
            return Framed::Partial;
        }
        request.set_body(Bytes::copy_from_slice(&self.buf[body_offset..consumed]));
        Framed::Request(request, consumed)
    }

    async fn respond_and_close(
        mut self,
        status: StatusCode,
        message: &str,
    ) -> Result<(), std::io::Error> {
        let mut sink = BufferedSink::new();
        sink.set_keep_alive(false);
        sink.write_status(status);
        sink.write_body(message.as_bytes())?;
        self.stream.write_all(&sink.into_bytes()).await
    }
}
