//! Demo: a slow backend behind the caching middleware.
//!
//! Run with `cargo run --example cached_server`, then hammer it:
//!
//! ```text
//! curl http://127.0.0.1:8080/report   # ~300ms, handler runs
//! curl http://127.0.0.1:8080/report   # instant, served from cache
//! ```
//!
//! Concurrent first requests coalesce: the backend runs once and every
//! client gets the same response.

use std::time::Duration;

use cacheflight::http::{Request, StatusCode};
use cacheflight::key::basic_key;
use cacheflight::middleware::{handler_fn, CacheMiddleware, HandlerFuture};
use cacheflight::server::Server;
use cacheflight::sink::ResponseSink;

fn slow_report<'a>(req: &'a Request, sink: &'a mut dyn ResponseSink) -> HandlerFuture<'a> {
    Box::pin(async move {
        // Stand-in for an expensive backend call.
        tokio::time::sleep(Duration::from_millis(300)).await;
        sink.append_header("Content-Type", "text/plain; charset=utf-8");
        sink.write_status(StatusCode::OK);
        sink.write_body(format!("report for {}\n", req.path()).as_bytes())?;
        Ok(())
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cacheflight=debug".into()),
        )
        .init();

    let cache = CacheMiddleware::new(1000, Duration::from_secs(30), basic_key())?;
    let server = Server::bind("127.0.0.1:8080").await?;
    println!("Listening on http://{}", server.local_addr());

    server.run(cache.wrap(handler_fn(slow_report))).await?;
    Ok(())
}
