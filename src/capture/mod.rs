//! Response capture: a transparent shim over the real response sink.
//!
//! [`CaptureSink`] wraps a [`ResponseSink`] for exactly one handler
//! execution. Every header mutation, the first status write, and every body
//! write are recorded into a [`ResponseRecord`] while being forwarded to the
//! real sink unchanged, so the shim's presence is behaviorally invisible.
//!
//! Body bytes accumulate in a buffer borrowed from a [`BufferPool`]. The
//! buffer is held through a guard that clears it and returns it to the pool
//! when dropped, so it is released on every exit path, success or handler
//! failure, or a cancelled future. The finished record copies the body into
//! its own [`Bytes`], so nothing references a pooled buffer after release.

use std::io;
use std::sync::{Mutex, PoisonError};

use bytes::{Bytes, BytesMut};

use crate::http::{Headers, StatusCode};
use crate::record::ResponseRecord;
use crate::sink::ResponseSink;

/// Buffers idling in the pool beyond this count are dropped instead of kept.
const MAX_POOLED: usize = 32;

/// A pool of reusable body-capture buffers shared across requests.
pub struct BufferPool {
    idle: Mutex<Vec<BytesMut>>,
}

impl BufferPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Takes a cleared buffer from the pool, allocating a fresh one when
    /// none is idle. The returned guard gives the buffer back on drop.
    pub fn acquire(&self) -> PooledBuffer<'_> {
        let buf = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();
        debug_assert!(buf.is_empty());
        PooledBuffer {
            pool: self,
            buf: Some(buf),
        }
    }

    fn release(&self, mut buf: BytesMut) {
        buf.clear();
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < MAX_POOLED {
            idle.push(buf);
        }
    }

    #[cfg(test)]
    fn idle_count(&self) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped ownership of one pooled buffer. Returns the buffer, cleared, to
/// its pool on drop.
pub struct PooledBuffer<'p> {
    pool: &'p BufferPool,
    buf: Option<BytesMut>,
}

impl PooledBuffer<'_> {
    fn get_mut(&mut self) -> &mut BytesMut {
        // The Option is only vacated by Drop.
        match self.buf.as_mut() {
            Some(buf) => buf,
            None => unreachable!("pooled buffer taken before drop"),
        }
    }

    fn as_slice(&self) -> &[u8] {
        match self.buf.as_ref() {
            Some(buf) => &buf[..],
            None => &[],
        }
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}

/// The capture shim: records one execution's response while forwarding
/// every write to the wrapped sink unchanged.
pub struct CaptureSink<'a> {
    inner: &'a mut dyn ResponseSink,
    buf: PooledBuffer<'a>,
    headers: Headers,
    status: Option<StatusCode>,
}

impl<'a> CaptureSink<'a> {
    /// Wraps `inner` for one handler execution, capturing body bytes into
    /// a buffer acquired from `pool`.
    pub fn new(inner: &'a mut dyn ResponseSink, pool: &'a BufferPool) -> Self {
        Self {
            inner,
            buf: pool.acquire(),
            headers: Headers::new(),
            status: None,
        }
    }

    /// Finishes the capture and builds the [`ResponseRecord`].
    ///
    /// The status defaults to `200 OK` when the handler never set one. The
    /// body is copied out of the pooled buffer, which returns to the pool
    /// as this sink is dropped.
    pub fn into_record(self) -> ResponseRecord {
        ResponseRecord::new(
            self.status.unwrap_or(StatusCode::OK),
            self.headers,
            Bytes::copy_from_slice(self.buf.as_slice()),
        )
    }
}

impl ResponseSink for CaptureSink<'_> {
    fn append_header(&mut self, name: &str, value: &str) {
        self.headers.append(name, value);
        self.inner.append_header(name, value);
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.headers.set(name, value);
        self.inner.set_header(name, value);
    }

    fn write_status(&mut self, status: StatusCode) {
        // Record the first status only; later writes are still forwarded so
        // the real sink behaves exactly as it would without capture.
        if self.status.is_none() {
            self.status = Some(status);
        }
        self.inner.write_status(status);
    }

    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.inner.write_body(chunk)?;
        self.buf.get_mut().extend_from_slice(chunk);
        Ok(())
    }
}
