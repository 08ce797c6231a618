//! Bounded response cache with per-entry TTL, LRU eviction, and counters.
//!
//! The store maps cache keys to immutable [`ResponseRecord`]s. Expiry is
//! lazy: an expired entry is removed by the `get` that observes it and
//! counted as a miss. Capacity pressure evicts the least-recently-*accessed*
//! entry, where both `get` and `insert` count as access.
//!
//! Recency is tracked with a stamped queue: every access pushes
//! `(key, stamp)` onto the back, and eviction pops from the front, skipping
//! stale "ghost" stamps left behind by later accesses of the same key. The
//! queue can briefly hold more slots than there are live entries, but never
//! fewer, so the eviction loop always terminates. Once ghosts outnumber live
//! slots the queue is swept in place, keeping its length within a small
//! multiple of the entry count even under hit-heavy workloads.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::trace;

use crate::record::ResponseRecord;

/// Monotonic counters describing cache effectiveness over the store's
/// lifetime. There is no reset; recreate the store to start over.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered by an unexpired entry.
    pub hits: u64,
    /// Lookups that found nothing, or only an expired entry.
    pub misses: u64,
    /// Successful inserts, including overwrites of an existing key.
    pub insertions: u64,
    /// Entries removed by capacity pressure (TTL removals do not count).
    pub evictions: u64,
}

struct Entry {
    record: Arc<ResponseRecord>,
    expires_at: Instant,
    touched: u64,
}

struct Inner {
    entries: HashMap<String, Entry>,
    recency: VecDeque<(String, u64)>,
    stamp: u64,
    stats: CacheStats,
}

/// Queues shorter than this are never compacted.
const COMPACT_FLOOR: usize = 32;

impl Inner {
    fn touch(&mut self, key: &str) -> u64 {
        self.stamp += 1;
        self.recency.push_back((key.to_owned(), self.stamp));
        self.stamp
    }

    /// Sweeps ghost slots once they outnumber live entries.
    ///
    /// Must run only after the touched entry's stamp has been stored, or the
    /// sweep would discard the slot that keeps that entry evictable.
    fn maybe_compact(&mut self) {
        if self.recency.len() <= (2 * self.entries.len()).max(COMPACT_FLOOR) {
            return;
        }
        let entries = &self.entries;
        self.recency
            .retain(|(key, stamp)| entries.get(key).is_some_and(|entry| entry.touched == *stamp));
    }
}

/// A bounded, TTL-aware cache of captured responses.
///
/// One internal lock serializes all index mutation; records themselves are
/// immutable `Arc`s, so a hit hands the caller a cheap read-only clone.
pub struct CacheStore {
    max_entries: usize,
    inner: Mutex<Inner>,
}

impl CacheStore {
    /// Creates a store holding at most `max_entries` live entries.
    ///
    /// Capacity validation belongs to the middleware constructor; a store
    /// built directly with `max_entries == 0` evicts on every insert.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: VecDeque::new(),
                stamp: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Looks up an unexpired entry, refreshing its recency.
    ///
    /// An expired entry is removed here and reported as a miss. Counters are
    /// updated on every call.
    pub fn get(&self, key: &str) -> Option<Arc<ResponseRecord>> {
        let mut inner = self.lock();

        let expired = match inner.entries.get(key) {
            None => {
                inner.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.expires_at <= Instant::now(),
        };

        if expired {
            trace!(key = %key, "cache entry expired");
            inner.entries.remove(key);
            inner.stats.misses += 1;
            return None;
        }

        let stamp = inner.touch(key);
        let entry = inner.entries.get_mut(key)?;
        entry.touched = stamp;
        let record = Arc::clone(&entry.record);
        inner.stats.hits += 1;
        inner.maybe_compact();
        Some(record)
    }

    /// Inserts or overwrites `key`, valid for `ttl` from now.
    ///
    /// Increments the insertion counter, then evicts the least-recently
    /// accessed entries while the store is over capacity, incrementing the
    /// eviction counter once per removed entry.
    pub fn insert(&self, key: String, record: Arc<ResponseRecord>, ttl: Duration) {
        let mut inner = self.lock();

        let stamp = inner.touch(&key);
        inner.entries.insert(
            key,
            Entry {
                record,
                expires_at: Instant::now() + ttl,
                touched: stamp,
            },
        );
        inner.stats.insertions += 1;

        while inner.entries.len() > self.max_entries {
            let Some((victim, stamp)) = inner.recency.pop_front() else {
                break;
            };
            // Ghost slot: the key was accessed again after this stamp was
            // queued, or the entry is already gone.
            let live = inner
                .entries
                .get(&victim)
                .is_some_and(|entry| entry.touched == stamp);
            if live {
                trace!(key = %victim, "evicting least-recently-used entry");
                inner.entries.remove(&victim);
                inner.stats.evictions += 1;
            }
        }
        inner.maybe_compact();
    }

    /// Snapshot of the running counters. Read-only; no side effects.
    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Number of live entries, counting expired-but-not-yet-removed ones.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` when no entries are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Entries are plain data, so a poisoned lock is safe to recover.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn recency_len(&self) -> usize {
        self.lock().recency.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Headers, StatusCode};
    use bytes::Bytes;

    const TTL: Duration = Duration::from_secs(60);

    fn record(body: &str) -> Arc<ResponseRecord> {
        Arc::new(ResponseRecord::new(
            StatusCode::OK,
            Headers::new(),
            Bytes::copy_from_slice(body.as_bytes()),
        ))
    }

    #[test]
    fn miss_then_hit() {
        let store = CacheStore::new(8);
        assert!(store.get("k").is_none());

        store.insert("k".to_owned(), record("v"), TTL);
        let got = store.get("k").unwrap();
        assert_eq!(got.body().as_ref(), b"v");

        let stats = store.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.insertions, 1);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn repeated_hits_return_identical_record() {
        let store = CacheStore::new(8);
        store.insert("k".to_owned(), record("abcdefg"), TTL);

        let first = store.get("k").unwrap();
        let second = store.get("k").unwrap();
        assert_eq!(first, second);
        assert_eq!(store.stats().hits, 2);
    }

    #[test]
    fn expired_entry_is_a_miss_and_is_removed() {
        let store = CacheStore::new(8);
        store.insert("k".to_owned(), record("v"), Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(25));

        assert!(store.get("k").is_none());
        assert!(store.is_empty());
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn entry_is_fresh_before_ttl() {
        let store = CacheStore::new(8);
        store.insert("k".to_owned(), record("v"), TTL);
        assert!(store.get("k").is_some());
    }

    #[test]
    fn overwrite_counts_as_insertion_not_eviction() {
        let store = CacheStore::new(8);
        store.insert("k".to_owned(), record("v1"), TTL);
        store.insert("k".to_owned(), record("v2"), TTL);

        assert_eq!(store.len(), 1);
        let stats = store.stats();
        assert_eq!(stats.insertions, 2);
        assert_eq!(stats.evictions, 0);
        assert_eq!(store.get("k").unwrap().body().as_ref(), b"v2");
    }

    #[test]
    fn capacity_evicts_exactly_one_lru_entry() {
        let store = CacheStore::new(2);
        store.insert("a".to_owned(), record("1"), TTL);
        store.insert("b".to_owned(), record("2"), TTL);
        store.insert("c".to_owned(), record("3"), TTL);

        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().evictions, 1);
        // "a" was least recently accessed.
        assert!(store.get("b").is_some());
        assert!(store.get("c").is_some());
        assert!(store.get("a").is_none());
    }

    #[test]
    fn get_refreshes_recency() {
        let store = CacheStore::new(2);
        store.insert("a".to_owned(), record("1"), TTL);
        store.insert("b".to_owned(), record("2"), TTL);

        // Touch "a" so "b" becomes the LRU victim.
        assert!(store.get("a").is_some());
        store.insert("c".to_owned(), record("3"), TTL);

        assert!(store.get("a").is_some());
        assert!(store.get("c").is_some());
        assert!(store.get("b").is_none());
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn hit_heavy_workload_keeps_the_recency_queue_bounded() {
        let store = CacheStore::new(8);
        store.insert("k".to_owned(), record("v"), TTL);

        for _ in 0..10_000 {
            assert!(store.get("k").is_some());
        }

        // One live entry; the queue must stay within the compaction bound
        // instead of accumulating a ghost slot per hit.
        assert!(
            store.recency_len() <= 64,
            "recency queue holds {} slots for 1 live entry",
            store.recency_len()
        );
        assert_eq!(store.stats().hits, 10_000);
    }

    #[test]
    fn eviction_order_survives_compaction() {
        let store = CacheStore::new(2);
        store.insert("a".to_owned(), record("1"), TTL);
        store.insert("b".to_owned(), record("2"), TTL);

        // Enough hits on "a" to trigger several sweeps.
        for _ in 0..200 {
            assert!(store.get("a").is_some());
        }

        store.insert("c".to_owned(), record("3"), TTL);
        assert!(store.get("a").is_some());
        assert!(store.get("c").is_some());
        assert!(store.get("b").is_none(), "\"b\" was least recently accessed");
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn stats_serialize_for_monitoring() {
        let store = CacheStore::new(2);
        store.insert("a".to_owned(), record("1"), TTL);
        let json = serde_json::to_value(store.stats()).unwrap();
        assert_eq!(json["insertions"], 1);
        assert_eq!(json["hits"], 0);
    }

    #[test]
    fn concurrent_access_keeps_bookkeeping_consistent() {
        let store = Arc::new(CacheStore::new(16));
        let mut handles = Vec::new();
        for t in 0..4 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    let key = format!("k{}", (t + i) % 8);
                    store.insert(key.clone(), record("v"), TTL);
                    let _ = store.get(&key);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = store.stats();
        assert_eq!(stats.insertions, 200);
        assert!(store.len() <= 16);
    }
}
