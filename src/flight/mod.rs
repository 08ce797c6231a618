//! Single-flight execution: deduplicates concurrent same-key work.
//!
//! For each key, the first caller of [`Group::run`] becomes the *leader* and
//! executes the supplied closure; callers that arrive while the leader is
//! still running become *followers* and await the leader's value instead of
//! executing their own closure. When the leader finishes, the in-flight
//! round for that key is torn down and a later call starts a fresh round.
//!
//! The coordinator delivers only the leader's return value. It makes no
//! promise about any per-call state a follower's unexecuted closure would
//! have populated; callers needing per-call effects must apply the returned
//! value themselves.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::debug;

/// A set of in-flight executions, keyed by string.
///
/// `T` must be `Clone` because every follower receives its own copy of the
/// leader's value; share large results behind an `Arc`.
pub struct Group<T> {
    calls: Mutex<HashMap<String, broadcast::Sender<T>>>,
}

impl<T> Group<T>
where
    T: Clone + Send + 'static,
{
    /// Creates a group with no in-flight executions.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `f` for `key`, coalescing with any execution already in flight.
    ///
    /// Returns the value and `true` when this caller led the execution, or a
    /// clone of the leader's value and `false` when it followed. A leader
    /// that disappears without publishing (cancelled or panicked) closes the
    /// round; its followers observe the closed channel and contend to lead a
    /// fresh round, so no caller hangs.
    pub async fn run<F, Fut>(&self, key: &str, f: F) -> (T, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        loop {
            let waiter = {
                let mut calls = self.lock();
                match calls.get(key) {
                    Some(leader) => Some(leader.subscribe()),
                    None => {
                        let (tx, _) = broadcast::channel(1);
                        calls.insert(key.to_owned(), tx);
                        None
                    }
                }
            };

            let Some(mut waiter) = waiter else { break };

            debug!(key = %key, "awaiting in-flight execution");
            match waiter.recv().await {
                Ok(value) => return (value, false),
                // Leader vanished without publishing; start a new round.
                Err(_) => continue,
            }
        }

        // Leader path. The guard tears the round down even if the execution
        // future is dropped mid-flight.
        let round = RoundGuard { group: self, key };
        let value = f().await;
        round.publish(value.clone());
        (value, true)
    }

    fn remove(&self, key: &str) -> Option<broadcast::Sender<T>> {
        self.lock().remove(key)
    }

    // The map holds only channel handles; recovering a poisoned lock is safe.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, broadcast::Sender<T>>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.lock().len()
    }
}

impl<T> Default for Group<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Removes the in-flight round on drop. `publish` additionally delivers the
/// leader's value to every subscribed follower.
struct RoundGuard<'g, T: Clone + Send + 'static> {
    group: &'g Group<T>,
    key: &'g str,
}

impl<T: Clone + Send + 'static> RoundGuard<'_, T> {
    fn publish(self, value: T) {
        // Remove before sending so late arrivals start a fresh round instead
        // of subscribing to a finished one. Send fails only when no follower
        // is waiting, which is fine.
        if let Some(leader) = self.group.remove(self.key) {
            let _ = leader.send(value);
        }
        std::mem::forget(self);
    }
}

impl<T: Clone + Send + 'static> Drop for RoundGuard<'_, T> {
    fn drop(&mut self) {
        // Leader abandoned the round: dropping the sender wakes followers
        // with a closed channel and they retry.
        self.group.remove(self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn single_caller_leads() {
        let group: Group<u32> = Group::new();
        let (value, leader) = group.run("k", || async { 7 }).await;
        assert_eq!(value, 7);
        assert!(leader);
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let group: Arc<Group<u32>> = Arc::new(Group::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let group = Arc::clone(&group);
            let executions = Arc::clone(&executions);
            tasks.push(tokio::spawn(async move {
                group
                    .run("k", || async {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        42u32
                    })
                    .await
            }));
        }

        let mut leaders = 0;
        for task in tasks {
            let (value, leader) = task.await.unwrap();
            assert_eq!(value, 42);
            if leader {
                leaders += 1;
            }
        }

        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(leaders, 1);
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let group: Arc<Group<&'static str>> = Arc::new(Group::new());
        let a = group.run("a", || async { "a" });
        let b = group.run("b", || async { "b" });
        let ((va, la), (vb, lb)) = tokio::join!(a, b);
        assert_eq!((va, vb), ("a", "b"));
        assert!(la && lb);
    }

    #[tokio::test]
    async fn completed_round_allows_a_fresh_execution() {
        let group: Group<u32> = Group::new();
        let executions = AtomicUsize::new(0);

        for expected in [1, 2] {
            let (_, leader) = group
                .run("k", || async {
                    executions.fetch_add(1, Ordering::SeqCst);
                    0u32
                })
                .await;
            assert!(leader);
            assert_eq!(executions.load(Ordering::SeqCst), expected);
        }
    }

    #[tokio::test]
    async fn abandoned_leader_releases_followers() {
        let group: Arc<Group<u32>> = Arc::new(Group::new());

        // A leader that stalls forever, then gets aborted mid-flight.
        let stalled = {
            let group = Arc::clone(&group);
            tokio::spawn(async move {
                group
                    .run("k", || async {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        0u32
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let follower = {
            let group = Arc::clone(&group);
            tokio::spawn(async move { group.run("k", || async { 9u32 }).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        stalled.abort();

        // The follower retries and leads its own round.
        let (value, leader) = follower.await.unwrap();
        assert_eq!(value, 9);
        assert!(leader);
        assert_eq!(group.in_flight(), 0);
    }
}
