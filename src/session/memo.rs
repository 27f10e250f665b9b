//! Keyed memo of shared asynchronous attempts.
//!
//! The first caller for a key installs a pending attempt; every concurrent
//! caller awaits that same attempt. Successes stay cached. A failure is
//! evicted by the callers that observed it, matched by attempt id so a newer
//! attempt installed in the meantime is left alone.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::error::FetchResult;

type SharedAttempt<V> = Shared<BoxFuture<'static, FetchResult<V>>>;

struct Slot<V> {
    attempt: u64,
    future: SharedAttempt<V>,
}

pub struct MemoMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    label: &'static str,
    slots: DashMap<K, Slot<V>>,
    next_attempt: AtomicU64,
}

impl<K, V> MemoMap<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone + Send + Sync + 'static,
{
    /// `label` names the memo in logs.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            slots: DashMap::new(),
            next_attempt: AtomicU64::new(1),
        }
    }

    /// Join the attempt for `key`, starting one with `start` if none exists.
    ///
    /// `start` only builds the future; it runs when first polled, outside
    /// any map lock.
    pub async fn resolve<F, Fut>(&self, key: K, start: F) -> FetchResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        self.resolve_attempt(key, start).await.1
    }

    /// Like [`resolve`](Self::resolve), also returning the id of the attempt
    /// the result came from, for a later [`evict_attempt`](Self::evict_attempt).
    pub async fn resolve_attempt<F, Fut>(&self, key: K, start: F) -> (u64, FetchResult<V>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        let (attempt, future) = match self.slots.entry(key.clone()) {
            Entry::Occupied(slot) => {
                tracing::trace!(memo = self.label, ?key, "Joining existing attempt");
                (slot.get().attempt, slot.get().future.clone())
            }
            Entry::Vacant(vacant) => {
                let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed);
                let future = start().boxed().shared();
                vacant.insert(Slot {
                    attempt,
                    future: future.clone(),
                });
                tracing::trace!(memo = self.label, ?key, attempt, "Started attempt");
                (attempt, future)
            }
        };

        let result = future.await;
        if let Err(e) = &result {
            if self.evict_attempt(&key, attempt) {
                tracing::debug!(memo = self.label, ?key, attempt, error = %e, "Evicted failed attempt");
            }
        }
        (attempt, result)
    }

    /// Settled success for `key`, if any.
    pub fn settled_ok(&self, key: &K) -> Option<V> {
        let slot = self.slots.get(key)?;
        match slot.future.peek() {
            Some(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Remove the slot for `key` only if it still holds `attempt`.
    pub fn evict_attempt(&self, key: &K, attempt: u64) -> bool {
        self.slots
            .remove_if(key, |_, slot| slot.attempt == attempt)
            .is_some()
    }
}

impl<K, V> Debug for MemoMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoMap")
            .field("label", &self.label)
            .field("slots", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_attempt() {
        let memo = Arc::new(MemoMap::<String, u32>::new("test"));
        let starts = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let memo = memo.clone();
            let starts = starts.clone();
            handles.push(tokio::spawn(async move {
                memo.resolve("k".to_string(), move || async move {
                    starts.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(7)
                })
                .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(7));
        }

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(memo.settled_ok(&"k".to_string()), Some(7));
    }

    #[tokio::test]
    async fn test_failure_is_evicted_and_retried() {
        let memo = MemoMap::<&'static str, u32>::new("test");

        let err = memo
            .resolve("k", || async { Err(FetchError::Transport("down".into())) })
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Transport("down".into()));
        assert!(!memo.contains(&"k"));

        let value = memo.resolve("k", || async { Ok(1) }).await.unwrap();
        assert_eq!(value, 1);
        assert!(memo.contains(&"k"));
    }

    #[tokio::test]
    async fn test_success_is_cached() {
        let memo = MemoMap::<u8, u32>::new("test");
        memo.resolve(1, || async { Ok(10) }).await.unwrap();

        let value = memo
            .resolve(1, || async {
                let second: FetchResult<u32> = Err(FetchError::Cache("second attempt".into()));
                second
            })
            .await
            .unwrap();
        assert_eq!(value, 10);
    }

    #[tokio::test]
    async fn test_evict_attempt_spares_newer_attempt() {
        let memo = MemoMap::<u8, u32>::new("test");

        let (stale, value) = memo.resolve_attempt(1, || async { Ok(5) }).await;
        assert_eq!(value, Ok(5));
        assert!(memo.evict_attempt(&1, stale));

        let (fresh, value) = memo.resolve_attempt(1, || async { Ok(6) }).await;
        assert_eq!(value, Ok(6));
        assert_ne!(fresh, stale);

        // A caller still holding the old id must not drop the new success.
        assert!(!memo.evict_attempt(&1, stale));
        assert_eq!(memo.settled_ok(&1), Some(6));
    }

    #[tokio::test]
    async fn test_joined_callers_see_same_attempt() {
        let memo = Arc::new(MemoMap::<u8, u32>::new("test"));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let first = {
            let memo = memo.clone();
            tokio::spawn(async move {
                memo.resolve_attempt(1, || async move {
                    let _ = rx.await;
                    Ok(5)
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = {
            let memo = memo.clone();
            tokio::spawn(async move { memo.resolve_attempt(1, || async { Ok(9) }).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        tx.send(()).unwrap();
        let (a, first) = first.await.unwrap();
        let (b, second) = second.await.unwrap();
        assert_eq!(a, b);
        assert_eq!(first, Ok(5));
        assert_eq!(second, Ok(5));
    }
}
