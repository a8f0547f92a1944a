//! Fetch-once caching for concurrent async lookups.
//!
//! [`FetchCache`] memoizes the result of an async fetch per key. The first
//! caller for a key becomes the leader and executes the fetch; callers
//! arriving while the fetch is in flight wait for it and receive a clone of
//! the same result. Successful results are kept for the lifetime of the
//! cache, so later calls return immediately without re-fetching. Failed
//! fetches are *not* memoized: the error is handed to every waiter of that
//! round, and the next call for the key starts a fresh fetch.
//!
//! # Cancellation
//!
//! **Note:** If the leader task is cancelled, followers of that round wait
//! indefinitely. Callers should ensure leader tasks are not cancelled, or
//! apply timeouts on their side.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::{Notify, OnceCell};

/// Internal state for a single in-flight fetch.
struct Waiter<V, E> {
    /// Holds the result once the leader completes.
    result: OnceCell<Result<V, E>>,
    /// Notifies waiting followers when the result is ready.
    notify: Notify,
}

/// A keyed compute-once cache for async operations.
///
/// Concurrent calls with the same key converge on a single execution of the
/// fetch closure; everyone receives a clone of its result. A success is
/// pinned in the cache and served to all later callers without recomputation.
///
/// # Example
///
/// ```ignore
/// use gitlabfs_rs::util::FetchCache;
///
/// let cache: FetchCache<u64, String, std::io::Error> = FetchCache::new();
///
/// // Fetched once; every later call for key 7 returns the cached value.
/// let name = cache.get_or_fetch(7, || async {
///     Ok("top-level-group".to_string())
/// }).await;
/// ```
pub struct FetchCache<K, V, E> {
    ready: Mutex<HashMap<K, V>>,
    in_flight: Mutex<HashMap<K, Arc<Waiter<V, E>>>>,
}

impl<K, V, E> FetchCache<K, V, E>
where
    K: Hash + Eq + Clone + Send,
    V: Clone + Send,
    E: Clone + Send,
{
    /// Create an empty `FetchCache`.
    pub fn new() -> Self {
        Self {
            ready: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key`, fetching it if necessary.
    ///
    /// If the key has a memoized value, it is returned immediately. If a
    /// fetch for the key is in flight, this call waits for it and returns a
    /// clone of its result. Otherwise `f` is executed; on success the value
    /// is memoized, on error the key stays absent and a later call retries.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, f: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.ready.lock().unwrap().get(&key) {
            return Ok(value.clone());
        }

        let (waiter, is_leader) = {
            let mut map = self.in_flight.lock().unwrap();
            if let Some(waiter) = map.get(&key) {
                (Arc::clone(waiter), false)
            } else {
                let waiter = Arc::new(Waiter {
                    result: OnceCell::new(),
                    notify: Notify::new(),
                });
                map.insert(key.clone(), Arc::clone(&waiter));
                (waiter, true)
            }
        };

        if is_leader {
            let result = f().await;

            if let Ok(ref value) = result {
                self.ready.lock().unwrap().insert(key.clone(), value.clone());
            }

            // Publish to followers, then retire the in-flight entry.
            // set() cannot fail since the leader is the only writer.
            let _ = waiter.result.set(result.clone());
            waiter.notify.notify_waiters();
            self.in_flight.lock().unwrap().remove(&key);

            result
        } else {
            // Wait for the leader. The loop handles the race between
            // checking the result and registering for notification.
            loop {
                let notified = waiter.notify.notified();

                if let Some(result) = waiter.result.get() {
                    return result.clone();
                }

                notified.await;
            }
        }
    }

    /// Return the memoized value for `key`, if one exists.
    pub fn get(&self, key: &K) -> Option<V> {
        self.ready.lock().unwrap().get(key).cloned()
    }

    /// Number of memoized values.
    pub fn len(&self) -> usize {
        self.ready.lock().unwrap().len()
    }

    /// Whether the cache holds no memoized values.
    pub fn is_empty(&self) -> bool {
        self.ready.lock().unwrap().is_empty()
    }
}

impl<K, V, E> Default for FetchCache<K, V, E>
where
    K: Hash + Eq + Clone + Send,
    V: Clone + Send,
    E: Clone + Send,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_single_fetch() {
        let cache: FetchCache<String, i32, ()> = FetchCache::new();

        let result = cache
            .get_or_fetch("key".to_string(), || async { Ok(42) })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_second_call_uses_cache() {
        let cache: FetchCache<String, i32, ()> = FetchCache::new();
        let call_count = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let call_count = Arc::clone(&call_count);
            let result = cache
                .get_or_fetch("key".to_string(), || {
                    let call_count = Arc::clone(&call_count);
                    async move {
                        call_count.fetch_add(1, Ordering::SeqCst);
                        Ok(7)
                    }
                })
                .await;
            assert_eq!(result, Ok(7));
        }

        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_same_key_fetches_once() {
        let cache: Arc<FetchCache<String, i32, ()>> = Arc::new(FetchCache::new());
        let call_count = Arc::new(AtomicU32::new(0));

        let mut handles = vec![];

        for _ in 0..5 {
            let cache = Arc::clone(&cache);
            let call_count = Arc::clone(&call_count);

            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("same-key".to_string(), || {
                        let call_count = Arc::clone(&call_count);
                        async move {
                            call_count.fetch_add(1, Ordering::SeqCst);
                            sleep(Duration::from_millis(50)).await;
                            Ok(42)
                        }
                    })
                    .await
            }));
        }

        for handle in handles {
            let result = handle.await.unwrap();
            assert_eq!(result, Ok(42));
        }

        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_fetch_separately() {
        let cache: Arc<FetchCache<String, i32, ()>> = Arc::new(FetchCache::new());
        let call_count = Arc::new(AtomicU32::new(0));

        let mut handles = vec![];

        for i in 0..5 {
            let cache = Arc::clone(&cache);
            let call_count = Arc::clone(&call_count);
            let key = format!("key-{}", i);

            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch(key, || {
                        let call_count = Arc::clone(&call_count);
                        async move {
                            call_count.fetch_add(1, Ordering::SeqCst);
                            Ok(42)
                        }
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }

        assert_eq!(call_count.load(Ordering::SeqCst), 5);
        assert_eq!(cache.len(), 5);
    }

    #[tokio::test]
    async fn test_error_not_memoized() {
        let cache: FetchCache<String, i32, String> = FetchCache::new();
        let call_count = Arc::new(AtomicU32::new(0));

        // First attempt fails.
        {
            let call_count = Arc::clone(&call_count);
            let result = cache
                .get_or_fetch("key".to_string(), || {
                    let call_count = Arc::clone(&call_count);
                    async move {
                        call_count.fetch_add(1, Ordering::SeqCst);
                        Err("unreachable".to_string())
                    }
                })
                .await;
            assert_eq!(result, Err("unreachable".to_string()));
        }
        assert!(cache.is_empty());

        // Second attempt retries and succeeds.
        {
            let call_count = Arc::clone(&call_count);
            let result = cache
                .get_or_fetch("key".to_string(), || {
                    let call_count = Arc::clone(&call_count);
                    async move {
                        call_count.fetch_add(1, Ordering::SeqCst);
                        Ok(9)
                    }
                })
                .await;
            assert_eq!(result, Ok(9));
        }

        assert_eq!(call_count.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get(&"key".to_string()), Some(9));
    }

    #[tokio::test]
    async fn test_error_shared_with_waiters() {
        let cache: Arc<FetchCache<String, i32, String>> = Arc::new(FetchCache::new());

        let mut handles = vec![];

        for _ in 0..3 {
            let cache = Arc::clone(&cache);

            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("key".to_string(), || async {
                        sleep(Duration::from_millis(50)).await;
                        Err("shared error".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            let result = handle.await.unwrap();
            assert_eq!(result, Err("shared error".to_string()));
        }

        assert!(cache.is_empty());
    }
}
