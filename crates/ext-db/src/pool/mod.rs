//! Generic race-safe client pool — §4.3.
//!
//! `Get(key)`: check under lock, release the lock before constructing (a
//! slow connect to one backend must never stall lookups against another
//! key), then re-acquire and re-check before inserting — the race this
//! collapses is two concurrent callers both missing the cache and both
//! paying the connect cost; only one of the two constructed clients
//! survives, the other is simply dropped.

pub mod document;
pub mod dynamodb;
pub mod sql;

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

/// A keyed mapping from connection identity to a live, reference-counted
/// client. One instance per backend family (spec.md §3 "Client-Pool
/// Entry").
pub struct Pool<K, V> {
    entries: Mutex<HashMap<K, Arc<V>>>,
}

impl<K, V> Default for Pool<K, V> {
    fn default() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }
}

impl<K: Eq + Hash + Clone, V> Pool<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing client for `key`, or constructs one via
    /// `construct` and races it against any concurrent constructor for the
    /// same key — the loser's client is simply dropped (never inserted,
    /// never used).
    pub async fn get_or_construct<F, Fut, E>(&self, key: K, construct: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(existing) = self.entries.lock().get(&key) {
            return Ok(existing.clone());
        }

        let constructed = construct().await?;

        let mut guard = self.entries.lock();
        if let Some(existing) = guard.get(&key) {
            return Ok(existing.clone());
        }
        let arc = Arc::new(constructed);
        guard.insert(key, arc.clone());
        Ok(arc)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_get_retains_exactly_one_client() {
        let pool: Arc<Pool<&'static str, usize>> = Arc::new(Pool::new());
        let constructions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let constructions = constructions.clone();
            handles.push(tokio::spawn(async move {
                pool.get_or_construct::<_, _, std::convert::Infallible>("k", || async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    constructions.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await
                .unwrap()
            }));
        }

        for handle in handles {
            let client = handle.await.unwrap();
            assert_eq!(*client, 42);
        }

        assert_eq!(pool.len(), 1);
        // Some constructions race and lose; at least one must have won.
        assert!(constructions.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn distinct_keys_construct_independently() {
        let pool: Pool<i32, i32> = Pool::new();
        pool.get_or_construct::<_, _, std::convert::Infallible>(1, || async { Ok(10) }).await.unwrap();
        pool.get_or_construct::<_, _, std::convert::Infallible>(2, || async { Ok(20) }).await.unwrap();
        assert_eq!(pool.len(), 2);
    }
}
