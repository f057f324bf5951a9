use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex};

use crate::error::{AppError, Result};

/// A single cached value with its expiry window. An entry is live iff
/// `created_at.elapsed() < ttl`; expired entries are logically absent even
/// before they are swept.
struct CacheEntry<V> {
    data: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_live(&self) -> bool {
        self.created_at.elapsed() < self.ttl
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
    pub in_flight: usize,
}

/// Generic in-process cache with TTL, oldest-first eviction over capacity,
/// and single-flight request de-duplication.
pub struct CacheStore<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    in_flight: Mutex<HashMap<K, broadcast::Sender<std::result::Result<V, String>>>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash + Clone + Send,
    V: Clone + Send,
{
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            default_ttl,
            max_entries,
        }
    }

    /// Returns the live value for `key`, lazily evicting it if expired.
    pub async fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_live() => Some(entry.data.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Inserts or overwrites `key`. Also sweeps all expired entries, so no
    /// background timer is needed, and evicts oldest-first when over
    /// capacity.
    pub async fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| e.is_live());

        entries.insert(
            key,
            CacheEntry {
                data: value,
                created_at: Instant::now(),
                ttl: ttl.unwrap_or(self.default_ttl),
            },
        );

        while entries.len() > self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }
    }

    /// Single-flight: if a request for `key` is already in flight, awaits
    /// and shares its outcome instead of running `factory` again. The
    /// in-flight marker is removed on completion or failure, whichever
    /// comes first. Followers of a failed factory observe its error as a
    /// message, not the original error value.
    pub async fn with_dedup<F>(&self, key: K, factory: F) -> Result<V>
    where
        F: Future<Output = Result<V>>,
    {
        let mut rx = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(&key) {
                Some(tx) => tx.subscribe(),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    in_flight.insert(key.clone(), tx);
                    drop(in_flight);

                    let result = factory.await;

                    // Remove the marker and broadcast under one lock so a
                    // follower can never subscribe and then miss the send.
                    let mut in_flight = self.in_flight.lock().await;
                    if let Some(tx) = in_flight.remove(&key) {
                        let shared = match &result {
                            Ok(v) => Ok(v.clone()),
                            Err(e) => Err(e.to_string()),
                        };
                        let _ = tx.send(shared);
                    }
                    return result;
                }
            }
        };

        match rx.recv().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(msg)) => Err(AppError::Other(anyhow::anyhow!(msg))),
            Err(_) => Err(AppError::Other(anyhow::anyhow!(
                "deduplicated request dropped before completing"
            ))),
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().await;
        let total = entries.len();
        let active = entries.values().filter(|e| e.is_live()).count();
        let in_flight = self.in_flight.lock().await.len();
        CacheStats {
            total,
            active,
            expired: total - active,
            in_flight,
        }
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_set_then_get() {
        let cache: CacheStore<String, String> =
            CacheStore::new(Duration::from_secs(60), 100);

        cache.set("k".to_string(), "v".to_string(), None).await;
        assert_eq!(cache.get(&"k".to_string()).await, Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache: CacheStore<String, String> =
            CacheStore::new(Duration::from_millis(50), 100);

        cache.set("k".to_string(), "v".to_string(), None).await;
        assert!(cache.get(&"k".to_string()).await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get(&"k".to_string()).await.is_none());

        // Lazy eviction removed the entry entirely.
        let stats = cache.stats().await;
        assert_eq!(stats.total, 0);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let cache: CacheStore<String, u32> = CacheStore::new(Duration::from_secs(60), 3);

        for i in 0..5u32 {
            cache.set(format!("k{}", i), i, None).await;
            // Distinct creation instants so oldest-first is deterministic.
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let stats = cache.stats().await;
        assert_eq!(stats.total, 3);
        assert!(cache.get(&"k0".to_string()).await.is_none());
        assert!(cache.get(&"k1".to_string()).await.is_none());
        assert!(cache.get(&"k4".to_string()).await.is_some());
    }

    #[tokio::test]
    async fn test_single_flight_dedup() {
        let cache: Arc<CacheStore<String, u32>> =
            Arc::new(CacheStore::new(Duration::from_secs(60), 100));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .with_dedup("k".to_string(), async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(42u32)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dedup_failure_shared_and_marker_cleared() {
        let cache: Arc<CacheStore<String, u32>> =
            Arc::new(CacheStore::new(Duration::from_secs(60), 100));

        let c = cache.clone();
        let first = tokio::spawn(async move {
            c.with_dedup("k".to_string(), async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Err(AppError::Extraction("boom".to_string()))
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let follower = cache
            .with_dedup("k".to_string(), async { Ok(1u32) })
            .await;

        assert!(first.await.unwrap().is_err());
        assert!(follower.is_err());
        assert_eq!(cache.stats().await.in_flight, 0);

        // A fresh call after failure runs its own factory.
        let retry = cache.with_dedup("k".to_string(), async { Ok(7u32) }).await;
        assert_eq!(retry.unwrap(), 7);
    }
}
