use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{SummaryMetadata, SummaryRecord, SummaryResponse};
use crate::storage::KvStore;

const SCHEMA_VERSION: &str = "1";
const INDEX_KEY: &str = "summary_cache:index";

fn record_key(hash: &str) -> String {
    format!("summary_cache:entry:{}", hash)
}

/// Deterministic content-addressed key: identical article text always maps
/// to the same hash regardless of URL or fetch time.
pub fn content_hash(title: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b":");
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct SummaryCacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hit_rate: f64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct HitCounters {
    total: u64,
    hits: u64,
}

/// Persisted cache of AI summaries with usage-aware eviction.
///
/// Reads fail open (any storage or decode error is a miss); writes fail
/// closed, so a summary that could not be persisted is never assumed cached.
pub struct SummaryCache {
    store: Arc<dyn KvStore>,
    max_size: usize,
    expiry_days: i64,
    counters: Mutex<HitCounters>,
}

impl SummaryCache {
    pub fn new(store: Arc<dyn KvStore>, max_size: usize, expiry_days: i64) -> Self {
        Self {
            store,
            max_size,
            expiry_days,
            counters: Mutex::new(HitCounters::default()),
        }
    }

    pub async fn get(&self, hash: &str) -> Option<SummaryResponse> {
        let mut counters = self.counters.lock().await;
        counters.total += 1;
        drop(counters);

        let raw = match self.store.get_item(&record_key(hash)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!("Summary cache read failed for {}: {}", hash, e);
                return None;
            }
        };

        let mut record: SummaryRecord = match serde_json::from_str(&raw) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("Discarding undecodable summary record {}: {}", hash, e);
                let _ = self.delete_record(hash).await;
                return None;
            }
        };

        if Utc::now() - record.created_at > Duration::days(self.expiry_days) {
            if let Err(e) = self.delete_record(hash).await {
                tracing::debug!("Failed to delete expired summary {}: {}", hash, e);
            }
            return None;
        }

        record.access_count += 1;
        record.last_accessed = Utc::now();
        if let Ok(raw) = serde_json::to_string(&record) {
            if let Err(e) = self.store.set_item(&record_key(hash), &raw).await {
                tracing::debug!("Failed to refresh summary record {}: {}", hash, e);
            }
        }

        let mut counters = self.counters.lock().await;
        counters.hits += 1;

        let mut response = record.summary;
        response.cached = true;
        Some(response)
    }

    pub async fn put(
        &self,
        hash: &str,
        summary: SummaryResponse,
        metadata: SummaryMetadata,
    ) -> Result<()> {
        let mut index = self.load_index().await;

        if index.len() >= self.max_size && !index.contains(&hash.to_string()) {
            self.evict(&mut index).await?;
        }

        let now = Utc::now();
        let record = SummaryRecord {
            content_hash: hash.to_string(),
            summary,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            metadata,
            schema_version: SCHEMA_VERSION.to_string(),
        };

        let raw = serde_json::to_string(&record)?;
        self.store.set_item(&record_key(hash), &raw).await?;

        if !index.contains(&hash.to_string()) {
            index.push(hash.to_string());
        }
        self.save_index(&index).await?;

        Ok(())
    }

    pub async fn remove(&self, hash: &str) -> Result<()> {
        self.delete_record(hash).await
    }

    pub async fn clear(&self) -> Result<()> {
        let index = self.load_index().await;
        let keys: Vec<String> = index.iter().map(|h| record_key(h)).collect();
        self.store.multi_remove(&keys).await?;
        self.store.remove_item(INDEX_KEY).await?;
        *self.counters.lock().await = HitCounters::default();
        Ok(())
    }

    pub async fn stats(&self) -> SummaryCacheStats {
        let index = self.load_index().await;
        let counters = self.counters.lock().await;
        let hit_rate = if counters.total > 0 {
            counters.hits as f64 / counters.total as f64
        } else {
            0.0
        };
        drop(counters);

        // Only the first few entries are sampled; good enough for display.
        let mut oldest = None;
        let mut newest = None;
        for hash in index.iter().take(10) {
            if let Some(record) = self.load_record(hash).await {
                oldest = match oldest {
                    Some(t) if t <= record.created_at => Some(t),
                    _ => Some(record.created_at),
                };
                newest = match newest {
                    Some(t) if t >= record.created_at => Some(t),
                    _ => Some(record.created_at),
                };
            }
        }

        SummaryCacheStats {
            size: index.len(),
            max_size: self.max_size,
            hit_rate,
            oldest_entry: oldest,
            newest_entry: newest,
        }
    }

    /// Removes the most disposable 10% of capacity (at least one entry) in
    /// one batch. Disposability blends frequency and staleness, weighted
    /// toward staleness: `access_count * 0.3 + age_ms(last_accessed) * 0.7`.
    async fn evict(&self, index: &mut Vec<String>) -> Result<()> {
        let now = Utc::now();
        let mut scored: Vec<(String, f64)> = Vec::with_capacity(index.len());

        for hash in index.iter() {
            let score = match self.load_record(hash).await {
                Some(record) => {
                    let age_ms = (now - record.last_accessed).num_milliseconds().max(0) as f64;
                    record.access_count as f64 * 0.3 + age_ms * 0.7
                }
                // Unreadable records go first.
                None => f64::MAX,
            };
            scored.push((hash.clone(), score));
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let batch = (self.max_size / 10).max(1);
        let victims: Vec<String> = scored.into_iter().take(batch).map(|(h, _)| h).collect();

        tracing::debug!("Evicting {} summary cache entries", victims.len());

        let keys: Vec<String> = victims.iter().map(|h| record_key(h)).collect();
        self.store.multi_remove(&keys).await?;

        index.retain(|h| !victims.contains(h));
        self.save_index(index).await?;

        Ok(())
    }

    async fn delete_record(&self, hash: &str) -> Result<()> {
        self.store.remove_item(&record_key(hash)).await?;
        let mut index = self.load_index().await;
        let before = index.len();
        index.retain(|h| h != hash);
        if index.len() != before {
            self.save_index(&index).await?;
        }
        Ok(())
    }

    async fn load_record(&self, hash: &str) -> Option<SummaryRecord> {
        let raw = self.store.get_item(&record_key(hash)).await.ok()??;
        serde_json::from_str(&raw).ok()
    }

    async fn load_index(&self) -> Vec<String> {
        match self.store.get_item(INDEX_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    async fn save_index(&self, index: &[String]) -> Result<()> {
        let raw = serde_json::to_string(index)?;
        self.store.set_item(INDEX_KEY, &raw).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn response(text: &str) -> SummaryResponse {
        SummaryResponse {
            summary: text.to_string(),
            tokens_used: 100,
            cost: 0.001,
            confidence: 0.9,
            cached: false,
        }
    }

    fn metadata() -> SummaryMetadata {
        SummaryMetadata {
            quality_score: 80.0,
            extracted_date: Utc::now(),
        }
    }

    fn cache(max_size: usize) -> SummaryCache {
        SummaryCache::new(Arc::new(MemoryStore::new()), max_size, 30)
    }

    #[test]
    fn test_content_hash_deterministic() {
        let a = content_hash("Title", "Body text");
        let b = content_hash("Title", "Body text");
        let c = content_hash("Title", "Different body");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_put_then_get_marks_cached() {
        let cache = cache(10);
        let hash = content_hash("Title", "Body");

        assert!(cache.get(&hash).await.is_none());

        cache.put(&hash, response("a summary"), metadata()).await.unwrap();

        let hit = cache.get(&hash).await.unwrap();
        assert_eq!(hit.summary, "a summary");
        assert!(hit.cached);
    }

    #[tokio::test]
    async fn test_hit_rate_tracking() {
        let cache = cache(10);
        let hash = content_hash("T", "C");

        cache.get(&hash).await; // miss
        cache.put(&hash, response("s"), metadata()).await.unwrap();
        cache.get(&hash).await; // hit

        let stats = cache.stats().await;
        assert_eq!(stats.size, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_eviction_keeps_size_bounded() {
        let cache = cache(5);

        for i in 0..5 {
            let hash = content_hash(&format!("t{}", i), "c");
            cache.put(&hash, response("s"), metadata()).await.unwrap();
            // Measurable age gaps so disposability ordering is deterministic.
            tokio::time::sleep(std::time::Duration::from_millis(15)).await;
        }

        // Touch one entry so its last_accessed is freshest.
        let kept = content_hash("t4", "c");
        cache.get(&kept).await.unwrap();

        let extra = content_hash("t-extra", "c");
        cache.put(&extra, response("s"), metadata()).await.unwrap();

        let stats = cache.stats().await;
        assert!(stats.size <= 5);
        assert!(cache.get(&kept).await.is_some());
        assert!(cache.get(&extra).await.is_some());
    }

    #[tokio::test]
    async fn test_clear_resets_stats() {
        let cache = cache(10);
        let hash = content_hash("t", "c");
        cache.put(&hash, response("s"), metadata()).await.unwrap();
        cache.get(&hash).await;

        cache.clear().await.unwrap();

        let stats = cache.stats().await;
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hit_rate, 0.0);
        assert!(cache.get(&hash).await.is_none());
    }
}
