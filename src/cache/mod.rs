mod store;
mod summary_cache;

pub use store::{CacheStats, CacheStore};
pub use summary_cache::{content_hash, SummaryCache, SummaryCacheStats};
