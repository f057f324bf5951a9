mod memory;
mod sqlite;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Durable key-value storage used by the summary cache and the queue.
///
/// Writes are assumed crash-consistent per individual key, not transactional
/// across keys.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>>;
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;
    async fn remove_item(&self, key: &str) -> Result<()>;
    async fn multi_remove(&self, keys: &[String]) -> Result<()>;
}
