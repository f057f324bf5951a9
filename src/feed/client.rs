use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::Client;

use crate::cache::CacheStore;
use crate::error::Result;
use crate::models::Story;

const DEFAULT_BASE_URL: &str = "https://hacker-news.firebaseio.com/v0";
const ITEM_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
const ITEM_CACHE_CAPACITY: usize = 1000;
const MAX_CONCURRENT_FETCHES: usize = 5;

/// Client for the public story feed API. Individual item lookups are
/// cached and de-duplicated so refreshes do not refetch unchanged stories.
pub struct StoryFeedClient {
    client: Client,
    base_url: String,
    cache: CacheStore<String, Story>,
}

impl StoryFeedClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("newsbrief/1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: CacheStore::new(ITEM_CACHE_TTL, ITEM_CACHE_CAPACITY),
        }
    }

    /// Fetches the current top stories, limited to `limit`, fetching item
    /// details concurrently. Failed or malformed items are skipped.
    pub async fn top_stories(&self, limit: usize) -> Result<Vec<Story>> {
        let ids: Vec<i64> = self
            .client
            .get(format!("{}/topstories.json", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let stories: Vec<Story> = stream::iter(ids.into_iter().take(limit))
            .map(|id| async move {
                match self.fetch_item(id).await {
                    Ok(story) => Some(story),
                    Err(e) => {
                        tracing::debug!("Skipping story {}: {}", id, e);
                        None
                    }
                }
            })
            .buffer_unordered(MAX_CONCURRENT_FETCHES)
            .filter_map(|r| async { r })
            .collect()
            .await;

        tracing::info!("Fetched {} stories from feed", stories.len());
        Ok(stories)
    }

    async fn fetch_item(&self, id: i64) -> Result<Story> {
        let key = format!("item:{}", id);

        if let Some(story) = self.cache.get(&key).await {
            return Ok(story);
        }

        let story = self
            .cache
            .with_dedup(key.clone(), async {
                let story: Story = self
                    .client
                    .get(format!("{}/item/{}.json", self.base_url, id))
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                Ok(story)
            })
            .await?;

        self.cache.set(key, story.clone(), None).await;
        Ok(story)
    }
}

impl Default for StoryFeedClient {
    fn default() -> Self {
        Self::new()
    }
}
