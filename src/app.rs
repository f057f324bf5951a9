use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::ai::{ClaudeSummarizer, Summarize};
use crate::cache::SummaryCache;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::extract::{ContentExtractor, HttpFetcher};
use crate::feed::StoryFeedClient;
use crate::models::{
    ExtractOptions, ExtractedContent, ItemStatus, Priority, QueueItem, Story, SummaryRequest,
};
use crate::queue::{QueueConfig, SummaryQueue};
use crate::storage::{KvStore, SqliteStore};

const MAX_CONCURRENT_EXTRACTIONS: usize = 5;

/// One enriched story card: the feed record, what extraction produced, and
/// (after the queue drains) the summarization outcome.
#[derive(Debug, Clone)]
pub struct StoryCard {
    pub story: Story,
    pub extraction: Option<ExtractedContent>,
    pub queue_item: Option<QueueItem>,
}

/// Composition root. Owns the single process-wide instances of the feed
/// client, extractor, summary cache, and queue, and drives a full
/// fetch → extract → summarize pass.
pub struct Pipeline {
    feed: StoryFeedClient,
    extractor: ContentExtractor,
    queue: Arc<SummaryQueue>,
    summary_cache: Arc<SummaryCache>,
    extract_options: ExtractOptions,
    story_limit: usize,
}

impl Pipeline {
    pub async fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .claude_api_key
            .clone()
            .ok_or_else(|| AppError::Config("claude_api_key is not set".to_string()))?;

        let store: Arc<dyn KvStore> = Arc::new(SqliteStore::new(&config.db_path).await?);
        let summarizer: Arc<dyn Summarize> = Arc::new(ClaudeSummarizer::new(api_key));

        Ok(Self::assemble(
            StoryFeedClient::new(),
            ContentExtractor::new(Arc::new(HttpFetcher::new())),
            summarizer,
            store,
            config,
        ))
    }

    /// Wires the pipeline from explicit collaborators. Tests inject stubs
    /// here; `new` supplies the production set.
    pub fn assemble(
        feed: StoryFeedClient,
        extractor: ContentExtractor,
        summarizer: Arc<dyn Summarize>,
        store: Arc<dyn KvStore>,
        config: &Config,
    ) -> Self {
        let summary_cache = Arc::new(SummaryCache::new(
            store.clone(),
            config.summary_cache_size,
            config.summary_expiry_days,
        ));
        let queue = Arc::new(SummaryQueue::new(
            summarizer,
            summary_cache.clone(),
            store,
            QueueConfig {
                max_concurrent: config.max_concurrent_summaries,
                max_retries: config.max_retries,
            },
        ));

        Self {
            feed,
            extractor,
            queue,
            summary_cache,
            extract_options: ExtractOptions {
                timeout_secs: config.extraction_timeout_secs,
                ..ExtractOptions::default()
            },
            story_limit: config.story_limit,
        }
    }

    pub fn queue(&self) -> &Arc<SummaryQueue> {
        &self.queue
    }

    pub fn summary_cache(&self) -> &Arc<SummaryCache> {
        &self.summary_cache
    }

    /// Full pass: fetch stories, extract each linked article, queue valid
    /// extractions for summarization, and drain the queue. Failed cards are
    /// kept in the result instead of disappearing from the feed.
    pub async fn run(&self) -> Result<Vec<StoryCard>> {
        self.queue.load().await?;

        let stories = self.feed.top_stories(self.story_limit).await?;
        tracing::info!("Processing {} stories", stories.len());

        let mut cards = self.extract_all(stories).await;

        let mut job_ids: Vec<Option<String>> = Vec::with_capacity(cards.len());
        for card in &cards {
            let id = match &card.extraction {
                Some(extraction) if extraction.success => {
                    let request = SummaryRequest {
                        content: extraction.content.clone(),
                        title: extraction.title.clone(),
                        url: extraction.url.clone(),
                        priority: priority_for(&card.story),
                    };
                    Some(self.queue.submit(request).await?)
                }
                _ => None,
            };
            job_ids.push(id);
        }

        self.queue.process().await?;

        let items = self.queue.items().await;
        for (card, job_id) in cards.iter_mut().zip(job_ids) {
            if let Some(job_id) = job_id {
                card.queue_item = items.iter().find(|i| i.id == job_id).cloned();
            }
        }

        Ok(cards)
    }

    async fn extract_all(&self, stories: Vec<Story>) -> Vec<StoryCard> {
        stream::iter(stories)
            .map(|story| async move {
                let extraction = match &story.url {
                    Some(url) => Some(self.extractor.extract(url, &self.extract_options).await),
                    None => None,
                };
                if let Some(e) = &extraction {
                    if !e.success {
                        tracing::debug!(
                            "Extraction failed for {}: {}",
                            e.url,
                            e.error.as_deref().unwrap_or("unknown")
                        );
                    }
                }
                StoryCard {
                    story,
                    extraction,
                    queue_item: None,
                }
            })
            .buffer_unordered(MAX_CONCURRENT_EXTRACTIONS)
            .collect()
            .await
    }

    /// Re-queues persisted failed jobs and drains them.
    pub async fn retry_failed(&self) -> Result<usize> {
        self.queue.load().await?;
        self.queue.retry_failed().await?;
        let progress = self.queue.progress().await;
        Ok(progress.completed)
    }

    pub async fn print_stats(&self) -> Result<()> {
        self.queue.load().await?;

        let extraction = self.extractor.cache_stats().await;
        let summaries = self.summary_cache.stats().await;
        let progress = self.queue.progress().await;
        let state = self.queue.state().await;

        println!("Extraction cache: {} entries ({} live)", extraction.total, extraction.active);
        println!(
            "Summary cache:    {}/{} entries, hit rate {:.0}%",
            summaries.size,
            summaries.max_size,
            summaries.hit_rate * 100.0
        );
        println!(
            "Queue:            {} total, {} completed, {} failed, {} pending",
            progress.total, progress.completed, progress.failed, progress.pending
        );
        println!(
            "Lifetime:         {} processed, {} failed",
            state.total_processed, state.total_failed
        );
        Ok(())
    }
}

/// Priority hint derived from story engagement.
fn priority_for(story: &Story) -> Priority {
    match story.score.unwrap_or(0) {
        s if s >= 300 => Priority::High,
        s if s >= 100 => Priority::Normal,
        _ => Priority::Low,
    }
}

/// Renders completed cards for the headless CLI.
pub fn print_cards(cards: &[StoryCard]) {
    for card in cards {
        println!("## {}", card.story.title);
        if let Some(url) = &card.story.url {
            println!("   {}", url);
        }
        match &card.queue_item {
            Some(item) if item.status == ItemStatus::Completed => {
                if let Some(response) = &item.response {
                    let tag = if response.cached { " (cached)" } else { "" };
                    println!("{}{}\n", response.summary, tag);
                }
            }
            Some(item) if item.status == ItemStatus::Failed => {
                println!(
                    "   [summary failed: {}]\n",
                    item.error.as_deref().unwrap_or("unknown error")
                );
            }
            Some(_) => println!("   [summary pending]\n"),
            None => {
                let reason = card
                    .extraction
                    .as_ref()
                    .and_then(|e| e.error.as_deref())
                    .unwrap_or("no linked article");
                println!("   [not summarized: {}]\n", reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_from_score() {
        let story = |score| Story {
            id: 1,
            title: "t".to_string(),
            url: None,
            by: None,
            time: None,
            score,
            descendants: None,
        };
        assert_eq!(priority_for(&story(Some(500))), Priority::High);
        assert_eq!(priority_for(&story(Some(150))), Priority::Normal);
        assert_eq!(priority_for(&story(Some(10))), Priority::Low);
        assert_eq!(priority_for(&story(None)), Priority::Low);
    }
}
