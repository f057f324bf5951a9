//! End-to-end pipeline test: a local feed server, real extraction over
//! HTTP, and a stubbed summarizer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use newsbrief::ai::Summarize;
use newsbrief::app::Pipeline;
use newsbrief::cache::content_hash;
use newsbrief::config::Config;
use newsbrief::error::Result;
use newsbrief::extract::{ContentExtractor, HttpFetcher};
use newsbrief::feed::StoryFeedClient;
use newsbrief::models::{ExtractionMethod, ItemStatus, Priority, SummaryResponse};
use newsbrief::storage::{KvStore, MemoryStore};

const SUMMARY_TEXT: &str =
    "The launch happened quietly. Nobody noticed for a week. Then everything changed at once.";

const ARTICLE_PARAGRAPH: &str =
    "The team shipped the new release overnight without any announcement at all today.";

struct FixedSummarizer {
    calls: AtomicUsize,
}

#[async_trait]
impl Summarize for FixedSummarizer {
    async fn summarize(
        &self,
        _content: &str,
        _title: &str,
        _priority: Priority,
    ) -> Result<SummaryResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SummaryResponse {
            summary: SUMMARY_TEXT.to_string(),
            tokens_used: 120,
            cost: 0.0002,
            confidence: 0.9,
            cached: false,
        })
    }
}

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Serves the story feed and the linked article over real HTTP.
async fn spawn_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{}", addr);

    let article_url = format!("{}/article", base);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let article_url = article_url.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let mut request = String::new();
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) => break,
                        Ok(n) => {
                            request.push_str(&String::from_utf8_lossy(&buf[..n]));
                            if request.contains("\r\n\r\n") {
                                break;
                            }
                        }
                        Err(_) => return,
                    }
                }

                let path = request
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .to_string();

                let response = if path == "/topstories.json" {
                    http_response("application/json", "[1]")
                } else if path == "/item/1.json" {
                    let story = serde_json::json!({
                        "id": 1,
                        "title": "Quiet Launch",
                        "url": article_url,
                        "by": "someone",
                        "time": 1700000000,
                        "score": 350,
                        "descendants": 42,
                    });
                    http_response("application/json", &story.to_string())
                } else {
                    let html = format!(
                        "<html><head><title>Quiet Launch Day</title></head><body><p>{}</p></body></html>",
                        ARTICLE_PARAGRAPH
                    );
                    http_response("text/html", &html)
                };

                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });

    base
}

fn test_config() -> Config {
    Config {
        story_limit: 5,
        max_concurrent_summaries: 2,
        max_retries: 3,
        summary_cache_size: 100,
        summary_expiry_days: 30,
        extraction_timeout_secs: 5,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_end_to_end_summarization() {
    let base = spawn_server().await;

    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let summarizer = Arc::new(FixedSummarizer {
        calls: AtomicUsize::new(0),
    });

    let pipeline = Pipeline::assemble(
        StoryFeedClient::with_base_url(&base),
        ContentExtractor::new(Arc::new(HttpFetcher::new())),
        summarizer.clone(),
        store,
        &test_config(),
    );

    let cards = pipeline.run().await.unwrap();
    assert_eq!(cards.len(), 1);

    // A sparse page with one substantial paragraph goes through the
    // fallback strategy.
    let extraction = cards[0].extraction.as_ref().unwrap();
    assert!(extraction.success, "error: {:?}", extraction.error);
    assert_eq!(extraction.extraction_method, ExtractionMethod::Fallback);
    assert_eq!(extraction.title, "Quiet Launch Day");
    assert_eq!(extraction.content, ARTICLE_PARAGRAPH);

    // Score 350 maps to high priority and the item completed.
    let item = cards[0].queue_item.as_ref().unwrap();
    assert_eq!(item.status, ItemStatus::Completed);
    assert_eq!(item.request.priority, Priority::High);
    let response = item.response.as_ref().unwrap();
    assert_eq!(response.summary, SUMMARY_TEXT);
    assert!(!response.cached);

    // The summary is now retrievable under the deterministic content hash.
    let hash = content_hash(&extraction.title, &extraction.content);
    let cached = pipeline.summary_cache().get(&hash).await.unwrap();
    assert_eq!(cached.summary, SUMMARY_TEXT);
    assert!(cached.cached);

    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);

    // A second identical pass is served entirely from the caches.
    let cards = pipeline.run().await.unwrap();
    let item = cards[0].queue_item.as_ref().unwrap();
    assert_eq!(item.status, ItemStatus::Completed);
    assert!(item.response.as_ref().unwrap().cached);
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
}
