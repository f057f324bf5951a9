use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Priority, SummaryResponse};

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const CLAUDE_MODEL: &str = "claude-3-5-haiku-20241022";

const MAX_CONTENT_CHARS: usize = 10_000;

// Per-token rates for the configured model.
const INPUT_COST_PER_TOKEN: f64 = 0.80 / 1_000_000.0;
const OUTPUT_COST_PER_TOKEN: f64 = 4.00 / 1_000_000.0;

/// Phrases that mark a refusal rather than a summary; such a response is a
/// failed attempt, not a cacheable result.
const REFUSAL_PATTERNS: &[&str] = &[
    "i cannot summarize",
    "i can't summarize",
    "i'm sorry, but",
    "i am unable to",
    "i'm not able to",
    "as an ai",
];

/// The external summarization collaborator the queue drives.
#[async_trait]
pub trait Summarize: Send + Sync {
    async fn summarize(
        &self,
        content: &str,
        title: &str,
        priority: Priority,
    ) -> Result<SummaryResponse>;
}

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

pub struct ClaudeSummarizer {
    client: Client,
    api_key: String,
}

impl ClaudeSummarizer {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");
        Self { client, api_key }
    }

    pub fn model_version(&self) -> &'static str {
        CLAUDE_MODEL
    }

    fn max_tokens_for(priority: Priority) -> u32 {
        match priority {
            Priority::High => 1024,
            Priority::Normal => 768,
            Priority::Low => 512,
        }
    }
}

#[async_trait]
impl Summarize for ClaudeSummarizer {
    async fn summarize(
        &self,
        content: &str,
        title: &str,
        priority: Priority,
    ) -> Result<SummaryResponse> {
        let system_prompt = r#"You are a helpful assistant that summarizes news articles.
Provide a concise, informative summary in 2-3 paragraphs.
Focus on the key facts, main arguments, and important conclusions.
Use clear, accessible language."#;

        let truncated = content.chars().count() > MAX_CONTENT_CHARS;
        let content: String = content.chars().take(MAX_CONTENT_CHARS).collect();

        let user_message = format!(
            "Please summarize the following article:\n\nTitle: {}\n\nContent:\n{}",
            title, content
        );

        let request = MessageRequest {
            model: CLAUDE_MODEL.to_string(),
            max_tokens: Self::max_tokens_for(priority),
            messages: vec![Message {
                role: "user".to_string(),
                content: user_message,
            }],
            system: Some(system_prompt.to_string()),
        };

        let response = self
            .client
            .post(CLAUDE_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AppError::ClaudeApi(format!("API error: {}", error_text)));
        }

        let message_response: MessageResponse = response.json().await?;

        let summary = message_response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        if summary.trim().is_empty() {
            return Err(AppError::ClaudeApi("empty summary returned".to_string()));
        }

        let lowered = summary.to_lowercase();
        if REFUSAL_PATTERNS.iter().any(|p| lowered.contains(p)) {
            return Err(AppError::ClaudeApi(
                "model refused to summarize".to_string(),
            ));
        }

        let usage = message_response.usage.unwrap_or_default();
        let tokens_used = usage.input_tokens + usage.output_tokens;
        let cost = usage.input_tokens as f64 * INPUT_COST_PER_TOKEN
            + usage.output_tokens as f64 * OUTPUT_COST_PER_TOKEN;

        Ok(SummaryResponse {
            summary,
            tokens_used,
            cost,
            confidence: if truncated { 0.7 } else { 0.9 },
            cached: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_tokens_scale_with_priority() {
        assert!(
            ClaudeSummarizer::max_tokens_for(Priority::High)
                > ClaudeSummarizer::max_tokens_for(Priority::Normal)
        );
        assert!(
            ClaudeSummarizer::max_tokens_for(Priority::Normal)
                > ClaudeSummarizer::max_tokens_for(Priority::Low)
        );
    }

    #[test]
    fn test_refusal_patterns_are_lowercase() {
        // Matching is done against the lowercased summary.
        for p in REFUSAL_PATTERNS {
            assert_eq!(*p, p.to_lowercase());
        }
    }
}
