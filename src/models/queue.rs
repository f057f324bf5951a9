use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::summary::SummaryResponse;

/// Priority classes order low-to-high numerically: High sorts before Normal
/// sorts before Low.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// The summarization work a queue item carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRequest {
    pub content: String,
    pub title: String,
    pub url: String,
    pub priority: Priority,
}

/// One unit of summarization work, retained after completion for history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub request: SummaryRequest,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub response: Option<SummaryResponse>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
}

/// Snapshot handed to progress subscribers after every state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub currently_processing: usize,
    pub estimated_time_remaining_secs: Option<f64>,
}

/// Driver state persisted alongside the queue itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueState {
    pub is_processing: bool,
    pub current_processing: Vec<String>,
    pub total_processed: u64,
    pub total_failed: u64,
    pub last_processed_at: Option<DateTime<Utc>>,
}
