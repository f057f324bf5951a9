use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the summarization call hands back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
    pub tokens_used: u32,
    pub cost: f64,
    pub confidence: f64,
    #[serde(default)]
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryMetadata {
    pub quality_score: f64,
    pub extracted_date: DateTime<Utc>,
}

/// Persisted summary, keyed by a hash of the article text itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub content_hash: String,
    pub summary: SummaryResponse,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub metadata: SummaryMetadata,
    pub schema_version: String,
}
