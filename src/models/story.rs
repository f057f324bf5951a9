use serde::{Deserialize, Serialize};

/// A story record from the public news feed.
///
/// Only `url` (optional) and enough metadata to form a job key are required
/// downstream; the rest is kept for display and priority hints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: i64,
    pub title: String,
    pub url: Option<String>,
    #[serde(default)]
    pub by: Option<String>,
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub descendants: Option<i64>,
}
