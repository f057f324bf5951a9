use serde::{Deserialize, Serialize};

/// Which extraction strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Metadata,
    Basic,
    Fallback,
    Failed,
}

/// Result of one extraction attempt. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub site_name: Option<String>,
    pub url: String,
    pub word_count: usize,
    pub extraction_method: ExtractionMethod,
    pub success: bool,
    pub error: Option<String>,
}

impl ExtractedContent {
    pub fn failure(url: &str, error: impl Into<String>) -> Self {
        Self {
            title: String::new(),
            content: String::new(),
            author: None,
            site_name: None,
            url: url.to_string(),
            word_count: 0,
            extraction_method: ExtractionMethod::Failed,
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlKind {
    Article,
    Github,
    Pdf,
    Video,
    Social,
    Academic,
    Documentation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Impossible,
}

/// Classification of a candidate URL. Pure function of the URL string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlAnalysis {
    pub kind: UrlKind,
    pub domain: String,
    pub is_extractable: bool,
    pub requires_special_handling: bool,
    pub estimated_difficulty: Difficulty,
}

/// Tuning knobs for a single extraction call.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub timeout_secs: u64,
    pub min_content_length: usize,
    pub max_content_length: usize,
    pub user_agent: Option<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            min_content_length: 200,
            max_content_length: 20_000,
            user_agent: None,
        }
    }
}
