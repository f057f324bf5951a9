use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    pub claude_api_key: Option<String>,

    #[serde(default = "default_story_limit")]
    pub story_limit: usize,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_summaries: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_summary_cache_size")]
    pub summary_cache_size: usize,

    #[serde(default = "default_summary_expiry_days")]
    pub summary_expiry_days: i64,

    #[serde(default = "default_extraction_timeout")]
    pub extraction_timeout_secs: u64,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("newsbrief");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("newsbrief.db").to_string_lossy().to_string()
}

fn default_story_limit() -> usize {
    30
}

fn default_max_concurrent() -> usize {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_summary_cache_size() -> usize {
    500
}

fn default_summary_expiry_days() -> i64 {
    30
}

fn default_extraction_timeout() -> u64 {
    15
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            claude_api_key: None,
            story_limit: default_story_limit(),
            max_concurrent_summaries: default_max_concurrent(),
            max_retries: default_max_retries(),
            summary_cache_size: default_summary_cache_size(),
            summary_expiry_days: default_summary_expiry_days(),
            extraction_timeout_secs: default_extraction_timeout(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("newsbrief")
            .join("config.toml")
    }
}
