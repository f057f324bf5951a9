use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use regex::Regex;
use reqwest::header::USER_AGENT;
use reqwest::Client;

use crate::cache::CacheStore;
use crate::error::{AppError, Result};
use crate::models::{ExtractOptions, ExtractedContent, ExtractionMethod};

use super::url::analyze_url;
use super::validator::ContentValidator;

const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const CACHE_CAPACITY: usize = 500;
const FETCH_ATTEMPTS: u32 = 2;

/// Rotated per attempt for basic anti-blocking variety.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (Version/17.4 Safari/605.1.15)",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0",
];

/// Raw HTTP fetch collaborator. A seam so tests can stub the network.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str, user_agent: &str, timeout: Duration) -> Result<String>;
}

/// Default reqwest-backed fetcher.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str, user_agent: &str, timeout: Duration) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .timeout(timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Extraction(format!(
                "HTTP {} fetching {}",
                response.status(),
                url
            )));
        }

        Ok(response.text().await?)
    }
}

struct Patterns {
    og_title: Regex,
    twitter_title: Regex,
    title_tag: Regex,
    og_description: Regex,
    twitter_description: Regex,
    meta_description: Regex,
    og_site_name: Regex,
    meta_author: Regex,
    strip_blocks: Regex,
    article: Regex,
    content_class: Regex,
    main_tag: Regex,
    story_class: Regex,
    paragraph: Regex,
    tag: Regex,
    numeric_entity: Regex,
}

impl Patterns {
    fn new() -> Self {
        let meta = |attr: &str, value: &str| {
            // Matches both attribute orders: property-then-content and
            // content-then-property.
            Regex::new(&format!(
                r#"(?is)<meta[^>]*{attr}=["']{value}["'][^>]*content=["']([^"']*)["']|<meta[^>]*content=["']([^"']*)["'][^>]*{attr}=["']{value}["']"#
            ))
            .expect("meta regex")
        };

        Self {
            og_title: meta("property", "og:title"),
            twitter_title: meta("name", "twitter:title"),
            title_tag: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title regex"),
            og_description: meta("property", "og:description"),
            twitter_description: meta("name", "twitter:description"),
            meta_description: meta("name", "description"),
            og_site_name: meta("property", "og:site_name"),
            meta_author: meta("name", "author"),
            strip_blocks: Regex::new(
                r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>|<nav[^>]*>.*?</nav>|<footer[^>]*>.*?</footer>|<aside[^>]*>.*?</aside>",
            )
            .expect("strip regex"),
            article: Regex::new(r"(?is)<article[^>]*>(.*?)</article>").expect("article regex"),
            content_class: Regex::new(
                r#"(?is)<(?:div|section)[^>]*class=["'][^"']*(?:content|post|article|entry)[^"']*["'][^>]*>(.*?)</(?:div|section)>"#,
            )
            .expect("content class regex"),
            main_tag: Regex::new(r"(?is)<main[^>]*>(.*?)</main>").expect("main regex"),
            story_class: Regex::new(
                r#"(?is)<(?:div|section)[^>]*class=["'][^"']*story[^"']*["'][^>]*>(.*?)</(?:div|section)>"#,
            )
            .expect("story class regex"),
            paragraph: Regex::new(r"(?is)<p[^>]*>(.*?)</p>").expect("paragraph regex"),
            tag: Regex::new(r"(?s)<[^>]+>").expect("tag regex"),
            numeric_entity: Regex::new(r"&#(x?[0-9a-fA-F]+);").expect("entity regex"),
        }
    }

    fn meta_value(&self, re: &Regex, html: &str) -> Option<String> {
        re.captures(html).and_then(|cap| {
            cap.get(1)
                .or_else(|| cap.get(2))
                .map(|m| m.as_str().trim().to_string())
        })
    }
}

/// Best-effort conversion of an arbitrary URL into readable article text.
///
/// A prioritized cascade of pattern-matching strategies, each gated by the
/// content validator; results (including terminal failures) are cached per
/// URL so repeated failures are not refetched within the TTL window.
pub struct ContentExtractor {
    fetcher: Arc<dyn Fetch>,
    validator: ContentValidator,
    patterns: Patterns,
    cache: CacheStore<String, ExtractedContent>,
}

impl ContentExtractor {
    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            fetcher,
            validator: ContentValidator::new(),
            patterns: Patterns::new(),
            cache: CacheStore::new(CACHE_TTL, CACHE_CAPACITY),
        }
    }

    pub async fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats().await
    }

    pub async fn extract(&self, url: &str, options: &ExtractOptions) -> ExtractedContent {
        if let Some(cached) = self.cache.get(&url.to_string()).await {
            tracing::debug!("Extraction cache hit for {}", url);
            return cached;
        }

        let result = self.extract_uncached(url, options).await;
        self.cache.set(url.to_string(), result.clone(), None).await;
        result
    }

    async fn extract_uncached(&self, url: &str, options: &ExtractOptions) -> ExtractedContent {
        let analysis = analyze_url(url);
        if !analysis.is_extractable {
            return ExtractedContent::failure(url, "URL type not supported for extraction");
        }

        let mut last_error: Option<String> = None;
        // One page download shared across strategies; refetched only if a
        // previous attempt failed.
        let mut html: Option<String> = None;

        for method in [
            ExtractionMethod::Metadata,
            ExtractionMethod::Basic,
            ExtractionMethod::Fallback,
        ] {
            if html.is_none() {
                match self.fetch_with_retry(url, options).await {
                    Ok(body) => html = Some(body),
                    Err(e) => {
                        tracing::debug!("Fetch failed for {}: {}", url, e);
                        last_error = Some(e.to_string());
                        continue;
                    }
                }
            }
            let body = html.as_deref().unwrap_or_default();

            let attempt = match method {
                ExtractionMethod::Metadata => self.extract_metadata(body, url),
                ExtractionMethod::Basic => self.extract_basic(body, url, options),
                ExtractionMethod::Fallback => self.extract_fallback(body, url),
                ExtractionMethod::Failed => unreachable!(),
            };

            match attempt {
                Ok(result) if result.success => return result,
                Ok(result) => {
                    // Fallback always yields a result object; return its
                    // stub only once the cascade is exhausted.
                    if method == ExtractionMethod::Fallback {
                        return result;
                    }
                }
                Err(e) => {
                    tracing::debug!("{:?} extraction failed for {}: {}", method, url, e);
                    last_error = Some(e.to_string());
                }
            }
        }

        ExtractedContent::failure(
            url,
            last_error.unwrap_or_else(|| "all extraction strategies failed".to_string()),
        )
    }

    /// og/twitter/meta tags, first match wins in priority order. Accepted at
    /// a looser score bar than the general one since meta descriptions are
    /// inherently short.
    fn extract_metadata(&self, html: &str, url: &str) -> Result<ExtractedContent> {
        let p = &self.patterns;

        let title = p
            .meta_value(&p.og_title, html)
            .or_else(|| p.meta_value(&p.twitter_title, html))
            .or_else(|| {
                p.title_tag
                    .captures(html)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().trim().to_string())
            })
            .map(|t| self.decode_entities(&t))
            .unwrap_or_default();

        let description = p
            .meta_value(&p.og_description, html)
            .or_else(|| p.meta_value(&p.twitter_description, html))
            .or_else(|| p.meta_value(&p.meta_description, html))
            .map(|d| self.decode_entities(&d))
            .unwrap_or_default();

        if description.chars().count() < 50 {
            return Err(AppError::Extraction(
                "metadata description missing or too short".to_string(),
            ));
        }

        let validation = self.validator.validate(&title, &description, url);
        if validation.score <= 30 {
            return Err(AppError::Extraction(format!(
                "metadata content rejected (score {})",
                validation.score
            )));
        }

        let word_count = description.split_whitespace().count();
        Ok(ExtractedContent {
            title,
            content: description,
            author: p.meta_value(&p.meta_author, html),
            site_name: p.meta_value(&p.og_site_name, html),
            url: url.to_string(),
            word_count,
            extraction_method: ExtractionMethod::Metadata,
            success: true,
            error: None,
        })
    }

    /// Structural extraction: strip noise blocks, then try known content
    /// containers in order, falling back to joining all paragraphs.
    fn extract_basic(
        &self,
        html: &str,
        url: &str,
        options: &ExtractOptions,
    ) -> Result<ExtractedContent> {
        let p = &self.patterns;
        let stripped = p.strip_blocks.replace_all(html, " ");

        let containers = [&p.article, &p.content_class, &p.main_tag, &p.story_class];

        let mut content = containers.iter().find_map(|re| {
            let inner = re.captures(&stripped)?.get(1)?.as_str();
            let text = self.to_text(inner);
            (text.chars().count() > options.min_content_length).then_some(text)
        });

        if content.is_none() {
            let joined: String = p
                .paragraph
                .captures_iter(&stripped)
                .filter_map(|cap| {
                    let text = self.to_text(cap.get(1)?.as_str());
                    (text.chars().count() > 20).then_some(text)
                })
                .collect::<Vec<_>>()
                .join("\n\n");
            if !joined.is_empty() {
                content = Some(truncate_chars(&joined, options.max_content_length));
            }
        }

        let content = content
            .ok_or_else(|| AppError::Extraction("no content containers found".to_string()))?;

        let title = p
            .title_tag
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| self.decode_entities(m.as_str().trim()))
            .unwrap_or_default();

        let validation = self.validator.validate(&title, &content, url);
        if !validation.is_valid {
            return Err(AppError::Extraction(format!(
                "structural content rejected (score {}, issues: {})",
                validation.score,
                validation.issues.join("; ")
            )));
        }

        Ok(ExtractedContent {
            title,
            content,
            author: None,
            site_name: None,
            url: url.to_string(),
            word_count: validation.word_count,
            extraction_method: ExtractionMethod::Basic,
            success: true,
            error: None,
        })
    }

    /// Last resort: page title plus the first substantial paragraph. Always
    /// produces a result object; success only when a paragraph was found.
    fn extract_fallback(&self, html: &str, url: &str) -> Result<ExtractedContent> {
        let p = &self.patterns;

        let title = p
            .title_tag
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| self.decode_entities(m.as_str().trim()))
            .unwrap_or_else(|| "Untitled".to_string());

        let first_paragraph = p.paragraph.captures_iter(html).find_map(|cap| {
            let text = self.to_text(cap.get(1)?.as_str());
            (text.chars().count() > 50).then_some(text)
        });

        match first_paragraph {
            Some(content) => {
                let word_count = content.split_whitespace().count();
                Ok(ExtractedContent {
                    title,
                    content,
                    author: None,
                    site_name: None,
                    url: url.to_string(),
                    word_count,
                    extraction_method: ExtractionMethod::Fallback,
                    success: true,
                    error: None,
                })
            }
            None => Ok(ExtractedContent {
                title,
                content: format!("Content could not be extracted. View the original at {}", url),
                author: None,
                site_name: None,
                url: url.to_string(),
                word_count: 0,
                extraction_method: ExtractionMethod::Fallback,
                success: false,
                error: Some("no readable paragraph found".to_string()),
            }),
        }
    }

    async fn fetch_with_retry(&self, url: &str, options: &ExtractOptions) -> Result<String> {
        let timeout = Duration::from_secs(options.timeout_secs);
        let mut last_error = None;

        for attempt in 0..FETCH_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(attempt as u64 * 1000)).await;
            }

            let user_agent = options.user_agent.clone().unwrap_or_else(|| {
                USER_AGENTS
                    .choose(&mut rand::thread_rng())
                    .copied()
                    .unwrap_or(USER_AGENTS[0])
                    .to_string()
            });

            match tokio::time::timeout(timeout, self.fetcher.fetch(url, &user_agent, timeout))
                .await
            {
                Ok(Ok(body)) => return Ok(body),
                Ok(Err(e)) => {
                    tracing::debug!("Fetch attempt {} failed for {}: {}", attempt + 1, url, e);
                    last_error = Some(e);
                }
                Err(_) => {
                    tracing::debug!("Fetch attempt {} timed out for {}", attempt + 1, url);
                    last_error = Some(AppError::Extraction(format!(
                        "timed out after {}s",
                        options.timeout_secs
                    )));
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AppError::Extraction("fetch failed with no attempts".to_string())))
    }

    fn to_text(&self, html: &str) -> String {
        let no_tags = self.patterns.tag.replace_all(html, " ");
        let decoded = self.decode_entities(&no_tags);
        decoded.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn decode_entities(&self, text: &str) -> String {
        let text = text
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&apos;", "'")
            .replace("&nbsp;", " ");

        self.patterns
            .numeric_entity
            .replace_all(&text, |caps: &regex::Captures| {
                let code = &caps[1];
                let parsed = if let Some(hex) = code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                    u32::from_str_radix(hex, 16).ok()
                } else {
                    code.parse::<u32>().ok()
                };
                parsed
                    .and_then(char::from_u32)
                    .map(|c| c.to_string())
                    .unwrap_or_default()
            })
            .into_owned()
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
