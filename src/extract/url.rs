use url::Url;

use crate::models::{Difficulty, UrlAnalysis, UrlKind};

/// Classifies a candidate URL by domain and path patterns. Pure function;
/// never touches the network.
pub fn analyze_url(raw: &str) -> UrlAnalysis {
    let lower = raw.trim().to_lowercase();

    // Non-fetchable schemes short-circuit the whole pipeline.
    if lower.starts_with("data:") || lower.starts_with("javascript:") || lower.starts_with("mailto:")
    {
        return UrlAnalysis {
            kind: UrlKind::Unknown,
            domain: String::new(),
            is_extractable: false,
            requires_special_handling: false,
            estimated_difficulty: Difficulty::Impossible,
        };
    }

    let parsed = Url::parse(raw);
    let (domain, path) = match &parsed {
        Ok(u) => (
            u.host_str().unwrap_or_default().to_lowercase(),
            u.path().to_lowercase(),
        ),
        Err(_) => {
            return UrlAnalysis {
                kind: UrlKind::Unknown,
                domain: String::new(),
                is_extractable: false,
                requires_special_handling: false,
                estimated_difficulty: Difficulty::Impossible,
            }
        }
    };

    let host = domain.trim_start_matches("www.");

    let (kind, difficulty, special) = if host == "github.com" {
        (UrlKind::Github, Difficulty::Medium, true)
    } else if host == "youtube.com" || host == "youtu.be" {
        (UrlKind::Video, Difficulty::Hard, true)
    } else if path.ends_with(".pdf") {
        (UrlKind::Pdf, Difficulty::Hard, true)
    } else if host == "twitter.com" || host == "linkedin.com" {
        (UrlKind::Social, Difficulty::Hard, true)
    } else if host == "arxiv.org" || host == "doi.org" {
        (UrlKind::Academic, Difficulty::Medium, true)
    } else if host.starts_with("docs.") || path.contains("/docs/") {
        (UrlKind::Documentation, Difficulty::Easy, false)
    } else {
        (UrlKind::Article, Difficulty::Easy, false)
    };

    UrlAnalysis {
        kind,
        domain,
        is_extractable: true,
        requires_special_handling: special,
        estimated_difficulty: difficulty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_default() {
        let a = analyze_url("https://example.com/some-story");
        assert_eq!(a.kind, UrlKind::Article);
        assert_eq!(a.estimated_difficulty, Difficulty::Easy);
        assert!(a.is_extractable);
        assert_eq!(a.domain, "example.com");
    }

    #[test]
    fn test_known_domains() {
        assert_eq!(analyze_url("https://github.com/rust-lang/rust").kind, UrlKind::Github);
        assert_eq!(analyze_url("https://youtu.be/abc123").kind, UrlKind::Video);
        assert_eq!(analyze_url("https://www.youtube.com/watch?v=1").kind, UrlKind::Video);
        assert_eq!(analyze_url("https://twitter.com/someone/status/1").kind, UrlKind::Social);
        assert_eq!(analyze_url("https://arxiv.org/abs/2401.00001").kind, UrlKind::Academic);
    }

    #[test]
    fn test_pdf_by_path() {
        let a = analyze_url("https://example.com/papers/report.pdf");
        assert_eq!(a.kind, UrlKind::Pdf);
        assert_eq!(a.estimated_difficulty, Difficulty::Hard);
    }

    #[test]
    fn test_documentation() {
        assert_eq!(analyze_url("https://docs.rs/tokio").kind, UrlKind::Documentation);
        assert_eq!(
            analyze_url("https://example.com/docs/getting-started").kind,
            UrlKind::Documentation
        );
    }

    #[test]
    fn test_impossible_schemes() {
        for url in ["javascript:alert(1)", "data:text/html,<p>x</p>", "mailto:a@b.com"] {
            let a = analyze_url(url);
            assert!(!a.is_extractable);
            assert_eq!(a.estimated_difficulty, Difficulty::Impossible);
        }
    }

    #[test]
    fn test_unparseable_url() {
        let a = analyze_url("not a url at all");
        assert!(!a.is_extractable);
    }
}
