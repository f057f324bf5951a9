use regex::Regex;

const MIN_WORD_COUNT: usize = 100;
const MAX_WORD_COUNT: usize = 50_000;
const MIN_TITLE_LEN: usize = 10;
const MAX_TITLE_LEN: usize = 300;

/// Common English stop-words; real prose should have a healthy share.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "are", "was", "were", "be", "been", "it", "its", "this", "that", "these",
    "those", "not", "no", "he", "she", "they", "we", "you", "i", "his", "her", "their", "our",
];

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub score: u32,
    pub issues: Vec<String>,
    pub word_count: usize,
    pub readability_score: f64,
}

/// Stateless quality scoring for extracted text. Starts at 100 and applies
/// additive penalties; `is_valid` requires score >= 60 and fewer than three
/// issues.
pub struct ContentValidator {
    spam_re: Regex,
    boilerplate_re: Regex,
}

impl ContentValidator {
    pub fn new() -> Self {
        let spam_re = Regex::new(
            r"(?i)(casino|viagra|cialis|payday\s+loan|get\s+rich\s+quick|work\s+from\s+home\s+and\s+earn|crypto\s+giveaway|free\s+money|xxx|betting\s+tips)",
        )
        .expect("spam regex");
        let boilerplate_re = Regex::new(
            r"(?i)^\s*$|404\s+not\s+found|page\s+not\s+found|access\s+denied|loading\.{3}|please\s+enable\s+javascript|subscribe\s+to\s+continue\s+reading|this\s+content\s+is\s+unavailable",
        )
        .expect("boilerplate regex");
        Self {
            spam_re,
            boilerplate_re,
        }
    }

    pub fn validate(&self, title: &str, content: &str, _url: &str) -> ValidationResult {
        let mut score: i32 = 100;
        let mut issues = Vec::new();

        let words: Vec<&str> = content.split_whitespace().collect();
        let word_count = words.len();

        if word_count < MIN_WORD_COUNT {
            score -= 30;
            issues.push(format!("content too short ({} words)", word_count));
        } else if word_count > MAX_WORD_COUNT {
            score -= 10;
            issues.push(format!("content too long ({} words)", word_count));
        }

        let title_len = title.chars().count();
        if title_len < MIN_TITLE_LEN || title_len > MAX_TITLE_LEN {
            score -= 10;
            issues.push(format!("title length out of range ({} chars)", title_len));
        }

        if self.spam_re.is_match(content) || self.spam_re.is_match(title) {
            score -= 40;
            issues.push("spam keywords detected".to_string());
        }

        if self.boilerplate_re.is_match(content) {
            score -= 35;
            issues.push("boilerplate or error-page content".to_string());
        }

        let readability = readability_score(content);
        if readability < 30.0 {
            score -= 15;
            issues.push(format!("low readability ({:.0})", readability));
        }

        if non_alphanumeric_ratio(content) > 0.10 {
            score -= 10;
            issues.push("excessive non-alphanumeric characters".to_string());
        }

        if has_unbalanced_lines(content) {
            score -= 10;
            issues.push("unbalanced line structure".to_string());
        }

        if word_count > 0 && stop_word_ratio(&words) < 0.05 {
            score -= 5;
            issues.push("low stop-word ratio".to_string());
        }

        let score = score.clamp(0, 100) as u32;
        ValidationResult {
            // Too-short content is never valid on its own, no matter how
            // clean it otherwise scores.
            is_valid: score >= 60 && issues.len() < 3 && word_count >= MIN_WORD_COUNT,
            score,
            issues,
            word_count,
            readability_score: readability,
        }
    }
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Flesch-like reading ease: 206.835 - 1.015*(words/sentence) -
/// 84.6*(syllables/word), clamped to [0, 100].
fn readability_score(content: &str) -> f64 {
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }

    let sentences = content
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
        .max(1);

    let syllables: usize = words.iter().map(|w| count_syllables(w)).sum();

    let words_per_sentence = words.len() as f64 / sentences as f64;
    let syllables_per_word = syllables as f64 / words.len() as f64;

    (206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word).clamp(0.0, 100.0)
}

/// Vowel-group counting with a trailing-e correction. Close enough for a
/// readability estimate; not a dictionary.
fn count_syllables(word: &str) -> usize {
    let word: String = word
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_lowercase();
    if word.is_empty() {
        return 0;
    }

    let mut count = 0;
    let mut prev_vowel = false;
    for c in word.chars() {
        let is_vowel = matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if is_vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = is_vowel;
    }

    if word.ends_with('e') && count > 1 {
        count -= 1;
    }

    count.max(1)
}

fn non_alphanumeric_ratio(content: &str) -> f64 {
    let total = content.chars().filter(|c| !c.is_whitespace()).count();
    if total == 0 {
        return 0.0;
    }
    let non_alnum = content
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_alphanumeric())
        .count();
    non_alnum as f64 / total as f64
}

/// True when more than 40% of lines are shorter than 30% or longer than
/// 300% of the mean line length.
fn has_unbalanced_lines(content: &str) -> bool {
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() < 3 {
        return false;
    }

    let mean = lines.iter().map(|l| l.len()).sum::<usize>() as f64 / lines.len() as f64;
    let outliers = lines
        .iter()
        .filter(|l| {
            let len = l.len() as f64;
            len < mean * 0.3 || len > mean * 3.0
        })
        .count();

    outliers as f64 / lines.len() as f64 > 0.40
}

fn stop_word_ratio(words: &[&str]) -> f64 {
    let stop = words
        .iter()
        .filter(|w| {
            let w: String = w
                .chars()
                .filter(|c| c.is_ascii_alphabetic())
                .collect::<String>()
                .to_lowercase();
            STOP_WORDS.contains(&w.as_str())
        })
        .count();
    stop as f64 / words.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_content() -> String {
        // Plain English prose, ~150 words, short sentences.
        let sentence = "The quick brown fox jumps over the lazy dog near the old red barn. ";
        sentence.repeat(11)
    }

    #[test]
    fn test_short_content_is_invalid() {
        let v = ContentValidator::new();
        let result = v.validate("A perfectly fine title", "only a few words here", "https://x.com");
        assert!(!result.is_valid);
        assert!(result.word_count < 100);
    }

    #[test]
    fn test_well_formed_content_is_valid() {
        let v = ContentValidator::new();
        let result = v.validate("A perfectly fine title", &good_content(), "https://x.com");
        assert!(result.is_valid, "score={} issues={:?}", result.score, result.issues);
        assert!(result.score >= 60);
    }

    #[test]
    fn test_spam_penalty() {
        let v = ContentValidator::new();
        let spammy = format!("{} Visit our casino for free money now!", good_content());
        let result = v.validate("A perfectly fine title", &spammy, "https://x.com");
        assert!(result.score <= 60);
        assert!(result.issues.iter().any(|i| i.contains("spam")));
    }

    #[test]
    fn test_boilerplate_penalty() {
        let v = ContentValidator::new();
        let result = v.validate(
            "A perfectly fine title",
            "404 not found. The page you requested could not be located on this server at all.",
            "https://x.com",
        );
        assert!(!result.is_valid);
    }

    #[test]
    fn test_title_length_penalty() {
        let v = ContentValidator::new();
        let ok = v.validate("A perfectly fine title", &good_content(), "");
        let short = v.validate("Hi", &good_content(), "");
        assert!(short.score < ok.score);
    }

    #[test]
    fn test_syllable_counting() {
        assert_eq!(count_syllables("cat"), 1);
        assert_eq!(count_syllables("beautiful"), 3);
        // Trailing-e correction.
        assert_eq!(count_syllables("lane"), 1);
        assert_eq!(count_syllables("table"), 1);
        // Never below one.
        assert_eq!(count_syllables("e"), 1);
    }

    #[test]
    fn test_readability_clamped() {
        let r = readability_score(&good_content());
        assert!((0.0..=100.0).contains(&r));
    }
}
