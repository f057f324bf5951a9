mod summarizer;

pub use summarizer::{ClaudeSummarizer, Summarize};
