mod content;
mod queue;
mod story;
mod summary;

pub use content::{
    Difficulty, ExtractOptions, ExtractedContent, ExtractionMethod, UrlAnalysis, UrlKind,
};
pub use queue::{ItemStatus, Priority, QueueItem, QueueProgress, QueueState, SummaryRequest};
pub use story::Story;
pub use summary::{SummaryMetadata, SummaryRecord, SummaryResponse};
