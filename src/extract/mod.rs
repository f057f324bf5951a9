mod engine;
mod url;
mod validator;

pub use engine::{ContentExtractor, Fetch, HttpFetcher};
pub use url::analyze_url;
pub use validator::{ContentValidator, ValidationResult};
