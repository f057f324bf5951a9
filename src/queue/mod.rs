mod runner;

pub use runner::{QueueConfig, SummaryQueue};
