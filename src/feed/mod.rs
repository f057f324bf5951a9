mod client;

pub use client::StoryFeedClient;
