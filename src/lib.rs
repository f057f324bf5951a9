pub mod ai;
pub mod app;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod feed;
pub mod models;
pub mod queue;
pub mod storage;
