pub mod config;
pub mod document;
pub mod indexer;
pub mod ranking;
pub mod search;

pub use config::Config;
pub use document::{ClickEvent, PageDocument};
