//! State module for tracking crawl progress
//!
//! - `CrawlState`: the lifecycle of a single crawl run

mod crawl_state;

pub use crawl_state::CrawlState;
