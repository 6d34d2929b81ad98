//! Output module for crawl summaries
//!
//! This module handles:
//! - Recording the counters a finished run reports
//! - Rendering them for the command line

pub mod stats;

pub use stats::{format_statistics, print_statistics, CrawlStats};
