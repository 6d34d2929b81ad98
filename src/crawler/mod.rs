//! Crawler module for crawl orchestration
//!
//! This module contains the core crawling logic, including:
//! - Admission of discovered addresses and the work queue
//! - HTTP downloading with retries and bounded streaming
//! - The per-page processing pipeline and HTML link extraction
//! - Overall crawl coordination and lifecycle events

pub mod context;
mod coordinator;
mod downloader;
mod events;
mod fetcher;
mod history;
mod parser;
mod pipeline;
mod queue;
mod scheduler;
mod step;
mod stream;

pub use context::{Content, Properties, PropertyBag, PropertyValue};
pub use coordinator::{Crawler, CrawlerBuilder};
pub use downloader::{DownloadError, DownloadMethod, Downloader, DownloaderFactory};
pub use events::{CrawlListener, EventHub};
pub use fetcher::{build_http_client, DownloadSettings, WebDownloader, WebDownloaderFactory};
pub use history::{CrawlHistory, InMemoryHistory};
pub use parser::{
    parse_html, HtmlDocumentProcessor, ParsedLink, ParsedPage, META, ORIGINAL_REFERRER_URL,
    ORIGINAL_URL,
};
pub use pipeline::{run_step, Pipeline, PipelineReport, PipelineStep, StepFault, StepOutcome, WithTimeout};
pub use queue::{CrawlQueue, InMemoryQueue};
pub use scheduler::ConcurrencyGate;
pub use step::{CrawlStep, QueueEntry};
pub use stream::{copy_with_progress, CopyLimits, SpillBuffer};
