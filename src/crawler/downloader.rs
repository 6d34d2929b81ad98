//! Downloader abstraction
//!
//! The orchestrator asks a [`DownloaderFactory`] for a fresh downloader per
//! fetch and treats any `Err` it returns as a terminal download fault.

use crate::crawler::context::PropertyBag;
use crate::crawler::step::CrawlStep;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// HTTP method used for a download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadMethod {
    #[default]
    Get,
    /// Headers only; the content is left empty
    Head,
}

impl From<DownloadMethod> for reqwest::Method {
    fn from(method: DownloadMethod) -> Self {
        match method {
            DownloadMethod::Get => reqwest::Method::GET,
            DownloadMethod::Head => reqwest::Method::HEAD,
        }
    }
}

/// Terminal failure of a download
///
/// Non-success HTTP statuses are not faults; they arrive as a normal
/// [`PropertyBag`] with the status set.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Request to {url} failed: {source}")]
    Request { url: Url, source: reqwest::Error },

    #[error("Request to {url} timed out after {after:?}")]
    Timeout { url: Url, after: Duration },

    #[error("Failed to read body of {url}: {source}")]
    Body { url: Url, source: std::io::Error },

    #[error("Download of {url} failed: {reason}")]
    Failed { url: Url, reason: String },

    #[error("Giving up on {url} after {attempts} attempts: {source}")]
    RetriesExhausted {
        url: Url,
        attempts: u32,
        source: Box<DownloadError>,
    },
}

impl DownloadError {
    /// The address whose download failed
    pub fn url(&self) -> &Url {
        match self {
            Self::Request { url, .. }
            | Self::Timeout { url, .. }
            | Self::Body { url, .. }
            | Self::Failed { url, .. }
            | Self::RetriesExhausted { url, .. } => url,
        }
    }
}

/// Fetches one step and produces its page context
///
/// `progress` receives the cumulative number of body bytes read.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(
        &self,
        step: &CrawlStep,
        referrer: Option<&CrawlStep>,
        method: DownloadMethod,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<PropertyBag, DownloadError>;
}

/// Produces one configured downloader per fetch
pub trait DownloaderFactory: Send + Sync {
    fn create(&self) -> Box<dyn Downloader>;
}

impl<F> DownloaderFactory for F
where
    F: Fn() -> Box<dyn Downloader> + Send + Sync,
{
    fn create(&self) -> Box<dyn Downloader> {
        self()
    }
}
