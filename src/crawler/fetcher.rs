//! HTTP downloader implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with the configured user agent and cookie store
//! - Per-attempt deadlines on the response head and on every body read
//! - Fixed-count retries for network failures
//! - Size-bounded, progress-reporting body streaming with spill to disk

use crate::config::DownloadConfig;
use crate::crawler::context::{Content, PropertyBag};
use crate::crawler::downloader::{DownloadError, DownloadMethod, Downloader, DownloaderFactory};
use crate::crawler::step::CrawlStep;
use crate::crawler::stream::{copy_with_progress, CopyLimits, SpillBuffer};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{CONTENT_TYPE, REFERER};
use reqwest::Client;
use std::io;
use std::time::Duration;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The download configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use ripple_crawl::config::DownloadConfig;
/// use ripple_crawl::crawler::build_http_client;
///
/// let client = build_http_client(&DownloadConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &DownloadConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(config.connect_timeout())
        .cookie_store(config.use_cookies)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Downloader settings derived from [`DownloadConfig`]
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub read_timeout: Duration,
    pub retry_count: u32,
    pub retry_wait: Duration,
    pub max_size_in_ram: usize,
    pub limits: CopyLimits,
}

impl From<&DownloadConfig> for DownloadSettings {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            read_timeout: config.read_timeout(),
            retry_count: config.retry_count,
            retry_wait: config.retry_wait(),
            max_size_in_ram: config.max_size_in_ram,
            limits: CopyLimits {
                buffer_size: config.buffer_size,
                max_bytes: config.max_content_size,
                read_timeout: Some(config.read_timeout()),
            },
        }
    }
}

/// Downloads pages over HTTP with reqwest
#[derive(Debug, Clone)]
pub struct WebDownloader {
    client: Client,
    settings: DownloadSettings,
}

impl WebDownloader {
    pub fn new(client: Client, settings: DownloadSettings) -> Self {
        Self { client, settings }
    }

    /// One request/response cycle without retries
    async fn attempt(
        &self,
        step: &CrawlStep,
        referrer: Option<&CrawlStep>,
        method: DownloadMethod,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<PropertyBag, DownloadError> {
        let url = &step.url;
        let mut request = self.client.request(method.into(), url.clone());
        if let Some(referrer) = referrer {
            request = request.header(REFERER, referrer.url.as_str());
        }

        let response = tokio::time::timeout(self.settings.read_timeout, request.send())
            .await
            .map_err(|_| DownloadError::Timeout {
                url: url.clone(),
                after: self.settings.read_timeout,
            })?
            .map_err(|source| DownloadError::Request {
                url: url.clone(),
                source,
            })?;

        let mut bag = PropertyBag::new(step.clone(), response.status());
        bag.response_url = response.url().clone();
        bag.headers = response.headers().clone();
        bag.content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if method == DownloadMethod::Head {
            return Ok(bag);
        }

        let body = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        let mut reader = Box::pin(body).into_async_read();
        let mut sink = SpillBuffer::new(self.settings.max_size_in_ram);

        copy_with_progress(&mut reader, &mut sink, &self.settings.limits, progress)
            .await
            .map_err(|source| body_error(url, source, self.settings.read_timeout))?;

        bag.content = sink
            .into_content()
            .map_err(|source| DownloadError::Body {
                url: url.clone(),
                source,
            })?;

        Ok(bag)
    }
}

fn body_error(url: &url::Url, source: io::Error, read_timeout: Duration) -> DownloadError {
    if source.kind() == io::ErrorKind::TimedOut {
        DownloadError::Timeout {
            url: url.clone(),
            after: read_timeout,
        }
    } else {
        DownloadError::Body {
            url: url.clone(),
            source,
        }
    }
}

#[async_trait]
impl Downloader for WebDownloader {
    /// Fetches a step, retrying network failures
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Any HTTP status | Returned as a page, never retried |
    /// | Connect/read error or timeout | Retried `retry_count` times, waiting `retry_wait` |
    /// | Attempts exhausted | `DownloadError::RetriesExhausted` |
    async fn download(
        &self,
        step: &CrawlStep,
        referrer: Option<&CrawlStep>,
        method: DownloadMethod,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<PropertyBag, DownloadError> {
        let attempts = self.settings.retry_count + 1;
        let mut attempt = 1;

        loop {
            match self.attempt(step, referrer, method, progress).await {
                Ok(bag) => return Ok(bag),
                Err(e) if attempt < attempts => {
                    tracing::debug!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt,
                        attempts,
                        step.url,
                        e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.settings.retry_wait).await;
                }
                Err(e) if attempts > 1 => {
                    return Err(DownloadError::RetriesExhausted {
                        url: step.url.clone(),
                        attempts,
                        source: Box::new(e),
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Hands out [`WebDownloader`]s sharing one connection pool
#[derive(Debug, Clone)]
pub struct WebDownloaderFactory {
    downloader: WebDownloader,
}

impl WebDownloaderFactory {
    pub fn new(client: Client, config: &DownloadConfig) -> Self {
        Self {
            downloader: WebDownloader::new(client, DownloadSettings::from(config)),
        }
    }
}

impl DownloaderFactory for WebDownloaderFactory {
    fn create(&self) -> Box<dyn Downloader> {
        Box::new(self.downloader.clone())
    }
}
