use crate::url::{UrlComponent, UrlComponents};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Ripple-Crawl
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Address the crawl starts from
    #[serde(default)]
    pub seed: Option<String>,

    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub download: DownloadConfig,

    #[serde(default)]
    pub urls: UrlConfig,

    /// Durable queue and history; in-memory when absent
    #[serde(default)]
    pub storage: Option<StorageConfig>,
}

/// Crawl limits and admission behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum number of downloads in flight at once
    #[serde(rename = "max-concurrent-downloads")]
    pub max_concurrent_downloads: usize,

    /// Steps at or beyond this depth are rejected
    #[serde(rename = "max-depth")]
    pub max_depth: Option<u32>,

    /// Maximum number of downloads dispatched over the whole crawl
    #[serde(rename = "max-visited")]
    pub max_visited: Option<u64>,

    /// Wall-clock limit for the crawl (seconds)
    #[serde(rename = "max-crawl-time")]
    pub max_crawl_time_secs: Option<u64>,

    /// The crawl stops once download faults exceed this count
    #[serde(rename = "max-download-errors")]
    pub max_download_errors: Option<u64>,

    /// Consult robots.txt before admitting an address
    #[serde(rename = "adhere-to-robots")]
    pub adhere_to_robots: bool,

    /// Addresses longer than this are rejected
    #[serde(rename = "max-url-length")]
    pub max_url_length: Option<usize>,

    /// Hosts treated as part of the seed site (supports "*.example.com")
    #[serde(rename = "internal-domains")]
    pub internal_domains: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 1,
            max_depth: None,
            max_visited: None,
            max_crawl_time_secs: None,
            max_download_errors: None,
            adhere_to_robots: true,
            max_url_length: None,
            internal_domains: Vec::new(),
        }
    }
}

impl CrawlerConfig {
    pub fn max_crawl_time(&self) -> Option<Duration> {
        self.max_crawl_time_secs.map(Duration::from_secs)
    }
}

/// Downloader behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    #[serde(rename = "use-cookies")]
    pub use_cookies: bool,

    /// Bodies larger than this are spilled to a temporary file (bytes)
    #[serde(rename = "max-size-in-ram")]
    pub max_size_in_ram: usize,

    /// Bytes beyond this limit are not read (bytes)
    #[serde(rename = "max-content-size")]
    pub max_content_size: Option<u64>,

    /// Read chunk size, also the progress notification granularity (bytes)
    #[serde(rename = "buffer-size")]
    pub buffer_size: usize,

    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,

    /// Per-read deadline, applied to the response head and each body chunk
    #[serde(rename = "read-timeout-ms")]
    pub read_timeout_ms: u64,

    /// Additional attempts after a failed one
    #[serde(rename = "retry-count")]
    pub retry_count: u32,

    #[serde(rename = "retry-wait-ms")]
    pub retry_wait_ms: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("ripple-crawl/{}", env!("CARGO_PKG_VERSION")),
            use_cookies: true,
            max_size_in_ram: 1024 * 1024,
            max_content_size: None,
            buffer_size: 50 * 1024,
            connect_timeout_ms: 30_000,
            read_timeout_ms: 60_000,
            retry_count: 0,
            retry_wait_ms: 1_000,
        }
    }
}

impl DownloadConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }
}

/// Address normalization and filtering
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UrlConfig {
    /// Components that identify an address for duplicate detection
    pub sensitivity: Vec<UrlComponent>,

    /// Regular expressions; a match admits the address outright
    pub include: Vec<String>,

    /// Regular expressions; a match rejects the address
    pub exclude: Vec<String>,
}

impl Default for UrlConfig {
    fn default() -> Self {
        Self {
            sensitivity: UrlComponents::http_request_url().to_vec(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl UrlConfig {
    pub fn components(&self) -> UrlComponents {
        UrlComponents::from_components(&self.sensitivity)
    }
}

/// Durable storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: PathBuf,
}
