//! Admission policy for discovered addresses
//!
//! The orchestrator asks a [`UrlPolicy`] whether each candidate may be
//! crawled and whether it lies outside the crawled site.

mod rules;

pub use rules::CrawlerRules;

use crate::crawler::CrawlStep;
use async_trait::async_trait;
use url::Url;

/// Decides which addresses are admitted to the crawl
#[async_trait]
pub trait UrlPolicy: Send + Sync {
    /// Returns false to reject `url`; a rejected seed stops the crawl
    async fn is_allowed(&self, url: &Url, referrer: Option<&CrawlStep>) -> bool;

    /// Returns true when `url` lies outside the crawled site
    fn is_external(&self, url: &Url) -> bool;
}

/// Admits every address and treats none as external
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl UrlPolicy for AllowAll {
    async fn is_allowed(&self, _url: &Url, _referrer: Option<&CrawlStep>) -> bool {
        true
    }

    fn is_external(&self, _url: &Url) -> bool {
        false
    }
}
