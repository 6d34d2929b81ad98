//! Work items: the crawl step and its queue entry

use crate::crawler::context::Properties;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// One candidate fetch
///
/// Built once at admission; its fields never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStep {
    pub url: Url,

    /// Link distance from the seed (the seed is depth 0)
    pub depth: u32,

    pub is_allowed: bool,

    /// True when the address lies outside the seed's site
    pub is_external: bool,
}

impl CrawlStep {
    pub fn new(url: Url, depth: u32) -> Self {
        Self {
            url,
            depth,
            is_allowed: true,
            is_external: false,
        }
    }
}

impl fmt::Display for CrawlStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (depth {})", self.url, self.depth)
    }
}

/// An admitted step waiting in the work queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub step: CrawlStep,

    /// The page the link was found on; `None` for the seed
    pub referrer: Option<CrawlStep>,

    /// Extension data carried from the discovering link into the page context
    #[serde(default)]
    pub properties: Properties,
}

impl QueueEntry {
    pub fn new(step: CrawlStep, referrer: Option<CrawlStep>, properties: Properties) -> Self {
        Self {
            step,
            referrer,
            properties,
        }
    }
}
