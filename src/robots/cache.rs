//! Robots.txt caching implementation
//!
//! Each origin's robots.txt is fetched once and reused for 24 hours.

use crate::robots::{fetch_robots, product_token, ParsedRobots};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::Mutex as AsyncMutex;
use url::Url;

/// Cached robots.txt data for an origin
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt content
    pub content: ParsedRobots,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(content: ParsedRobots) -> Self {
        Self {
            content,
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the cached robots.txt is older than 24 hours
    pub fn is_stale(&self) -> bool {
        Utc::now() - self.fetched_at > Duration::hours(24)
    }
}

/// Cache slot for one origin
///
/// The async lock is held across the fetch, so concurrent misses for the
/// same origin wait for a single request.
type Slot = Arc<AsyncMutex<Option<CachedRobots>>>;

/// Per-origin robots.txt cache backed by an HTTP client
pub struct RobotsCache {
    client: Client,
    user_agent: String,
    deadline: StdDuration,
    entries: Mutex<HashMap<String, Slot>>,
}

impl RobotsCache {
    /// Creates a cache that fetches with `client` and matches rules for `user_agent`
    ///
    /// A robots.txt that is not fully received within `deadline` is treated
    /// as allowing everything.
    pub fn new(client: Client, user_agent: &str, deadline: StdDuration) -> Self {
        Self {
            client,
            user_agent: product_token(user_agent).to_string(),
            deadline,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, origin: &str) -> Slot {
        Arc::clone(self.entries.lock().entry(origin.to_string()).or_default())
    }

    /// Checks a URL against its origin's robots.txt, fetching it when needed
    pub async fn is_allowed(&self, url: &Url) -> bool {
        let origin = url.origin().ascii_serialization();
        let slot = self.slot(&origin);
        let mut entry = slot.lock().await;

        let cached = entry
            .as_ref()
            .filter(|cached| !cached.is_stale())
            .map(|cached| cached.content.clone());

        let robots = match cached {
            Some(robots) => robots,
            None => {
                tracing::debug!("Fetching robots.txt for {}", origin);
                let robots = fetch_robots(&self.client, url, self.deadline).await;
                *entry = Some(CachedRobots::new(robots.clone()));
                robots
            }
        };

        robots.is_allowed(url.as_str(), &self.user_agent)
    }

    /// Stores robots.txt content for an origin without fetching it
    pub fn insert(&self, origin: &Url, content: &str) {
        let cached = CachedRobots::new(ParsedRobots::from_content(content));
        let slot = Arc::new(AsyncMutex::new(Some(cached)));
        self.entries
            .lock()
            .insert(origin.origin().ascii_serialization(), slot);
    }

    /// Number of origins seen so far
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
