//! Default URL policy built from the configuration

use crate::config::Config;
use crate::crawler::CrawlStep;
use crate::policy::UrlPolicy;
use crate::robots::RobotsCache;
use crate::url::{extract_domain, matches_wildcard};
use crate::{ConfigError, ConfigResult};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use url::Url;

/// Standard admission rules
///
/// Checks are applied in order:
/// 1. Addresses longer than the maximum URL length are denied
/// 2. An address matching any include pattern is allowed
/// 3. An address matching any exclude pattern is denied
/// 4. External addresses are denied
/// 5. robots.txt is consulted when adherence is on
pub struct CrawlerRules {
    seed_host: Option<String>,
    internal_domains: Vec<String>,
    max_url_length: Option<usize>,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    robots: Option<RobotsCache>,
}

impl CrawlerRules {
    /// Builds the rules for a crawl rooted at `seed`
    ///
    /// `client` is only used for robots.txt requests.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlerRules)` - Rules ready for use
    /// * `Err(ConfigError)` - An include or exclude pattern failed to compile
    pub fn new(seed: &Url, config: &Config, client: Client) -> ConfigResult<Self> {
        let robots = config
            .crawler
            .adhere_to_robots
            .then(|| {
                RobotsCache::new(
                    client,
                    &config.download.user_agent,
                    config.download.read_timeout(),
                )
            });

        Ok(Self {
            seed_host: extract_domain(seed),
            internal_domains: config
                .crawler
                .internal_domains
                .iter()
                .map(|d| d.to_lowercase())
                .collect(),
            max_url_length: config.crawler.max_url_length,
            include: compile_patterns(&config.urls.include)?,
            exclude: compile_patterns(&config.urls.exclude)?,
            robots,
        })
    }

    fn is_too_long(&self, url: &Url) -> bool {
        self.max_url_length
            .map_or(false, |max| url.as_str().len() > max)
    }
}

fn compile_patterns(patterns: &[String]) -> ConfigResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| ConfigError::InvalidPattern(format!("{}: {}", p, e))))
        .collect()
}

#[async_trait]
impl UrlPolicy for CrawlerRules {
    async fn is_allowed(&self, url: &Url, _referrer: Option<&CrawlStep>) -> bool {
        if self.is_too_long(url) {
            tracing::debug!("Rejecting {}: longer than {:?}", url, self.max_url_length);
            return false;
        }

        let address = url.as_str();
        if self.include.iter().any(|re| re.is_match(address)) {
            return true;
        }

        if self.exclude.iter().any(|re| re.is_match(address)) {
            tracing::debug!("Rejecting {}: matches an exclude pattern", url);
            return false;
        }

        if self.is_external(url) {
            tracing::trace!("Rejecting {}: external", url);
            return false;
        }

        match &self.robots {
            Some(robots) => {
                let allowed = robots.is_allowed(url).await;
                if !allowed {
                    tracing::debug!("Rejecting {}: disallowed by robots.txt", url);
                }
                allowed
            }
            None => true,
        }
    }

    fn is_external(&self, url: &Url) -> bool {
        let Some(host) = extract_domain(url) else {
            return true;
        };

        if self.seed_host.as_deref() == Some(host.as_str()) {
            return false;
        }

        !self
            .internal_domains
            .iter()
            .any(|pattern| matches_wildcard(pattern, &host))
    }
}

impl std::fmt::Debug for CrawlerRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlerRules")
            .field("seed_host", &self.seed_host)
            .field("internal_domains", &self.internal_domains)
            .field("max_url_length", &self.max_url_length)
            .field("include", &self.include.len())
            .field("exclude", &self.exclude.len())
            .field("robots", &self.robots.is_some())
            .finish()
    }
}
