//! URL handling module for Ripple-Crawl
//!
//! This module derives the history key that identifies an address, and
//! provides host extraction and wildcard matching for site membership checks.

mod domain;
mod key;

pub use domain::{extract_domain, matches_wildcard};
pub use key::{url_key, UrlComponent, UrlComponents};

use crate::{UrlError, UrlResult};
use url::Url;

/// Parses an address that the crawler is able to fetch
///
/// # Returns
///
/// * `Ok(Url)` - An absolute http or https URL with a host
/// * `Err(UrlError)` - The string is not a fetchable address
pub fn parse_crawlable(address: &str) -> UrlResult<Url> {
    let url = Url::parse(address).map_err(|e| UrlError::Parse(e.to_string()))?;

    if !is_crawlable_scheme(&url) {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    Ok(url)
}

/// Returns true for the schemes the downloader speaks
pub fn is_crawlable_scheme(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}
