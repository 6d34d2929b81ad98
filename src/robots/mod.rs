//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching robots.txt files.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::{product_token, ParsedRobots};

use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Fetches robots.txt for the origin of `url`
///
/// Any failure to obtain a success response (network error, 4xx, 5xx)
/// results in an allow-all policy, as does a request and body read that
/// together take longer than `deadline`.
pub async fn fetch_robots(client: &Client, url: &Url, deadline: Duration) -> ParsedRobots {
    let robots_url = match url.join("/robots.txt") {
        Ok(u) => u,
        Err(_) => return ParsedRobots::allow_all(),
    };

    match tokio::time::timeout(deadline, request_robots(client, &robots_url)).await {
        Ok(robots) => robots,
        Err(_) => {
            tracing::debug!(
                "robots.txt at {} took longer than {:?}, allowing all",
                robots_url,
                deadline
            );
            ParsedRobots::allow_all()
        }
    }
}

async fn request_robots(client: &Client, robots_url: &Url) -> ParsedRobots {
    let response = match client.get(robots_url.clone()).send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!("robots.txt unavailable at {}: {}", robots_url, e);
            return ParsedRobots::allow_all();
        }
    };

    if !response.status().is_success() {
        tracing::debug!(
            "robots.txt at {} returned {}, allowing all",
            robots_url,
            response.status()
        );
        return ParsedRobots::allow_all();
    }

    match response.text().await {
        Ok(body) => ParsedRobots::from_content(&body),
        Err(e) => {
            tracing::debug!("Failed to read robots.txt at {}: {}", robots_url, e);
            ParsedRobots::allow_all()
        }
    }
}
