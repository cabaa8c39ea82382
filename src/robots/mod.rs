//! Robots.txt handling module
//!
//! The crawl touches a single site, so robots.txt is fetched once per run
//! and kept for the lifetime of the fetcher.

mod policy;

pub use policy::RobotsPolicy;

use reqwest::{Client, StatusCode};
use url::Url;

/// Fetches `/robots.txt` from the site root of `base_url`
///
/// A missing file (4xx) allows everything. Network failures and 5xx are
/// also treated as allow-all with a warning; the crawl is paced either way.
pub async fn fetch_robots(client: &Client, base_url: &Url) -> RobotsPolicy {
    let robots_url = match base_url.join("/robots.txt") {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("Cannot build robots.txt URL from {}: {}", base_url, e);
            return RobotsPolicy::allow_all();
        }
    };

    let response = match client.get(robots_url.as_str()).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Failed to fetch {}: {}; assuming allow-all", robots_url, e);
            return RobotsPolicy::allow_all();
        }
    };

    let status = response.status();
    if status == StatusCode::OK {
        match response.text().await {
            Ok(body) => {
                tracing::debug!("Loaded robots.txt ({} bytes)", body.len());
                RobotsPolicy::from_content(&body)
            }
            Err(e) => {
                tracing::warn!("Unreadable robots.txt body: {}; assuming allow-all", e);
                RobotsPolicy::allow_all()
            }
        }
    } else {
        if status.is_server_error() {
            tracing::warn!("robots.txt returned {}; assuming allow-all", status);
        } else {
            tracing::debug!("No robots.txt ({}); allowing all", status);
        }
        RobotsPolicy::allow_all()
    }
}
