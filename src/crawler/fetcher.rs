//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with the configured user agent and timeout
//! - Building profile and season URLs for the source site
//! - Honoring robots.txt before every request
//! - Classifying failures as timeout, network or HTTP status

use crate::config::{Config, SourceConfig, UserAgentConfig};
use crate::crawler::parser::{parse_profile, PlayerProfile};
use crate::robots::{fetch_robots, RobotsPolicy};
use crate::{FetchError, FetchResult};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use url::Url;

/// Page source consumed by the crawl orchestrator
///
/// Transport failures come back as `FetchError`; a page that downloads but
/// parses poorly is not an error at this layer.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches and parses a player's profile page
    async fn fetch_profile(&self, player_id: i64) -> FetchResult<PlayerProfile>;

    /// Fetches the raw match listing of one season
    async fn fetch_season(&self, player_id: i64, season_code: &str) -> FetchResult<String>;
}

/// Builds an HTTP client with proper configuration
///
/// The user agent reads `CrawlerName/Version (+ContactURL; ContactEmail)`.
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10).min(timeout))
        .redirect(Policy::limited(5))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetcher for the configured results site
pub struct HttpFetcher {
    client: Client,
    base_url: Url,
    profile_path: String,
    season_query: String,
    robots: RobotsPolicy,
    robots_agent: String,
}

impl HttpFetcher {
    /// Creates a fetcher that allows every path until `load_robots` runs
    pub fn new(config: &Config) -> crate::Result<Self> {
        let client = build_http_client(
            &config.user_agent,
            Duration::from_secs(config.crawler.request_timeout_secs),
        )?;
        Self::with_client(client, &config.source, &config.user_agent)
    }

    pub fn with_client(
        client: Client,
        source: &SourceConfig,
        user_agent: &UserAgentConfig,
    ) -> crate::Result<Self> {
        let base_url = Url::parse(&source.base_url)?;
        Ok(Self {
            client,
            base_url,
            profile_path: source.profile_path.clone(),
            season_query: source.season_query.clone(),
            robots: RobotsPolicy::allow_all(),
            robots_agent: user_agent.crawler_name.clone(),
        })
    }

    /// Fetches robots.txt once and returns its crawl delay for us, if any
    pub async fn load_robots(&mut self) -> Option<Duration> {
        self.robots = fetch_robots(&self.client, &self.base_url).await;
        self.robots.crawl_delay(&self.robots_agent)
    }

    pub fn profile_url(&self, player_id: i64) -> FetchResult<Url> {
        let path = self.profile_path.replace("{id}", &player_id.to_string());
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", path, e)))
    }

    pub fn season_url(&self, player_id: i64, season_code: &str) -> FetchResult<Url> {
        let mut url = self.profile_url(player_id)?;
        url.query_pairs_mut()
            .append_pair(&self.season_query, season_code);
        Ok(url)
    }

    async fn get_html(&self, url: &Url) -> FetchResult<String> {
        if !self.robots.is_allowed(url.as_str(), &self.robots_agent) {
            return Err(FetchError::RobotsDenied {
                url: url.to_string(),
            });
        }

        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| classify_error(url, e))
    }
}

fn classify_error(url: &Url, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_profile(&self, player_id: i64) -> FetchResult<PlayerProfile> {
        let url = self.profile_url(player_id)?;
        let html = self.get_html(&url).await?;
        Ok(parse_profile(&html, player_id))
    }

    async fn fetch_season(&self, player_id: i64, season_code: &str) -> FetchResult<String> {
        let url = self.season_url(player_id, season_code)?;
        self.get_html(&url).await
    }
}
