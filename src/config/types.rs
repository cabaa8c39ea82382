use serde::Deserialize;

/// Main configuration structure for Rally-Graph
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub pacing: PacingConfig,
    pub source: SourceConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "seed")]
    pub seeds: Vec<SeedEntry>,
}

/// Crawl bounds and loop behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum BFS depth from a seeded player (-1 = unlimited)
    #[serde(rename = "max-depth")]
    pub max_depth: i32,

    /// Maximum players brought to a terminal state per run (-1 = unlimited)
    #[serde(rename = "max-players")]
    pub max_players: i64,

    /// Per-request timeout in seconds
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long the loop sleeps before re-checking an empty queue
    #[serde(rename = "idle-poll-secs", default = "default_idle_poll")]
    pub idle_poll_secs: u64,
}

impl CrawlerConfig {
    /// Returns the depth bound, or None when unlimited
    pub fn depth_limit(&self) -> Option<u32> {
        u32::try_from(self.max_depth).ok()
    }

    /// Returns the per-run player bound, or None when unlimited
    pub fn player_limit(&self) -> Option<u64> {
        u64::try_from(self.max_players).ok()
    }
}

/// Adaptive pacing bounds (milliseconds)
#[derive(Debug, Clone, Deserialize)]
pub struct PacingConfig {
    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,

    #[serde(rename = "min-delay-ms")]
    pub min_delay_ms: u64,

    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,
}

/// Where the results site lives and how its pages are addressed
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Site root, e.g. "https://results.example.org/"
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Profile path template relative to the base URL; must contain `{id}`
    #[serde(rename = "profile-path")]
    pub profile_path: String,

    /// Query parameter that selects a season on the profile page
    #[serde(rename = "season-query", default = "default_season_query")]
    pub season_query: String,

    /// Whether robots.txt on the source site is honored
    #[serde(rename = "respect-robots", default = "default_true")]
    pub respect_robots: bool,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the markdown integrity report
    #[serde(rename = "report-path")]
    pub report_path: String,
}

/// A manually seeded player
#[derive(Debug, Clone, Deserialize)]
pub struct SeedEntry {
    #[serde(rename = "player-id")]
    pub player_id: i64,

    #[serde(default)]
    pub priority: i64,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_idle_poll() -> u64 {
    5
}

fn default_season_query() -> String {
    "season".to_string()
}

fn default_true() -> bool {
    true
}
