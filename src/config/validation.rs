use crate::config::types::{
    Config, CrawlerConfig, OutputConfig, PacingConfig, SeedEntry, SourceConfig, UserAgentConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_pacing_config(&config.pacing)?;
    validate_source_config(&config.source)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_seeds(&config.seeds)?;
    Ok(())
}

/// Validates crawl bounds
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_depth < -1 {
        return Err(ConfigError::Validation(format!(
            "max_depth must be -1 (unlimited) or >= 0, got {}",
            config.max_depth
        )));
    }

    if config.max_players < -1 {
        return Err(ConfigError::Validation(format!(
            "max_players must be -1 (unlimited) or >= 0, got {}",
            config.max_players
        )));
    }

    if config.request_timeout_secs == 0 || config.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_secs must be between 1 and 300, got {}",
            config.request_timeout_secs
        )));
    }

    if config.idle_poll_secs == 0 {
        return Err(ConfigError::Validation(
            "idle_poll_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates pacing bounds: min <= base <= max
fn validate_pacing_config(config: &PacingConfig) -> Result<(), ConfigError> {
    if config.min_delay_ms < 50 {
        return Err(ConfigError::Validation(format!(
            "min_delay_ms must be >= 50ms, got {}ms",
            config.min_delay_ms
        )));
    }

    if config.base_delay_ms < config.min_delay_ms || config.base_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "base_delay_ms must lie within [{}, {}], got {}",
            config.min_delay_ms, config.max_delay_ms, config.base_delay_ms
        )));
    }

    Ok(())
}

/// Validates the source site settings
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if !config.profile_path.contains("{id}") {
        return Err(ConfigError::Validation(format!(
            "profile_path must contain an {{id}} placeholder, got '{}'",
            config.profile_path
        )));
    }

    if config.season_query.trim().is_empty() {
        return Err(ConfigError::Validation(
            "season_query cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.report_path.is_empty() {
        return Err(ConfigError::Validation(
            "report_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Seeds must be positive and listed once
fn validate_seeds(seeds: &[SeedEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for seed in seeds {
        if seed.player_id <= 0 {
            return Err(ConfigError::Validation(format!(
                "seed player_id must be positive, got {}",
                seed.player_id
            )));
        }
        if !seen.insert(seed.player_id) {
            return Err(ConfigError::Validation(format!(
                "seed player_id {} is listed more than once",
                seed.player_id
            )));
        }
    }
    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
