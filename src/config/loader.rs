//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails (including unknown topic keys)
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    topics = config.topics.len(),
    base_url = %config.api.base_url,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).context("Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Non-empty base URL with an http(s) scheme
/// - Positive timeouts and intervals
/// - Sane backoff tuning
/// - No topic listed twice
fn validate_config(config: &AppConfig) -> Result<()> {
  // API validation
  anyhow::ensure!(
    config.api.base_url.starts_with("http://") || config.api.base_url.starts_with("https://"),
    "API base_url must start with http:// or https://, got {:?}",
    config.api.base_url
  );
  anyhow::ensure!(config.api.timeout_ms > 0, "API timeout_ms must be positive");
  anyhow::ensure!(
    config.api.max_concurrent > 0,
    "API max_concurrent must be positive"
  );

  // Registry validation
  anyhow::ensure!(
    config.sync.fetch_timeout_ms > 0,
    "fetch_timeout_ms must be positive"
  );

  // Backoff validation
  anyhow::ensure!(
    config.backoff.max_multiplier >= 1,
    "backoff max_multiplier must be at least 1, got {}",
    config.backoff.max_multiplier
  );
  anyhow::ensure!(
    (0.0..1.0).contains(&config.backoff.jitter_ratio),
    "backoff jitter_ratio must be in [0, 1), got {}",
    config.backoff.jitter_ratio
  );

  // Topic validation
  let mut seen = HashSet::new();
  for topic in &config.topics {
    anyhow::ensure!(
      seen.insert(topic.topic),
      "Topic {} is configured more than once",
      topic.topic
    );
    anyhow::ensure!(
      topic.interval_ms > 0,
      "Topic {} has a zero interval_ms",
      topic.topic
    );
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::topic::Topic;

  const VALID: &str = r#"
    [sync]
    name = "dashboard-sync"

    [api]
    base_url = "http://localhost:4000"

    [[topics]]
    topic = "liveStats"
    interval_ms = 5000

    [[topics]]
    topic = "connection"
    interval_ms = 30000
  "#;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_parse_valid_config_with_defaults() {
    let config = tokio_test::assert_ok!(parse_config(VALID));
    assert_eq!(config.sync.log_level, "info");
    assert_eq!(config.sync.fetch_timeout_ms, 10_000);
    assert_eq!(config.backoff.max_multiplier, 5);
    assert_eq!(config.topics.len(), 2);
    assert_eq!(config.topics[0].topic, Topic::LiveStats);
    assert!(config.topics[1].enabled);
    assert_eq!(config.metrics.health_port, 8080);
  }

  #[test]
  fn test_unknown_topic_key_rejected() {
    let text = VALID.replace("\"liveStats\"", "\"usage\"");
    assert!(parse_config(&text).is_err());
  }

  #[test]
  fn test_duplicate_topic_rejected() {
    let text = format!("{VALID}\n[[topics]]\ntopic = \"liveStats\"\n");
    let err = parse_config(&text).unwrap_err();
    assert!(err.to_string().contains("more than once"));
  }

  #[test]
  fn test_bad_jitter_rejected() {
    let text = format!("{VALID}\n[backoff]\njitter_ratio = 1.5\n");
    tokio_test::assert_err!(parse_config(&text));
  }

  #[test]
  fn test_registry_options_follow_config() {
    let config = parse_config(VALID).unwrap();
    let options = config.registry_options();
    assert_eq!(options.fetch_timeout.as_millis(), 10_000);
    assert_eq!(options.cache_ttl, None);
  }

  #[test]
  fn test_topic_cache_ttl_is_optional() {
    let text = VALID.replace(
      "topic = \"liveStats\"\n    interval_ms = 5000",
      "topic = \"liveStats\"\n    interval_ms = 5000\n    cache_ttl_ms = 2500",
    );
    let config = tokio_test::assert_ok!(parse_config(&text));
    assert_eq!(config.topics[0].cache_ttl(), Some(std::time::Duration::from_millis(2_500)));
    assert_eq!(config.topics[1].cache_ttl(), None);
  }

  #[test]
  fn test_global_cache_ttl_overrides_topic_defaults() {
    let text = VALID.replace(
      "name = \"dashboard-sync\"",
      "name = \"dashboard-sync\"\n    cache_ttl_ms = 0",
    );
    let config = tokio_test::assert_ok!(parse_config(&text));
    assert_eq!(config.registry_options().cache_ttl, Some(std::time::Duration::ZERO));
  }
}
