//! Configuration Module - TOML-based Sync Configuration
//!
//! Loads and validates configuration from `config.toml`.
//! Endpoints, refresh intervals and backoff tuning are externalized
//! here; nothing about timing is hardcoded in the registry.

pub mod hot_reload;
pub mod loader;

use std::time::Duration;

use serde::Deserialize;

use crate::adapters::api::ScalixClientConfig;
use crate::domain::backoff::BackoffPolicy;
use crate::domain::topic::Topic;
use crate::usecases::registry::RegistryOptions;

/// Top-level configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before any topic starts polling.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AppConfig {
  /// Daemon identity and registry tuning.
  pub sync: SyncConfig,
  /// Scalix API endpoint.
  pub api: ApiConfig,
  /// Retry delay policy.
  #[serde(default)]
  pub backoff: BackoffPolicy,
  /// Topics to keep live.
  #[serde(default)]
  pub topics: Vec<TopicConfig>,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Daemon identity and registry tuning.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SyncConfig {
  /// Human-readable instance name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Client-side bound on a single fetch (milliseconds).
  #[serde(default = "default_fetch_timeout")]
  pub fetch_timeout_ms: u64,
  /// One-shot cache lifetime for every topic (milliseconds). Unset keeps
  /// each topic's default.
  #[serde(default)]
  pub cache_ttl_ms: Option<u64>,
}

/// API endpoint configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiConfig {
  /// REST API base URL.
  pub base_url: String,
  /// HTTP request timeout (milliseconds).
  #[serde(default = "default_fetch_timeout")]
  pub timeout_ms: u64,
  /// Maximum concurrent requests.
  #[serde(default = "default_max_concurrent")]
  pub max_concurrent: usize,
  /// Environment variable holding the bearer token, if any.
  #[serde(default)]
  pub api_key_env: Option<String>,
}

/// One live topic.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TopicConfig {
  /// Topic key, e.g. `"liveStats"`.
  pub topic: Topic,
  /// Refresh interval (milliseconds).
  #[serde(default = "default_interval")]
  pub interval_ms: u64,
  /// Whether the daemon keeps this topic live.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// One-shot cache lifetime for this topic (milliseconds).
  #[serde(default)]
  pub cache_ttl_ms: Option<u64>,
}

impl TopicConfig {
  pub const fn interval(&self) -> Duration {
    Duration::from_millis(self.interval_ms)
  }

  pub fn cache_ttl(&self) -> Option<Duration> {
    self.cache_ttl_ms.map(Duration::from_millis)
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

impl AppConfig {
  /// Registry tunables derived from this config.
  pub fn registry_options(&self) -> RegistryOptions {
    RegistryOptions {
      fetch_timeout: Duration::from_millis(self.sync.fetch_timeout_ms),
      backoff: self.backoff,
      cache_ttl: self.sync.cache_ttl_ms.map(Duration::from_millis),
    }
  }

  /// HTTP client settings. The API key is read from the environment.
  pub fn client_config(&self) -> ScalixClientConfig {
    ScalixClientConfig {
      base_url: self.api.base_url.clone(),
      timeout: Duration::from_millis(self.api.timeout_ms),
      max_concurrent: self.api.max_concurrent,
      api_key: self
        .api
        .api_key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok())
        .filter(|key| !key.is_empty()),
    }
  }

  /// Topics the daemon should keep live.
  pub fn enabled_topics(&self) -> impl Iterator<Item = &TopicConfig> {
    self.topics.iter().filter(|t| t.enabled)
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_fetch_timeout() -> u64 {
  10_000
}

fn default_max_concurrent() -> usize {
  4
}

fn default_interval() -> u64 {
  5_000
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}
