//! Scalix HTTP Client - Bounded GET Requests
//!
//! Wraps reqwest with a request timeout, a concurrency cap, and
//! error mapping into `FetchError`. It performs exactly one attempt per
//! call: retries and backoff belong to the registry, which knows how
//! long each topic has been failing.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::ports::fetcher::FetchError;

/// Longest response body excerpt kept in a status error.
const MAX_ERROR_BODY: usize = 256;

/// Configuration for the Scalix HTTP client.
#[derive(Debug, Clone)]
pub struct ScalixClientConfig {
  /// Base URL, e.g. `https://api.scalix.world`.
  pub base_url: String,
  /// Request timeout.
  pub timeout: Duration,
  /// Maximum concurrent requests.
  pub max_concurrent: usize,
  /// Bearer token sent verbatim, if any.
  pub api_key: Option<String>,
}

impl Default for ScalixClientConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:4000".to_string(),
      timeout: Duration::from_secs(10),
      max_concurrent: 4,
      api_key: None,
    }
  }
}

/// HTTP client for the Scalix API.
pub struct ScalixClient {
  /// Underlying HTTP client.
  http: Client,
  /// Client configuration.
  config: ScalixClientConfig,
  /// Concurrency limiter.
  semaphore: Arc<Semaphore>,
}

impl ScalixClient {
  /// Create a new client.
  pub fn new(config: ScalixClientConfig) -> Result<Self> {
    let mut headers = HeaderMap::new();
    if let Some(key) = &config.api_key {
      let value = HeaderValue::from_str(&format!("Bearer {key}"))
        .context("API key is not a valid header value")?;
      headers.insert(AUTHORIZATION, value);
    }

    let http = Client::builder()
      .timeout(config.timeout)
      .default_headers(headers)
      .pool_max_idle_per_host(5)
      .build()
      .context("Failed to build HTTP client")?;

    let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));

    Ok(Self {
      http,
      config,
      semaphore,
    })
  }

  pub fn base_url(&self) -> &str {
    &self.config.base_url
  }

  /// GET `path` and decode the body as `T`.
  ///
  /// Non-2xx, transport failures, timeouts and bodies that do not match
  /// `T` all come back as `FetchError`.
  pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
    let _permit = self
      .semaphore
      .acquire()
      .await
      .map_err(|e| FetchError::Aborted(e.to_string()))?;

    let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
    debug!(url = %url, "GET");

    let response = self
      .http
      .get(&url)
      .send()
      .await
      .map_err(|e| self.map_transport(&e))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      warn!(status = %status, path, "API returned error status");
      return Err(status_error(status, &body));
    }

    let bytes = response
      .bytes()
      .await
      .map_err(|e| self.map_transport(&e))?;

    serde_json::from_slice(&bytes).map_err(|e| FetchError::Malformed(e.to_string()))
  }

  fn map_transport(&self, error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
      FetchError::Timeout(u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX))
    } else {
      FetchError::Transport(error.to_string())
    }
  }
}

/// Build a status error, keeping a short excerpt of the body.
fn status_error(status: StatusCode, body: &str) -> FetchError {
  let mut reason = status.canonical_reason().unwrap_or("").to_string();
  let body = body.trim();
  if !body.is_empty() {
    let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
    if reason.is_empty() {
      reason = excerpt;
    } else {
      reason = format!("{reason}: {excerpt}");
    }
  }
  FetchError::Status {
    status: status.as_u16(),
    reason,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_error_keeps_reason_and_excerpt() {
    let err = status_error(StatusCode::SERVICE_UNAVAILABLE, "  upstream down ");
    assert_eq!(
      err,
      FetchError::Status {
        status: 503,
        reason: "Service Unavailable: upstream down".to_string(),
      }
    );
  }

  #[test]
  fn test_status_error_truncates_long_bodies() {
    let body = "x".repeat(1000);
    let FetchError::Status { reason, .. } = status_error(StatusCode::BAD_GATEWAY, &body) else {
      panic!("expected status error");
    };
    assert!(reason.len() < 300);
  }

  #[test]
  fn test_client_rejects_invalid_api_key() {
    let config = ScalixClientConfig {
      api_key: Some("bad\nkey".to_string()),
      ..ScalixClientConfig::default()
    };
    assert!(ScalixClient::new(config).is_err());
  }
}
