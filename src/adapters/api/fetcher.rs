//! HTTP Topic Fetcher - Maps Topics to Scalix Endpoints
//!
//! Implements the `TopicFetcher` port on top of `ScalixClient`:
//! - `analytics`     ← `GET /v1/analytics`
//! - `liveStats`     ← `GET /v1/analytics`, reduced to headline numbers
//! - `platformStats` ← `GET /v1/analytics`, reduced to platform totals
//! - `connection`    ← `GET /health`

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use super::client::ScalixClient;
use crate::domain::topic::{AnalyticsData, HealthReport, Topic, TopicPayload};
use crate::ports::fetcher::{FetchError, TopicFetcher};
use crate::usecases::registry::FetcherMap;

/// Analytics document endpoint.
pub const ANALYTICS_PATH: &str = "/v1/analytics";

/// Health probe endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Serves every topic from the Scalix REST API.
pub struct HttpTopicFetcher {
  client: Arc<ScalixClient>,
}

impl HttpTopicFetcher {
  pub fn new(client: Arc<ScalixClient>) -> Self {
    Self { client }
  }

  /// One shared fetcher registered for every topic.
  pub fn fetcher_map(client: Arc<ScalixClient>) -> FetcherMap {
    let fetcher: Arc<dyn TopicFetcher> = Arc::new(Self::new(client));
    Topic::ALL
      .into_iter()
      .map(|topic| (topic, Arc::clone(&fetcher)))
      .collect()
  }

  async fn analytics(&self) -> Result<AnalyticsData, FetchError> {
    self.client.get_json(ANALYTICS_PATH).await
  }
}

#[async_trait]
impl TopicFetcher for HttpTopicFetcher {
  #[instrument(skip(self))]
  async fn fetch(&self, topic: Topic) -> Result<TopicPayload, FetchError> {
    match topic {
      Topic::Analytics => self.analytics().await.map(TopicPayload::Analytics),
      Topic::LiveStats => self
        .analytics()
        .await
        .map(|a| TopicPayload::LiveStats(a.live_stats())),
      Topic::PlatformStats => self
        .analytics()
        .await
        .map(|a| TopicPayload::PlatformStats(a.platform_stats())),
      Topic::Connection => self
        .client
        .get_json::<HealthReport>(HEALTH_PATH)
        .await
        .map(TopicPayload::Health),
    }
  }
}
