//! Health Check Server - Liveness, Readiness and Sync Status
//!
//! Exposes /live, /ready and /status endpoints via axum 0.7 for Docker
//! health checks and for operators who want to see what every topic is
//! doing. Readiness follows the registry's derived connection signal.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::domain::connection::ConnectionState;
use crate::usecases::registry::{SyncRegistry, TopicSnapshot};

/// Body of the `/status` endpoint.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub connection: ConnectionState,
    pub topics: Vec<TopicSnapshot>,
}

impl StatusReport {
    pub fn collect(registry: &SyncRegistry) -> Self {
        Self {
            connection: registry.connection_state(),
            topics: registry.topic_snapshots(),
        }
    }
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    /// Registry whose state is reported.
    registry: Arc<SyncRegistry>,
    /// Bind port.
    port: u16,
}

impl HealthServer {
    /// Create a new health server.
    pub fn new(registry: Arc<SyncRegistry>, port: u16) -> Self {
        Self { registry, port }
    }

    /// Build the router. Exposed for in-process tests.
    pub fn router(registry: Arc<SyncRegistry>) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .route("/status", get(Self::status))
            .with_state(registry)
    }

    /// Start the health check server in the background.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = Self::router(Arc::clone(&self.registry));

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: 200 only while the API is reachable.
    async fn readiness(State(registry): State<Arc<SyncRegistry>>) -> impl IntoResponse {
        if registry.get_connection_status() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }

    /// Connection state and per-topic bookkeeping as JSON.
    async fn status(State(registry): State<Arc<SyncRegistry>>) -> impl IntoResponse {
        Json(StatusReport::collect(&registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::registry::{FetcherMap, RegistryOptions};

    #[test]
    fn test_status_report_before_any_fetch() {
        let registry = SyncRegistry::new(FetcherMap::new(), RegistryOptions::default());
        let report = StatusReport::collect(&registry);

        assert!(!report.connection.connected);
        assert!(!report.connection.settled);
        assert!(report.topics.is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["connection"]["retry_count"], 0);
    }
}
