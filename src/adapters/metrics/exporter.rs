//! Prometheus Metrics - Sync Observability
//!
//! Records what the registry does (fetch outcomes and latency, joined
//! ticks, scheduled delays, subscriber counts, connection state) and
//! serves it on `/metrics` for Grafana dashboards.
//!
//! All metrics follow the naming convention `scalix_sync_*` and carry
//! a `topic` label where it applies.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use prometheus::{
    Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::domain::topic::Topic;
use crate::ports::fetcher::FetchError;
use crate::ports::observer::SyncObserver;

/// Centralized Prometheus metrics for the sync client.
pub struct SyncMetrics {
    /// Prometheus registry.
    registry: Registry,
    /// Completed fetches by topic and outcome (`ok` or error kind).
    pub fetches: IntCounterVec,
    /// Fetch latency histogram (milliseconds).
    pub fetch_latency_ms: HistogramVec,
    /// Ticks that joined an in-flight fetch instead of issuing one.
    pub ticks_joined: IntCounterVec,
    /// Delay armed for each topic's next tick (milliseconds).
    pub next_delay_ms: GaugeVec,
    /// Subscribers per topic.
    pub subscribers: GaugeVec,
    /// Connection status (1 = connected, 0 = disconnected).
    pub connected: Gauge,
}

impl SyncMetrics {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let fetches = IntCounterVec::new(
            Opts::new("scalix_sync_fetches_total", "Completed fetches"),
            &["topic", "outcome"],
        )?;

        let fetch_latency_ms = HistogramVec::new(
            HistogramOpts::new(
                "scalix_sync_fetch_latency_ms",
                "Fetch latency in milliseconds",
            )
            .buckets(vec![
                10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
            ]),
            &["topic"],
        )?;

        let ticks_joined = IntCounterVec::new(
            Opts::new(
                "scalix_sync_ticks_joined_total",
                "Ticks that joined an in-flight fetch",
            ),
            &["topic"],
        )?;

        let next_delay_ms = GaugeVec::new(
            Opts::new(
                "scalix_sync_next_delay_ms",
                "Delay before the next tick in milliseconds",
            ),
            &["topic"],
        )?;

        let subscribers = GaugeVec::new(
            Opts::new("scalix_sync_subscribers", "Subscribers per topic"),
            &["topic"],
        )?;

        let connected = Gauge::new(
            "scalix_sync_connected",
            "Connection status (1=connected, 0=disconnected)",
        )?;

        // Register all metrics
        registry.register(Box::new(fetches.clone()))?;
        registry.register(Box::new(fetch_latency_ms.clone()))?;
        registry.register(Box::new(ticks_joined.clone()))?;
        registry.register(Box::new(next_delay_ms.clone()))?;
        registry.register(Box::new(subscribers.clone()))?;
        registry.register(Box::new(connected.clone()))?;

        Ok(Self {
            registry,
            fetches,
            fetch_latency_ms,
            ticks_joined,
            next_delay_ms,
            subscribers,
            connected,
        })
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move { metrics.render() }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

impl SyncObserver for SyncMetrics {
    fn fetch_completed(&self, topic: Topic, outcome: Result<(), &FetchError>, latency: Duration) {
        let label = outcome.map_or_else(FetchError::kind, |()| "ok");
        self.fetches
            .with_label_values(&[topic.as_str(), label])
            .inc();
        self.fetch_latency_ms
            .with_label_values(&[topic.as_str()])
            .observe(latency.as_secs_f64() * 1000.0);
    }

    fn tick_joined(&self, topic: Topic) {
        self.ticks_joined.with_label_values(&[topic.as_str()]).inc();
    }

    fn next_tick_scheduled(&self, topic: Topic, delay: Duration) {
        self.next_delay_ms
            .with_label_values(&[topic.as_str()])
            .set(delay.as_secs_f64() * 1000.0);
    }

    fn connection_observed(&self, connected: bool) {
        self.connected.set(if connected { 1.0 } else { 0.0 });
    }

    fn subscribers_changed(&self, topic: Topic, count: usize) {
        #[allow(clippy::cast_precision_loss)]
        self.subscribers
            .with_label_values(&[topic.as_str()])
            .set(count as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_hooks_update_metrics() {
        let metrics = SyncMetrics::new().unwrap();
        metrics.fetch_completed(Topic::LiveStats, Ok(()), Duration::from_millis(12));
        metrics.fetch_completed(
            Topic::LiveStats,
            Err(&FetchError::Timeout(10_000)),
            Duration::from_secs(10),
        );
        metrics.connection_observed(true);
        metrics.subscribers_changed(Topic::Analytics, 3);

        assert_eq!(
            metrics
                .fetches
                .with_label_values(&["liveStats", "ok"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .fetches
                .with_label_values(&["liveStats", "timeout"])
                .get(),
            1
        );
        assert!((metrics.connected.get() - 1.0).abs() < f64::EPSILON);

        let text = metrics.render();
        assert!(text.contains("scalix_sync_subscribers"));
        assert!(text.contains("scalix_sync_fetch_latency_ms"));
    }
}
