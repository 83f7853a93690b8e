//! Scalix Sync Daemon — Entry Point
//!
//! Keeps the configured topics live against the Scalix API and exposes
//! what it sees over health and metrics endpoints. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Create ScalixClient (HTTP + bearer auth + concurrency cap)
//! 4. Create SyncMetrics (Prometheus observer)
//! 5. Create SyncRegistry with one HTTP fetcher per topic
//! 6. Subscribe a log sink per enabled topic and start its updates
//! 7. Spawn health server (/live, /ready, /status) and metrics server
//! 8. Spawn config watcher, re-applying topics on change
//! 9. Wait for SIGINT → stop every topic → exit

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use scalix_realtime_sync::adapters::api::{HttpTopicFetcher, ScalixClient};
use scalix_realtime_sync::adapters::metrics::{HealthServer, SyncMetrics};
use scalix_realtime_sync::config::hot_reload::ConfigWatcher;
use scalix_realtime_sync::config::{self, AppConfig};
use scalix_realtime_sync::domain::topic::{Topic, TopicPayload};
use scalix_realtime_sync::usecases::{Subscription, SyncRegistry};

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config = config::loader::load_config(CONFIG_PATH).context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.sync.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.sync.name,
        version = env!("CARGO_PKG_VERSION"),
        base_url = %config.api.base_url,
        topics = config.topics.len(),
        "Starting Scalix sync daemon"
    );

    // ── 3. Shutdown signal channel ──────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 4. HTTP client and metrics ──────────────────────────
    let client = Arc::new(
        ScalixClient::new(config.client_config()).context("Failed to create Scalix client")?,
    );
    let metrics = Arc::new(SyncMetrics::new().context("Failed to register metrics")?);

    // ── 5. Registry ─────────────────────────────────────────
    let registry = Arc::new(SyncRegistry::with_observer(
        HttpTopicFetcher::fetcher_map(Arc::clone(&client)),
        config.registry_options(),
        Arc::clone(&metrics) as _,
    ));

    // ── 6. Keep configured topics live ──────────────────────
    let mut live = LiveTopics::default();
    live.apply(&registry, &config);

    // ── 7. Health and metrics servers ───────────────────────
    let health_server = HealthServer::new(Arc::clone(&registry), config.metrics.health_port);
    let health_shutdown = shutdown_tx.subscribe();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    });

    let metrics_handle = if config.metrics.enabled {
        let metrics_shutdown = shutdown_tx.subscribe();
        let bind_address = config.metrics.bind_address.clone();
        let exporter = Arc::clone(&metrics);
        Some(tokio::spawn(async move {
            if let Err(e) = exporter.serve(bind_address, metrics_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }))
    } else {
        None
    };

    // ── 8. Config hot-reload ────────────────────────────────
    let (mut watcher, config_rx) = ConfigWatcher::new(CONFIG_PATH, config);
    let watcher_shutdown = shutdown_tx.subscribe();
    let watcher_handle = tokio::spawn(async move {
        if let Err(e) = watcher.run(watcher_shutdown).await {
            error!(error = %e, "Config watcher failed");
        }
    });

    let reload_shutdown = shutdown_tx.subscribe();
    let reload_registry = Arc::clone(&registry);
    let reload_handle = tokio::spawn(async move {
        follow_config(reload_registry, live, config_rx, reload_shutdown).await;
    });

    info!("All tasks spawned — daemon is running");

    // ── 9. Wait for SIGINT ──────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for SIGINT, shutting down");
    } else {
        info!("SIGINT received, initiating graceful shutdown");
    }

    let _ = shutdown_tx.send(());

    // Dropping the subscriptions inside the reload task halts every topic.
    let _ = tokio::time::timeout(Duration::from_secs(5), reload_handle).await;
    for topic in Topic::ALL {
        registry.stop_real_time_updates(topic);
    }

    let _ = tokio::time::timeout(Duration::from_secs(5), watcher_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), health_handle).await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Log-sink subscriptions the daemon holds, one per enabled topic.
#[derive(Default)]
struct LiveTopics {
    subscriptions: HashMap<Topic, Subscription>,
}

impl LiveTopics {
    /// Bring the registry in line with `config`.
    ///
    /// Per-topic cache lifetimes are applied first. Enabled topics get a
    /// subscriber and are (re)started with their interval. Topics no longer enabled lose their subscriber, which
    /// stops their updates.
    fn apply(&mut self, registry: &SyncRegistry, config: &AppConfig) {
        for topic in &config.topics {
            registry.set_cache_ttl(topic.topic, topic.cache_ttl());
        }

        let wanted: HashMap<Topic, Duration> = config
            .enabled_topics()
            .map(|t| (t.topic, t.interval()))
            .collect();

        self.subscriptions.retain(|topic, _| {
            let keep = wanted.contains_key(topic);
            if !keep {
                info!(topic = %topic, "Topic disabled by config");
            }
            keep
        });

        for (topic, interval) in wanted {
            self.subscriptions
                .entry(topic)
                .or_insert_with(|| registry.subscribe(topic, log_payload));

            if let Err(e) = registry.start_real_time_updates(topic, interval) {
                warn!(topic = %topic, error = %e, "Topic not started");
            }
        }
    }
}

/// Re-apply topics whenever the config watcher publishes a change.
async fn follow_config(
    registry: Arc<SyncRegistry>,
    mut live: LiveTopics,
    mut config_rx: watch::Receiver<AppConfig>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            changed = config_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let config = config_rx.borrow_and_update().clone();
                info!(topics = config.topics.len(), "Applying reloaded config");
                live.apply(&registry, &config);
            }
        }
    }
    drop(live);
}

/// Subscriber used by the daemon: one structured log line per update.
fn log_payload(payload: Arc<TopicPayload>) {
    match payload.as_ref() {
        TopicPayload::LiveStats(stats) => info!(
            topic = %Topic::LiveStats,
            active_subscriptions = stats.active_subscriptions,
            monthly_api_calls = stats.monthly_api_calls,
            avg_response_time = %stats.avg_response_time,
            "Live stats updated"
        ),
        TopicPayload::PlatformStats(stats) => info!(
            topic = %Topic::PlatformStats,
            active_subscriptions = stats.active_subscriptions,
            monthly_api_spend = stats.monthly_api_spend,
            "Platform stats updated"
        ),
        TopicPayload::Analytics(data) => info!(
            topic = %Topic::Analytics,
            total_users = data.total_users,
            total_requests = data.total_requests,
            models = data.top_models.len(),
            "Analytics updated"
        ),
        TopicPayload::Connection(event) => info!(
            topic = %Topic::Connection,
            connected = event.connected,
            error = event.error.as_ref().map(|e| e.message.as_str()),
            "Connection changed"
        ),
        TopicPayload::Health(_) => {}
    }
}
