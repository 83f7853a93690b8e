//! Config Hot-Reload - Re-read config.toml on a Timer
//!
//! The daemon re-applies topic intervals and enabled flags from a fresh
//! config without restarting. The file is polled (no inotify, which
//! behaves differently on Docker bind mounts); a new config is published
//! on a `watch` channel only when its text changed, it validates, and it
//! differs from what subscribers already hold.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use super::AppConfig;
use super::loader::load_config;

/// Default polling period for the config file.
pub const DEFAULT_RELOAD_PERIOD: Duration = Duration::from_secs(60);

/// Outcome of one reload check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// File text is the same as last time (or unreadable both times).
    Unchanged,
    /// Text changed but parses to the config already published.
    Equivalent,
    /// Text changed and failed validation; the old config stays.
    Rejected,
    /// A new config was published.
    Applied,
}

/// Polls a config file and publishes validated changes.
pub struct ConfigWatcher {
    path: PathBuf,
    tx: watch::Sender<AppConfig>,
    /// Fingerprint of the text last looked at.
    fingerprint: Option<u64>,
    period: Duration,
}

impl ConfigWatcher {
    /// Build a watcher seeded with the config already in use.
    ///
    /// The returned receiver yields every config the watcher accepts.
    pub fn new(path: &str, current: AppConfig) -> (Self, watch::Receiver<AppConfig>) {
        let (tx, rx) = watch::channel(current);
        let watcher = Self {
            path: PathBuf::from(path),
            tx,
            fingerprint: None,
            period: DEFAULT_RELOAD_PERIOD,
        };
        (watcher, rx)
    }

    #[must_use]
    pub const fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Poll until `shutdown_rx` fires.
    #[instrument(skip(self, shutdown_rx), fields(path = %self.path.display()))]
    pub async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.fingerprint = self.read_fingerprint().await;

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; the seed fingerprint covers it.
        ticker.tick().await;

        info!(period_s = self.period.as_secs(), "Watching config for changes");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!("Config watcher stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
    }

    /// Look at the file once and publish it if it is a valid change.
    pub async fn poll_once(&mut self) -> ReloadOutcome {
        let fingerprint = self.read_fingerprint().await;
        if fingerprint == self.fingerprint {
            return ReloadOutcome::Unchanged;
        }
        self.fingerprint = fingerprint;

        let config = match load_config(&self.path.to_string_lossy()) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Edited config is invalid, ignoring it");
                return ReloadOutcome::Rejected;
            }
        };

        let changed = self.tx.send_if_modified(|published| {
            if *published == config {
                false
            } else {
                *published = config;
                true
            }
        });

        if changed {
            info!(receivers = self.tx.receiver_count(), "New config published");
            ReloadOutcome::Applied
        } else {
            debug!("Config text changed, settings did not");
            ReloadOutcome::Equivalent
        }
    }

    async fn read_fingerprint(&self) -> Option<u64> {
        let text = tokio::fs::read_to_string(&self.path).await.ok()?;
        Some(fingerprint(&text))
    }
}

fn fingerprint(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}
