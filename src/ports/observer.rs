//! Sync Observer Port - Instrumentation Hooks
//!
//! The registry reports what it does through this trait so that metrics
//! exporters stay in the adapters layer. Every hook has an empty default
//! body; implement only what you record.

use std::time::Duration;

use crate::domain::topic::Topic;

use super::fetcher::FetchError;

/// Receives registry events. Calls are synchronous and must be cheap.
pub trait SyncObserver: Send + Sync + 'static {
  /// A fetch finished, successfully or not.
  fn fetch_completed(&self, _topic: Topic, _outcome: Result<(), &FetchError>, _latency: Duration) {}

  /// A tick found a fetch already in flight and joined it.
  fn tick_joined(&self, _topic: Topic) {}

  /// The poller armed its timer for the next tick.
  fn next_tick_scheduled(&self, _topic: Topic, _delay: Duration) {}

  /// The derived connection signal after an outcome was folded in.
  fn connection_observed(&self, _connected: bool) {}

  /// A topic's subscriber count changed.
  fn subscribers_changed(&self, _topic: Topic, _count: usize) {}
}

/// Observer that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {}
