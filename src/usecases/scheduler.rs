//! Poller/Scheduler - One Timer per Active Topic
//!
//! Each started topic with at least one subscriber owns one poller task.
//! The task is the topic's timer: it fetches immediately on activation,
//! then sleeps for either the configured interval (after a success) or the
//! backoff delay (after a failure) before the next tick.
//!
//! A tick never starts a second fetch while one is pending. It joins the
//! pending call instead, and that call's resolution drives the next
//! scheduling decision. Aborting the poller (stop, or last unsubscribe)
//! cancels the timer but not a fetch already on the wire.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use super::registry::RegistryInner;
use crate::domain::topic::Topic;

/// Per-topic scheduler state.
///
/// `Idle -> Scheduled -> Fetching -> {Scheduled | Backoff}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
  /// Stopped, or nobody is subscribed.
  Idle,
  /// Waiting for the next regular tick.
  Scheduled,
  /// A fetch is on the wire.
  Fetching,
  /// Waiting for a retry after one or more failures.
  Backoff,
}

impl SchedulerState {
  /// Derive the state from the topic's bookkeeping.
  pub const fn derive(timer_armed: bool, in_flight: bool, consecutive_failures: u32) -> Self {
    if !timer_armed {
      Self::Idle
    } else if in_flight {
      Self::Fetching
    } else if consecutive_failures > 0 {
      Self::Backoff
    } else {
      Self::Scheduled
    }
  }
}

/// A running poller task.
///
/// The generation distinguishes this poller from earlier ones for the same
/// topic, so a poller that was replaced never re-arms itself.
#[derive(Debug)]
pub(crate) struct Timer {
  pub(crate) handle: JoinHandle<()>,
  pub(crate) generation: u64,
}

impl Timer {
  pub(crate) fn cancel(self) {
    self.handle.abort();
  }
}

/// Poller loop for one topic.
#[instrument(skip(inner))]
pub(crate) async fn poll_topic(inner: Arc<RegistryInner>, topic: Topic, generation: u64) {
  loop {
    let pending = match RegistryInner::begin_fetch(&inner, topic) {
      Ok(pending) => pending,
      Err(e) => {
        error!(error = %e, "Poller cannot fetch, stopping");
        inner.release_timer(topic, generation);
        return;
      }
    };

    // Outcome already applied by the fetch task; only timing matters here.
    let _ = pending.await;

    let Some(delay) = inner.next_delay(topic, generation) else {
      debug!("Poller superseded, exiting");
      return;
    };
    tokio::time::sleep(delay).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_state_derivation() {
    assert_eq!(SchedulerState::derive(false, true, 3), SchedulerState::Idle);
    assert_eq!(SchedulerState::derive(true, true, 0), SchedulerState::Fetching);
    assert_eq!(SchedulerState::derive(true, false, 2), SchedulerState::Backoff);
    assert_eq!(SchedulerState::derive(true, false, 0), SchedulerState::Scheduled);
  }
}
