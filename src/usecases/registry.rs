//! Sync Registry - The Facade UI Code Talks To
//!
//! Turns many independent consumers' interest in live data into one
//! deduplicated, backoff-aware fetch per topic, fanned out to every
//! subscriber.
//!
//! State model:
//! - One `Mutex<RegistryState>` guards the topic table, the subscriber bus
//!   and the connection monitor. It is held only for short synchronous
//!   sections: never across `.await`, never while callbacks or observer
//!   hooks run.
//! - Deliveries are queued under that lock and run afterwards, in queue
//!   order, so the last connection event a subscriber sees always matches
//!   `get_connection_status()`.
//! - Each fetch runs in its own task. Its `JoinHandle` is wrapped in a
//!   `Shared` future stored as the topic's in-flight marker, so pollers
//!   and one-shot callers join the same call.
//! - Each started topic owns a poller task (see `scheduler`).
//!
//! The registry is constructed once at startup and shared by reference
//! (`Arc<SyncRegistry>`). There is no global instance.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use serde::Serialize;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::bus::{Callback, DeliveryQueue, SubscriberBus, SubscriptionId};
use super::scheduler::{self, SchedulerState, Timer};
use crate::domain::backoff::BackoffPolicy;
use crate::domain::connection::{ConnectionMonitor, ConnectionState};
use crate::domain::topic::{
  AnalyticsData, LiveStats, PlatformStats, Topic, TopicPayload, UnknownTopicKey,
};
use crate::ports::fetcher::{FetchError, TopicFetcher};
use crate::ports::observer::{NoopObserver, SyncObserver};

/// Result of one fetch as seen by every waiter.
pub type FetchOutcome = Result<Arc<TopicPayload>, FetchError>;

/// A fetch that pollers and one-shot callers can all await.
pub type PendingFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Fetchers keyed by the topic they serve.
pub type FetcherMap = HashMap<Topic, Arc<dyn TopicFetcher>>;

/// Misuse of the registry, or a one-shot fetch that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
  /// No fetcher is registered for the topic.
  #[error("no fetcher registered for topic {0}")]
  UnknownTopic(Topic),
  /// A topic key did not parse.
  #[error(transparent)]
  UnknownKey(#[from] UnknownTopicKey),
  /// Updates were requested for a topic nobody listens to.
  #[error("cannot start updates for {0}: no subscribers")]
  NoSubscribers(Topic),
  /// A zero refresh interval would spin.
  #[error("refresh interval for {0} must be greater than zero")]
  InvalidInterval(Topic),
  /// Called outside a Tokio runtime.
  #[error("no Tokio runtime available to drive {0}")]
  NoRuntime(Topic),
  /// A one-shot fetch failed.
  #[error("fetch for {topic} failed: {source}")]
  Fetch {
    topic: Topic,
    #[source]
    source: FetchError,
  },
  /// The cached or fetched payload belongs to another topic.
  #[error("{0} fetcher returned a payload for another topic")]
  PayloadMismatch(Topic),
}

/// Tunables shared by every topic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegistryOptions {
  /// Client-side bound on a single fetch.
  pub fetch_timeout: Duration,
  /// Retry delay policy.
  pub backoff: BackoffPolicy,
  /// Cache lifetime for one-shot accessors on every topic. `None` uses
  /// each topic's own default; zero disables the cache.
  pub cache_ttl: Option<Duration>,
}

impl Default for RegistryOptions {
  fn default() -> Self {
    Self {
      fetch_timeout: Duration::from_secs(10),
      backoff: BackoffPolicy::default(),
      cache_ttl: None,
    }
  }
}

/// Read-only view of one topic, for status pages and tests.
#[derive(Debug, Clone, Serialize)]
pub struct TopicSnapshot {
  pub topic: Topic,
  pub state: SchedulerState,
  /// Requested refresh interval while started.
  pub interval_ms: Option<u64>,
  pub subscribers: usize,
  pub in_flight: bool,
  pub consecutive_failures: u32,
  pub has_value: bool,
  pub cache_ttl_ms: u64,
  pub last_fetched_at: Option<DateTime<Utc>>,
  pub last_error: Option<String>,
}

/// Bookkeeping for one topic.
#[derive(Default)]
struct TopicEntry {
  fetcher: Option<Arc<dyn TopicFetcher>>,
  /// `Some` while updates are started.
  interval: Option<Duration>,
  last_value: Option<Arc<TopicPayload>>,
  last_fetched_at: Option<DateTime<Utc>>,
  /// Monotonic twin of `last_fetched_at`, for cache age.
  last_fetched: Option<Instant>,
  last_error: Option<FetchError>,
  in_flight: Option<PendingFetch>,
  consecutive_failures: u32,
  timer: Option<Timer>,
  /// Per-topic override of the one-shot cache lifetime.
  cache_ttl: Option<Duration>,
}

impl TopicEntry {
  fn cache_ttl(&self, topic: Topic, options: &RegistryOptions) -> Duration {
    self
      .cache_ttl
      .or(options.cache_ttl)
      .unwrap_or_else(|| topic.default_cache_ttl())
  }

  fn scheduler_state(&self) -> SchedulerState {
    SchedulerState::derive(
      self.timer.is_some(),
      self.in_flight.is_some(),
      self.consecutive_failures,
    )
  }

  /// Cancel the timer and forget backoff. Subscribers and cache stay.
  ///
  /// An outstanding fetch keeps its in-flight marker until it resolves,
  /// so a restart joins it rather than issuing a duplicate call.
  fn halt(&mut self) -> Option<Timer> {
    self.interval = None;
    self.consecutive_failures = 0;
    self.timer.take()
  }
}

struct RegistryState {
  topics: HashMap<Topic, TopicEntry>,
  bus: SubscriberBus,
  connection: ConnectionMonitor,
  last_generation: u64,
}

/// Shared core, owned jointly by the facade and its tasks.
pub(crate) struct RegistryInner {
  state: Mutex<RegistryState>,
  delivery: DeliveryQueue,
  options: RegistryOptions,
  observer: Arc<dyn SyncObserver>,
}

impl RegistryInner {
  fn lock(&self) -> MutexGuard<'_, RegistryState> {
    // Callbacks never run under the lock, so a poisoned guard still holds
    // consistent bookkeeping.
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Return the topic's pending fetch, starting one if none is in flight.
  pub(crate) fn begin_fetch(inner: &Arc<Self>, topic: Topic) -> Result<PendingFetch, SyncError> {
    let mut state = inner.lock();
    let entry = state.topics.entry(topic).or_default();

    if let Some(pending) = &entry.in_flight {
      let pending = pending.clone();
      drop(state);
      debug!(topic = %topic, "Fetch already in flight, joining");
      inner.observer.tick_joined(topic);
      return Ok(pending);
    }

    let fetcher = entry
      .fetcher
      .clone()
      .ok_or(SyncError::UnknownTopic(topic))?;

    let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime(topic))?;
    let task_inner = Arc::clone(inner);
    let handle = runtime.spawn(async move { task_inner.run_fetch(topic, fetcher).await });

    let pending = async move {
      handle
        .await
        .unwrap_or_else(|e| Err(FetchError::Aborted(e.to_string())))
    }
    .boxed()
    .shared();

    entry.in_flight = Some(pending.clone());
    Ok(pending)
  }

  /// Perform the network call, then fold the outcome into shared state.
  #[instrument(skip(self, fetcher))]
  async fn run_fetch(&self, topic: Topic, fetcher: Arc<dyn TopicFetcher>) -> FetchOutcome {
    let started = Instant::now();
    let timeout = self.options.fetch_timeout;

    let call = AssertUnwindSafe(fetcher.fetch(topic)).catch_unwind();
    let result = match tokio::time::timeout(timeout, call).await {
      Err(_) => Err(FetchError::Timeout(
        u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
      )),
      Ok(Err(_)) => Err(FetchError::Aborted("fetcher panicked".to_string())),
      Ok(Ok(result)) => result,
    };

    let result = result.and_then(|payload| {
      if payload.topic() == topic {
        Ok(payload)
      } else {
        Err(FetchError::Malformed(format!(
          "expected {topic} payload, got {}",
          payload.topic()
        )))
      }
    });

    let latency = started.elapsed();
    self
      .observer
      .fetch_completed(topic, result.as_ref().map(|_| ()), latency);

    match &result {
      Ok(_) => debug!(latency_ms = latency.as_millis(), "Fetch succeeded"),
      Err(e) => warn!(error = %e, latency_ms = latency.as_millis(), "Fetch failed"),
    }

    self.apply_outcome(topic, result)
  }

  /// Update cache, backoff and connection state, then deliver.
  fn apply_outcome(&self, topic: Topic, result: Result<TopicPayload, FetchError>) -> FetchOutcome {
    let outcome = result.map(Arc::new);

    let (ticket, flipped, connected) = {
      let mut guard = self.lock();
      let state = &mut *guard;
      let entry = state.topics.entry(topic).or_default();
      entry.in_flight = None;

      let mut ticket = None;
      let transition = match &outcome {
        Ok(payload) => {
          entry.last_value = Some(Arc::clone(payload));
          entry.last_fetched_at = Some(Utc::now());
          entry.last_fetched = Some(Instant::now());
          entry.last_error = None;
          entry.consecutive_failures = 0;
          if topic.carries_data() {
            ticket = self
              .delivery
              .push(topic, state.bus.snapshot(topic), Arc::clone(payload));
          }
          state.connection.record_success()
        }
        Err(e) => {
          entry.last_error = Some(e.clone());
          entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
          state.connection.record_failure(e.to_string())
        }
      };

      // Data first, then the transition it caused.
      let flipped = transition.is_some();
      if let Some(event) = transition {
        let event = Arc::new(TopicPayload::Connection(event));
        ticket = self
          .delivery
          .push(Topic::Connection, state.bus.snapshot(Topic::Connection), event)
          .or(ticket);
      }
      (ticket, flipped, state.connection.is_connected())
    };

    self.observer.connection_observed(connected);
    if flipped {
      if connected {
        info!(via = %topic, "Connection to API restored");
      } else {
        warn!(via = %topic, "Lost connection to API");
      }
    }

    if let Some(ticket) = ticket {
      self.delivery.deliver_through(ticket);
    }

    outcome
  }

  /// Delay before the next tick, or `None` if this poller was superseded.
  pub(crate) fn next_delay(&self, topic: Topic, generation: u64) -> Option<Duration> {
    let (delay, failures) = {
      let state = self.lock();
      let entry = state.topics.get(&topic)?;
      let timer = entry.timer.as_ref()?;
      if timer.generation != generation {
        return None;
      }
      let interval = entry.interval?;
      let failures = entry.consecutive_failures;
      (self.options.backoff.delay(interval, failures), failures)
    };

    debug!(
      topic = %topic,
      delay_ms = delay.as_millis(),
      failures,
      "Next tick scheduled"
    );
    self.observer.next_tick_scheduled(topic, delay);
    Some(delay)
  }

  /// Forget a poller that exited on its own.
  pub(crate) fn release_timer(&self, topic: Topic, generation: u64) {
    let mut state = self.lock();
    if let Some(entry) = state.topics.get_mut(&topic) {
      if entry.timer.as_ref().is_some_and(|t| t.generation == generation) {
        entry.timer = None;
        entry.interval = None;
      }
    }
  }

  /// Remove a subscription; tears the topic's timer down if it was the last.
  fn unsubscribe(&self, id: SubscriptionId) -> bool {
    let (removed, timer, topic, remaining) = {
      let mut guard = self.lock();
      let state = &mut *guard;
      match state.bus.remove(id) {
        None => return false,
        Some((topic, remaining, callback)) => {
          let timer = if remaining == 0 {
            state.topics.get_mut(&topic).and_then(TopicEntry::halt)
          } else {
            None
          };
          debug!(topic = %topic, id = %id, remaining, "Unsubscribed");
          if timer.is_some() {
            info!(topic = %topic, "Last subscriber left, stopping updates");
          }
          (callback, timer, topic, remaining)
        }
      }
    };

    self.observer.subscribers_changed(topic, remaining);
    if let Some(timer) = timer {
      timer.cancel();
    }
    // Dropped outside the lock: it may own a handle that re-enters.
    drop(removed);
    true
  }
}

/// Disposable handle for one subscription.
///
/// Dropping the handle unsubscribes. `unsubscribe` does the same
/// explicitly and is idempotent. Use `detach` to keep the callback
/// registered without holding the handle.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
  id: SubscriptionId,
  topic: Topic,
  registry: Weak<RegistryInner>,
  active: AtomicBool,
}

impl Subscription {
  pub const fn id(&self) -> SubscriptionId {
    self.id
  }

  pub const fn topic(&self) -> Topic {
    self.topic
  }

  /// Whether this handle still owns a live subscription.
  pub fn is_active(&self) -> bool {
    self.active.load(Ordering::Acquire)
  }

  /// Remove the subscription. Returns `false` if it was already removed.
  pub fn unsubscribe(&self) -> bool {
    if !self.active.swap(false, Ordering::AcqRel) {
      return false;
    }
    self
      .registry
      .upgrade()
      .is_some_and(|inner| inner.unsubscribe(self.id))
  }

  /// Give up the handle but keep the callback registered.
  ///
  /// The id can still be passed to [`SyncRegistry::unsubscribe`].
  pub fn detach(self) -> SubscriptionId {
    self.active.store(false, Ordering::Release);
    self.id
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.unsubscribe();
  }
}

impl std::fmt::Debug for Subscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("id", &self.id)
      .field("topic", &self.topic)
      .field("active", &self.is_active())
      .finish()
  }
}

/// Process-wide registry of live topics.
pub struct SyncRegistry {
  inner: Arc<RegistryInner>,
}

impl SyncRegistry {
  /// Create a registry with the given fetchers.
  pub fn new(fetchers: FetcherMap, options: RegistryOptions) -> Self {
    Self::with_observer(fetchers, options, Arc::new(NoopObserver))
  }

  /// Create a registry that reports to `observer`.
  pub fn with_observer(
    fetchers: FetcherMap,
    options: RegistryOptions,
    observer: Arc<dyn SyncObserver>,
  ) -> Self {
    let topics = fetchers
      .into_iter()
      .map(|(topic, fetcher)| {
        let entry = TopicEntry {
          fetcher: Some(fetcher),
          ..TopicEntry::default()
        };
        (topic, entry)
      })
      .collect();

    Self {
      inner: Arc::new(RegistryInner {
        state: Mutex::new(RegistryState {
          topics,
          bus: SubscriberBus::new(),
          connection: ConnectionMonitor::new(),
          last_generation: 0,
        }),
        delivery: DeliveryQueue::new(),
        options,
        observer,
      }),
    }
  }

  pub fn options(&self) -> &RegistryOptions {
    &self.inner.options
  }

  /// Install or replace the fetcher for `topic`.
  pub fn register_fetcher(&self, topic: Topic, fetcher: Arc<dyn TopicFetcher>) {
    let previous = {
      let mut state = self.inner.lock();
      state.topics.entry(topic).or_default().fetcher.replace(fetcher)
    };
    info!(topic = %topic, replaced = previous.is_some(), "Fetcher registered");
  }

  /// Override how long `topic`'s cached value satisfies one-shot reads.
  ///
  /// `None` falls back to `RegistryOptions::cache_ttl`, then to
  /// `Topic::default_cache_ttl`.
  pub fn set_cache_ttl(&self, topic: Topic, ttl: Option<Duration>) {
    self.inner.lock().topics.entry(topic).or_default().cache_ttl = ttl;
  }

  /// Cache lifetime currently in effect for `topic`.
  pub fn cache_ttl(&self, topic: Topic) -> Duration {
    let state = self.inner.lock();
    state.topics.get(&topic).map_or_else(
      || {
        self
          .inner
          .options
          .cache_ttl
          .unwrap_or_else(|| topic.default_cache_ttl())
      },
      |entry| entry.cache_ttl(topic, &self.inner.options),
    )
  }

  /// Register `callback` for `topic`.
  ///
  /// If the topic already holds a value, the callback receives it before
  /// this returns. For the connection topic, a settled connection state
  /// is delivered the same way. Called from inside another callback, the
  /// backfill runs right after that callback returns instead.
  pub fn subscribe<F>(&self, topic: Topic, callback: F) -> Subscription
  where
    F: Fn(Arc<TopicPayload>) + Send + Sync + 'static,
  {
    let callback: Callback = Arc::new(callback);

    let (id, ticket, count) = {
      let mut guard = self.inner.lock();
      let state = &mut *guard;
      let id = state.bus.add(topic, Arc::clone(&callback));
      let entry = state.topics.get(&topic);

      if topic.carries_data() && entry.and_then(|e| e.fetcher.as_ref()).is_none() {
        warn!(topic = %topic, "Subscribed to a topic with no fetcher yet");
      }

      let backfill = if topic.carries_data() {
        entry.and_then(|e| e.last_value.clone())
      } else {
        let connection = state.connection.state();
        connection
          .settled
          .then(|| Arc::new(TopicPayload::Connection(connection.as_event())))
      };

      debug!(topic = %topic, id = %id, backfill = backfill.is_some(), "Subscribed");
      let ticket = backfill.and_then(|payload| {
        self
          .inner
          .delivery
          .push(topic, vec![Arc::clone(&callback)], payload)
      });
      (id, ticket, state.bus.count(topic))
    };

    self.inner.observer.subscribers_changed(topic, count);
    if let Some(ticket) = ticket {
      self.inner.delivery.deliver_through(ticket);
    }

    Subscription {
      id,
      topic,
      registry: Arc::downgrade(&self.inner),
      active: AtomicBool::new(true),
    }
  }

  /// Remove a subscription by id. Idempotent.
  pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
    self.inner.unsubscribe(id)
  }

  /// Start periodic updates for `topic`, fetching immediately.
  ///
  /// Calling again while running only changes the interval used for the
  /// next tick; it never creates a second timer.
  ///
  /// # Errors
  /// `InvalidInterval` for a zero interval, `UnknownTopic` if no fetcher
  /// is registered, `NoSubscribers` if nobody listens, `NoRuntime` when
  /// called outside Tokio.
  pub fn start_real_time_updates(&self, topic: Topic, interval: Duration) -> Result<(), SyncError> {
    let result = self.try_start(topic, interval);
    if let Err(e) = &result {
      error!(topic = %topic, error = %e, "Cannot start real-time updates");
    }
    result
  }

  fn try_start(&self, topic: Topic, interval: Duration) -> Result<(), SyncError> {
    if interval.is_zero() {
      return Err(SyncError::InvalidInterval(topic));
    }
    let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime(topic))?;

    let mut guard = self.inner.lock();
    let state = &mut *guard;
    let subscribers = state.bus.count(topic);
    let entry = state.topics.entry(topic).or_default();

    if entry.fetcher.is_none() {
      return Err(SyncError::UnknownTopic(topic));
    }
    if subscribers == 0 {
      return Err(SyncError::NoSubscribers(topic));
    }

    let previous = entry.interval.replace(interval);
    if entry.timer.is_some() {
      if previous != Some(interval) {
        info!(
          topic = %topic,
          interval_ms = interval.as_millis(),
          "Refresh interval updated"
        );
      }
      return Ok(());
    }

    state.last_generation += 1;
    let generation = state.last_generation;
    let handle = runtime.spawn(scheduler::poll_topic(
      Arc::clone(&self.inner),
      topic,
      generation,
    ));
    entry.timer = Some(Timer { handle, generation });

    info!(
      topic = %topic,
      interval_ms = interval.as_millis(),
      subscribers,
      "Real-time updates started"
    );
    Ok(())
  }

  /// Stop periodic updates for `topic`. Subscribers stay registered.
  pub fn stop_real_time_updates(&self, topic: Topic) {
    let timer = {
      let mut state = self.inner.lock();
      state.topics.get_mut(&topic).and_then(TopicEntry::halt)
    };
    if let Some(timer) = timer {
      timer.cancel();
      info!(topic = %topic, "Real-time updates stopped");
    }
  }

  /// Current derived connection signal. Never fetches.
  pub fn get_connection_status(&self) -> bool {
    self.inner.lock().connection.is_connected()
  }

  /// Full connection state snapshot.
  pub fn connection_state(&self) -> ConnectionState {
    self.inner.lock().connection.state()
  }

  /// Scheduler state of `topic`.
  pub fn scheduler_state(&self, topic: Topic) -> SchedulerState {
    self
      .inner
      .lock()
      .topics
      .get(&topic)
      .map_or(SchedulerState::Idle, TopicEntry::scheduler_state)
  }

  /// Bookkeeping of `topic`, if it has ever been touched.
  pub fn topic_snapshot(&self, topic: Topic) -> Option<TopicSnapshot> {
    let state = self.inner.lock();
    let subscribers = state.bus.count(topic);
    let entry = state.topics.get(&topic)?;
    Some(TopicSnapshot {
      topic,
      state: entry.scheduler_state(),
      interval_ms: entry
        .interval
        .map(|i| u64::try_from(i.as_millis()).unwrap_or(u64::MAX)),
      subscribers,
      in_flight: entry.in_flight.is_some(),
      consecutive_failures: entry.consecutive_failures,
      has_value: entry.last_value.is_some(),
      cache_ttl_ms: u64::try_from(entry.cache_ttl(topic, &self.inner.options).as_millis())
        .unwrap_or(u64::MAX),
      last_fetched_at: entry.last_fetched_at,
      last_error: entry.last_error.as_ref().map(ToString::to_string),
    })
  }

  /// Snapshots of every known topic, in `Topic::ALL` order.
  pub fn topic_snapshots(&self) -> Vec<TopicSnapshot> {
    Topic::ALL
      .into_iter()
      .filter_map(|t| self.topic_snapshot(t))
      .collect()
  }

  /// Last cached payload of `topic`, if any.
  pub fn last_value(&self, topic: Topic) -> Option<Arc<TopicPayload>> {
    self
      .inner
      .lock()
      .topics
      .get(&topic)
      .and_then(|e| e.last_value.clone())
  }

  /// One fetch-and-cache cycle outside the scheduler.
  ///
  /// Served from cache while younger than the topic's cache TTL; otherwise joins the
  /// in-flight call if there is one, or starts a new one.
  async fn fetch_now(&self, topic: Topic, allow_cache: bool) -> Result<Arc<TopicPayload>, SyncError> {
    if allow_cache {
      if let Some(cached) = self.fresh_value(topic) {
        debug!(topic = %topic, "Serving one-shot from cache");
        return Ok(cached);
      }
    }

    let pending = RegistryInner::begin_fetch(&self.inner, topic)?;
    pending
      .await
      .map_err(|source| SyncError::Fetch { topic, source })
  }

  fn fresh_value(&self, topic: Topic) -> Option<Arc<TopicPayload>> {
    let state = self.inner.lock();
    let entry = state.topics.get(&topic)?;
    let ttl = entry.cache_ttl(topic, &self.inner.options);
    if ttl.is_zero() {
      return None;
    }
    let fetched = entry.last_fetched?;
    (fetched.elapsed() < ttl)
      .then(|| entry.last_value.clone())
      .flatten()
  }

  /// Fetch live stats once.
  ///
  /// # Errors
  /// `SyncError::Fetch` if the call fails, `UnknownTopic` without a fetcher.
  pub async fn get_live_stats(&self) -> Result<LiveStats, SyncError> {
    let payload = self.fetch_now(Topic::LiveStats, true).await?;
    payload
      .as_live_stats()
      .cloned()
      .ok_or(SyncError::PayloadMismatch(Topic::LiveStats))
  }

  /// Fetch the analytics document once.
  ///
  /// # Errors
  /// `SyncError::Fetch` if the call fails, `UnknownTopic` without a fetcher.
  pub async fn get_analytics_data(&self) -> Result<AnalyticsData, SyncError> {
    let payload = self.fetch_now(Topic::Analytics, true).await?;
    payload
      .as_analytics()
      .cloned()
      .ok_or(SyncError::PayloadMismatch(Topic::Analytics))
  }

  /// Fetch platform stats once.
  ///
  /// # Errors
  /// `SyncError::Fetch` if the call fails, `UnknownTopic` without a fetcher.
  pub async fn get_platform_stats(&self) -> Result<PlatformStats, SyncError> {
    let payload = self.fetch_now(Topic::PlatformStats, true).await?;
    payload
      .as_platform_stats()
      .cloned()
      .ok_or(SyncError::PayloadMismatch(Topic::PlatformStats))
  }

  /// Run one health probe and report whether it succeeded.
  ///
  /// The outcome feeds the connection monitor like any fetch.
  ///
  /// # Errors
  /// `UnknownTopic` if no fetcher serves `Topic::Connection`.
  pub async fn check_connection(&self) -> Result<bool, SyncError> {
    match self.fetch_now(Topic::Connection, false).await {
      Ok(_) => Ok(true),
      Err(SyncError::Fetch { .. }) => Ok(false),
      Err(e) => Err(e),
    }
  }
}

impl Drop for SyncRegistry {
  fn drop(&mut self) {
    let timers: Vec<Timer> = {
      let mut state = self.inner.lock();
      state
        .topics
        .values_mut()
        .filter_map(TopicEntry::halt)
        .collect()
    };
    for timer in timers {
      timer.cancel();
    }
  }
}

impl std::fmt::Debug for SyncRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SyncRegistry")
      .field("options", &self.inner.options)
      .field("connected", &self.get_connection_status())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::topic::{HealthReport, LiveStats};
  use async_trait::async_trait;

  struct Fixed(TopicPayload);

  #[async_trait]
  impl TopicFetcher for Fixed {
    async fn fetch(&self, _topic: Topic) -> Result<TopicPayload, FetchError> {
      Ok(self.0.clone())
    }
  }

  fn stats(n: u64) -> TopicPayload {
    TopicPayload::LiveStats(LiveStats {
      active_subscriptions: n,
      monthly_api_calls: 0,
      platform_uptime: "99.9%".to_string(),
      avg_response_time: "1.2s".to_string(),
    })
  }

  #[test]
  fn test_start_without_fetcher_is_rejected() {
    let rt = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .unwrap();
    let _guard = rt.enter();

    let registry = SyncRegistry::new(FetcherMap::new(), RegistryOptions::default());
    let _sub = registry.subscribe(Topic::LiveStats, |_| {});
    assert_eq!(
      registry.start_real_time_updates(Topic::LiveStats, Duration::from_secs(5)),
      Err(SyncError::UnknownTopic(Topic::LiveStats))
    );
  }

  #[test]
  fn test_start_outside_runtime_is_rejected() {
    let mut fetchers = FetcherMap::new();
    fetchers.insert(Topic::LiveStats, Arc::new(Fixed(stats(1))) as Arc<dyn TopicFetcher>);
    let registry = SyncRegistry::new(fetchers, RegistryOptions::default());
    let _sub = registry.subscribe(Topic::LiveStats, |_| {});
    assert_eq!(
      registry.start_real_time_updates(Topic::LiveStats, Duration::from_secs(5)),
      Err(SyncError::NoRuntime(Topic::LiveStats))
    );
  }

  #[test]
  fn test_zero_interval_is_rejected() {
    let registry = SyncRegistry::new(FetcherMap::new(), RegistryOptions::default());
    assert_eq!(
      registry.start_real_time_updates(Topic::Analytics, Duration::ZERO),
      Err(SyncError::InvalidInterval(Topic::Analytics))
    );
  }

  #[tokio::test]
  async fn test_wrong_variant_is_treated_as_malformed() {
    let mut fetchers = FetcherMap::new();
    fetchers.insert(
      Topic::Analytics,
      Arc::new(Fixed(TopicPayload::Health(HealthReport { status: None }))) as Arc<dyn TopicFetcher>,
    );
    let registry = SyncRegistry::new(fetchers, RegistryOptions::default());

    let err = registry.get_analytics_data().await.unwrap_err();
    assert!(matches!(
      err,
      SyncError::Fetch {
        source: FetchError::Malformed(_),
        ..
      }
    ));
    assert!(registry.last_value(Topic::Analytics).is_none());
  }

  #[tokio::test]
  async fn test_one_shot_populates_cache() {
    let mut fetchers = FetcherMap::new();
    fetchers.insert(Topic::LiveStats, Arc::new(Fixed(stats(42))) as Arc<dyn TopicFetcher>);
    let registry = SyncRegistry::new(fetchers, RegistryOptions::default());

    let live = registry.get_live_stats().await.unwrap();
    assert_eq!(live.active_subscriptions, 42);
    let snapshot = registry.topic_snapshot(Topic::LiveStats).unwrap();
    assert!(snapshot.has_value);
    assert!(!snapshot.in_flight);
    assert_eq!(snapshot.state, SchedulerState::Idle);
    assert!(registry.get_connection_status());
  }
}
