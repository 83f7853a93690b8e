//! Subscriber Bus - Per-topic Callback Fan-out
//!
//! Holds an insertion-ordered list of callbacks per topic. Delivery never
//! happens while the registry lock is held: callers take a `snapshot`,
//! release the lock, then `dispatch`. A callback that subscribes or
//! unsubscribes during delivery therefore cannot disturb the current pass.
//!
//! Deliveries are queued while the registry lock is still held and run in
//! queue order by one thread at a time (`DeliveryQueue`), so subscribers
//! see payloads and connection events in the order the state changed.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::error;

use crate::domain::topic::{Topic, TopicPayload};

/// Subscriber callback. Receives the same `Arc` as every other
/// subscriber of the tick.
pub type Callback = Arc<dyn Fn(Arc<TopicPayload>) + Send + Sync>;

/// Unique identifier of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "sub-{}", self.0)
  }
}

struct Subscriber {
  id: SubscriptionId,
  callback: Callback,
}

/// Topic → ordered subscribers.
#[derive(Default)]
pub struct SubscriberBus {
  topics: HashMap<Topic, Vec<Subscriber>>,
  /// Last issued id; ids start at 1.
  last_id: u64,
}

impl SubscriberBus {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `callback` on `topic` and return its id.
  pub fn add(&mut self, topic: Topic, callback: Callback) -> SubscriptionId {
    self.last_id += 1;
    let id = SubscriptionId(self.last_id);
    self.topics.entry(topic).or_default().push(Subscriber { id, callback });
    id
  }

  /// Remove a subscription.
  ///
  /// Returns the topic, the number of subscribers left on it, and the
  /// removed callback. The callback is handed back so the caller can drop
  /// it after releasing any lock, since it may own a subscription handle
  /// whose `Drop` re-enters the registry.
  pub fn remove(&mut self, id: SubscriptionId) -> Option<(Topic, usize, Callback)> {
    let (topic, subscribers) = self
      .topics
      .iter_mut()
      .find(|(_, subs)| subs.iter().any(|s| s.id == id))?;
    let topic = *topic;

    let pos = subscribers.iter().position(|s| s.id == id)?;
    let removed = subscribers.remove(pos);
    let remaining = subscribers.len();
    if remaining == 0 {
      self.topics.remove(&topic);
    }

    Some((topic, remaining, removed.callback))
  }

  /// Number of subscribers on `topic`.
  pub fn count(&self, topic: Topic) -> usize {
    self.topics.get(&topic).map_or(0, Vec::len)
  }

  /// Copy of the current callbacks for `topic`, in insertion order.
  pub fn snapshot(&self, topic: Topic) -> Vec<Callback> {
    self
      .topics
      .get(&topic)
      .map(|subs| subs.iter().map(|s| Arc::clone(&s.callback)).collect())
      .unwrap_or_default()
  }
}

/// Deliver `payload` to every callback in `callbacks`.
///
/// A panicking callback is logged and skipped; the rest still receive the
/// payload. Returns how many callbacks completed normally.
pub fn dispatch(topic: Topic, callbacks: &[Callback], payload: &Arc<TopicPayload>) -> usize {
  let mut delivered = 0;
  for callback in callbacks {
    let result = catch_unwind(AssertUnwindSafe(|| callback(Arc::clone(payload))));
    match result {
      Ok(()) => delivered += 1,
      Err(_) => error!(topic = %topic, "Subscriber callback panicked"),
    }
  }
  delivered
}

/// Position of a queued delivery. Deliveries complete in ticket order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

struct Delivery {
  topic: Topic,
  callbacks: Vec<Callback>,
  payload: Arc<TopicPayload>,
}

#[derive(Default)]
struct QueueState {
  pending: VecDeque<Delivery>,
  enqueued: u64,
  delivered: u64,
  /// Thread currently running callbacks, if any.
  drainer: Option<ThreadId>,
}

/// FIFO of deliveries, drained by one thread at a time.
///
/// `push` is called under the registry lock, which fixes the order.
/// `deliver_through` is called after the lock is released: it runs queued
/// deliveries itself, or waits for the thread that is already doing so.
/// A callback that causes a new delivery (e.g. a backfill from a nested
/// `subscribe`) does not wait for it; the running drain picks it up after
/// the callback returns.
#[derive(Default)]
pub struct DeliveryQueue {
  state: Mutex<QueueState>,
  progressed: Condvar,
}

impl DeliveryQueue {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, QueueState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Queue `payload` for `callbacks`. Returns `None` if there is nobody
  /// to deliver to.
  pub fn push(
    &self,
    topic: Topic,
    callbacks: Vec<Callback>,
    payload: Arc<TopicPayload>,
  ) -> Option<Ticket> {
    if callbacks.is_empty() {
      return None;
    }
    let mut state = self.lock();
    state.pending.push_back(Delivery {
      topic,
      callbacks,
      payload,
    });
    state.enqueued += 1;
    Some(Ticket(state.enqueued))
  }

  /// Return once every delivery up to `ticket` has run, unless called from
  /// inside a callback of this queue.
  pub fn deliver_through(&self, ticket: Ticket) {
    let me = thread::current().id();
    let mut state = self.lock();
    loop {
      if state.delivered >= ticket.0 {
        return;
      }
      match state.drainer {
        Some(drainer) if drainer == me => return,
        Some(_) => {
          state = self
            .progressed
            .wait(state)
            .unwrap_or_else(PoisonError::into_inner);
        }
        None => break,
      }
    }

    state.drainer = Some(me);
    while let Some(delivery) = state.pending.pop_front() {
      drop(state);
      dispatch(delivery.topic, &delivery.callbacks, &delivery.payload);
      // Callbacks released outside the queue lock; they may own handles.
      drop(delivery);
      state = self.lock();
      state.delivered += 1;
      self.progressed.notify_all();
    }
    state.drainer = None;
    drop(state);
    self.progressed.notify_all();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::topic::{ConnectionEvent, TopicPayload};

  fn event(connected: bool) -> Arc<TopicPayload> {
    Arc::new(TopicPayload::Connection(ConnectionEvent {
      connected,
      error: None,
    }))
  }

  fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Callback {
    let log = Arc::clone(log);
    Arc::new(move |_: Arc<TopicPayload>| log.lock().unwrap().push(name))
  }

  #[test]
  fn test_ids_are_unique_and_increasing() {
    let mut bus = SubscriberBus::new();
    let a = bus.add(Topic::LiveStats, Arc::new(|_: Arc<TopicPayload>| {}));
    let b = bus.add(Topic::Analytics, Arc::new(|_: Arc<TopicPayload>| {}));
    assert!(b > a);
  }

  #[test]
  fn test_dispatch_in_insertion_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut bus = SubscriberBus::new();
    bus.add(Topic::Connection, recorder(&log, "first"));
    bus.add(Topic::Connection, recorder(&log, "second"));
    bus.add(Topic::Connection, recorder(&log, "third"));

    let delivered = dispatch(Topic::Connection, &bus.snapshot(Topic::Connection), &event(true));
    assert_eq!(delivered, 3);
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
  }

  #[test]
  fn test_remove_reports_remaining_and_is_idempotent() {
    let mut bus = SubscriberBus::new();
    let a = bus.add(Topic::LiveStats, Arc::new(|_: Arc<TopicPayload>| {}));
    let b = bus.add(Topic::LiveStats, Arc::new(|_: Arc<TopicPayload>| {}));

    let (topic, remaining, _) = bus.remove(a).unwrap();
    assert_eq!(topic, Topic::LiveStats);
    assert_eq!(remaining, 1);
    assert!(bus.remove(a).is_none());

    let (_, remaining, _) = bus.remove(b).unwrap();
    assert_eq!(remaining, 0);
    assert_eq!(bus.count(Topic::LiveStats), 0);
  }

  #[test]
  fn test_snapshot_is_unaffected_by_later_removal() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut bus = SubscriberBus::new();
    let a = bus.add(Topic::Analytics, recorder(&log, "a"));
    bus.add(Topic::Analytics, recorder(&log, "b"));

    let snapshot = bus.snapshot(Topic::Analytics);
    bus.remove(a);
    dispatch(Topic::Analytics, &snapshot, &event(false));

    assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
  }

  #[test]
  fn test_queue_delivers_in_push_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let queue = DeliveryQueue::new();
    let first = queue.push(Topic::Connection, vec![recorder(&log, "first")], event(true));
    let second = queue.push(Topic::Connection, vec![recorder(&log, "second")], event(false));
    assert!(queue.push(Topic::Connection, Vec::new(), event(true)).is_none());

    queue.deliver_through(second.unwrap());
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);

    // Already delivered: returns without running anything.
    queue.deliver_through(first.unwrap());
    assert_eq!(log.lock().unwrap().len(), 2);
  }

  #[test]
  fn test_nested_push_runs_after_the_current_callback() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let queue = Arc::new(DeliveryQueue::new());

    let nested_log = Arc::clone(&log);
    let nested_queue = Arc::downgrade(&queue);
    let outer: Callback = Arc::new(move |_: Arc<TopicPayload>| {
      nested_log.lock().unwrap().push("outer start");
      if let Some(queue) = nested_queue.upgrade() {
        let inner = recorder(&nested_log, "inner");
        let ticket = queue.push(Topic::LiveStats, vec![inner], event(true)).unwrap();
        queue.deliver_through(ticket);
      }
      nested_log.lock().unwrap().push("outer end");
    });

    let ticket = queue.push(Topic::LiveStats, vec![outer], event(true)).unwrap();
    queue.deliver_through(ticket);

    assert_eq!(*log.lock().unwrap(), vec!["outer start", "outer end", "inner"]);
  }

  #[test]
  fn test_concurrent_callers_keep_queue_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let queue = Arc::new(DeliveryQueue::new());

    let slow_log = Arc::clone(&log);
    let slow: Callback = Arc::new(move |_: Arc<TopicPayload>| {
      std::thread::sleep(std::time::Duration::from_millis(100));
      slow_log.lock().unwrap().push("slow");
    });
    let first = queue.push(Topic::LiveStats, vec![slow], event(true)).unwrap();

    let drainer = {
      let queue = Arc::clone(&queue);
      std::thread::spawn(move || queue.deliver_through(first))
    };
    std::thread::sleep(std::time::Duration::from_millis(20));

    let second = queue.push(Topic::Connection, vec![recorder(&log, "fast")], event(false)).unwrap();
    queue.deliver_through(second);

    assert_eq!(*log.lock().unwrap(), vec!["slow", "fast"]);
    drainer.join().unwrap();
  }

  #[test]
  fn test_panicking_callback_does_not_stop_fan_out() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let callbacks: Vec<Callback> = vec![
      Arc::new(|_: Arc<TopicPayload>| panic!("render failed")),
      recorder(&log, "survivor"),
    ];

    let delivered = dispatch(Topic::LiveStats, &callbacks, &event(true));
    assert_eq!(delivered, 1);
    assert_eq!(*log.lock().unwrap(), vec!["survivor"]);
  }
}
