//! Use Cases Layer - Real-time Synchronization
//!
//! Orchestrates the domain pieces (backoff, connection monitor) with the
//! fetcher port to keep every subscribed topic fresh.
//!
//! Use cases:
//! - `SyncRegistry`: facade for subscribe / start / stop / one-shot reads
//! - `scheduler`: one poller task per active topic
//! - `bus`: per-topic subscriber fan-out

pub mod bus;
pub mod registry;
pub mod scheduler;

pub use bus::{Callback, SubscriptionId};
pub use registry::{
    FetchOutcome, FetcherMap, RegistryOptions, Subscription, SyncError, SyncRegistry,
    TopicSnapshot,
};
pub use scheduler::SchedulerState;
