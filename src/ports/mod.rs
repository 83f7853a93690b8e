//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the registry requires from
//! the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `TopicFetcher`: one network call per topic
//! - `SyncObserver`: instrumentation hooks (metrics)

pub mod fetcher;
pub mod observer;

pub use fetcher::{FetchError, TopicFetcher};
pub use observer::{NoopObserver, SyncObserver};
