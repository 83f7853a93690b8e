//! Domain layer - Topics, payloads, backoff and connection state.
//!
//! Pure logic with no I/O (hexagonal architecture inner ring).
//! Everything here is deterministic given its inputs, except that
//! `BackoffPolicy::delay` draws jitter from the thread-local RNG.

pub mod backoff;
pub mod connection;
pub mod topic;

// Re-export core types for convenience
pub use backoff::BackoffPolicy;
pub use connection::{ConnectionMonitor, ConnectionState};
pub use topic::{
    AnalyticsData, ConnectionErrorInfo, ConnectionEvent, HealthReport, LiveStats,
    ModelUsage, PlatformStats, SystemHealth, Topic, TopicPayload, UserTiers,
};
