//! Metrics and Monitoring Adapters
//!
//! Provides Prometheus metrics export and health/status endpoints
//! (/live, /ready, /status) via axum 0.7.

pub mod exporter;
pub mod health;

pub use exporter::SyncMetrics;
pub use health::HealthServer;
