//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP client, Prometheus, axum).
//!
//! Adapter categories:
//! - `api`: Scalix REST API client and the HTTP topic fetcher
//! - `metrics`: Prometheus metrics export and health/status checks

pub mod api;
pub mod metrics;
