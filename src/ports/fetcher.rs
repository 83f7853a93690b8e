//! Topic Fetcher Port - One Network Call per Topic
//!
//! The registry never talks HTTP itself. Each topic is backed by a
//! `TopicFetcher` that performs a single idempotent GET-style call and
//! either returns a typed payload or fails. Every failure mode (timeout,
//! non-2xx, transport, schema mismatch) comes back as a `FetchError`,
//! which the registry turns into backoff and connection state.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::topic::{Topic, TopicPayload};

/// Why a single fetch did not produce a usable payload.
///
/// Cloneable so one outcome can be handed to every waiter of a shared
/// in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
  /// The call did not finish within the client-side timeout.
  #[error("request timed out after {0} ms")]
  Timeout(u64),
  /// The server answered with a non-2xx status.
  #[error("API error: {status} {reason}")]
  Status {
    /// HTTP status code.
    status: u16,
    /// Reason phrase or response body excerpt.
    reason: String,
  },
  /// Connection refused, DNS failure, TLS failure, ...
  #[error("transport error: {0}")]
  Transport(String),
  /// The body did not match the topic's schema.
  #[error("malformed payload: {0}")]
  Malformed(String),
  /// The fetch task was cancelled or panicked before resolving.
  #[error("fetch aborted: {0}")]
  Aborted(String),
}

impl FetchError {
  /// Whether the error came from the network rather than the payload.
  pub const fn is_transient(&self) -> bool {
    !matches!(self, Self::Malformed(_))
  }

  /// Short label used for metrics.
  pub const fn kind(&self) -> &'static str {
    match self {
      Self::Timeout(_) => "timeout",
      Self::Status { .. } => "status",
      Self::Transport(_) => "transport",
      Self::Malformed(_) => "malformed",
      Self::Aborted(_) => "aborted",
    }
  }
}

/// External collaborator that fetches one topic's payload.
///
/// Implementations must be side-effect free: the registry may call
/// `fetch` on every tick for as long as the topic is active.
#[async_trait]
pub trait TopicFetcher: Send + Sync + 'static {
  /// Perform one fetch for `topic`.
  ///
  /// The returned payload must be the variant belonging to `topic`.
  async fn fetch(&self, topic: Topic) -> Result<TopicPayload, FetchError>;
}
