//! Connection Monitor - One Global Connected/Disconnected Signal
//!
//! Folds the outcome of every completed fetch, across all topics, into a
//! single `ConnectionState`. Only edges are announced: a flip from
//! connected to disconnected (or back) yields a `ConnectionEvent`, repeated
//! outcomes in the same state do not.

use serde::Serialize;

use super::topic::{ConnectionErrorInfo, ConnectionEvent};

/// Snapshot of the derived connection signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    /// Whether the most recent outcome was a success.
    pub connected: bool,
    /// Message of the most recent failure, cleared on success.
    pub last_error: Option<String>,
    /// Failures since the last success.
    pub retry_count: u32,
    /// Whether any outcome has been observed yet.
    pub settled: bool,
}

impl ConnectionState {
    /// The event a late subscriber should see for this state.
    pub fn as_event(&self) -> ConnectionEvent {
        ConnectionEvent {
            connected: self.connected,
            error: self.last_error.as_ref().map(|message| ConnectionErrorInfo {
                message: message.clone(),
            }),
        }
    }
}

/// Edge-triggered connection monitor.
///
/// Starts disconnected and unsettled. The first observed outcome sets the
/// baseline without an announcement; every later flip is announced.
#[derive(Debug, Clone)]
pub struct ConnectionMonitor {
    state: ConnectionState,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMonitor {
    pub const fn new() -> Self {
        Self {
            state: ConnectionState {
                connected: false,
                last_error: None,
                retry_count: 0,
                settled: false,
            },
        }
    }

    pub const fn is_connected(&self) -> bool {
        self.state.connected
    }

    pub fn state(&self) -> ConnectionState {
        self.state.clone()
    }

    /// Record a successful fetch on any topic.
    ///
    /// Returns the event to broadcast if this was a disconnected→connected flip.
    pub fn record_success(&mut self) -> Option<ConnectionEvent> {
        let was_settled = self.state.settled;
        let was_connected = self.state.connected;

        self.state.connected = true;
        self.state.retry_count = 0;
        self.state.last_error = None;
        self.state.settled = true;

        (was_settled && !was_connected).then(|| self.state.as_event())
    }

    /// Record a failed fetch on any topic.
    ///
    /// Returns the event to broadcast if this was a connected→disconnected flip.
    pub fn record_failure(&mut self, message: impl Into<String>) -> Option<ConnectionEvent> {
        let was_settled = self.state.settled;
        let was_connected = self.state.connected;

        self.state.connected = false;
        self.state.retry_count = self.state.retry_count.saturating_add(1);
        self.state.last_error = Some(message.into());
        self.state.settled = true;

        (was_settled && was_connected).then(|| self.state.as_event())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_disconnected_and_unsettled() {
        let monitor = ConnectionMonitor::new();
        assert!(!monitor.is_connected());
        assert!(!monitor.state().settled);
        assert_eq!(monitor.state().retry_count, 0);
    }

    #[test]
    fn test_first_outcome_sets_baseline_silently() {
        let mut monitor = ConnectionMonitor::new();
        assert!(monitor.record_success().is_none());
        assert!(monitor.is_connected());

        let mut monitor = ConnectionMonitor::new();
        assert!(monitor.record_failure("refused").is_none());
        assert!(!monitor.is_connected());
        assert_eq!(monitor.state().retry_count, 1);
        assert_eq!(monitor.state().last_error.as_deref(), Some("refused"));
    }

    #[test]
    fn test_edges_are_announced_once() {
        let mut monitor = ConnectionMonitor::new();
        let outcomes = [true, false, false, false, true];
        let events: Vec<ConnectionEvent> = outcomes
            .iter()
            .filter_map(|&ok| {
                if ok {
                    monitor.record_success()
                } else {
                    monitor.record_failure("timeout")
                }
            })
            .collect();

        assert_eq!(events.len(), 2);
        assert!(!events[0].connected);
        assert_eq!(events[0].error.as_ref().unwrap().message, "timeout");
        assert!(events[1].connected);
        assert!(events[1].error.is_none());
    }

    #[test]
    fn test_retry_count_grows_while_down_and_resets_on_success() {
        let mut monitor = ConnectionMonitor::new();
        monitor.record_success();
        monitor.record_failure("a");
        monitor.record_failure("b");
        monitor.record_failure("c");
        assert_eq!(monitor.state().retry_count, 3);
        assert_eq!(monitor.state().last_error.as_deref(), Some("c"));

        monitor.record_success();
        assert_eq!(monitor.state().retry_count, 0);
        assert!(monitor.state().last_error.is_none());
    }
}
