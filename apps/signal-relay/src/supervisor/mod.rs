//! Reconnection Supervisor
//!
//! Background watcher that detects and recovers lost connectivity to the
//! execution gateway and the outbound notification channel. One monitor
//! task per dependency owns that dependency's [`ConnectionState`] record;
//! request-path code reads point-in-time snapshots and never waits on the
//! supervisor.
//!
//! Workers report venue transport failures through a bounded event channel
//! so failures observed mid-execution count toward the same failure totals
//! the probes maintain.

mod backoff;
mod monitor;

pub use backoff::BackoffPolicy;
pub use monitor::{ConnectionMonitor, NotifierProbe, Probe, run_event_intake};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Connectivity status of one monitored dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Last probe succeeded.
    Connected,
    /// No probe has succeeded yet.
    Disconnected,
    /// Probes are failing; retries are scheduled with backoff.
    Reconnecting,
}

impl ConnectionStatus {
    /// Stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Point-in-time state of one monitored dependency.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionState {
    /// Current status.
    pub status: ConnectionStatus,
    /// Consecutive failed probes (and reported transport failures).
    pub consecutive_failures: u32,
    /// When the next reconnection attempt is due, while reconnecting.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Last time the dependency was seen healthy.
    pub last_connected_at: Option<DateTime<Utc>>,
}

impl ConnectionState {
    const fn unknown() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            consecutive_failures: 0,
            next_retry_at: None,
            last_connected_at: None,
        }
    }
}

/// Shared table of connection states, one record per dependency.
///
/// Written only by supervisor tasks; everything else takes snapshots.
pub struct ConnectionStateTable {
    states: RwLock<HashMap<String, ConnectionState>>,
}

impl Default for ConnectionStateTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Register a dependency, starting disconnected.
    pub fn register(&self, name: &str) {
        self.states
            .write()
            .entry(name.to_string())
            .or_insert_with(ConnectionState::unknown);
    }

    /// Record a successful probe: connected, failures cleared.
    pub fn mark_connected(&self, name: &str) {
        let mut states = self.states.write();
        let state = states
            .entry(name.to_string())
            .or_insert_with(ConnectionState::unknown);
        state.status = ConnectionStatus::Connected;
        state.consecutive_failures = 0;
        state.next_retry_at = None;
        state.last_connected_at = Some(Utc::now());
    }

    /// Record a failed probe and the scheduled retry time.
    ///
    /// While failures continue, `next_retry_at` only moves forward.
    pub fn mark_failure(&self, name: &str, next_retry_at: DateTime<Utc>) {
        let mut states = self.states.write();
        let state = states
            .entry(name.to_string())
            .or_insert_with(ConnectionState::unknown);
        state.status = ConnectionStatus::Reconnecting;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.next_retry_at = Some(match state.next_retry_at {
            Some(current) if current > next_retry_at => current,
            _ => next_retry_at,
        });
    }

    /// Record a transport failure observed outside the probe loop
    /// (e.g. a timed-out execution call).
    pub fn record_transport_failure(&self, name: &str) {
        let mut states = self.states.write();
        let state = states
            .entry(name.to_string())
            .or_insert_with(ConnectionState::unknown);
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
    }

    /// State of one dependency.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ConnectionState> {
        self.states.read().get(name).cloned()
    }

    /// Snapshot of every dependency.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, ConnectionState> {
        self.states.read().clone()
    }
}

/// Connectivity events reported by signal-processing workers.
#[derive(Debug, Clone)]
pub enum ConnectivityEvent {
    /// A venue call failed at the transport layer.
    TransportFailure {
        /// Dependency name (venue adapter name).
        dependency: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_dependencies_start_disconnected() {
        let table = ConnectionStateTable::new();
        table.register("venue");

        let state = table.get("venue").unwrap();
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.next_retry_at.is_none());
    }

    #[test]
    fn failures_accumulate_until_success() {
        let table = ConnectionStateTable::new();
        table.register("venue");

        table.mark_failure("venue", Utc::now());
        table.mark_failure("venue", Utc::now());
        table.record_transport_failure("venue");

        let state = table.get("venue").unwrap();
        assert_eq!(state.status, ConnectionStatus::Reconnecting);
        assert_eq!(state.consecutive_failures, 3);

        table.mark_connected("venue");
        let state = table.get("venue").unwrap();
        assert_eq!(state.status, ConnectionStatus::Connected);
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.next_retry_at.is_none());
        assert!(state.last_connected_at.is_some());
    }

    #[test]
    fn next_retry_never_moves_backward_while_failing() {
        let table = ConnectionStateTable::new();
        let later = Utc::now() + chrono::Duration::seconds(30);
        let earlier = Utc::now() + chrono::Duration::seconds(5);

        table.mark_failure("venue", later);
        table.mark_failure("venue", earlier);

        let state = table.get("venue").unwrap();
        assert_eq!(state.next_retry_at, Some(later));
    }

    #[test]
    fn snapshot_is_decoupled_from_table() {
        let table = ConnectionStateTable::new();
        table.register("venue");
        let snapshot = table.snapshot();

        table.mark_failure("venue", Utc::now());
        assert_eq!(
            snapshot.get("venue").unwrap().status,
            ConnectionStatus::Disconnected
        );
    }
}
