//! Signal ledger.
//!
//! Tracks the status of every signal inside the retention window and the
//! append-only execution results that form the audit trail. The ledger is
//! the single writer of signal status and enforces the lifecycle
//! invariants:
//!
//! - a signal never transitions backward;
//! - a terminal signal never transitions again;
//! - exactly one execution result per signal reaching a terminal status.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;

use crate::error::ErrorKind;
use crate::model::{ExecutionResult, Signal, SignalStatus};

/// Ledger operation failure. These indicate either a caller bug or a
/// lost race with a concurrent transition; the worker logs and drops them.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Signal id is not tracked (never accepted, or evicted).
    #[error("unknown signal id: {0}")]
    Unknown(String),
    /// Attempted transition would move the status backward.
    #[error("refusing backward transition for {id}: {from} -> {to}")]
    BackwardTransition {
        /// Signal id.
        id: String,
        /// Current status label.
        from: &'static str,
        /// Requested status label.
        to: &'static str,
    },
    /// Signal already reached a terminal status.
    #[error("signal {0} is already terminal")]
    AlreadyTerminal(String),
    /// A result was already recorded for this signal.
    #[error("result already recorded for signal {0}")]
    DuplicateResult(String),
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    signal: Signal,
    status: SignalStatus,
    error_kind: Option<ErrorKind>,
    result: Option<ExecutionResult>,
    updated_at: DateTime<Utc>,
}

/// Aggregate counters that survive entry eviction.
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerTotals {
    /// Signals accepted into the ledger.
    pub submitted: u64,
    /// Signals that executed successfully.
    pub executed: u64,
    /// Signals that reached failed status.
    pub failed: u64,
    /// Signals rejected after acceptance (rate limit).
    pub rejected: u64,
    /// Signals cancelled or aged out.
    pub expired: u64,
}

/// Status and result store for in-window signals.
pub struct SignalLedger {
    entries: RwLock<HashMap<String, LedgerEntry>>,
    totals: RwLock<LedgerTotals>,
}

impl Default for SignalLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            totals: RwLock::new(LedgerTotals::default()),
        }
    }

    /// Track a newly accepted signal as pending.
    pub fn insert_pending(&self, signal: Signal) {
        let id = signal.id.clone();
        let entry = LedgerEntry {
            signal,
            status: SignalStatus::Pending,
            error_kind: None,
            result: None,
            updated_at: Utc::now(),
        };
        self.entries.write().insert(id, entry);
        self.totals.write().submitted += 1;
    }

    /// Advance a signal to a non-terminal status.
    ///
    /// # Errors
    ///
    /// Fails when the signal is unknown, already terminal, or the
    /// transition would move backward.
    pub fn advance(&self, id: &str, status: SignalStatus) -> Result<(), LedgerError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| LedgerError::Unknown(id.to_string()))?;

        if entry.status.is_terminal() {
            return Err(LedgerError::AlreadyTerminal(id.to_string()));
        }
        if status.rank() < entry.status.rank() {
            return Err(LedgerError::BackwardTransition {
                id: id.to_string(),
                from: entry.status.as_str(),
                to: status.as_str(),
            });
        }

        entry.status = status;
        entry.updated_at = Utc::now();
        Ok(())
    }

    /// Record the terminal result for a signal, deriving its final status.
    ///
    /// # Errors
    ///
    /// Fails when the signal is unknown, already terminal, or already has
    /// a result.
    pub fn record_result(&self, result: ExecutionResult) -> Result<SignalStatus, LedgerError> {
        let status = if result.success {
            SignalStatus::Executed
        } else if result.error_kind == Some(ErrorKind::RateLimitExceeded) {
            SignalStatus::Rejected
        } else if result.error_kind.is_none() {
            SignalStatus::Expired
        } else {
            SignalStatus::Failed
        };

        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(&result.signal_id)
            .ok_or_else(|| LedgerError::Unknown(result.signal_id.clone()))?;

        if entry.result.is_some() {
            return Err(LedgerError::DuplicateResult(result.signal_id.clone()));
        }
        if entry.status.is_terminal() {
            return Err(LedgerError::AlreadyTerminal(result.signal_id.clone()));
        }

        entry.status = status;
        entry.error_kind = result.error_kind;
        entry.updated_at = Utc::now();
        entry.result = Some(result);

        let mut totals = self.totals.write();
        match status {
            SignalStatus::Executed => totals.executed += 1,
            SignalStatus::Failed => totals.failed += 1,
            SignalStatus::Rejected => totals.rejected += 1,
            SignalStatus::Expired => totals.expired += 1,
            SignalStatus::Pending | SignalStatus::Gated | SignalStatus::Executing => {}
        }

        Ok(status)
    }

    /// Cancel a signal that has not started executing.
    ///
    /// # Errors
    ///
    /// Fails when the signal is unknown or already past the gate.
    pub fn cancel(&self, id: &str) -> Result<(), LedgerError> {
        {
            let entries = self.entries.read();
            let entry = entries
                .get(id)
                .ok_or_else(|| LedgerError::Unknown(id.to_string()))?;
            if !matches!(entry.status, SignalStatus::Pending | SignalStatus::Gated) {
                return Err(LedgerError::AlreadyTerminal(id.to_string()));
            }
        }
        self.record_result(ExecutionResult::expired(id)).map(|_| ())
    }

    /// Current status of a signal.
    #[must_use]
    pub fn status(&self, id: &str) -> Option<SignalStatus> {
        self.entries.read().get(id).map(|e| e.status)
    }

    /// Error kind of a terminal signal, if any.
    #[must_use]
    pub fn error_kind(&self, id: &str) -> Option<ErrorKind> {
        self.entries.read().get(id).and_then(|e| e.error_kind)
    }

    /// Execution result of a terminal signal, if recorded.
    #[must_use]
    pub fn result(&self, id: &str) -> Option<ExecutionResult> {
        self.entries.read().get(id).and_then(|e| e.result.clone())
    }

    /// Owner of a tracked signal.
    #[must_use]
    pub fn owner_of(&self, id: &str) -> Option<String> {
        self.entries.read().get(id).map(|e| e.signal.owner.clone())
    }

    /// Signals currently tracked for an owner, most recent first.
    #[must_use]
    pub fn history_for(&self, owner: &str) -> Vec<(Signal, SignalStatus)> {
        let entries = self.entries.read();
        let mut history: Vec<&LedgerEntry> = entries
            .values()
            .filter(|e| e.signal.owner == owner)
            .collect();
        history.sort_by(|a, b| b.signal.submitted_at.cmp(&a.signal.submitted_at));
        history
            .into_iter()
            .map(|e| (e.signal.clone(), e.status))
            .collect()
    }

    /// Number of signals waiting or in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|e| !e.status.is_terminal())
            .count()
    }

    /// Aggregate counters since startup.
    #[must_use]
    pub fn totals(&self) -> LedgerTotals {
        *self.totals.read()
    }

    /// Evict terminal entries older than `retention`. Aggregate counters
    /// are unaffected.
    pub fn evict_older_than(&self, retention: std::time::Duration) {
        let cutoff =
            Utc::now() - ChronoDuration::from_std(retention).unwrap_or_else(|_| ChronoDuration::hours(24));
        self.entries
            .write()
            .retain(|_, e| !e.status.is_terminal() || e.updated_at > cutoff);
    }
}
