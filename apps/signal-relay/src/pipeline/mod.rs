//! Signal Pipeline
//!
//! Resilient intake for trading signals: validate, deduplicate, enqueue,
//! and drive each accepted signal through rate limiting, account routing,
//! and gated execution, recording exactly one execution result per
//! terminal signal.
//!
//! Validation and duplicate rejection are synchronous and side-effect
//! free; everything after acceptance is asynchronous. Execution failures
//! are terminal for the signal (no automatic re-submission); the
//! owner issues a new signal with a new id.

mod intake;
mod ledger;
mod worker;

pub use intake::DedupWindow;
pub use ledger::{LedgerError, LedgerTotals, SignalLedger};
pub use worker::{Dispatcher, PipelineContext};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineSettings;
use crate::error::RelayError;
use crate::metrics;
use crate::model::{ExecutionResult, Signal, SignalRecord, SignalStatus};

/// Acknowledgement returned on acceptance.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    /// Id the signal is tracked under (caller-supplied or derived).
    pub id: String,
}

/// Intake facade: submission, cancellation, and status queries.
pub struct SignalPipeline {
    dedup: DedupWindow,
    ledger: Arc<SignalLedger>,
    tx: mpsc::Sender<Signal>,
    retention: Duration,
}

impl SignalPipeline {
    /// Build the pipeline and its dispatcher.
    ///
    /// The caller spawns the returned [`Dispatcher`]; the pipeline itself
    /// is cheap shared state safe to call from any task.
    #[must_use]
    pub fn new(
        ctx: Arc<PipelineContext>,
        settings: &PipelineSettings,
        cancel: CancellationToken,
    ) -> (Self, Dispatcher) {
        let (tx, rx) = mpsc::channel(settings.queue_capacity);
        let dispatcher = Dispatcher::new(
            rx,
            Arc::clone(&ctx),
            settings.account_queue_capacity,
            cancel,
        );

        let pipeline = Self {
            dedup: DedupWindow::new(settings.retention),
            ledger: Arc::clone(&ctx.ledger),
            tx,
            retention: settings.retention,
        };
        (pipeline, dispatcher)
    }

    /// Submit a raw signal record.
    ///
    /// Validation and duplicate errors are synchronous and leave no
    /// trace; accepted signals are enqueued as pending and processed
    /// asynchronously.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Validation`] for malformed records.
    /// - [`RelayError::DuplicateSignal`] for an id seen within the
    ///   retention window.
    pub async fn submit(&self, record: SignalRecord) -> Result<SubmitReceipt, RelayError> {
        let signal = Signal::from_record(record).map_err(|reason| {
            metrics::record_signal_invalid();
            RelayError::Validation(reason)
        })?;

        if !self.dedup.check_and_insert(&signal.id) {
            metrics::record_signal_duplicate();
            tracing::debug!(signal_id = %signal.id, "duplicate signal rejected");
            return Err(RelayError::DuplicateSignal(signal.id));
        }

        let id = signal.id.clone();
        self.ledger.insert_pending(signal.clone());
        metrics::record_signal_accepted();
        tracing::info!(
            signal_id = %id,
            kind = signal.kind.as_str(),
            instrument = %signal.instrument,
            owner = %signal.owner,
            "signal accepted"
        );

        if self.tx.send(signal).await.is_err() {
            // Shutdown race: the dispatcher is gone. The signal stays
            // pending and ages out of the window.
            tracing::warn!(signal_id = %id, "intake queue closed, signal not dispatched");
        }

        Ok(SubmitReceipt { id })
    }

    /// Cancel a signal that has not started executing.
    ///
    /// # Errors
    ///
    /// - [`RelayError::UnknownSignal`] when the id is not tracked.
    /// - [`RelayError::NotCancellable`] once execution has started or the
    ///   signal is terminal.
    pub fn cancel(&self, id: &str) -> Result<(), RelayError> {
        match self.ledger.cancel(id) {
            Ok(()) => {
                tracing::info!(signal_id = %id, "signal cancelled");
                Ok(())
            }
            Err(LedgerError::Unknown(id)) => Err(RelayError::UnknownSignal(id)),
            Err(_) => Err(RelayError::NotCancellable(id.to_string())),
        }
    }

    /// Current status of a signal.
    #[must_use]
    pub fn status(&self, id: &str) -> Option<SignalStatus> {
        self.ledger.status(id)
    }

    /// Execution result of a terminal signal.
    #[must_use]
    pub fn result(&self, id: &str) -> Option<ExecutionResult> {
        self.ledger.result(id)
    }

    /// Owner of a tracked signal.
    #[must_use]
    pub fn owner_of(&self, id: &str) -> Option<String> {
        self.ledger.owner_of(id)
    }

    /// Signals tracked for an owner, most recent first.
    #[must_use]
    pub fn history_for(&self, owner: &str) -> Vec<(Signal, SignalStatus)> {
        self.ledger.history_for(owner)
    }

    /// Aggregate counters since startup.
    #[must_use]
    pub fn totals(&self) -> LedgerTotals {
        self.ledger.totals()
    }

    /// Signals waiting or in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.ledger.in_flight()
    }

    /// Periodic maintenance: prune the dedup window and evict aged-out
    /// terminal ledger entries. Called from the health aggregator poll.
    pub fn housekeeping(&self) {
        self.dedup.prune();
        self.ledger.evict_older_than(self.retention);
    }
}
