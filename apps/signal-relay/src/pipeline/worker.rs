//! Pipeline dispatcher and signal-processing workers.
//!
//! The dispatcher pulls accepted signals off the intake queue and fans
//! them out to one worker task per queue key, spawned lazily. Signals
//! for the same account always share a queue, so they are processed
//! strictly in submission order and never concurrently; signals for
//! distinct owners run in parallel.
//!
//! Each worker drives a signal through the gate sequence: rate limiter →
//! account router → credential vault → execution gateway, recording the
//! terminal result and notifying the owner. Failures are local to the
//! signal; venue transport failures are additionally reported to the
//! reconnection supervisor through a bounded event channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::ledger::SignalLedger;
use crate::error::ErrorKind;
use crate::gateway::ExecutionGateway;
use crate::limiter::{RateDecision, RateLimiter, Tier};
use crate::metrics;
use crate::model::{ExecutionResult, Signal, SignalStatus};
use crate::notify::{Notification, Notifier, Severity};
use crate::router::AccountRegistry;
use crate::supervisor::ConnectivityEvent;
use crate::vault::CredentialVault;

/// Shared dependencies for signal-processing workers.
///
/// Built once at startup and passed explicitly; there is no global state.
pub struct PipelineContext {
    /// Rate limiter, consulted before routing.
    pub limiter: Arc<RateLimiter>,
    /// Account registry for routing.
    pub registry: Arc<AccountRegistry>,
    /// Credential vault; decryption is scoped to one gateway call.
    pub vault: Arc<CredentialVault>,
    /// Venue gateway.
    pub gateway: Arc<ExecutionGateway>,
    /// Status ledger and audit trail.
    pub ledger: Arc<SignalLedger>,
    /// Owner notification channel.
    pub notifier: Arc<dyn Notifier>,
    /// Connectivity events consumed by the reconnection supervisor.
    pub events: mpsc::Sender<ConnectivityEvent>,
}

/// Fans accepted signals out to per-account worker tasks.
pub struct Dispatcher {
    rx: mpsc::Receiver<Signal>,
    ctx: Arc<PipelineContext>,
    account_queue_capacity: usize,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Create a dispatcher over the intake queue.
    #[must_use]
    pub fn new(
        rx: mpsc::Receiver<Signal>,
        ctx: Arc<PipelineContext>,
        account_queue_capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rx,
            ctx,
            account_queue_capacity,
            cancel,
        }
    }

    /// Run until the intake queue closes or shutdown is requested.
    pub async fn run(mut self) {
        let mut queues: HashMap<String, mpsc::Sender<Signal>> = HashMap::new();

        loop {
            let signal = tokio::select! {
                () = self.cancel.cancelled() => break,
                signal = self.rx.recv() => match signal {
                    Some(signal) => signal,
                    None => break,
                },
            };

            let key = self.queue_key(&signal);
            let sender = queues.entry(key.clone()).or_insert_with(|| {
                let (tx, rx) = mpsc::channel(self.account_queue_capacity);
                let ctx = Arc::clone(&self.ctx);
                let cancel = self.cancel.clone();
                tokio::spawn(run_account_worker(key.clone(), rx, ctx, cancel));
                tx
            });

            if sender.send(signal).await.is_err() {
                tracing::error!(queue = %key, "account worker queue closed unexpectedly");
                queues.remove(&key);
            }
        }

        tracing::debug!("dispatcher stopped");
    }

    /// Serialization key for a signal.
    ///
    /// An account belongs to exactly one owner, so keying by owner keeps
    /// every signal for a given account on one queue even while the
    /// owner's default account or account_ref targets change mid-stream.
    /// Distinct owners execute in parallel.
    fn queue_key(&self, signal: &Signal) -> String {
        format!("owner:{}", signal.owner)
    }
}

async fn run_account_worker(
    key: String,
    mut rx: mpsc::Receiver<Signal>,
    ctx: Arc<PipelineContext>,
    cancel: CancellationToken,
) {
    tracing::debug!(queue = %key, "account worker started");
    loop {
        let signal = tokio::select! {
            () = cancel.cancelled() => break,
            signal = rx.recv() => match signal {
                Some(signal) => signal,
                None => break,
            },
        };
        process_signal(&ctx, signal).await;
    }
    tracing::debug!(queue = %key, "account worker stopped");
}

/// Drive one signal to a terminal status.
///
/// Every failure path records exactly one execution result and never
/// propagates: an error local to one signal must not take down the worker
/// or affect other in-flight signals.
pub(crate) async fn process_signal(ctx: &PipelineContext, signal: Signal) {
    // A cancellation may have landed while the signal sat in the queue.
    if ctx.ledger.status(&signal.id) != Some(SignalStatus::Pending) {
        tracing::debug!(signal_id = %signal.id, "skipping signal no longer pending");
        return;
    }

    // Gate: rate limiter runs before any account or credential access.
    let key = ctx.limiter.key_for(&signal);
    match ctx.limiter.allow(&key, Tier::Standard) {
        RateDecision::Denied { retry_after } => {
            metrics::record_rate_limit_denied(Tier::Standard.as_str());
            tracing::warn!(
                signal_id = %signal.id,
                %key,
                retry_after_secs = retry_after.as_secs(),
                "signal denied by rate limiter"
            );
            finish(
                ctx,
                &signal,
                ExecutionResult::failed(&signal.id, ErrorKind::RateLimitExceeded, Duration::ZERO),
                Notification::new(
                    Severity::Warning,
                    format!("signal {} rejected", signal.id),
                    format!(
                        "rate limit exceeded for {}; retry after {}s",
                        signal.owner,
                        retry_after.as_secs()
                    ),
                ),
            )
            .await;
            return;
        }
        RateDecision::Permitted { .. } => {
            if ctx.ledger.advance(&signal.id, SignalStatus::Gated).is_err() {
                // Cancelled between the pending check and the gate.
                return;
            }
        }
    }

    // Route: explicit reference, else the owner's default active account.
    let account = match ctx.registry.resolve(&signal) {
        Ok(account) => account,
        Err(err) => {
            tracing::warn!(signal_id = %signal.id, owner = %signal.owner, %err, "routing failed");
            finish(
                ctx,
                &signal,
                ExecutionResult::failed(&signal.id, ErrorKind::NoActiveAccount, Duration::ZERO),
                Notification::new(
                    Severity::Warning,
                    format!("signal {} failed", signal.id),
                    format!("no active account for owner {}", signal.owner),
                ),
            )
            .await;
            return;
        }
    };

    // Point of no return: once executing, the signal runs to a terminal
    // result and can no longer be cancelled.
    if ctx
        .ledger
        .advance(&signal.id, SignalStatus::Executing)
        .is_err()
    {
        return;
    }

    // Credentials live exactly as long as this gateway call.
    let result = {
        let credentials = match ctx.vault.open(&account.credentials) {
            Ok(credentials) => credentials,
            Err(err) => {
                tracing::error!(
                    signal_id = %signal.id,
                    account_id = %account.id,
                    %err,
                    "credential decryption failed"
                );
                finish(
                    ctx,
                    &signal,
                    ExecutionResult::failed(
                        &signal.id,
                        ErrorKind::CredentialDecryption,
                        Duration::ZERO,
                    ),
                    Notification::new(
                        Severity::Critical,
                        "credential vault failure".to_string(),
                        format!(
                            "account {} credentials failed to decrypt; check vault key configuration",
                            account.label()
                        ),
                    ),
                )
                .await;
                return;
            }
        };
        ctx.gateway.execute(&signal, &credentials).await
    };

    metrics::record_execution_latency(result.latency);

    // Transport failures feed the supervisor's failure counter; venue
    // rejections do not.
    if result.error_kind.is_some_and(ErrorKind::is_transport) {
        let event = ConnectivityEvent::TransportFailure {
            dependency: ctx.gateway.venue_name().to_string(),
        };
        if ctx.events.try_send(event).is_err() {
            tracing::debug!("connectivity event queue full, dropping report");
        }
    }

    let notification = if result.success {
        Notification::new(
            Severity::Info,
            format!("signal {} executed", signal.id),
            format!(
                "{} {} {} on {}, ticket {}",
                signal.kind.as_str(),
                signal.volume,
                signal.instrument,
                account.label(),
                result.ticket.unwrap_or_default()
            ),
        )
    } else if result.error_kind.is_some_and(ErrorKind::is_transport) {
        // Infrastructure detail stays internal; owners see a degradation
        // notice, not raw transport errors.
        Notification::new(
            Severity::Warning,
            format!("signal {} failed", signal.id),
            "execution service degraded; the signal was not executed".to_string(),
        )
    } else {
        Notification::new(
            Severity::Warning,
            format!("signal {} failed", signal.id),
            format!(
                "venue rejected the order on {}",
                account.label()
            ),
        )
    };

    finish(ctx, &signal, result, notification).await;
}

/// Record a terminal result and notify the owner.
async fn finish(
    ctx: &PipelineContext,
    signal: &Signal,
    result: ExecutionResult,
    notification: Notification,
) {
    let error_label = result.error_kind.map_or("none", ErrorKind::as_str);

    match ctx.ledger.record_result(result) {
        Ok(status) => {
            metrics::record_signal_terminal(status.as_str(), error_label);
            tracing::info!(
                signal_id = %signal.id,
                status = status.as_str(),
                error_kind = error_label,
                "signal reached terminal status"
            );
        }
        Err(err) => {
            // Lost a race with cancellation; the ledger kept the first
            // terminal result, which is the correct outcome.
            tracing::warn!(signal_id = %signal.id, %err, "terminal result not recorded");
            return;
        }
    }

    if let Err(err) = ctx.notifier.notify(&notification).await {
        tracing::warn!(signal_id = %signal.id, %err, "owner notification failed");
    }
}
