//! Execution Gateway
//!
//! Uniform interface for placing, modifying, and closing trades against a
//! venue that may be mocked or live. The [`VenueClient`] capability trait
//! has two implementations selected at construction time from
//! configuration; nothing inspects types at runtime.
//!
//! The [`ExecutionGateway`] wrapper owns the resilience policy:
//!
//! - every call carries a bounded timeout;
//! - trade placement is **non-retryable**: a timeout or ambiguous reply is
//!   reported as failed rather than retried, so an order is never placed
//!   twice;
//! - read-only status queries may retry transport failures with bounded
//!   exponential backoff;
//! - every outcome is normalized to an [`ExecutionResult`], with
//!   venue-side rejections distinguished from transport failures so only
//!   the latter feed the reconnection supervisor.

mod mock;
mod rest;

pub use mock::{MockVenue, VenueBehavior};
pub use rest::RestVenue;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::GatewaySettings;
use crate::error::ErrorKind;
use crate::model::{ExecutionResult, Signal, SignalKind};
use crate::vault::TradeCredentials;

/// Venue-level request derived from a validated signal.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRequest {
    /// Signal the request belongs to.
    pub signal_id: String,
    /// Instruction kind.
    pub kind: SignalKind,
    /// Instrument symbol.
    pub instrument: String,
    /// Lot volume.
    pub volume: Decimal,
    /// Entry price for pending kinds.
    pub price: Option<Decimal>,
    /// Stop-loss level.
    pub stop: Option<Decimal>,
    /// Take-profit level.
    pub target: Option<Decimal>,
    /// Venue ticket for close/modify.
    pub ticket: Option<i64>,
    /// Comment forwarded to the venue.
    pub comment: Option<String>,
}

impl ExecutionRequest {
    /// Build a request from a validated signal.
    #[must_use]
    pub fn from_signal(signal: &Signal) -> Self {
        Self {
            signal_id: signal.id.clone(),
            kind: signal.kind,
            instrument: signal.instrument.clone(),
            volume: signal.volume,
            price: signal.price,
            stop: signal.stop,
            target: signal.target,
            ticket: signal.ticket,
            comment: signal.comment.clone(),
        }
    }
}

/// Successful venue reply.
#[derive(Debug, Clone)]
pub struct VenueReply {
    /// Ticket assigned (or re-confirmed) by the venue.
    pub ticket: Option<i64>,
    /// Venue message, forwarded to the owner notification.
    pub message: String,
}

/// Status of an existing trade, from a read-only query.
#[derive(Debug, Clone)]
pub struct TradeStatus {
    /// Venue ticket.
    pub ticket: i64,
    /// Whether the position is still open.
    pub is_open: bool,
}

/// Venue call failure.
#[derive(Debug, thiserror::Error)]
pub enum VenueError {
    /// The venue received the request and rejected it (business failure:
    /// insufficient margin, bad ticket, market closed).
    #[error("venue rejected request: {0}")]
    Rejected(String),
    /// The venue could not be reached or replied with a server failure.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Capability interface implemented by mock and live venue adapters.
#[async_trait]
pub trait VenueClient: Send + Sync {
    /// Execute a trade instruction. Credentials exist only for this call.
    async fn execute(
        &self,
        request: &ExecutionRequest,
        credentials: &TradeCredentials,
    ) -> Result<VenueReply, VenueError>;

    /// Read-only status query for an existing ticket.
    async fn query_status(&self, ticket: i64) -> Result<TradeStatus, VenueError>;

    /// Cheap liveness probe used by the reconnection supervisor.
    async fn probe(&self) -> bool;

    /// Adapter name for logs and connection-state records.
    fn name(&self) -> &'static str;
}

/// Venue client wrapper applying timeout, retry, and normalization policy.
pub struct ExecutionGateway {
    client: Arc<dyn VenueClient>,
    call_timeout: Duration,
    read_retry_attempts: u32,
    read_retry_initial: Duration,
}

impl ExecutionGateway {
    /// Wrap a venue client with the configured policy.
    #[must_use]
    pub fn new(client: Arc<dyn VenueClient>, settings: &GatewaySettings) -> Self {
        Self {
            client,
            call_timeout: settings.call_timeout,
            read_retry_attempts: settings.read_retry_attempts,
            read_retry_initial: settings.read_retry_initial,
        }
    }

    /// Adapter name.
    #[must_use]
    pub fn venue_name(&self) -> &'static str {
        self.client.name()
    }

    /// Execute a signal against the venue, exactly once.
    ///
    /// Never retries: a timeout after the order may have reached the venue
    /// is reported as `transport_timeout` and left for manual
    /// reconciliation rather than risking duplicate placement.
    pub async fn execute(
        &self,
        signal: &Signal,
        credentials: &TradeCredentials,
    ) -> ExecutionResult {
        let request = ExecutionRequest::from_signal(signal);
        let start = Instant::now();

        let outcome =
            tokio::time::timeout(self.call_timeout, self.client.execute(&request, credentials))
                .await;
        let latency = start.elapsed();

        match outcome {
            Err(_elapsed) => {
                tracing::warn!(
                    signal_id = %signal.id,
                    timeout_ms = self.call_timeout.as_millis() as u64,
                    "venue call timed out"
                );
                ExecutionResult::failed(&signal.id, ErrorKind::TransportTimeout, latency)
            }
            Ok(Err(VenueError::Transport(reason))) => {
                tracing::warn!(signal_id = %signal.id, %reason, "venue transport failure");
                ExecutionResult::failed(&signal.id, ErrorKind::Transport, latency)
            }
            Ok(Err(VenueError::Rejected(reason))) => {
                tracing::info!(signal_id = %signal.id, %reason, "venue rejected signal");
                ExecutionResult::failed(&signal.id, ErrorKind::VenueRejected, latency)
            }
            Ok(Ok(reply)) => {
                let ticket = reply.ticket.or(signal.ticket);
                tracing::info!(
                    signal_id = %signal.id,
                    ticket = ?ticket,
                    latency_ms = latency.as_millis() as u64,
                    "signal executed"
                );
                ExecutionResult::executed(&signal.id, ticket, latency)
            }
        }
    }

    /// Query trade status, retrying transport failures with bounded
    /// exponential backoff. Rejections are returned immediately.
    ///
    /// # Errors
    ///
    /// Returns the last venue error once attempts are exhausted.
    pub async fn query_status(&self, ticket: i64) -> Result<TradeStatus, VenueError> {
        let mut delay = self.read_retry_initial;
        let mut last_error = VenueError::Transport("no attempts configured".to_string());

        for attempt in 0..self.read_retry_attempts.max(1) {
            let outcome =
                tokio::time::timeout(self.call_timeout, self.client.query_status(ticket)).await;

            match outcome {
                Ok(Ok(status)) => return Ok(status),
                Ok(Err(err @ VenueError::Rejected(_))) => return Err(err),
                Ok(Err(err @ VenueError::Transport(_))) => last_error = err,
                Err(_elapsed) => {
                    last_error = VenueError::Transport("status query timed out".to_string());
                }
            }

            if attempt + 1 < self.read_retry_attempts {
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
        }

        Err(last_error)
    }

    /// Probe venue liveness with the call timeout applied.
    pub async fn probe(&self) -> bool {
        (tokio::time::timeout(self.call_timeout, self.client.probe()).await).unwrap_or(false)
    }
}
