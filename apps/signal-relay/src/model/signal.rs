//! Signal domain types.
//!
//! [`SignalRecord`] is the wire shape consumed from the upstream producer;
//! [`Signal`] is the validated form that flows through the pipeline. Field
//! and range checks happen exactly once, at the record boundary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::ErrorKind;

/// Kind of trading instruction carried by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Market buy.
    OpenBuy,
    /// Market sell.
    OpenSell,
    /// Pending buy limit order.
    OpenBuyLimit,
    /// Pending sell limit order.
    OpenSellLimit,
    /// Pending buy stop order.
    OpenBuyStop,
    /// Pending sell stop order.
    OpenSellStop,
    /// Close an open position.
    Close,
    /// Modify stop/target of an open position.
    Modify,
}

impl SignalKind {
    /// Parse a kind label as it appears on the wire.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open_buy" => Some(Self::OpenBuy),
            "open_sell" => Some(Self::OpenSell),
            "open_buy_limit" => Some(Self::OpenBuyLimit),
            "open_sell_limit" => Some(Self::OpenSellLimit),
            "open_buy_stop" => Some(Self::OpenBuyStop),
            "open_sell_stop" => Some(Self::OpenSellStop),
            "close" => Some(Self::Close),
            "modify" => Some(Self::Modify),
            _ => None,
        }
    }

    /// Stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenBuy => "open_buy",
            Self::OpenSell => "open_sell",
            Self::OpenBuyLimit => "open_buy_limit",
            Self::OpenSellLimit => "open_sell_limit",
            Self::OpenBuyStop => "open_buy_stop",
            Self::OpenSellStop => "open_sell_stop",
            Self::Close => "close",
            Self::Modify => "modify",
        }
    }

    /// Whether this kind opens a new position (market or pending).
    #[must_use]
    pub const fn is_entry(self) -> bool {
        !matches!(self, Self::Close | Self::Modify)
    }

    /// Pending order kinds need an explicit entry price.
    #[must_use]
    pub const fn requires_price(self) -> bool {
        matches!(
            self,
            Self::OpenBuyLimit | Self::OpenSellLimit | Self::OpenBuyStop | Self::OpenSellStop
        )
    }

    /// Close/modify act on an existing venue ticket.
    #[must_use]
    pub const fn requires_ticket(self) -> bool {
        matches!(self, Self::Close | Self::Modify)
    }
}

/// Lifecycle status of a signal.
///
/// Transitions are strictly forward; see the ledger for enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    /// Accepted, waiting in queue.
    Pending,
    /// Passed the rate-limit gate.
    Gated,
    /// Gateway call in flight; no longer cancellable.
    Executing,
    /// Venue confirmed execution.
    Executed,
    /// Rejected before execution (rate limit, cancellation conflict).
    Rejected,
    /// Terminal failure (routing, credentials, venue, transport).
    Failed,
    /// Cancelled before execution or aged out.
    Expired,
}

impl SignalStatus {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Executed | Self::Rejected | Self::Failed | Self::Expired
        )
    }

    /// Ordering rank used to forbid backward transitions.
    #[must_use]
    pub(crate) const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Gated => 1,
            Self::Executing => 2,
            Self::Executed | Self::Rejected | Self::Failed | Self::Expired => 3,
        }
    }

    /// Stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Gated => "gated",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }
}

/// Raw signal record as consumed from the upstream producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    /// Caller-supplied id; derived when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Instruction kind label.
    pub kind: String,
    /// Instrument symbol.
    pub instrument: String,
    /// Lot volume.
    pub volume: Decimal,
    /// Entry price (required for pending kinds).
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Stop-loss level.
    #[serde(default)]
    pub stop: Option<Decimal>,
    /// Take-profit level.
    #[serde(default)]
    pub target: Option<Decimal>,
    /// Venue ticket (required for close/modify).
    #[serde(default)]
    pub ticket: Option<i64>,
    /// Owning user.
    pub owner: String,
    /// Explicit target account.
    #[serde(default)]
    pub account_ref: Option<String>,
    /// Free-form comment forwarded to the venue.
    #[serde(default)]
    pub comment: Option<String>,
    /// Producer tag (strategy/source label).
    #[serde(default)]
    pub tag: Option<String>,
}

/// A validated signal flowing through the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    /// Unique id within the retention window.
    pub id: String,
    /// Instruction kind.
    pub kind: SignalKind,
    /// Instrument symbol.
    pub instrument: String,
    /// Lot volume, strictly positive.
    pub volume: Decimal,
    /// Entry price for pending kinds.
    pub price: Option<Decimal>,
    /// Stop-loss level.
    pub stop: Option<Decimal>,
    /// Take-profit level.
    pub target: Option<Decimal>,
    /// Venue ticket for close/modify.
    pub ticket: Option<i64>,
    /// Owning user.
    pub owner: String,
    /// Explicit target account, if any.
    pub account_ref: Option<String>,
    /// Comment forwarded to the venue.
    pub comment: Option<String>,
    /// Producer tag.
    pub tag: Option<String>,
    /// Ingestion timestamp.
    pub submitted_at: DateTime<Utc>,
}

impl Signal {
    /// Validate a raw record into a pipeline signal.
    ///
    /// # Errors
    ///
    /// Returns the human-readable reason when a required field is missing
    /// or out of range.
    pub fn from_record(record: SignalRecord) -> Result<Self, String> {
        let kind = SignalKind::parse(record.kind.trim())
            .ok_or_else(|| format!("unknown signal kind: {}", record.kind))?;

        let instrument = record.instrument.trim().to_string();
        if instrument.is_empty() {
            return Err("instrument must not be empty".to_string());
        }

        if record.volume <= Decimal::ZERO {
            return Err(format!("volume must be positive, got {}", record.volume));
        }

        let owner = record.owner.trim().to_string();
        if owner.is_empty() {
            return Err("owner must not be empty".to_string());
        }

        if kind.requires_price() && record.price.is_none() {
            return Err(format!("{} requires an entry price", kind.as_str()));
        }

        if kind.requires_ticket() && record.ticket.is_none() {
            return Err(format!("{} requires a venue ticket", kind.as_str()));
        }

        let id = match record.id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        Ok(Self {
            id,
            kind,
            instrument,
            volume: record.volume,
            price: record.price,
            stop: record.stop,
            target: record.target,
            ticket: record.ticket,
            owner,
            account_ref: record.account_ref.filter(|r| !r.trim().is_empty()),
            comment: record.comment,
            tag: record.tag,
            submitted_at: Utc::now(),
        })
    }
}

/// Outcome of driving one signal to a terminal status.
///
/// Append-only: exactly one per signal that reaches a terminal status.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Signal this result belongs to.
    pub signal_id: String,
    /// Whether the venue confirmed execution.
    pub success: bool,
    /// Venue ticket on success.
    pub ticket: Option<i64>,
    /// Failure label on failure.
    pub error_kind: Option<ErrorKind>,
    /// End-to-end latency of the execution attempt.
    pub latency: Duration,
    /// Completion timestamp.
    pub completed_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Result for a confirmed execution.
    #[must_use]
    pub fn executed(signal_id: &str, ticket: Option<i64>, latency: Duration) -> Self {
        Self {
            signal_id: signal_id.to_string(),
            success: true,
            ticket,
            error_kind: None,
            latency,
            completed_at: Utc::now(),
        }
    }

    /// Result for a signal cancelled or aged out before execution.
    #[must_use]
    pub fn expired(signal_id: &str) -> Self {
        Self {
            signal_id: signal_id.to_string(),
            success: false,
            ticket: None,
            error_kind: None,
            latency: Duration::ZERO,
            completed_at: Utc::now(),
        }
    }

    /// Result for a terminal failure.
    #[must_use]
    pub fn failed(signal_id: &str, error_kind: ErrorKind, latency: Duration) -> Self {
        Self {
            signal_id: signal_id.to_string(),
            success: false,
            ticket: None,
            error_kind: Some(error_kind),
            latency,
            completed_at: Utc::now(),
        }
    }
}
