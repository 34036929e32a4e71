//! Error taxonomy for the signal relay.
//!
//! Two layers of error reporting:
//!
//! - [`RelayError`] is the synchronous error returned to callers of the
//!   public API (submission, sessions, privileged operations).
//! - [`ErrorKind`] is the normalized label carried on terminal signals and
//!   execution results, so every failed signal reports a stable,
//!   human-readable reason.
//!
//! Errors local to a single signal never abort the worker processing it;
//! connectivity failures are aggregated by the reconnection supervisor
//! rather than surfaced per request.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Normalized failure label attached to terminal signals and results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing signal fields.
    Validation,
    /// Signal id already seen within the retention window.
    DuplicateSignal,
    /// No explicit or default active account resolves for the owner.
    NoActiveAccount,
    /// Credential blob failed to decrypt (systemic misconfiguration).
    CredentialDecryption,
    /// Venue call exceeded its bounded timeout.
    TransportTimeout,
    /// Venue unreachable (connection refused/reset, DNS, 5xx).
    Transport,
    /// Venue accepted the request and rejected it for business reasons.
    VenueRejected,
    /// Request quota exhausted for the rate-limit key.
    RateLimitExceeded,
    /// Session token past its fixed expiry.
    SessionExpired,
    /// Session token explicitly revoked.
    SessionRevoked,
}

impl ErrorKind {
    /// Stable string label used in results, notifications, and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::DuplicateSignal => "duplicate_signal",
            Self::NoActiveAccount => "no_active_account",
            Self::CredentialDecryption => "credential_decryption",
            Self::TransportTimeout => "transport_timeout",
            Self::Transport => "transport",
            Self::VenueRejected => "venue_rejected",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::SessionExpired => "session_expired",
            Self::SessionRevoked => "session_revoked",
        }
    }

    /// Whether this failure should feed the reconnection supervisor.
    ///
    /// Only infrastructure failures count toward connectivity state;
    /// venue-side business rejections do not.
    #[must_use]
    pub const fn is_transport(self) -> bool {
        matches!(self, Self::Transport | Self::TransportTimeout)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors returned synchronously from the relay API.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Signal failed field or range validation; rejected before enqueue.
    #[error("invalid signal: {0}")]
    Validation(String),

    /// Signal id collides with one seen inside the retention window.
    #[error("duplicate signal id: {0}")]
    DuplicateSignal(String),

    /// Neither an explicit account reference nor a default active account
    /// resolves for the owner.
    #[error("no active account for owner {owner}")]
    NoActiveAccount {
        /// Owner the resolution was attempted for.
        owner: String,
    },

    /// Stored credential blob could not be decrypted.
    #[error("credential decryption failed for account {account_id}")]
    CredentialDecryption {
        /// Account whose blob failed to open.
        account_id: String,
    },

    /// Request quota exhausted; carries the time until the window resets.
    #[error("rate limit exceeded for {key}, retry after {retry_after_secs}s")]
    RateLimitExceeded {
        /// Rate-limit key that was denied.
        key: String,
        /// Seconds until the current window elapses.
        retry_after_secs: u64,
    },

    /// Session token past its expiry; caller must re-authenticate.
    #[error("session expired")]
    SessionExpired,

    /// Session token explicitly revoked; caller must re-authenticate.
    #[error("session revoked")]
    SessionRevoked,

    /// Session token malformed or signature mismatch.
    #[error("invalid session token")]
    SessionInvalid,

    /// Signal is not in a cancellable state (already executing or terminal).
    #[error("signal {0} can no longer be cancelled")]
    NotCancellable(String),

    /// Signal id is unknown or already evicted from the retention window.
    #[error("unknown signal id: {0}")]
    UnknownSignal(String),

    /// Account id is not registered.
    #[error("unknown account id: {0}")]
    UnknownAccount(String),
}

impl RelayError {
    /// Map to the normalized label where one applies.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Validation(_) => Some(ErrorKind::Validation),
            Self::DuplicateSignal(_) => Some(ErrorKind::DuplicateSignal),
            Self::NoActiveAccount { .. } => Some(ErrorKind::NoActiveAccount),
            Self::CredentialDecryption { .. } => Some(ErrorKind::CredentialDecryption),
            Self::RateLimitExceeded { .. } => Some(ErrorKind::RateLimitExceeded),
            Self::SessionExpired => Some(ErrorKind::SessionExpired),
            Self::SessionRevoked => Some(ErrorKind::SessionRevoked),
            Self::SessionInvalid
            | Self::NotCancellable(_)
            | Self::UnknownSignal(_)
            | Self::UnknownAccount(_) => None,
        }
    }
}
