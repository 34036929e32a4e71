//! Relay Service
//!
//! Thin orchestration layer over the pipeline components. Signal
//! submission is open to the upstream producer; privileged operations
//! (authentication, account management, cancellation) are gated by the
//! session manager and rate-limited on the strict tier.

use std::sync::Arc;

use crate::error::RelayError;
use crate::limiter::{RateDecision, RateLimiter, Tier};
use crate::model::{Account, Signal, SignalRecord, SignalStatus};
use crate::pipeline::{SignalPipeline, SubmitReceipt};
use crate::router::AccountRegistry;
use crate::session::{Session, SessionManager};
use crate::vault::{CredentialVault, TradeCredentials};

/// Public operations of the relay.
pub struct RelayService {
    pipeline: Arc<SignalPipeline>,
    registry: Arc<AccountRegistry>,
    vault: Arc<CredentialVault>,
    sessions: Arc<SessionManager>,
    limiter: Arc<RateLimiter>,
}

impl RelayService {
    /// Create the service over shared components.
    #[must_use]
    pub fn new(
        pipeline: Arc<SignalPipeline>,
        registry: Arc<AccountRegistry>,
        vault: Arc<CredentialVault>,
        sessions: Arc<SessionManager>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            pipeline,
            registry,
            vault,
            sessions,
            limiter,
        }
    }

    /// Submit a signal record from the upstream producer.
    ///
    /// # Errors
    ///
    /// See [`SignalPipeline::submit`].
    pub async fn submit(&self, record: SignalRecord) -> Result<SubmitReceipt, RelayError> {
        self.pipeline.submit(record).await
    }

    /// Status of a tracked signal.
    #[must_use]
    pub fn signal_status(&self, id: &str) -> Option<SignalStatus> {
        self.pipeline.status(id)
    }

    /// Authenticate an owner, issuing a fixed-TTL session.
    ///
    /// Issuance runs on the strict tier so credential-stuffing style bursts
    /// are bounded.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::RateLimitExceeded`] when the tier quota is
    /// exhausted.
    pub fn login(&self, owner: &str) -> Result<Session, RelayError> {
        let key = format!("auth:{owner}");
        match self.limiter.allow(&key, Tier::Strict) {
            RateDecision::Denied { retry_after } => {
                crate::metrics::record_rate_limit_denied(Tier::Strict.as_str());
                Err(RelayError::RateLimitExceeded {
                    key,
                    retry_after_secs: retry_after.as_secs(),
                })
            }
            RateDecision::Permitted { .. } => Ok(self.sessions.issue(owner)),
        }
    }

    /// Invalidate a session immediately.
    pub fn logout(&self, token: &str) {
        self.sessions.revoke(token);
    }

    /// Register a trading account for the session owner.
    ///
    /// Credentials are sealed before the registry ever sees them.
    ///
    /// # Errors
    ///
    /// Session errors, strict-tier rate limiting, or a vault seal failure.
    pub fn register_account(
        &self,
        token: &str,
        account_id: &str,
        display_name: Option<&str>,
        credentials: &TradeCredentials,
        is_default: bool,
    ) -> Result<(), RelayError> {
        let owner = self.sessions.validate(token)?;
        self.check_tier(&owner, Tier::Strict)?;

        let blob = self
            .vault
            .seal(credentials)
            .map_err(|_| RelayError::CredentialDecryption {
                account_id: account_id.to_string(),
            })?;

        let mut account = Account::new(account_id, owner, blob, is_default);
        if let Some(name) = display_name {
            account = account.with_display_name(name);
        }
        self.registry.register(account);
        Ok(())
    }

    /// Deactivate one of the session owner's accounts (soft delete).
    ///
    /// # Errors
    ///
    /// Session errors, or [`RelayError::UnknownAccount`] when the account
    /// does not exist or belongs to someone else.
    pub fn deactivate_account(&self, token: &str, account_id: &str) -> Result<(), RelayError> {
        let owner = self.sessions.validate(token)?;

        // Ownership check fails closed: foreign accounts look unknown.
        match self.registry.get(account_id) {
            Some(account) if account.owner == owner => self.registry.deactivate(account_id),
            _ => Err(RelayError::UnknownAccount(account_id.to_string())),
        }
    }

    /// Accounts registered to the session owner.
    ///
    /// # Errors
    ///
    /// Session errors or relaxed-tier rate limiting.
    pub fn accounts(&self, token: &str) -> Result<Vec<Account>, RelayError> {
        let owner = self.sessions.validate(token)?;
        self.check_tier(&owner, Tier::Relaxed)?;
        Ok(self.registry.accounts_for(&owner))
    }

    /// Cancel one of the session owner's signals before execution starts.
    ///
    /// # Errors
    ///
    /// Session errors, [`RelayError::UnknownSignal`] for foreign or
    /// untracked ids, [`RelayError::NotCancellable`] once executing.
    pub fn cancel_signal(&self, token: &str, signal_id: &str) -> Result<(), RelayError> {
        let owner = self.sessions.validate(token)?;

        match self.pipeline.owner_of(signal_id) {
            Some(signal_owner) if signal_owner == owner => self.pipeline.cancel(signal_id),
            _ => Err(RelayError::UnknownSignal(signal_id.to_string())),
        }
    }

    /// Signal history for the session owner, most recent first.
    ///
    /// # Errors
    ///
    /// Session errors or relaxed-tier rate limiting.
    pub fn history(&self, token: &str) -> Result<Vec<(Signal, SignalStatus)>, RelayError> {
        let owner = self.sessions.validate(token)?;
        self.check_tier(&owner, Tier::Relaxed)?;
        Ok(self.pipeline.history_for(&owner))
    }

    // Tier-scoped keys keep these buckets separate from the standard-tier
    // buckets the pipeline consumes per owner.
    fn check_tier(&self, owner: &str, tier: Tier) -> Result<(), RelayError> {
        let key = format!("{}:{owner}", tier.as_str());
        match self.limiter.allow(&key, tier) {
            RateDecision::Denied { retry_after } => {
                crate::metrics::record_rate_limit_denied(tier.as_str());
                Err(RelayError::RateLimitExceeded {
                    key,
                    retry_after_secs: retry_after.as_secs(),
                })
            }
            RateDecision::Permitted { .. } => Ok(()),
        }
    }
}
