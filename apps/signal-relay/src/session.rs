//! Session Manager
//!
//! Issues and validates short-lived access tokens gating privileged
//! operations. Tokens are self-contained: the owner, issuance time, and
//! expiry are signed with HMAC-SHA256, so validation needs no store lookup
//! beyond the revocation check. TTL is fixed at issuance; there is no
//! sliding renewal; callers re-authenticate after expiry.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use sha2::Sha256;
use uuid::Uuid;

use crate::config::{SessionSecret, SessionSettings};
use crate::error::RelayError;

type HmacSha256 = Hmac<Sha256>;

/// An issued session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque signed token handed to the caller.
    pub token: String,
    /// Owner the session was issued to.
    pub owner: String,
    /// Issuance time.
    pub issued_at: DateTime<Utc>,
    /// Fixed expiry; never extended.
    pub expires_at: DateTime<Utc>,
}

/// Point-in-time session counters for the health surface.
#[derive(Debug, Clone, Copy)]
pub struct SessionStats {
    /// Tokens issued since startup.
    pub issued: u64,
    /// Tokens currently in the revocation set.
    pub revoked: usize,
}

/// Issues, validates, and revokes signed session tokens.
pub struct SessionManager {
    secret: SessionSecret,
    ttl: Duration,
    revoked: RwLock<HashSet<String>>,
    issued: AtomicU64,
}

impl SessionManager {
    /// Create a session manager.
    #[must_use]
    pub fn new(secret: SessionSecret, settings: &SessionSettings) -> Self {
        Self {
            secret,
            ttl: settings.ttl,
            revoked: RwLock::new(HashSet::new()),
            issued: AtomicU64::new(0),
        }
    }

    /// Issue a new session for `owner` with the configured fixed TTL.
    #[must_use]
    pub fn issue(&self, owner: &str) -> Session {
        self.issue_at(owner, Utc::now())
    }

    /// Issue a session with an explicit issuance time.
    ///
    /// Expiry is `issued_at + ttl`, fixed for the session lifetime.
    #[must_use]
    pub fn issue_at(&self, owner: &str, issued_at: DateTime<Utc>) -> Session {
        let expires_at = issued_at
            + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::hours(24));
        let nonce = Uuid::new_v4().simple().to_string();
        let payload = format!(
            "{owner}.{}.{}.{nonce}",
            issued_at.timestamp(),
            expires_at.timestamp()
        );
        let signature = self.sign(&payload);
        let token = format!("{payload}.{signature}");

        self.issued.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(owner, expires_at = %expires_at, "session issued");

        Session {
            token,
            owner: owner.to_string(),
            issued_at,
            expires_at,
        }
    }

    /// Validate a token against the current time.
    ///
    /// # Errors
    ///
    /// - [`RelayError::SessionInvalid`] when the token is malformed or the
    ///   signature does not verify.
    /// - [`RelayError::SessionRevoked`] when the token was revoked.
    /// - [`RelayError::SessionExpired`] when the fixed expiry has passed.
    pub fn validate(&self, token: &str) -> Result<String, RelayError> {
        self.validate_at(token, Utc::now())
    }

    /// Validate a token against an explicit time.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, RelayError> {
        let (payload, signature) = token
            .rsplit_once('.')
            .ok_or(RelayError::SessionInvalid)?;

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| RelayError::SessionInvalid)?;
        mac.update(payload.as_bytes());
        let expected = hex::decode(signature).map_err(|_| RelayError::SessionInvalid)?;
        mac.verify_slice(&expected)
            .map_err(|_| RelayError::SessionInvalid)?;

        // payload = owner.issued.expires.nonce; owner ids contain no dots.
        let mut parts = payload.split('.');
        let owner = parts.next().ok_or(RelayError::SessionInvalid)?;
        let _issued = parts
            .next()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(RelayError::SessionInvalid)?;
        let expires = parts
            .next()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(RelayError::SessionInvalid)?;

        if self.revoked.read().contains(token) {
            return Err(RelayError::SessionRevoked);
        }

        let expires_at = Utc
            .timestamp_opt(expires, 0)
            .single()
            .ok_or(RelayError::SessionInvalid)?;
        if now >= expires_at {
            return Err(RelayError::SessionExpired);
        }

        Ok(owner.to_string())
    }

    /// Revoke a token immediately, regardless of remaining TTL.
    pub fn revoke(&self, token: &str) {
        self.revoked.write().insert(token.to_string());
        tracing::info!("session revoked");
    }

    /// Drop revocation entries for tokens that have expired anyway.
    pub fn prune(&self) {
        let now = Utc::now();
        self.revoked.write().retain(|token| {
            token
                .rsplitn(3, '.')
                .nth(2)
                .and_then(|payload| payload.rsplit('.').next())
                .and_then(|s| s.parse::<i64>().ok())
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
                .is_none_or(|expires_at| expires_at > now)
        });
    }

    /// Snapshot of session counters.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            issued: self.issued.load(Ordering::Relaxed),
            revoked: self.revoked.read().len(),
        }
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any size"));
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(ttl: Duration) -> SessionManager {
        SessionManager::new(
            SessionSecret::new("unit-test-secret".to_string()),
            &SessionSettings { ttl },
        )
    }

    #[test]
    fn issued_token_validates_to_owner() {
        let mgr = manager(Duration::from_secs(3600));
        let session = mgr.issue("1001");
        assert_eq!(mgr.validate(&session.token).unwrap(), "1001");
    }

    #[test]
    fn expiry_is_fixed_at_issuance() {
        let mgr = manager(Duration::from_secs(3600));
        let issued_at = Utc.with_ymd_and_hms(2026, 8, 5, 12, 0, 0).unwrap();
        let session = mgr.issue_at("1001", issued_at);

        // Valid one second before expiry, expired one second after.
        let just_before = issued_at + chrono::Duration::seconds(3599);
        let just_after = issued_at + chrono::Duration::seconds(3601);

        assert_eq!(mgr.validate_at(&session.token, just_before).unwrap(), "1001");
        assert!(matches!(
            mgr.validate_at(&session.token, just_after),
            Err(RelayError::SessionExpired)
        ));
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let mgr = manager(Duration::from_secs(3600));
        let issued_at = Utc.with_ymd_and_hms(2026, 8, 5, 12, 0, 0).unwrap();
        let session = mgr.issue_at("1001", issued_at);
        let at_expiry = issued_at + chrono::Duration::seconds(3600);

        assert!(matches!(
            mgr.validate_at(&session.token, at_expiry),
            Err(RelayError::SessionExpired)
        ));
    }

    #[test]
    fn revoked_token_fails_regardless_of_ttl() {
        let mgr = manager(Duration::from_secs(3600));
        let session = mgr.issue("1001");
        mgr.revoke(&session.token);

        assert!(matches!(
            mgr.validate(&session.token),
            Err(RelayError::SessionRevoked)
        ));
    }

    #[test]
    fn forged_token_is_rejected() {
        let mgr = manager(Duration::from_secs(3600));
        let session = mgr.issue("1001");

        // Flip the owner while keeping the original signature.
        let forged = session.token.replacen("1001", "9999", 1);
        assert!(matches!(
            mgr.validate(&forged),
            Err(RelayError::SessionInvalid)
        ));
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let mgr = manager(Duration::from_secs(3600));
        let other = SessionManager::new(
            SessionSecret::new("different-secret".to_string()),
            &SessionSettings {
                ttl: Duration::from_secs(3600),
            },
        );
        let session = other.issue("1001");
        assert!(matches!(
            mgr.validate(&session.token),
            Err(RelayError::SessionInvalid)
        ));
    }

    #[test]
    fn garbage_tokens_are_invalid() {
        let mgr = manager(Duration::from_secs(3600));
        for token in ["", "not-a-token", "a.b.c.d.e", "onlypayloadnosig"] {
            assert!(matches!(
                mgr.validate(token),
                Err(RelayError::SessionInvalid)
            ));
        }
    }

    #[test]
    fn prune_drops_expired_revocations() {
        let mgr = manager(Duration::from_secs(3600));

        let stale = mgr.issue_at("1001", Utc::now() - chrono::Duration::hours(2));
        let live = mgr.issue("1002");
        mgr.revoke(&stale.token);
        mgr.revoke(&live.token);
        assert_eq!(mgr.stats().revoked, 2);

        mgr.prune();
        assert_eq!(mgr.stats().revoked, 1);
    }

    #[test]
    fn stats_count_issued_sessions() {
        let mgr = manager(Duration::from_secs(3600));
        let _ = mgr.issue("1001");
        let _ = mgr.issue("1002");
        assert_eq!(mgr.stats().issued, 2);
    }
}
