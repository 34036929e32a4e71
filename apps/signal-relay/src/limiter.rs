//! Rate Limiter
//!
//! Fixed-window request quotas per key, checked before any
//! externally-visible action. Buckets are ephemeral: a bucket is recreated
//! the first time a key is seen in a new window, and the counter can never
//! exceed the tier limit. Requests over the limit are denied with the time
//! until the window resets; they are never queued.
//!
//! The gate runs before account resolution so denied requests never touch
//! credential material.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::{RateLimitKeyMode, RateLimitSettings, TierLimits};
use crate::model::Signal;

/// Named rate tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Sensitive operations (account registration, session issuance).
    Strict,
    /// Default tier for signal execution.
    Standard,
    /// Read-only operations.
    Relaxed,
}

impl Tier {
    /// Tier name for logs and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Standard => "standard",
            Self::Relaxed => "relaxed",
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request permitted; carries the remaining quota in this window.
    Permitted {
        /// Requests left in the current window after this one.
        remaining: u32,
    },
    /// Request denied; carries the time until the window resets.
    Denied {
        /// Remaining time until a new window opens for this key.
        retry_after: Duration,
    },
}

impl RateDecision {
    /// Whether the request was permitted.
    #[must_use]
    pub const fn is_permitted(&self) -> bool {
        matches!(self, Self::Permitted { .. })
    }
}

/// Point-in-time limiter counters for the health surface.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterStats {
    /// Total permitted requests since startup.
    pub permitted: u64,
    /// Total denied requests since startup.
    pub denied: u64,
    /// Live bucket count.
    pub active_buckets: usize,
}

#[derive(Debug)]
struct Bucket {
    window_start: Instant,
    count: u32,
}

/// Fixed-window rate limiter, safe for concurrent callers sharing a key.
pub struct RateLimiter {
    settings: RateLimitSettings,
    buckets: Mutex<HashMap<String, Bucket>>,
    permitted: AtomicU64,
    denied: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter from settings.
    #[must_use]
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            buckets: Mutex::new(HashMap::new()),
            permitted: AtomicU64::new(0),
            denied: AtomicU64::new(0),
        }
    }

    /// Derive the limiter key for a signal per the configured key mode.
    ///
    /// In per-account mode the explicit account reference is used when
    /// present; signals without one fall back to the owner key, since the
    /// actual default account is not resolved until after the gate.
    #[must_use]
    pub fn key_for(&self, signal: &Signal) -> String {
        match self.settings.key_mode {
            RateLimitKeyMode::PerOwner => format!("owner:{}", signal.owner),
            RateLimitKeyMode::PerAccount => signal.account_ref.as_ref().map_or_else(
                || format!("owner:{}", signal.owner),
                |account| format!("account:{account}"),
            ),
        }
    }

    /// Check and consume quota for `key` under `tier`.
    ///
    /// Increments are atomic under the bucket lock; a denied request does
    /// not mutate the counter.
    pub fn allow(&self, key: &str, tier: Tier) -> RateDecision {
        let limits = self.limits_for(tier);
        let now = Instant::now();
        let mut buckets = self.buckets.lock();

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            window_start: now,
            count: 0,
        });

        // Roll over to a fresh window once the old one has elapsed.
        if now.duration_since(bucket.window_start) >= limits.window {
            bucket.window_start = now;
            bucket.count = 0;
        }

        if bucket.count >= limits.max_requests {
            let elapsed = now.duration_since(bucket.window_start);
            let retry_after = limits.window.saturating_sub(elapsed);
            self.denied.fetch_add(1, Ordering::Relaxed);
            return RateDecision::Denied { retry_after };
        }

        bucket.count += 1;
        let remaining = limits.max_requests - bucket.count;
        self.permitted.fetch_add(1, Ordering::Relaxed);
        RateDecision::Permitted { remaining }
    }

    /// Drop buckets whose window elapsed; called periodically by the
    /// health aggregator poll.
    pub fn prune(&self) {
        let max_window = self
            .settings
            .strict
            .window
            .max(self.settings.standard.window)
            .max(self.settings.relaxed.window);
        let now = Instant::now();
        self.buckets
            .lock()
            .retain(|_, bucket| now.duration_since(bucket.window_start) < max_window);
    }

    /// Snapshot of limiter counters.
    #[must_use]
    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            permitted: self.permitted.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            active_buckets: self.buckets.lock().len(),
        }
    }

    const fn limits_for(&self, tier: Tier) -> TierLimits {
        match tier {
            Tier::Strict => self.settings.strict,
            Tier::Standard => self.settings.standard,
            Tier::Relaxed => self.settings.relaxed,
        }
    }
}
