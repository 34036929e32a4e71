//! Reconnection backoff policy.
//!
//! Exponential backoff with jitter, bounded by a maximum delay. The policy
//! resets to the base interval on the first successful probe; attempts are
//! unlimited because the supervisor alerts instead of giving up.

use std::time::Duration;

use rand::Rng;

use crate::config::SupervisorSettings;

/// Exponential backoff with jitter for reconnection attempts.
#[derive(Debug)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter_factor: f64,
    current: Duration,
    attempts: u32,
}

impl BackoffPolicy {
    /// Create a policy from supervisor settings.
    #[must_use]
    pub const fn new(settings: &SupervisorSettings) -> Self {
        Self {
            initial: settings.backoff_initial,
            max: settings.backoff_max,
            multiplier: settings.backoff_multiplier,
            jitter_factor: settings.jitter_factor,
            current: settings.backoff_initial,
            attempts: 0,
        }
    }

    /// Get the next delay, applying jitter and advancing the schedule.
    ///
    /// The un-jittered sequence is non-decreasing and capped at the
    /// configured maximum.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);

        let delay = self.apply_jitter(self.current);

        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current.as_millis() as f64 * self.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let capped = next_millis.min(self.max.as_millis());
        self.current = Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX));

        delay
    }

    /// Reset to the base interval after a successful probe.
    pub const fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }

    /// Failed attempts since the last reset.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(adjusted as u64)
    }
}
