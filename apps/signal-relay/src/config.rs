//! Relay Configuration Settings
//!
//! Configuration types for the signal relay, loaded from environment
//! variables. Required secrets are validated at startup; everything else
//! falls back to documented defaults.

use std::time::Duration;

/// Venue gateway selection (mock vs live REST adapter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayMode {
    /// Simulated venue with deterministic tickets.
    #[default]
    Mock,
    /// Live venue reached through its REST bridge.
    Rest,
}

impl GatewayMode {
    /// Parse gateway mode from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "rest" | "live" => Self::Rest,
            _ => Self::Mock,
        }
    }

    /// Get the mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Rest => "rest",
        }
    }
}

/// Rate-limit key derivation mode.
///
/// The upstream transport decides what a "caller" is; within the relay the
/// key is derived either from the signal owner or from the resolved account
/// reference. This is an explicit configuration choice, not an inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitKeyMode {
    /// One bucket per signal owner.
    #[default]
    PerOwner,
    /// One bucket per target account.
    PerAccount,
}

impl RateLimitKeyMode {
    /// Parse key mode from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "per-account" | "per_account" | "account" => Self::PerAccount,
            _ => Self::PerOwner,
        }
    }

    /// Get the mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PerOwner => "per-owner",
            Self::PerAccount => "per-account",
        }
    }
}

/// Master key for the credential vault (32 bytes).
#[derive(Clone)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    /// Create a master key from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a master key from a 64-character hex string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the string is not 64 hex chars.
    pub fn from_hex(s: &str) -> Result<Self, ConfigError> {
        let bytes = hex::decode(s)
            .map_err(|_| ConfigError::InvalidValue("RELAY_MASTER_KEY".to_string()))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ConfigError::InvalidValue("RELAY_MASTER_KEY".to_string()))?;
        Ok(Self(key))
    }

    /// Get the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MasterKey").field(&"[REDACTED]").finish()
    }
}

/// Secret used to sign session tokens.
#[derive(Clone)]
pub struct SessionSecret(String);

impl SessionSecret {
    /// Create a session secret.
    #[must_use]
    pub const fn new(secret: String) -> Self {
        Self(secret)
    }

    /// Get the secret bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionSecret").field(&"[REDACTED]").finish()
    }
}

/// Limits for one named rate tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
}

/// Rate limiter settings.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    /// Key derivation mode.
    pub key_mode: RateLimitKeyMode,
    /// Strict tier, for sensitive operations.
    pub strict: TierLimits,
    /// Standard tier, the pipeline default.
    pub standard: TierLimits,
    /// Relaxed tier, for read-only operations.
    pub relaxed: TierLimits,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            key_mode: RateLimitKeyMode::PerOwner,
            strict: TierLimits {
                max_requests: 10,
                window: Duration::from_secs(60),
            },
            standard: TierLimits {
                max_requests: 60,
                window: Duration::from_secs(60),
            },
            relaxed: TierLimits {
                max_requests: 300,
                window: Duration::from_secs(60),
            },
        }
    }
}

/// Session manager settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Fixed token lifetime; no sliding renewal.
    pub ttl: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 3600),
        }
    }
}

/// Venue gateway settings.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Which venue client to construct.
    pub mode: GatewayMode,
    /// Base URL of the venue REST bridge (rest mode only).
    pub rest_base_url: String,
    /// Bounded timeout applied to every venue call.
    pub call_timeout: Duration,
    /// Retry attempts for read-only venue calls. Placement is never retried.
    pub read_retry_attempts: u32,
    /// Initial backoff between read retries.
    pub read_retry_initial: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            mode: GatewayMode::Mock,
            rest_base_url: "http://localhost:5002/api".to_string(),
            call_timeout: Duration::from_secs(10),
            read_retry_attempts: 3,
            read_retry_initial: Duration::from_millis(200),
        }
    }
}

/// Reconnection supervisor settings.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Interval between liveness probes while connected.
    pub probe_interval: Duration,
    /// Initial reconnection delay.
    pub backoff_initial: Duration,
    /// Maximum reconnection delay.
    pub backoff_max: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// Jitter factor as a fraction of the delay.
    pub jitter_factor: f64,
    /// Consecutive failures before an incident alert fires.
    pub alert_threshold: u32,
    /// Minimum spacing between incident alerts per dependency.
    pub alert_cooldown: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(30),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            alert_threshold: 5,
            alert_cooldown: Duration::from_secs(300),
        }
    }
}

/// Signal pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Capacity of the intake dispatch channel.
    pub queue_capacity: usize,
    /// Capacity of each per-account queue.
    pub account_queue_capacity: usize,
    /// Retention window for signal ids (dedup) and ledger records.
    pub retention: Duration,
    /// Capacity of the connectivity event channel feeding the supervisor.
    pub event_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            account_queue_capacity: 256,
            retention: Duration::from_secs(24 * 3600),
            event_capacity: 256,
        }
    }
}

/// Health aggregator settings.
#[derive(Debug, Clone)]
pub struct HealthSettings {
    /// HTTP port for the health/metrics endpoint.
    pub port: u16,
    /// Interval between composite-status polls.
    pub poll_interval: Duration,
    /// Minimum spacing between status-transition alerts.
    pub alert_cooldown: Duration,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            port: 8085,
            poll_interval: Duration::from_secs(60),
            alert_cooldown: Duration::from_secs(300),
        }
    }
}

/// Outbound notification settings.
#[derive(Debug, Clone)]
pub struct NotifierSettings {
    /// Webhook endpoint for alerts and owner notifications; log-only when
    /// unset.
    pub webhook_url: Option<String>,
    /// Bounded timeout for webhook delivery.
    pub timeout: Duration,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Vault master key.
    pub master_key: MasterKey,
    /// Session signing secret.
    pub session_secret: SessionSecret,
    /// Venue gateway settings.
    pub gateway: GatewaySettings,
    /// Rate limiter settings.
    pub limits: RateLimitSettings,
    /// Session manager settings.
    pub session: SessionSettings,
    /// Reconnection supervisor settings.
    pub supervisor: SupervisorSettings,
    /// Signal pipeline settings.
    pub pipeline: PipelineSettings,
    /// Health aggregator settings.
    pub health: HealthSettings,
    /// Outbound notification settings.
    pub notifier: NotifierSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required secrets are missing or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let master_key_hex = std::env::var("RELAY_MASTER_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("RELAY_MASTER_KEY".to_string()))?;
        let master_key = MasterKey::from_hex(&master_key_hex)?;

        let session_secret = std::env::var("RELAY_SESSION_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("RELAY_SESSION_SECRET".to_string()))?;
        if session_secret.is_empty() {
            return Err(ConfigError::EmptyValue("RELAY_SESSION_SECRET".to_string()));
        }

        let gateway_defaults = GatewaySettings::default();
        let gateway = GatewaySettings {
            mode: std::env::var("RELAY_GATEWAY_MODE")
                .map(|s| GatewayMode::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            rest_base_url: std::env::var("RELAY_VENUE_URL")
                .unwrap_or(gateway_defaults.rest_base_url),
            call_timeout: parse_env_duration_secs(
                "RELAY_VENUE_TIMEOUT_SECS",
                gateway_defaults.call_timeout,
            ),
            read_retry_attempts: parse_env_u32(
                "RELAY_VENUE_READ_RETRIES",
                gateway_defaults.read_retry_attempts,
            ),
            read_retry_initial: parse_env_duration_millis(
                "RELAY_VENUE_READ_RETRY_INITIAL_MS",
                gateway_defaults.read_retry_initial,
            ),
        };

        let limit_defaults = RateLimitSettings::default();
        let limits = RateLimitSettings {
            key_mode: std::env::var("RELAY_RATE_KEY_MODE")
                .map(|s| RateLimitKeyMode::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            strict: TierLimits {
                max_requests: parse_env_u32(
                    "RELAY_RATE_STRICT_MAX",
                    limit_defaults.strict.max_requests,
                ),
                window: parse_env_duration_secs(
                    "RELAY_RATE_STRICT_WINDOW_SECS",
                    limit_defaults.strict.window,
                ),
            },
            standard: TierLimits {
                max_requests: parse_env_u32(
                    "RELAY_RATE_STANDARD_MAX",
                    limit_defaults.standard.max_requests,
                ),
                window: parse_env_duration_secs(
                    "RELAY_RATE_STANDARD_WINDOW_SECS",
                    limit_defaults.standard.window,
                ),
            },
            relaxed: TierLimits {
                max_requests: parse_env_u32(
                    "RELAY_RATE_RELAXED_MAX",
                    limit_defaults.relaxed.max_requests,
                ),
                window: parse_env_duration_secs(
                    "RELAY_RATE_RELAXED_WINDOW_SECS",
                    limit_defaults.relaxed.window,
                ),
            },
        };

        let session = SessionSettings {
            ttl: parse_env_duration_secs("RELAY_SESSION_TTL_SECS", SessionSettings::default().ttl),
        };

        let supervisor_defaults = SupervisorSettings::default();
        let supervisor = SupervisorSettings {
            probe_interval: parse_env_duration_secs(
                "RELAY_PROBE_INTERVAL_SECS",
                supervisor_defaults.probe_interval,
            ),
            backoff_initial: parse_env_duration_secs(
                "RELAY_BACKOFF_INITIAL_SECS",
                supervisor_defaults.backoff_initial,
            ),
            backoff_max: parse_env_duration_secs(
                "RELAY_BACKOFF_MAX_SECS",
                supervisor_defaults.backoff_max,
            ),
            backoff_multiplier: parse_env_f64(
                "RELAY_BACKOFF_MULTIPLIER",
                supervisor_defaults.backoff_multiplier,
            ),
            jitter_factor: parse_env_f64(
                "RELAY_BACKOFF_JITTER",
                supervisor_defaults.jitter_factor,
            ),
            alert_threshold: parse_env_u32(
                "RELAY_ALERT_THRESHOLD",
                supervisor_defaults.alert_threshold,
            ),
            alert_cooldown: parse_env_duration_secs(
                "RELAY_ALERT_COOLDOWN_SECS",
                supervisor_defaults.alert_cooldown,
            ),
        };

        let pipeline_defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            queue_capacity: parse_env_usize(
                "RELAY_QUEUE_CAPACITY",
                pipeline_defaults.queue_capacity,
            ),
            account_queue_capacity: parse_env_usize(
                "RELAY_ACCOUNT_QUEUE_CAPACITY",
                pipeline_defaults.account_queue_capacity,
            ),
            retention: parse_env_duration_secs(
                "RELAY_RETENTION_SECS",
                pipeline_defaults.retention,
            ),
            event_capacity: parse_env_usize(
                "RELAY_EVENT_CAPACITY",
                pipeline_defaults.event_capacity,
            ),
        };

        let health_defaults = HealthSettings::default();
        let health = HealthSettings {
            port: parse_env_u16("RELAY_HEALTH_PORT", health_defaults.port),
            poll_interval: parse_env_duration_secs(
                "RELAY_HEALTH_POLL_SECS",
                health_defaults.poll_interval,
            ),
            alert_cooldown: parse_env_duration_secs(
                "RELAY_HEALTH_ALERT_COOLDOWN_SECS",
                health_defaults.alert_cooldown,
            ),
        };

        let notifier_defaults = NotifierSettings::default();
        let notifier = NotifierSettings {
            webhook_url: std::env::var("RELAY_ALERT_WEBHOOK_URL").ok(),
            timeout: parse_env_duration_secs(
                "RELAY_NOTIFY_TIMEOUT_SECS",
                notifier_defaults.timeout,
            ),
        };

        Ok(Self {
            master_key,
            session_secret: SessionSecret::new(session_secret),
            gateway,
            limits,
            session,
            supervisor,
            pipeline,
            health,
            notifier,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable failed to parse.
    #[error("environment variable {0} has an invalid value")]
    InvalidValue(String),
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_mode_parsing() {
        assert_eq!(
            GatewayMode::from_str_case_insensitive("mock"),
            GatewayMode::Mock
        );
        assert_eq!(
            GatewayMode::from_str_case_insensitive("REST"),
            GatewayMode::Rest
        );
        assert_eq!(
            GatewayMode::from_str_case_insensitive("live"),
            GatewayMode::Rest
        );
        assert_eq!(
            GatewayMode::from_str_case_insensitive("unknown"),
            GatewayMode::Mock
        );
    }

    #[test]
    fn key_mode_parsing() {
        assert_eq!(
            RateLimitKeyMode::from_str_case_insensitive("per-account"),
            RateLimitKeyMode::PerAccount
        );
        assert_eq!(
            RateLimitKeyMode::from_str_case_insensitive("PER_ACCOUNT"),
            RateLimitKeyMode::PerAccount
        );
        assert_eq!(
            RateLimitKeyMode::from_str_case_insensitive("owner"),
            RateLimitKeyMode::PerOwner
        );
    }

    #[test]
    fn master_key_from_hex() {
        let hex_key = "ab".repeat(32);
        let key = MasterKey::from_hex(&hex_key).unwrap();
        assert_eq!(key.as_bytes()[0], 0xab);

        assert!(MasterKey::from_hex("too-short").is_err());
        assert!(MasterKey::from_hex(&"ab".repeat(16)).is_err());
    }

    #[test]
    fn secrets_redacted_in_debug() {
        let key = MasterKey::new([7; 32]);
        let secret = SessionSecret::new("hunter2".to_string());
        assert!(!format!("{key:?}").contains('7'));
        assert!(format!("{key:?}").contains("REDACTED"));
        assert!(!format!("{secret:?}").contains("hunter2"));
    }

    #[test]
    fn tier_defaults_match_documented_limits() {
        let limits = RateLimitSettings::default();
        assert_eq!(limits.strict.max_requests, 10);
        assert_eq!(limits.standard.max_requests, 60);
        assert_eq!(limits.relaxed.max_requests, 300);
        assert_eq!(limits.standard.window, Duration::from_secs(60));
    }

    #[test]
    fn supervisor_defaults() {
        let settings = SupervisorSettings::default();
        assert_eq!(settings.backoff_initial, Duration::from_secs(1));
        assert_eq!(settings.backoff_max, Duration::from_secs(60));
        assert!((settings.backoff_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(settings.alert_threshold, 5);
    }
}
