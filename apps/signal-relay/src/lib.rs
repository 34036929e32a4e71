#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Signal Relay - Trade Signal Execution Service
//!
//! Ingests asynchronous trading signals from external producers, routes
//! each to the correct downstream trading account, and executes it against
//! a trading venue that may be mocked or live, staying correct under
//! network flakiness, duplicate deliveries, and concurrent access from
//! multiple users.
//!
//! # Data Flow
//!
//! ```text
//! producer ──► pipeline (validate, dedup) ──► rate limiter ──► router
//!                                                                │
//!            notification ◄── result recorded ◄── gateway ◄── vault
//! ```
//!
//! The reconnection supervisor runs independently of request flow,
//! probing the venue gateway and the notification channel; the health
//! aggregator folds connection state and component counters into a
//! composite view served over HTTP.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Environment-driven configuration.
pub mod config;

/// Error taxonomy.
pub mod error;

/// Venue gateway: capability trait, mock and REST adapters.
pub mod gateway;

/// Health aggregation and HTTP endpoint.
pub mod health;

/// Fixed-window rate limiting.
pub mod limiter;

/// Prometheus metrics.
pub mod metrics;

/// Domain model.
pub mod model;

/// Outbound notification port.
pub mod notify;

/// Signal intake and execution pipeline.
pub mod pipeline;

/// Account routing.
pub mod router;

/// Service facade with session-gated privileged operations.
pub mod service;

/// Session tokens.
pub mod session;

/// Reconnection supervision.
pub mod supervisor;

/// Tracing setup.
pub mod telemetry;

/// Credential vault.
pub mod vault;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, GatewayMode, RateLimitKeyMode, RelayConfig};
pub use error::{ErrorKind, RelayError};
pub use gateway::{ExecutionGateway, MockVenue, RestVenue, VenueClient};
pub use health::{HealthAggregator, HealthServer, HealthSnapshot, OverallStatus};
pub use limiter::{RateDecision, RateLimiter, Tier};
pub use model::{Account, ExecutionResult, Signal, SignalKind, SignalRecord, SignalStatus};
pub use notify::{BufferNotifier, Notification, Notifier, TracingNotifier, WebhookNotifier};
pub use pipeline::{PipelineContext, SignalLedger, SignalPipeline, SubmitReceipt};
pub use router::AccountRegistry;
pub use service::RelayService;
pub use session::{Session, SessionManager};
pub use supervisor::{
    ConnectionMonitor, ConnectionState, ConnectionStateTable, ConnectionStatus, ConnectivityEvent,
};
pub use vault::{CredentialVault, TradeCredentials};
