//! Health Aggregator
//!
//! Polls connection state and component counters on a fixed interval,
//! computes a composite status, and serves it over HTTP for operators and
//! orchestrators. Alerts fire on status *transitions* only, with a
//! cooldown bounding alert frequency; steady-state polling is silent.
//!
//! # Endpoints
//!
//! - `GET /health` - Composite JSON snapshot
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (fails while execution path is down)
//! - `GET /metrics` - Prometheus metrics in text format

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::HealthSettings;
use crate::limiter::RateLimiter;
use crate::metrics::get_metrics_handle;
use crate::notify::{Notification, Notifier, Severity};
use crate::pipeline::SignalPipeline;
use crate::session::SessionManager;
use crate::supervisor::{ConnectionState, ConnectionStateTable, ConnectionStatus};

// =============================================================================
// Snapshot Types
// =============================================================================

/// Composite service status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    /// All dependencies connected.
    Ok,
    /// Some dependency is reconnecting or degraded.
    Degraded,
    /// The execution path is unavailable.
    Down,
}

impl OverallStatus {
    /// Stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Degraded => "degraded",
            Self::Down => "down",
        }
    }
}

/// Signal pipeline counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SignalCounters {
    /// Signals accepted since startup.
    pub submitted: u64,
    /// Executed successfully.
    pub executed: u64,
    /// Terminal failures.
    pub failed: u64,
    /// Rejected after acceptance.
    pub rejected: u64,
    /// Cancelled or aged out.
    pub expired: u64,
    /// Currently waiting or in flight.
    pub in_flight: usize,
}

/// Rate limiter counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateCounters {
    /// Permitted requests since startup.
    pub permitted: u64,
    /// Denied requests since startup.
    pub denied: u64,
}

/// Session manager counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SessionCounters {
    /// Sessions issued since startup.
    pub issued: u64,
    /// Tokens currently revoked.
    pub revoked: usize,
}

/// Point-in-time composite health view.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// Composite status.
    pub overall: OverallStatus,
    /// Service version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// Snapshot time.
    pub current_time: DateTime<Utc>,
    /// Per-dependency connection state.
    pub components: BTreeMap<String, ConnectionState>,
    /// Pipeline counters.
    pub signals: SignalCounters,
    /// Limiter counters.
    pub rate_limiter: RateCounters,
    /// Session counters.
    pub sessions: SessionCounters,
}

// =============================================================================
// Aggregator
// =============================================================================

/// Composite health state over all relay components.
pub struct HealthAggregator {
    table: Arc<ConnectionStateTable>,
    pipeline: Arc<SignalPipeline>,
    limiter: Arc<RateLimiter>,
    sessions: Arc<SessionManager>,
    notifier: Arc<dyn Notifier>,
    venue_dependency: String,
    settings: HealthSettings,
    version: String,
    started_at: Instant,
    last_overall: Mutex<Option<OverallStatus>>,
    last_alert: Mutex<Option<Instant>>,
}

impl HealthAggregator {
    /// Create an aggregator.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        table: Arc<ConnectionStateTable>,
        pipeline: Arc<SignalPipeline>,
        limiter: Arc<RateLimiter>,
        sessions: Arc<SessionManager>,
        notifier: Arc<dyn Notifier>,
        venue_dependency: String,
        settings: HealthSettings,
        version: String,
    ) -> Self {
        Self {
            table,
            pipeline,
            limiter,
            sessions,
            notifier,
            venue_dependency,
            settings,
            version,
            started_at: Instant::now(),
            last_overall: Mutex::new(None),
            last_alert: Mutex::new(None),
        }
    }

    /// Build a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        let components: BTreeMap<String, ConnectionState> =
            self.table.snapshot().into_iter().collect();
        let overall = self.compute_overall(&components);

        let totals = self.pipeline.totals();
        let limiter = self.limiter.stats();
        let sessions = self.sessions.stats();

        HealthSnapshot {
            overall,
            version: self.version.clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            current_time: Utc::now(),
            components,
            signals: SignalCounters {
                submitted: totals.submitted,
                executed: totals.executed,
                failed: totals.failed,
                rejected: totals.rejected,
                expired: totals.expired,
                in_flight: self.pipeline.in_flight(),
            },
            rate_limiter: RateCounters {
                permitted: limiter.permitted,
                denied: limiter.denied,
            },
            sessions: SessionCounters {
                issued: sessions.issued,
                revoked: sessions.revoked,
            },
        }
    }

    /// Run the poll loop until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            poll_secs = self.settings.poll_interval.as_secs(),
            "health aggregator started"
        );
        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => self.poll().await,
            }
        }
        tracing::debug!("health aggregator stopped");
    }

    async fn poll(&self) {
        // Housekeeping rides on the poll: prune aged ids, buckets, and
        // revocations so no component needs its own timer.
        self.pipeline.housekeeping();
        self.limiter.prune();
        self.sessions.prune();

        #[allow(clippy::cast_precision_loss)]
        crate::metrics::set_queue_depth(self.pipeline.in_flight() as f64);

        let snapshot = self.snapshot();
        let previous = self.last_overall.lock().replace(snapshot.overall);

        match previous {
            Some(previous) if previous != snapshot.overall => {
                tracing::info!(
                    from = previous.as_str(),
                    to = snapshot.overall.as_str(),
                    "composite health changed"
                );
                self.alert_transition(previous, snapshot.overall).await;
            }
            None => {
                tracing::info!(status = snapshot.overall.as_str(), "initial composite health");
            }
            _ => {}
        }
    }

    async fn alert_transition(&self, from: OverallStatus, to: OverallStatus) {
        let cooled_down = {
            let last_alert = self.last_alert.lock();
            last_alert.is_none_or(|at| at.elapsed() >= self.settings.alert_cooldown)
        };
        // Recoveries always go out; degradation alerts respect the cooldown.
        if to != OverallStatus::Ok && !cooled_down {
            return;
        }

        let severity = match to {
            OverallStatus::Ok => Severity::Info,
            OverallStatus::Degraded => Severity::Warning,
            OverallStatus::Down => Severity::Critical,
        };
        let notification = Notification::new(
            severity,
            format!("relay health: {}", to.as_str()),
            format!("composite status changed from {} to {}", from.as_str(), to.as_str()),
        );

        if let Err(err) = self.notifier.notify(&notification).await {
            tracing::warn!(%err, "health transition alert failed");
        } else if to != OverallStatus::Ok {
            *self.last_alert.lock() = Some(Instant::now());
        }
    }

    fn compute_overall(&self, components: &BTreeMap<String, ConnectionState>) -> OverallStatus {
        compute_overall(components, &self.venue_dependency)
    }
}

/// Composite rule: down if the execution-path dependency is disconnected,
/// degraded while anything is reconnecting or disconnected, ok otherwise.
fn compute_overall(
    components: &BTreeMap<String, ConnectionState>,
    venue_dependency: &str,
) -> OverallStatus {
    let venue_status = components.get(venue_dependency).map(|state| state.status);

    match venue_status {
        None | Some(ConnectionStatus::Disconnected) => return OverallStatus::Down,
        Some(ConnectionStatus::Reconnecting) => return OverallStatus::Degraded,
        Some(ConnectionStatus::Connected) => {}
    }

    let all_connected = components
        .values()
        .all(|state| state.status == ConnectionStatus::Connected);
    if all_connected {
        OverallStatus::Ok
    } else {
        OverallStatus::Degraded
    }
}

// =============================================================================
// HTTP Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    aggregator: Arc<HealthAggregator>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a health server.
    #[must_use]
    pub const fn new(
        port: u16,
        aggregator: Arc<HealthAggregator>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            port,
            aggregator,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.aggregator);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("health server stopped");
        Ok(())
    }
}

async fn health_handler(State(aggregator): State<Arc<HealthAggregator>>) -> impl IntoResponse {
    let snapshot = aggregator.snapshot();
    let status_code = match snapshot.overall {
        OverallStatus::Ok | OverallStatus::Degraded => StatusCode::OK,
        OverallStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(snapshot))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(aggregator): State<Arc<HealthAggregator>>) -> impl IntoResponse {
    if aggregator.snapshot().overall == OverallStatus::Down {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    } else {
        (StatusCode::OK, "READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
