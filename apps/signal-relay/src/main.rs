//! Signal Relay Binary
//!
//! Starts the signal relay service: pipeline dispatcher, reconnection
//! supervisor, health aggregator, and the health HTTP endpoint.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin signal-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `RELAY_MASTER_KEY`: 64-char hex key for the credential vault
//! - `RELAY_SESSION_SECRET`: secret for session token signing
//!
//! ## Optional
//! - `RELAY_GATEWAY_MODE`: "mock" | "rest" (default: mock)
//! - `RELAY_VENUE_URL`: venue REST bridge base URL
//! - `RELAY_HEALTH_PORT`: health/metrics HTTP port (default: 8085)
//! - `RELAY_ALERT_WEBHOOK_URL`: webhook for alerts (log-only when unset)
//! - `RELAY_RATE_KEY_MODE`: "per-owner" | "per-account" (default: per-owner)
//! - `RUST_LOG`: log level (default: info)

use std::sync::Arc;

use signal_relay::gateway::{ExecutionGateway, MockVenue, RestVenue, VenueClient};
use signal_relay::notify::{Notifier, TracingNotifier, WebhookNotifier};
use signal_relay::supervisor::{
    ConnectionMonitor, ConnectionStateTable, NotifierProbe, Probe, run_event_intake,
};
use signal_relay::{
    AccountRegistry, CredentialVault, GatewayMode, HealthAggregator, HealthServer,
    PipelineContext, RateLimiter, RelayConfig, SessionManager, SignalLedger, SignalPipeline,
    metrics, telemetry,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    telemetry::init();

    tracing::info!("starting signal relay");

    let _metrics_handle = metrics::init_metrics();

    let config = RelayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Core components, passed explicitly; no global state.
    let vault = Arc::new(CredentialVault::new(&config.master_key));
    let registry = Arc::new(AccountRegistry::new());
    let limiter = Arc::new(RateLimiter::new(config.limits.clone()));
    let sessions = Arc::new(SessionManager::new(
        config.session_secret.clone(),
        &config.session,
    ));
    let ledger = Arc::new(SignalLedger::new());

    let notifier: Arc<dyn Notifier> = match &config.notifier.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone(), &config.notifier)?),
        None => Arc::new(TracingNotifier),
    };

    let venue: Arc<dyn VenueClient> = match config.gateway.mode {
        GatewayMode::Mock => Arc::new(MockVenue::always_succeed()),
        GatewayMode::Rest => Arc::new(RestVenue::new(&config.gateway)?),
    };
    let gateway = Arc::new(ExecutionGateway::new(venue, &config.gateway));

    // Bounded event channel: workers report venue transport failures to
    // the supervisor without ever blocking on it.
    let (event_tx, event_rx) = mpsc::channel(config.pipeline.event_capacity);
    let connection_table = Arc::new(ConnectionStateTable::new());

    let ctx = Arc::new(PipelineContext {
        limiter: Arc::clone(&limiter),
        registry: Arc::clone(&registry),
        vault: Arc::clone(&vault),
        gateway: Arc::clone(&gateway),
        ledger: Arc::clone(&ledger),
        notifier: Arc::clone(&notifier),
        events: event_tx,
    });

    let (pipeline, dispatcher) =
        SignalPipeline::new(Arc::clone(&ctx), &config.pipeline, shutdown_token.clone());
    let pipeline = Arc::new(pipeline);

    tokio::spawn(dispatcher.run());

    // One monitor per external dependency.
    let gateway_monitor = ConnectionMonitor::new(
        Arc::clone(&gateway) as Arc<dyn Probe>,
        Arc::clone(&connection_table),
        Arc::clone(&notifier),
        config.supervisor.clone(),
        shutdown_token.clone(),
    );
    tokio::spawn(gateway_monitor.run());

    let notifier_monitor = ConnectionMonitor::new(
        Arc::new(NotifierProbe(Arc::clone(&notifier))) as Arc<dyn Probe>,
        Arc::clone(&connection_table),
        Arc::clone(&notifier),
        config.supervisor.clone(),
        shutdown_token.clone(),
    );
    tokio::spawn(notifier_monitor.run());

    tokio::spawn(run_event_intake(
        event_rx,
        Arc::clone(&connection_table),
        shutdown_token.clone(),
    ));

    // Health aggregation and HTTP endpoint.
    let aggregator = Arc::new(HealthAggregator::new(
        Arc::clone(&connection_table),
        Arc::clone(&pipeline),
        Arc::clone(&limiter),
        Arc::clone(&sessions),
        Arc::clone(&notifier),
        gateway.venue_name().to_string(),
        config.health.clone(),
        env!("CARGO_PKG_VERSION").to_string(),
    ));
    tokio::spawn(Arc::clone(&aggregator).run(shutdown_token.clone()));

    let health_server = HealthServer::new(
        config.health.port,
        Arc::clone(&aggregator),
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "health server error");
        }
    });

    tracing::info!("signal relay ready");

    await_shutdown(shutdown_token).await;

    tracing::info!("signal relay stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration (never secrets).
fn log_config(config: &RelayConfig) {
    tracing::info!(
        gateway_mode = config.gateway.mode.as_str(),
        rate_key_mode = config.limits.key_mode.as_str(),
        health_port = config.health.port,
        session_ttl_secs = config.session.ttl.as_secs(),
        retention_secs = config.pipeline.retention.as_secs(),
        webhook_alerts = config.notifier.webhook_url.is_some(),
        "configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
