//! Per-dependency connection monitor.
//!
//! Runs the probe → reconnect state machine for one dependency:
//! connected, probe on a fixed interval; on failure, reconnecting with
//! backoff-scheduled retries; on the first success, back to connected with
//! the backoff reset. After the configured number of consecutive failures
//! an incident alert fires once, with a cooldown guarding against alert
//! storms; recovery sends a closing notification for alerted incidents.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{BackoffPolicy, ConnectionStateTable, ConnectivityEvent};
use crate::config::SupervisorSettings;
use crate::gateway::ExecutionGateway;
use crate::notify::{Notification, Notifier, Severity};

/// Liveness probe for one monitored dependency.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Check the dependency; `true` means healthy.
    async fn check(&self) -> bool;

    /// Dependency name used in state records and alerts.
    fn name(&self) -> &'static str;
}

#[async_trait]
impl Probe for ExecutionGateway {
    async fn check(&self) -> bool {
        self.probe().await
    }

    fn name(&self) -> &'static str {
        self.venue_name()
    }
}

/// Probe adapter for the notification channel.
pub struct NotifierProbe(pub Arc<dyn Notifier>);

#[async_trait]
impl Probe for NotifierProbe {
    async fn check(&self) -> bool {
        self.0.probe().await
    }

    fn name(&self) -> &'static str {
        self.0.name()
    }
}

/// Monitor task for one dependency.
pub struct ConnectionMonitor {
    probe: Arc<dyn Probe>,
    table: Arc<ConnectionStateTable>,
    notifier: Arc<dyn Notifier>,
    settings: SupervisorSettings,
    cancel: CancellationToken,
}

impl ConnectionMonitor {
    /// Create a monitor.
    #[must_use]
    pub fn new(
        probe: Arc<dyn Probe>,
        table: Arc<ConnectionStateTable>,
        notifier: Arc<dyn Notifier>,
        settings: SupervisorSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            probe,
            table,
            notifier,
            settings,
            cancel,
        }
    }

    /// Run the probe loop until cancelled.
    pub async fn run(self) {
        let name = self.probe.name();
        self.table.register(name);
        tracing::info!(dependency = name, "connection monitor started");

        let mut policy = BackoffPolicy::new(&self.settings);
        let mut incident_alerted = false;
        let mut last_alert: Option<Instant> = None;
        let mut was_down = false;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let healthy = self.probe.check().await;

            let delay = if healthy {
                if was_down {
                    tracing::info!(dependency = name, "connection restored");
                    if incident_alerted {
                        self.send_recovery(name).await;
                    }
                }
                self.table.mark_connected(name);
                policy.reset();
                incident_alerted = false;
                was_down = false;
                crate::metrics::set_connection_up(name, true);
                self.settings.probe_interval
            } else {
                let delay = policy.next_delay();
                let next_retry_at = chrono::Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60));
                self.table.mark_failure(name, next_retry_at);
                crate::metrics::set_connection_up(name, false);
                crate::metrics::record_reconnect_attempt(name);

                let failures = self
                    .table
                    .get(name)
                    .map_or(0, |state| state.consecutive_failures);
                tracing::warn!(
                    dependency = name,
                    failures,
                    retry_in_ms = delay.as_millis() as u64,
                    "probe failed, reconnecting"
                );
                was_down = true;

                if failures >= self.settings.alert_threshold
                    && !incident_alerted
                    && cooldown_elapsed(last_alert, self.settings.alert_cooldown)
                {
                    self.send_incident(name, failures).await;
                    incident_alerted = true;
                    last_alert = Some(Instant::now());
                }

                delay
            };

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        tracing::debug!(dependency = name, "connection monitor stopped");
    }

    async fn send_incident(&self, name: &str, failures: u32) {
        let notification = Notification::new(
            Severity::Critical,
            format!("{name} connection lost"),
            format!(
                "{failures} consecutive probe failures; reconnecting with backoff. \
                 Manual intervention may be required."
            ),
        );
        if let Err(e) = self.notifier.notify(&notification).await {
            tracing::error!(dependency = name, error = %e, "failed to send incident alert");
        }
    }

    async fn send_recovery(&self, name: &str) {
        let downtime = self
            .table
            .get(name)
            .and_then(|state| state.last_connected_at)
            .map_or_else(
                || "unknown".to_string(),
                |at| format!("{}s", (chrono::Utc::now() - at).num_seconds().max(0)),
            );
        let notification = Notification::new(
            Severity::Info,
            format!("{name} reconnected"),
            format!("connection restored, downtime {downtime}"),
        );
        if let Err(e) = self.notifier.notify(&notification).await {
            tracing::error!(dependency = name, error = %e, "failed to send recovery notice");
        }
    }
}

fn cooldown_elapsed(last: Option<Instant>, cooldown: Duration) -> bool {
    last.is_none_or(|at| at.elapsed() >= cooldown)
}

/// Drain worker connectivity events into the state table.
///
/// Runs until the channel closes or the token is cancelled.
pub async fn run_event_intake(
    mut rx: mpsc::Receiver<ConnectivityEvent>,
    table: Arc<ConnectionStateTable>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    ConnectivityEvent::TransportFailure { dependency } => {
                        tracing::debug!(%dependency, "worker reported transport failure");
                        table.record_transport_failure(&dependency);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::BufferNotifier;
    use crate::supervisor::ConnectionStatus;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakyProbe {
        healthy: AtomicBool,
    }

    #[async_trait]
    impl Probe for FlakyProbe {
        async fn check(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn fast_settings(threshold: u32) -> SupervisorSettings {
        SupervisorSettings {
            probe_interval: Duration::from_millis(10),
            backoff_initial: Duration::from_millis(5),
            backoff_max: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
            alert_threshold: threshold,
            alert_cooldown: Duration::from_secs(300),
        }
    }

    #[tokio::test]
    async fn incident_alert_fires_once_and_recovery_closes_it() {
        let probe = Arc::new(FlakyProbe {
            healthy: AtomicBool::new(false),
        });
        let table = Arc::new(ConnectionStateTable::new());
        let notifier = Arc::new(BufferNotifier::new());
        let cancel = CancellationToken::new();

        let monitor = ConnectionMonitor::new(
            Arc::clone(&probe) as Arc<dyn Probe>,
            Arc::clone(&table),
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            fast_settings(3),
            cancel.clone(),
        );
        let handle = tokio::spawn(monitor.run());

        // Let failures accumulate past the threshold.
        tokio::time::sleep(Duration::from_millis(120)).await;
        let alerts = notifier.take();
        assert_eq!(alerts.len(), 1, "incident alert must fire exactly once");
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(
            table.get("flaky").unwrap().status,
            ConnectionStatus::Reconnecting
        );

        // Recover and expect a single recovery notice plus a reset table.
        probe.healthy.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;

        let state = table.get("flaky").unwrap();
        assert_eq!(state.status, ConnectionStatus::Connected);
        assert_eq!(state.consecutive_failures, 0);

        let notices = notifier.take();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].severity, Severity::Info);

        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_millis(100), handle).await;
    }

    #[tokio::test]
    async fn below_threshold_failures_do_not_alert() {
        let probe = Arc::new(FlakyProbe {
            healthy: AtomicBool::new(false),
        });
        let table = Arc::new(ConnectionStateTable::new());
        let notifier = Arc::new(BufferNotifier::new());
        let cancel = CancellationToken::new();

        let monitor = ConnectionMonitor::new(
            probe,
            Arc::clone(&table),
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            fast_settings(1000),
            cancel.clone(),
        );
        let handle = tokio::spawn(monitor.run());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(notifier.is_empty());

        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_millis(100), handle).await;
    }

    #[tokio::test]
    async fn event_intake_records_transport_failures() {
        let table = Arc::new(ConnectionStateTable::new());
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(8);

        let handle = tokio::spawn(run_event_intake(rx, Arc::clone(&table), cancel.clone()));

        tx.send(ConnectivityEvent::TransportFailure {
            dependency: "mock-venue".to_string(),
        })
        .await
        .unwrap();
        tx.send(ConnectivityEvent::TransportFailure {
            dependency: "mock-venue".to_string(),
        })
        .await
        .unwrap();
        drop(tx);
        let _ = tokio::time::timeout(Duration::from_millis(100), handle).await;

        assert_eq!(table.get("mock-venue").unwrap().consecutive_failures, 2);
    }
}
