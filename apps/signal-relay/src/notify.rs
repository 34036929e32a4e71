//! Outbound Notification Port
//!
//! Boundary to the external notification collaborator (chat bot, pager,
//! webhook). The relay only depends on the [`Notifier`] trait; execution
//! outcomes, supervisor incidents, and health transitions all flow through
//! it. Delivery is best-effort with a bounded timeout and never blocks
//! request-path code beyond that timeout.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use crate::config::NotifierSettings;

/// Notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Routine information (execution confirmations).
    Info,
    /// Degraded but functional (reconnecting, denials).
    Warning,
    /// Operator attention needed (incident alerts, vault failures).
    Critical,
}

impl Severity {
    /// Label for logs and payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// A message for the notification collaborator.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Severity level.
    pub severity: Severity,
    /// Short title.
    pub title: String,
    /// Human-readable body.
    pub body: String,
}

impl Notification {
    /// Build a notification.
    #[must_use]
    pub fn new(severity: Severity, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Notification delivery failure.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The channel could not be reached.
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Outbound notification capability.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification.
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Cheap liveness probe used by the reconnection supervisor.
    async fn probe(&self) -> bool;

    /// Channel name for logs and connection-state records.
    fn name(&self) -> &'static str;
}

/// Log-only notifier, the default when no webhook is configured.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        match notification.severity {
            Severity::Info => tracing::info!(
                title = %notification.title,
                body = %notification.body,
                "notification"
            ),
            Severity::Warning => tracing::warn!(
                title = %notification.title,
                body = %notification.body,
                "notification"
            ),
            Severity::Critical => tracing::error!(
                title = %notification.title,
                body = %notification.body,
                "notification"
            ),
        }
        Ok(())
    }

    async fn probe(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "log-notifier"
    }
}

/// Webhook notifier posting JSON payloads to a configured endpoint.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// Create a webhook notifier.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Delivery`] if the HTTP client cannot be built.
    pub fn new(url: String, settings: &NotifierSettings) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| NotifyError::Delivery(format!("http client: {e}")))?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = json!({
            "severity": notification.severity.as_str(),
            "title": notification.title,
            "text": notification.body,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Delivery(format!(
                "webhook returned {}",
                response.status()
            )))
        }
    }

    async fn probe(&self) -> bool {
        // Any HTTP response counts as reachable; webhook endpoints often
        // reject GET with 405 while still being healthy.
        self.http.get(&self.url).send().await.is_ok()
    }

    fn name(&self) -> &'static str {
        "webhook-notifier"
    }
}

/// Capturing notifier for tests.
pub struct BufferNotifier {
    messages: Mutex<Vec<Notification>>,
    online: AtomicBool,
}

impl Default for BufferNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferNotifier {
    /// Create an empty buffer notifier.
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            online: AtomicBool::new(true),
        }
    }

    /// Script probe results.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Drain captured notifications.
    #[must_use]
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut self.messages.lock())
    }

    /// Number of captured notifications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Whether nothing has been captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[async_trait]
impl Notifier for BufferNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("notifier offline".to_string()));
        }
        self.messages.lock().push(notification.clone());
        Ok(())
    }

    async fn probe(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "buffer-notifier"
    }
}
