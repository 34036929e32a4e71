//! Account domain types.

use chrono::{DateTime, Utc};

use crate::vault::SealedBlob;

/// A credentialed trading identity that signals execute against.
///
/// Accounts are soft-deleted: deactivation clears `is_active` but keeps
/// the record so historical signals still resolve to an owner.
#[derive(Debug, Clone)]
pub struct Account {
    /// Unique account id (venue account number).
    pub id: String,
    /// Owning user.
    pub owner: String,
    /// Optional display name shown in notifications.
    pub display_name: Option<String>,
    /// Encrypted credential blob; opened only at the gateway call site.
    pub credentials: SealedBlob,
    /// Whether this is the owner's default account.
    pub is_default: bool,
    /// Whether the account accepts new signals.
    pub is_active: bool,
    /// Registration timestamp.
    pub registered_at: DateTime<Utc>,
}

impl Account {
    /// Create a new active account.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        owner: impl Into<String>,
        credentials: SealedBlob,
        is_default: bool,
    ) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            display_name: None,
            credentials,
            is_default,
            is_active: true,
            registered_at: Utc::now(),
        }
    }

    /// Set a display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Label used in notifications: display name if set, else the id.
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}
