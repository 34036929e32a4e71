//! Account Router
//!
//! Resolves which account a signal executes against. Resolution order is
//! strict: an explicit account reference on the signal (which must belong
//! to the owner and be active), otherwise the owner's default active
//! account. Resolution fails closed: a signal is never silently routed to
//! an arbitrary account, and the router never handles decrypted
//! credentials; those flow from the vault straight to the gateway call.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::RelayError;
use crate::model::{Account, Signal};

/// In-memory account registry with soft deactivation.
pub struct AccountRegistry {
    accounts: RwLock<HashMap<String, Account>>,
}

impl Default for AccountRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Register an account.
    ///
    /// The owner's first account becomes the default automatically; an
    /// account registered with `is_default` set displaces the previous
    /// default for that owner.
    pub fn register(&self, mut account: Account) {
        let mut accounts = self.accounts.write();

        let has_existing = accounts.values().any(|a| a.owner == account.owner);
        if !has_existing {
            account.is_default = true;
        } else if account.is_default {
            for existing in accounts.values_mut() {
                if existing.owner == account.owner {
                    existing.is_default = false;
                }
            }
        }

        tracing::info!(
            account_id = %account.id,
            owner = %account.owner,
            is_default = account.is_default,
            "account registered"
        );
        accounts.insert(account.id.clone(), account);
    }

    /// Soft-delete an account: it stops accepting signals but the record
    /// remains so historical signals still resolve.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnknownAccount`] if the id is not registered.
    pub fn deactivate(&self, account_id: &str) -> Result<(), RelayError> {
        let mut accounts = self.accounts.write();
        let account = accounts
            .get_mut(account_id)
            .ok_or_else(|| RelayError::UnknownAccount(account_id.to_string()))?;
        account.is_active = false;
        tracing::info!(account_id, "account deactivated");
        Ok(())
    }

    /// Mark an account as its owner's default.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnknownAccount`] if the id is not registered.
    pub fn set_default(&self, account_id: &str) -> Result<(), RelayError> {
        let mut accounts = self.accounts.write();
        let owner = accounts
            .get(account_id)
            .map(|a| a.owner.clone())
            .ok_or_else(|| RelayError::UnknownAccount(account_id.to_string()))?;

        for account in accounts.values_mut() {
            if account.owner == owner {
                account.is_default = account.id == account_id;
            }
        }
        Ok(())
    }

    /// Look up an account by id.
    #[must_use]
    pub fn get(&self, account_id: &str) -> Option<Account> {
        self.accounts.read().get(account_id).cloned()
    }

    /// All accounts registered to an owner, active or not.
    #[must_use]
    pub fn accounts_for(&self, owner: &str) -> Vec<Account> {
        let mut accounts: Vec<Account> = self
            .accounts
            .read()
            .values()
            .filter(|a| a.owner == owner)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        accounts
    }

    /// Count of registered accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }

    /// Resolve the account a signal executes against.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NoActiveAccount`] when the explicit reference
    /// does not resolve to an active account of the owner, or when the
    /// owner has no default active account.
    pub fn resolve(&self, signal: &Signal) -> Result<Account, RelayError> {
        let accounts = self.accounts.read();

        if let Some(account_ref) = &signal.account_ref {
            return accounts
                .get(account_ref)
                .filter(|a| a.owner == signal.owner && a.is_active)
                .cloned()
                .ok_or_else(|| RelayError::NoActiveAccount {
                    owner: signal.owner.clone(),
                });
        }

        accounts
            .values()
            .find(|a| a.owner == signal.owner && a.is_default && a.is_active)
            .cloned()
            .ok_or_else(|| RelayError::NoActiveAccount {
                owner: signal.owner.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SignalRecord;
    use crate::vault::SealedBlob;
    use rust_decimal_macros::dec;

    fn account(id: &str, owner: &str) -> Account {
        Account::new(id, owner, SealedBlob::from_bytes(vec![0u8; 16]), false)
    }

    fn signal_for(owner: &str, account_ref: Option<&str>) -> Signal {
        Signal::from_record(SignalRecord {
            id: Some(format!("sig-{owner}")),
            kind: "open_buy".to_string(),
            instrument: "EURUSD".to_string(),
            volume: dec!(0.1),
            price: None,
            stop: None,
            target: None,
            ticket: None,
            owner: owner.to_string(),
            account_ref: account_ref.map(String::from),
            comment: None,
            tag: None,
        })
        .unwrap()
    }

    #[test]
    fn first_account_becomes_default() {
        let registry = AccountRegistry::new();
        registry.register(account("a1", "1001"));
        registry.register(account("a2", "1001"));

        let resolved = registry.resolve(&signal_for("1001", None)).unwrap();
        assert_eq!(resolved.id, "a1");
    }

    #[test]
    fn explicit_reference_wins_over_default() {
        let registry = AccountRegistry::new();
        registry.register(account("a1", "1001"));
        registry.register(account("a2", "1001"));

        let resolved = registry.resolve(&signal_for("1001", Some("a2"))).unwrap();
        assert_eq!(resolved.id, "a2");
    }

    #[test]
    fn foreign_reference_fails_closed() {
        let registry = AccountRegistry::new();
        registry.register(account("a1", "1001"));
        registry.register(account("b1", "2002"));

        // Owner 1001 referencing 2002's account must not resolve, and must
        // not fall back to 1001's own default either.
        let err = registry.resolve(&signal_for("1001", Some("b1"))).unwrap_err();
        assert!(matches!(err, RelayError::NoActiveAccount { .. }));
    }

    #[test]
    fn inactive_reference_fails_closed() {
        let registry = AccountRegistry::new();
        registry.register(account("a1", "1001"));
        registry.register(account("a2", "1001"));
        registry.deactivate("a2").unwrap();

        let err = registry.resolve(&signal_for("1001", Some("a2"))).unwrap_err();
        assert!(matches!(err, RelayError::NoActiveAccount { .. }));
    }

    #[test]
    fn deactivated_default_stops_resolving() {
        let registry = AccountRegistry::new();
        registry.register(account("a1", "1001"));
        registry.deactivate("a1").unwrap();

        assert!(registry.resolve(&signal_for("1001", None)).is_err());
        // Record survives soft deletion.
        assert!(registry.get("a1").is_some());
    }

    #[test]
    fn unknown_owner_has_no_account() {
        let registry = AccountRegistry::new();
        let err = registry.resolve(&signal_for("9999", None)).unwrap_err();
        assert!(matches!(err, RelayError::NoActiveAccount { owner } if owner == "9999"));
    }

    #[test]
    fn registering_new_default_displaces_old() {
        let registry = AccountRegistry::new();
        registry.register(account("a1", "1001"));

        let mut preferred = account("a2", "1001");
        preferred.is_default = true;
        registry.register(preferred);

        let resolved = registry.resolve(&signal_for("1001", None)).unwrap();
        assert_eq!(resolved.id, "a2");
        assert!(!registry.get("a1").unwrap().is_default);
    }

    #[test]
    fn set_default_switches_resolution() {
        let registry = AccountRegistry::new();
        registry.register(account("a1", "1001"));
        registry.register(account("a2", "1001"));
        registry.set_default("a2").unwrap();

        assert_eq!(registry.resolve(&signal_for("1001", None)).unwrap().id, "a2");
        assert!(matches!(
            registry.set_default("missing"),
            Err(RelayError::UnknownAccount(_))
        ));
    }

    #[test]
    fn accounts_for_is_sorted_and_owner_scoped() {
        let registry = AccountRegistry::new();
        registry.register(account("a2", "1001"));
        registry.register(account("a1", "1001"));
        registry.register(account("b1", "2002"));

        let accounts = registry.accounts_for("1001");
        let ids: Vec<&str> = accounts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
    }
}
