//! Credential Vault
//!
//! Encrypted-at-rest storage for per-account trading credentials.
//! Blobs are sealed with ChaCha20-Poly1305 under a single master key; the
//! random nonce is prepended to the ciphertext. Decryption happens on
//! demand at the gateway call site and the plaintext is dropped as soon as
//! the call returns; nothing decrypted is ever cached or logged.

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::config::MasterKey;

/// Nonce length for ChaCha20-Poly1305.
const NONCE_LEN: usize = 12;

/// Decrypted trading credentials for one account.
///
/// Exists only for the duration of a single gateway call.
#[derive(Clone, Serialize, Deserialize)]
pub struct TradeCredentials {
    /// Venue login (account number).
    pub login: String,
    /// Venue server identifier.
    pub server: String,
    /// Venue password.
    pub password: String,
}

impl TradeCredentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(login: String, server: String, password: String) -> Self {
        Self {
            login,
            server,
            password,
        }
    }
}

impl std::fmt::Debug for TradeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeCredentials")
            .field("login", &self.login)
            .field("server", &self.server)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Sealed credential blob: nonce followed by ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlob(Vec<u8>);

impl SealedBlob {
    /// Wrap raw sealed bytes (e.g. loaded from storage).
    #[must_use]
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get the raw sealed bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Vault error.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Encryption failed.
    #[error("credential encryption failed")]
    Seal,
    /// Blob is malformed or the key does not match.
    #[error("credential decryption failed")]
    Open,
}

/// Encrypting credential store.
///
/// Holds only the master key; sealed blobs live on the account records.
pub struct CredentialVault {
    cipher: ChaCha20Poly1305,
}

impl CredentialVault {
    /// Create a vault from the master key.
    #[must_use]
    pub fn new(master_key: &MasterKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(master_key.as_bytes())),
        }
    }

    /// Seal credentials into an encrypted blob.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::Seal` if encryption fails.
    pub fn seal(&self, credentials: &TradeCredentials) -> Result<SealedBlob, VaultError> {
        let plaintext = serde_json::to_vec(credentials).map_err(|_| VaultError::Seal)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|_| VaultError::Seal)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(SealedBlob(sealed))
    }

    /// Open a sealed blob, returning the decrypted credentials.
    ///
    /// The caller must scope the returned value tightly: acquire, use for
    /// one gateway call, discard.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::Open` if the blob is truncated, tampered with,
    /// or sealed under a different key.
    pub fn open(&self, blob: &SealedBlob) -> Result<TradeCredentials, VaultError> {
        if blob.0.len() < NONCE_LEN {
            return Err(VaultError::Open);
        }

        let nonce = Nonce::from_slice(&blob.0[..NONCE_LEN]);
        let plaintext = self
            .cipher
            .decrypt(nonce, &blob.0[NONCE_LEN..])
            .map_err(|_| VaultError::Open)?;

        serde_json::from_slice(&plaintext).map_err(|_| VaultError::Open)
    }
}
