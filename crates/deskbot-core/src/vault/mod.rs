//! Credential vault
//!
//! Holds the provider API key encrypted at rest. Three lifetimes are
//! supported:
//! - `Session`: volatile store only, gone when the process exits
//! - `Temporary`: durable store, expires 24 hours after saving
//! - `Pinned`: durable store, no expiry
//!
//! Records written by older clients (plaintext under `apiKey`) are
//! re-encrypted the first time they are loaded.

mod cipher;
mod validators;
mod verify;

pub use cipher::{derive_key, installation_fingerprint, user_agent, VaultCipher};
pub use validators::{
    strength_points, FormatCheck, KeyStrength, KeyValidator, ValidationFailure, ValidatorChain,
};
pub use verify::{verify_key, KeyFailure, KeyVerification};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::config::DeskSettings;
use crate::constants::vault::TEMPORARY_TTL_MS;
use crate::error::DeskError;
use crate::storage::{now_ms, KeyValueStore};

/// How long a saved key lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    Session,
    Temporary,
    Pinned,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageMode::Session => "session",
            StorageMode::Temporary => "temporary",
            StorageMode::Pinned => "pinned",
        })
    }
}

/// Decrypted API key; wiped on drop and never printed
#[derive(Clone)]
pub struct ApiKey(Zeroizing<String>);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(Zeroizing::new(key.into()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl From<Zeroizing<String>> for ApiKey {
    fn from(value: Zeroizing<String>) -> Self {
        Self(value)
    }
}

/// Persisted record shape
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCredential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ciphertext: Option<String>,
    #[serde(default)]
    encrypted: bool,
    #[serde(default)]
    pinned: bool,
    /// Epoch ms; 0 means no expiry
    #[serde(default)]
    expiry: i64,
    /// Plaintext key from clients that predate encryption
    #[serde(rename = "apiKey", default, skip_serializing_if = "Option::is_none")]
    legacy_key: Option<String>,
}

impl StoredCredential {
    fn is_expired(&self, now: i64) -> bool {
        self.expiry > 0 && now >= self.expiry
    }
}

/// What is stored, without decrypting it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStatus {
    pub mode: Option<StorageMode>,
    /// Epoch ms, for temporary keys
    pub expires_at: Option<i64>,
}

impl CredentialStatus {
    pub fn is_stored(&self) -> bool {
        self.mode.is_some()
    }
}

#[derive(Clone, Copy)]
enum Slot {
    Session,
    Durable,
}

/// Encrypted API key storage for one namespace
pub struct CredentialVault {
    session: Arc<dyn KeyValueStore>,
    durable: Arc<dyn KeyValueStore>,
    record_key: String,
    cipher: VaultCipher,
    validators: ValidatorChain,
}

impl CredentialVault {
    pub fn new(
        settings: &DeskSettings,
        session: Arc<dyn KeyValueStore>,
        durable: Arc<dyn KeyValueStore>,
    ) -> Self {
        let fingerprint = installation_fingerprint(&settings.namespace, &user_agent());
        Self {
            cipher: VaultCipher::new(
                durable.clone(),
                &settings.namespace,
                fingerprint,
                settings.kdf_iterations,
            ),
            session,
            durable,
            record_key: format!("{}.api_key", settings.namespace),
            validators: ValidatorChain::standard(settings.min_key_strength),
        }
    }

    pub fn validators(&self) -> &ValidatorChain {
        &self.validators
    }

    pub fn validate_format(&self, key: &str) -> FormatCheck {
        self.validators.validate_format(key)
    }

    fn store(&self, slot: Slot) -> &dyn KeyValueStore {
        match slot {
            Slot::Session => self.session.as_ref(),
            Slot::Durable => self.durable.as_ref(),
        }
    }

    /// Validate, encrypt and persist `key`; any record in the other store is removed
    pub async fn save(&self, key: &str, mode: StorageMode) -> Result<(), DeskError> {
        let key = key.trim();
        self.validators
            .validate(key)
            .map_err(|failure| DeskError::Format {
                check: failure.check.to_string(),
                message: failure.message,
            })?;

        let record = StoredCredential {
            ciphertext: Some(self.cipher.encrypt(key).await?),
            encrypted: true,
            pinned: mode == StorageMode::Pinned,
            expiry: match mode {
                StorageMode::Temporary => now_ms() + TEMPORARY_TTL_MS,
                _ => 0,
            },
            legacy_key: None,
        };
        let (target, other) = match mode {
            StorageMode::Session => (Slot::Session, Slot::Durable),
            StorageMode::Temporary | StorageMode::Pinned => (Slot::Durable, Slot::Session),
        };
        self.write_record(target, &record)?;
        self.store(other).remove(&self.record_key)?;

        tracing::info!(mode = %mode, "API key saved");
        Ok(())
    }

    /// Decrypt the stored key, preferring the session store
    ///
    /// Expired and unparseable records are deleted and treated as absent.
    pub async fn load(&self) -> Result<Option<ApiKey>, DeskError> {
        for slot in [Slot::Session, Slot::Durable] {
            if let Some(key) = self.load_from(slot).await? {
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    async fn load_from(&self, slot: Slot) -> Result<Option<ApiKey>, DeskError> {
        let Some(record) = self.read_record(slot)? else {
            return Ok(None);
        };

        if record.encrypted {
            let Some(ciphertext) = record.ciphertext.as_deref() else {
                tracing::warn!("Encrypted credential record has no ciphertext, removing");
                self.store(slot).remove(&self.record_key)?;
                return Ok(None);
            };
            return Ok(Some(self.cipher.decrypt(ciphertext).await?.into()));
        }

        let StoredCredential {
            pinned,
            expiry,
            legacy_key,
            ..
        } = record;
        match legacy_key {
            Some(plain) if !plain.trim().is_empty() => {
                let plain = Zeroizing::new(plain);
                self.migrate_legacy(slot, pinned, expiry, &plain).await?;
                Ok(Some(ApiKey(plain)))
            }
            _ => {
                tracing::warn!("Credential record holds no key, removing");
                self.store(slot).remove(&self.record_key)?;
                Ok(None)
            }
        }
    }

    fn read_record(&self, slot: Slot) -> Result<Option<StoredCredential>, DeskError> {
        let store = self.store(slot);
        let Some(raw) = store.get(&self.record_key)? else {
            return Ok(None);
        };

        let record: StoredCredential = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Credential record is not valid JSON, removing: {}", e);
                store.remove(&self.record_key)?;
                return Ok(None);
            }
        };

        if record.is_expired(now_ms()) {
            tracing::info!("Temporary API key expired, clearing");
            store.remove(&self.record_key)?;
            return Ok(None);
        }
        Ok(Some(record))
    }

    fn write_record(&self, slot: Slot, record: &StoredCredential) -> Result<(), DeskError> {
        let json = serde_json::to_string(record)
            .map_err(|e| DeskError::CredentialCrypto(format!("failed to encode record: {e}")))?;
        self.store(slot).set(&self.record_key, &json)?;
        Ok(())
    }

    /// Rewrite a plaintext record in encrypted form, keeping its lifetime
    async fn migrate_legacy(
        &self,
        slot: Slot,
        pinned: bool,
        expiry: i64,
        plain: &str,
    ) -> Result<(), DeskError> {
        let record = StoredCredential {
            ciphertext: Some(self.cipher.encrypt(plain).await?),
            encrypted: true,
            pinned,
            expiry,
            legacy_key: None,
        };
        self.write_record(slot, &record)?;
        tracing::info!("Migrated legacy plaintext API key to encrypted storage");
        Ok(())
    }

    /// Remove the key from both stores
    pub fn clear(&self) -> Result<(), DeskError> {
        self.session.remove(&self.record_key)?;
        self.durable.remove(&self.record_key)?;
        tracing::info!("API key cleared");
        Ok(())
    }

    /// Report where the key lives and when it expires, without decrypting
    pub fn status(&self) -> Result<CredentialStatus, DeskError> {
        if self.read_record(Slot::Session)?.is_some() {
            return Ok(CredentialStatus {
                mode: Some(StorageMode::Session),
                expires_at: None,
            });
        }

        Ok(match self.read_record(Slot::Durable)? {
            Some(record) if record.expiry > 0 => CredentialStatus {
                mode: Some(StorageMode::Temporary),
                expires_at: Some(record.expiry),
            },
            Some(_) => CredentialStatus {
                mode: Some(StorageMode::Pinned),
                expires_at: None,
            },
            None => CredentialStatus {
                mode: None,
                expires_at: None,
            },
        })
    }
}
