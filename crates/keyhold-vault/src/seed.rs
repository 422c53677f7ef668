// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The master seed: one random 32-byte root secret per installation, stored
//! sealed by a hardware key that demands a fresh authentication gesture for
//! every decryption.

use std::sync::Arc;

use keyhold_audit::{AuditChain, AuditEvent};
use keyhold_core::{
    AuditEventType, AuthCapability, HardwareCiphertext, HardwareKeyError, HardwareKeyStore,
    KeyBlobStore, KeyPolicy, KeyholdError, SecurityLevel,
};
use tracing::{info, warn};

use crate::memory::SecretKey;
use crate::record_event;
use crate::records::{self, SealedSeed, MASTER_SEED_BLOB, PASSWORD_SLOT_BLOB, RECORD_VERSION};

/// Alias of the hardware key that seals the master seed.
pub const SEED_KEY_ALIAS: &str = "keyhold.master_seed";

fn map_hardware_err(e: HardwareKeyError) -> KeyholdError {
    match e {
        HardwareKeyError::AuthenticationRequired => KeyholdError::AuthenticationRequired,
        HardwareKeyError::KeyInvalidated => {
            KeyholdError::DecryptionFailed("hardware key was permanently invalidated".into())
        }
        HardwareKeyError::KeyNotFound(alias) => {
            KeyholdError::DecryptionFailed(format!("hardware key `{alias}` not found"))
        }
        HardwareKeyError::Failed(msg) => KeyholdError::DecryptionFailed(msg),
    }
}

/// Persists the hardware-sealed master seed.
#[derive(Clone)]
pub struct MasterSeedStore {
    hardware: Arc<dyn HardwareKeyStore>,
    blobs: Arc<dyn KeyBlobStore>,
    audit: Option<AuditChain>,
}

impl MasterSeedStore {
    pub fn new(hardware: Arc<dyn HardwareKeyStore>, blobs: Arc<dyn KeyBlobStore>) -> Self {
        Self {
            hardware,
            blobs,
            audit: None,
        }
    }

    /// Record seed lifecycle events on `audit`.
    pub fn with_audit(mut self, audit: AuditChain) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Whether a sealed seed is stored.
    pub async fn is_initialized(&self) -> Result<bool, KeyholdError> {
        Ok(self.blobs.get(MASTER_SEED_BLOB).await?.is_some())
    }

    /// Create and seal the seed if none is stored. Returns whether a seed was created.
    pub async fn initialize_if_absent(&self) -> Result<bool, KeyholdError> {
        if self.is_initialized().await? {
            return Ok(false);
        }
        self.seal_new_seed().await?;
        info!("master seed initialized");
        record_event(
            self.audit.as_ref(),
            AuditEvent::new(AuditEventType::SeedLifecycle, "initialize").level(SecurityLevel::High),
        )
        .await;
        Ok(true)
    }

    /// Decrypt the seed with a single-use authentication capability.
    ///
    /// The capability is consumed whatever the outcome. The returned key is
    /// wiped when dropped.
    pub async fn decrypt(
        &self,
        capability: Option<AuthCapability>,
    ) -> Result<SecretKey, KeyholdError> {
        let sealed: SealedSeed = records::load(self.blobs.as_ref(), MASTER_SEED_BLOB)
            .await?
            .ok_or(KeyholdError::SeedUnavailable)?;
        let capability = capability.ok_or(KeyholdError::AuthenticationRequired)?;
        if sealed.version != RECORD_VERSION {
            return Err(KeyholdError::DecryptionFailed(format!(
                "unsupported sealed seed version {}",
                sealed.version
            )));
        }

        let ciphertext = HardwareCiphertext {
            iv: sealed.iv,
            ciphertext: sealed.ciphertext,
        };
        let plaintext = self
            .hardware
            .decrypt(SEED_KEY_ALIAS, capability, &ciphertext)
            .await
            .map_err(|e| {
                let err = map_hardware_err(e);
                if matches!(err, KeyholdError::DecryptionFailed(_)) {
                    warn!(error = %err, "master seed decryption failed");
                }
                err
            })?;

        SecretKey::from_slice(&plaintext).ok_or_else(|| {
            KeyholdError::DecryptionFailed("sealed seed has the wrong length".into())
        })
    }

    /// Replace the seed with a fresh one.
    ///
    /// Irreversible: everything wrapped under keys derived from the old seed
    /// becomes unrecoverable. The password slot, which would still yield the
    /// old seed, is removed.
    pub async fn rotate(&self) -> Result<(), KeyholdError> {
        self.seal_new_seed().await?;
        let removed_slot = self.blobs.delete(PASSWORD_SLOT_BLOB).await?;
        warn!(removed_password_slot = removed_slot, "master seed rotated");
        record_event(
            self.audit.as_ref(),
            AuditEvent::new(AuditEventType::SeedLifecycle, "rotate").level(SecurityLevel::Critical),
        )
        .await;
        Ok(())
    }

    async fn seal_new_seed(&self) -> Result<(), KeyholdError> {
        let exists = self
            .hardware
            .key_exists(SEED_KEY_ALIAS)
            .await
            .map_err(|e| KeyholdError::HardwareKey(e.to_string()))?;
        if !exists {
            self.hardware
                .create_key(SEED_KEY_ALIAS, KeyPolicy::per_use_authentication())
                .await
                .map_err(|e| KeyholdError::HardwareKey(e.to_string()))?;
        }

        let seed = SecretKey::generate()?;
        let sealed = match self.hardware.encrypt(SEED_KEY_ALIAS, seed.expose()).await {
            // Enrollment changed: the old key is unusable, replace it.
            Err(HardwareKeyError::KeyInvalidated) => {
                warn!(alias = SEED_KEY_ALIAS, "hardware key invalidated, recreating");
                self.hardware
                    .delete_key(SEED_KEY_ALIAS)
                    .await
                    .map_err(|e| KeyholdError::HardwareKey(e.to_string()))?;
                self.hardware
                    .create_key(SEED_KEY_ALIAS, KeyPolicy::per_use_authentication())
                    .await
                    .map_err(|e| KeyholdError::HardwareKey(e.to_string()))?;
                self.hardware.encrypt(SEED_KEY_ALIAS, seed.expose()).await
            }
            other => other,
        }
        .map_err(|e| KeyholdError::HardwareKey(e.to_string()))?;
        drop(seed);

        let record = SealedSeed {
            version: RECORD_VERSION,
            iv: sealed.iv,
            ciphertext: sealed.ciphertext,
        };
        records::store(self.blobs.as_ref(), MASTER_SEED_BLOB, &record).await
    }
}
