// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Password fallback slot: the master seed wrapped under a password-derived key.

use std::sync::Arc;

use keyhold_core::{AuthCapability, KeyBlobStore, KeyholdError};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::kdf::{derive_blocking, generate_salt, KdfParams, SALT_LEN};
use crate::memory::SecretKey;
use crate::records::{self, PasswordSlotRecord, PASSWORD_SLOT_BLOB, RECORD_VERSION};
use crate::seed::MasterSeedStore;
use crate::wrap::{unwrap_key, wrap_key};

fn password_bytes(password: &SecretString) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(password.expose_secret().as_bytes().to_vec())
}

/// Opens the master seed with a password when no biometric capability is available.
#[derive(Clone)]
pub struct PasswordSlot {
    blobs: Arc<dyn KeyBlobStore>,
    kdf: KdfParams,
}

impl PasswordSlot {
    /// `kdf` applies to new enrollments; existing slots keep their stored parameters.
    pub fn new(blobs: Arc<dyn KeyBlobStore>, kdf: KdfParams) -> Self {
        Self { blobs, kdf }
    }

    pub async fn is_enrolled(&self) -> Result<bool, KeyholdError> {
        Ok(self.blobs.get(PASSWORD_SLOT_BLOB).await?.is_some())
    }

    /// Decrypt the seed with one fresh capability and store it wrapped under `password`.
    ///
    /// Replaces any existing slot.
    pub async fn enroll(
        &self,
        seed_store: &MasterSeedStore,
        capability: AuthCapability,
        password: &SecretString,
    ) -> Result<(), KeyholdError> {
        if password.expose_secret().is_empty() {
            return Err(KeyholdError::InvalidState("empty password not allowed".into()));
        }
        let seed = seed_store.decrypt(Some(capability)).await?;
        let salt = generate_salt()?;
        let key = derive_blocking(password_bytes(password), salt, self.kdf).await?;

        let record = PasswordSlotRecord {
            version: RECORD_VERSION,
            kdf: self.kdf,
            salt: salt.to_vec(),
            wrapped_seed: wrap_key(&key, seed.expose())?,
        };
        records::store(self.blobs.as_ref(), PASSWORD_SLOT_BLOB, &record).await?;
        info!("password slot enrolled");
        Ok(())
    }

    /// Recover the seed. A wrong password fails with [`KeyholdError::UnwrapFailed`].
    pub async fn open(&self, password: &SecretString) -> Result<SecretKey, KeyholdError> {
        let record: PasswordSlotRecord = records::load(self.blobs.as_ref(), PASSWORD_SLOT_BLOB)
            .await?
            .ok_or(KeyholdError::SeedUnavailable)?;
        if record.version != RECORD_VERSION {
            return Err(KeyholdError::UnwrapFailed);
        }
        let salt: [u8; SALT_LEN] = record
            .salt
            .as_slice()
            .try_into()
            .map_err(|_| KeyholdError::UnwrapFailed)?;

        let key = derive_blocking(password_bytes(password), salt, record.kdf).await?;
        let seed = unwrap_key(&key, &record.wrapped_seed).inspect_err(|_| {
            debug!("password slot rejected the supplied password");
        })?;
        SecretKey::from_slice(&seed).ok_or(KeyholdError::UnwrapFailed)
    }

    /// Delete the slot. Returns whether one existed.
    pub async fn remove(&self) -> Result<bool, KeyholdError> {
        self.blobs.delete(PASSWORD_SLOT_BLOB).await
    }
}
