// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Argon2id key derivation.
//!
//! Derives 32-byte keys from the master seed or a user password plus a
//! random 16-byte salt (Algorithm::Argon2id, Version::V0x13). Parameters are
//! versioned and persisted next to every salt that protects stored data, so
//! a later configuration change never strands an existing record.

use keyhold_config::validation::{MAX_KDF_ITERATIONS, MAX_KDF_MEMORY_KIB, MAX_KDF_PARALLELISM};
use keyhold_config::KdfConfig;
use keyhold_core::KeyholdError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::memory::{random_array, SecretKey, KEY_LEN};

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Versioned Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub version: u8,
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KdfParams {
    /// Argon2id, 64 MiB, 3 passes, 1 lane.
    pub const V1: KdfParams = KdfParams {
        version: 1,
        memory_kib: 65_536,
        iterations: 3,
        parallelism: 1,
    };

    /// Version-1 parameters with the configured costs.
    pub fn from_config(config: &KdfConfig) -> Self {
        Self {
            version: 1,
            memory_kib: config.memory_kib,
            iterations: config.iterations,
            parallelism: config.parallelism,
        }
    }

    fn argon2(&self) -> Result<argon2::Argon2<'static>, KeyholdError> {
        if self.version != 1 {
            return Err(KeyholdError::DerivationFailed(format!(
                "unsupported KDF parameter version {}",
                self.version
            )));
        }
        // Stored parameters are attacker-controlled; refuse before allocating.
        if self.memory_kib > MAX_KDF_MEMORY_KIB
            || self.iterations > MAX_KDF_ITERATIONS
            || self.parallelism > MAX_KDF_PARALLELISM
        {
            return Err(KeyholdError::DerivationFailed(format!(
                "Argon2id parameters exceed the accepted maximum (m={}KiB t={} p={})",
                self.memory_kib, self.iterations, self.parallelism
            )));
        }
        let params = argon2::Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| KeyholdError::DerivationFailed(format!("invalid Argon2id parameters: {e}")))?;
        Ok(argon2::Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params,
        ))
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::V1
    }
}

/// Derive a 32-byte key from `secret` and `salt`.
///
/// Deterministic for identical inputs. No partial key is returned on failure.
pub fn derive(secret: &[u8], salt: &[u8], params: &KdfParams) -> Result<SecretKey, KeyholdError> {
    let argon2 = params.argon2()?;
    let mut output = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(secret, salt, output.as_mut())
        .map_err(|e| KeyholdError::DerivationFailed(format!("Argon2id key derivation failed: {e}")))?;
    Ok(SecretKey::from_bytes(*output))
}

/// [`derive`] applied to a user-entered password.
pub fn derive_from_password(
    password: &SecretString,
    salt: &[u8],
    params: &KdfParams,
) -> Result<SecretKey, KeyholdError> {
    derive(password.expose_secret().as_bytes(), salt, params)
}

/// Run [`derive`] on the blocking pool so a 64 MiB derivation never stalls the runtime.
pub async fn derive_blocking(
    secret: Zeroizing<Vec<u8>>,
    salt: [u8; SALT_LEN],
    params: KdfParams,
) -> Result<SecretKey, KeyholdError> {
    tokio::task::spawn_blocking(move || derive(&secret, &salt, &params))
        .await
        .map_err(|e| KeyholdError::Internal(format!("key derivation task failed: {e}")))?
}

/// A fresh random 16-byte salt.
pub fn generate_salt() -> Result<[u8; SALT_LEN], KeyholdError> {
    random_array::<SALT_LEN>()
}
