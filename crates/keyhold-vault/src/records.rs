// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Versioned on-disk records for key material.
//!
//! Records are JSON with hex-encoded byte fields, stored by name in a
//! [`KeyBlobStore`]. Every record carries a version tag so a future
//! encryption scheme can coexist with this one during migration.

use keyhold_core::{KeyBlobStore, KeyholdError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::kdf::KdfParams;

/// Current record version.
pub const RECORD_VERSION: u8 = 1;

/// Blob holding the hardware-sealed master seed.
pub const MASTER_SEED_BLOB: &str = "master_seed";
/// Blob holding the seed wrapped under the password-derived key.
pub const PASSWORD_SLOT_BLOB: &str = "password_slot";
/// Blob holding the salt the master key is derived with.
pub const MASTER_KEY_SALT_BLOB: &str = "master_key_salt";
/// Blob holding the storage passphrase wrapped under the master key.
pub const STORAGE_PASSPHRASE_BLOB: &str = "storage_passphrase";

/// Key material encrypted with AES-256-GCM. The 16-byte tag trails the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    pub version: u8,
    #[serde(with = "hex")]
    pub iv: Vec<u8>,
    #[serde(with = "hex")]
    pub ciphertext: Vec<u8>,
}

/// The master seed as encrypted by the hardware key store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSeed {
    pub version: u8,
    #[serde(with = "hex")]
    pub iv: Vec<u8>,
    #[serde(with = "hex")]
    pub ciphertext: Vec<u8>,
}

/// The master seed wrapped under a password-derived key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordSlotRecord {
    pub version: u8,
    pub kdf: KdfParams,
    #[serde(with = "hex")]
    pub salt: Vec<u8>,
    pub wrapped_seed: WrappedKey,
}

/// Salt and parameters for deriving the master key from the seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterKeySalt {
    pub version: u8,
    pub kdf: KdfParams,
    #[serde(with = "hex")]
    pub salt: Vec<u8>,
}

/// Serialize a record for storage.
pub fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, KeyholdError> {
    serde_json::to_vec(record).map_err(KeyholdError::storage)
}

/// Parse a stored record.
pub fn decode<T: DeserializeOwned>(blob: &[u8]) -> Result<T, KeyholdError> {
    serde_json::from_slice(blob).map_err(KeyholdError::storage)
}

/// Load and parse the record stored under `name`, if any.
pub async fn load<T: DeserializeOwned>(
    blobs: &dyn KeyBlobStore,
    name: &str,
) -> Result<Option<T>, KeyholdError> {
    match blobs.get(name).await? {
        Some(blob) => decode(&blob).map(Some),
        None => Ok(None),
    }
}

/// Serialize and store `record` under `name`, replacing any previous record.
pub async fn store<T: Serialize>(
    blobs: &dyn KeyBlobStore,
    name: &str,
    record: &T,
) -> Result<(), KeyholdError> {
    blobs.put(name, encode(record)?).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_key_uses_hex_fields() {
        let record = WrappedKey {
            version: RECORD_VERSION,
            iv: vec![0xde, 0xad],
            ciphertext: vec![0xbe, 0xef],
        };
        let json = String::from_utf8(encode(&record).unwrap()).unwrap();
        assert_eq!(json, r#"{"version":1,"iv":"dead","ciphertext":"beef"}"#);
        assert_eq!(decode::<WrappedKey>(json.as_bytes()).unwrap(), record);
    }

    #[test]
    fn password_slot_embeds_kdf_params() {
        let record = PasswordSlotRecord {
            version: RECORD_VERSION,
            kdf: KdfParams::V1,
            salt: vec![7; 16],
            wrapped_seed: WrappedKey {
                version: RECORD_VERSION,
                iv: vec![0; 12],
                ciphertext: vec![1; 48],
            },
        };
        let back: PasswordSlotRecord = decode(&encode(&record).unwrap()).unwrap();
        assert_eq!(back.kdf, KdfParams::V1);
        assert_eq!(back, record);
    }

    #[test]
    fn garbage_is_a_storage_error() {
        assert!(matches!(
            decode::<SealedSeed>(b"not json"),
            Err(KeyholdError::Storage { .. })
        ));
    }
}
