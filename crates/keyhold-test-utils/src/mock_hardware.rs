// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock hardware key store for deterministic testing.
//!
//! `MockHardwareKeyStore` implements `HardwareKeyStore` with real AES-256-GCM
//! under in-memory keys. Decryption only succeeds with a capability handed
//! out by [`MockHardwareKeyStore::issue_capability`], and each capability
//! works exactly once, as a per-use authentication policy demands.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use keyhold_core::{AuthCapability, HardwareCiphertext, HardwareKeyError, HardwareKeyStore, KeyPolicy};
use rand::RngCore;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use tokio::sync::Mutex;
use zeroize::Zeroizing;

struct MockKey {
    material: Zeroizing<[u8; 32]>,
    policy: KeyPolicy,
    invalidated: bool,
}

impl MockKey {
    fn generate(policy: KeyPolicy) -> Self {
        let mut material = Zeroizing::new([0u8; 32]);
        rand::thread_rng().fill_bytes(&mut material[..]);
        Self {
            material,
            policy,
            invalidated: false,
        }
    }

    fn aead(&self) -> Result<LessSafeKey, HardwareKeyError> {
        UnboundKey::new(&AES_256_GCM, &self.material[..])
            .map(LessSafeKey::new)
            .map_err(|_| HardwareKeyError::Failed("bad key material".into()))
    }
}

/// A hardware key store that lives in memory.
pub struct MockHardwareKeyStore {
    keys: Mutex<HashMap<String, MockKey>>,
    outstanding: Mutex<HashSet<u64>>,
    decrypt_calls: AtomicUsize,
}

impl MockHardwareKeyStore {
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            outstanding: Mutex::new(HashSet::new()),
            decrypt_calls: AtomicUsize::new(0),
        }
    }

    /// Simulate a successful biometric gesture.
    pub async fn issue_capability(&self) -> AuthCapability {
        let handle = rand::random::<u64>();
        self.outstanding.lock().await.insert(handle);
        AuthCapability::new(handle)
    }

    /// Simulate an enrollment change: the key under `alias` stops working for good.
    pub async fn invalidate(&self, alias: &str) -> bool {
        match self.keys.lock().await.get_mut(alias) {
            Some(key) => {
                key.invalidated = true;
                true
            }
            None => false,
        }
    }

    /// Policy the key under `alias` was created with.
    pub async fn policy(&self, alias: &str) -> Option<KeyPolicy> {
        self.keys.lock().await.get(alias).map(|k| k.policy)
    }

    /// Number of decrypt attempts so far, including rejected ones.
    pub fn decrypt_calls(&self) -> usize {
        self.decrypt_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockHardwareKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HardwareKeyStore for MockHardwareKeyStore {
    async fn key_exists(&self, alias: &str) -> Result<bool, HardwareKeyError> {
        Ok(self.keys.lock().await.contains_key(alias))
    }

    async fn create_key(&self, alias: &str, policy: KeyPolicy) -> Result<(), HardwareKeyError> {
        self.keys
            .lock()
            .await
            .insert(alias.to_string(), MockKey::generate(policy));
        Ok(())
    }

    async fn encrypt(
        &self,
        alias: &str,
        plaintext: &[u8],
    ) -> Result<HardwareCiphertext, HardwareKeyError> {
        let keys = self.keys.lock().await;
        let key = keys
            .get(alias)
            .ok_or_else(|| HardwareKeyError::KeyNotFound(alias.to_string()))?;
        if key.invalidated {
            return Err(HardwareKeyError::KeyInvalidated);
        }

        let mut iv = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut iv);
        let mut in_out = plaintext.to_vec();
        key.aead()?
            .seal_in_place_append_tag(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut in_out)
            .map_err(|_| HardwareKeyError::Failed("seal failed".into()))?;
        Ok(HardwareCiphertext {
            iv: iv.to_vec(),
            ciphertext: in_out,
        })
    }

    async fn decrypt(
        &self,
        alias: &str,
        capability: AuthCapability,
        sealed: &HardwareCiphertext,
    ) -> Result<Zeroizing<Vec<u8>>, HardwareKeyError> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        // Consumed whether or not decryption succeeds.
        if !self.outstanding.lock().await.remove(&capability.handle()) {
            return Err(HardwareKeyError::AuthenticationRequired);
        }

        let keys = self.keys.lock().await;
        let key = keys
            .get(alias)
            .ok_or_else(|| HardwareKeyError::KeyNotFound(alias.to_string()))?;
        if key.invalidated {
            return Err(HardwareKeyError::KeyInvalidated);
        }

        let iv: [u8; NONCE_LEN] = sealed
            .iv
            .as_slice()
            .try_into()
            .map_err(|_| HardwareKeyError::Failed("malformed iv".into()))?;
        let mut in_out = Zeroizing::new(sealed.ciphertext.clone());
        let len = key
            .aead()?
            .open_in_place(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut in_out)
            .map_err(|_| HardwareKeyError::Failed("authentication tag mismatch".into()))?
            .len();
        in_out.truncate(len);
        Ok(in_out)
    }

    async fn delete_key(&self, alias: &str) -> Result<(), HardwareKeyError> {
        self.keys.lock().await.remove(alias);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALIAS: &str = "test.key";

    async fn store_with_key() -> MockHardwareKeyStore {
        let store = MockHardwareKeyStore::new();
        store
            .create_key(ALIAS, KeyPolicy::per_use_authentication())
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn capability_decrypts_once() {
        let store = store_with_key().await;
        let sealed = store.encrypt(ALIAS, b"seed bytes").await.unwrap();

        let cap = store.issue_capability().await;
        let handle = cap.handle();
        let plain = store.decrypt(ALIAS, cap, &sealed).await.unwrap();
        assert_eq!(plain.as_slice(), b"seed bytes");

        let replay = AuthCapability::new(handle);
        assert!(matches!(
            store.decrypt(ALIAS, replay, &sealed).await,
            Err(HardwareKeyError::AuthenticationRequired)
        ));
        assert_eq!(store.decrypt_calls(), 2);
    }

    #[tokio::test]
    async fn forged_capability_is_rejected() {
        let store = store_with_key().await;
        let sealed = store.encrypt(ALIAS, b"seed bytes").await.unwrap();
        let result = store.decrypt(ALIAS, AuthCapability::new(7), &sealed).await;
        assert!(matches!(result, Err(HardwareKeyError::AuthenticationRequired)));
    }

    #[tokio::test]
    async fn invalidated_key_refuses_both_directions() {
        let store = store_with_key().await;
        let sealed = store.encrypt(ALIAS, b"seed bytes").await.unwrap();
        assert!(store.invalidate(ALIAS).await);

        let cap = store.issue_capability().await;
        assert!(matches!(
            store.decrypt(ALIAS, cap, &sealed).await,
            Err(HardwareKeyError::KeyInvalidated)
        ));
        assert_eq!(
            store.encrypt(ALIAS, b"x").await,
            Err(HardwareKeyError::KeyInvalidated)
        );
    }

    #[tokio::test]
    async fn tampered_ciphertext_fails() {
        let store = store_with_key().await;
        let mut sealed = store.encrypt(ALIAS, b"seed bytes").await.unwrap();
        sealed.ciphertext[0] ^= 1;
        let cap = store.issue_capability().await;
        assert!(matches!(
            store.decrypt(ALIAS, cap, &sealed).await,
            Err(HardwareKeyError::Failed(_))
        ));
    }
}
