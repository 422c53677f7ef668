// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory key record store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use keyhold_core::{KeyBlobStore, KeyholdError};
use tokio::sync::Mutex;

/// A `KeyBlobStore` backed by a `BTreeMap`.
#[derive(Default)]
pub struct MemoryKeyBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_next_put: AtomicBool,
}

impl MemoryKeyBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `put` fail without writing.
    pub fn fail_next_put(&self) {
        self.fail_next_put.store(true, Ordering::SeqCst);
    }

    /// Raw stored bytes, for assertions on persisted records.
    pub async fn raw(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs.lock().await.get(name).cloned()
    }

    /// Overwrite a record directly, bypassing the vault.
    pub async fn overwrite(&self, name: &str, blob: Vec<u8>) {
        self.blobs.lock().await.insert(name.to_string(), blob);
    }
}

#[async_trait]
impl KeyBlobStore for MemoryKeyBlobStore {
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, KeyholdError> {
        Ok(self.blobs.lock().await.get(name).cloned())
    }

    async fn put(&self, name: &str, blob: Vec<u8>) -> Result<(), KeyholdError> {
        if self.fail_next_put.swap(false, Ordering::SeqCst) {
            return Err(KeyholdError::storage("disk full"));
        }
        self.blobs.lock().await.insert(name.to_string(), blob);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, KeyholdError> {
        Ok(self.blobs.lock().await.remove(name).is_some())
    }

    async fn names(&self) -> Result<Vec<String>, KeyholdError> {
        Ok(self.blobs.lock().await.keys().cloned().collect())
    }
}
