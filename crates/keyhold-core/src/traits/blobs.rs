// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence for encrypted key records (sealed seed, wrapped keys, salts).

use async_trait::async_trait;

use crate::error::KeyholdError;

/// Named blob storage for key records.
///
/// Blobs are already encrypted or non-secret; the store itself need not be
/// encrypted. `put` must replace an existing blob atomically.
#[async_trait]
pub trait KeyBlobStore: Send + Sync {
    /// Read a blob by name.
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, KeyholdError>;

    /// Insert or atomically replace a blob.
    async fn put(&self, name: &str, blob: Vec<u8>) -> Result<(), KeyholdError>;

    /// Remove a blob. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, KeyholdError>;

    /// List stored blob names in lexical order.
    async fn names(&self) -> Result<Vec<String>, KeyholdError>;
}
