// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The passphrase-keyed encrypted storage engine.

use async_trait::async_trait;

use crate::error::KeyholdError;

/// An encrypted relational store keyed by a raw passphrase.
///
/// Implementations must fail closed: a wrong or stale passphrase is an
/// error, never an empty or partially readable database.
#[async_trait]
pub trait EncryptedStore: Send + Sync {
    /// Open the store with `passphrase` and run a trivial read.
    async fn probe(&self, passphrase: &[u8]) -> Result<(), KeyholdError>;

    /// Re-encrypt the store from `old` to `new`.
    ///
    /// Dropping the returned future need not stop the re-key; callers that
    /// give up must treat the store's key as unknown.
    async fn rekey(&self, old: &[u8], new: &[u8]) -> Result<(), KeyholdError>;
}
