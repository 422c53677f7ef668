// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hardware-backed key store that gates decryption on a fresh authentication gesture.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use zeroize::Zeroizing;

/// Access policy for a hardware key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPolicy {
    /// Whether every use requires user authentication.
    pub require_user_auth: bool,
    /// How long one authentication stays valid. Zero means one gesture per use.
    pub auth_validity: Duration,
}

impl KeyPolicy {
    /// One authentication gesture authorizes exactly one operation.
    pub const fn per_use_authentication() -> Self {
        Self {
            require_user_auth: true,
            auth_validity: Duration::ZERO,
        }
    }
}

/// Ciphertext produced by the hardware key store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareCiphertext {
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// A short-lived, single-use decryption capability bound to one successful
/// authentication gesture.
///
/// Deliberately neither `Clone` nor `Copy`: handing it to
/// [`HardwareKeyStore::decrypt`] consumes it.
#[derive(Debug)]
pub struct AuthCapability {
    handle: u64,
    issued_at: Instant,
}

impl AuthCapability {
    /// Wrap the platform handle returned by a successful authentication.
    pub fn new(handle: u64) -> Self {
        Self {
            handle,
            issued_at: Instant::now(),
        }
    }

    /// Platform handle the hardware store validates.
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// When the gesture completed.
    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }
}

/// Failures reported by a hardware key store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HardwareKeyError {
    /// The capability is missing, already used, or stale.
    #[error("user authentication required")]
    AuthenticationRequired,
    /// The key was permanently invalidated (e.g. biometric enrollment changed).
    #[error("hardware key permanently invalidated")]
    KeyInvalidated,
    /// No key exists under the alias.
    #[error("hardware key not found: {0}")]
    KeyNotFound(String),
    /// Any other platform failure.
    #[error("{0}")]
    Failed(String),
}

/// Platform key store whose keys never leave secure hardware.
#[async_trait]
pub trait HardwareKeyStore: Send + Sync {
    /// Whether a key exists under `alias`.
    async fn key_exists(&self, alias: &str) -> Result<bool, HardwareKeyError>;

    /// Create a key under `alias` with the given access policy.
    async fn create_key(&self, alias: &str, policy: KeyPolicy) -> Result<(), HardwareKeyError>;

    /// Encrypt with the key under `alias`.
    async fn encrypt(
        &self,
        alias: &str,
        plaintext: &[u8],
    ) -> Result<HardwareCiphertext, HardwareKeyError>;

    /// Decrypt with the key under `alias`, consuming one authentication capability.
    async fn decrypt(
        &self,
        alias: &str,
        capability: AuthCapability,
        sealed: &HardwareCiphertext,
    ) -> Result<Zeroizing<Vec<u8>>, HardwareKeyError>;

    /// Delete the key under `alias`.
    async fn delete_key(&self, alias: &str) -> Result<(), HardwareKeyError>;
}
