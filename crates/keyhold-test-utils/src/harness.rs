// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness wiring the full key hierarchy over in-memory collaborators.
//!
//! `TestVault` assembles the seed store, password slot, session manager,
//! storage key manager and audit chain with mock hardware and fast KDF
//! parameters, and keeps concrete handles to every mock for fault
//! injection and assertions.

use std::sync::Arc;
use std::time::Duration;

use keyhold_audit::{AuditChain, MemoryAuditStore};
use keyhold_core::{KeyholdError, SessionId};
use keyhold_vault::{
    KdfParams, MasterSeedStore, PasswordSlot, SessionManager, SessionTimeouts, StorageKeyManager,
    UnlockMethod,
};
use secrecy::SecretString;

use crate::mock_blobs::MemoryKeyBlobStore;
use crate::mock_engine::MemoryEncryptedStore;
use crate::mock_hardware::MockHardwareKeyStore;

/// Password enrolled by default.
pub const TEST_PASSWORD: &str = "correct-password";

/// Argon2id parameters cheap enough for unit tests.
pub const FAST_KDF: KdfParams = KdfParams {
    version: 1,
    memory_kib: 256,
    iterations: 1,
    parallelism: 1,
};

/// Builder for creating test vaults with configurable options.
pub struct TestVaultBuilder {
    timeouts: SessionTimeouts,
    rekey_timeout: Duration,
    password: Option<String>,
}

impl TestVaultBuilder {
    fn new() -> Self {
        Self {
            timeouts: SessionTimeouts::default(),
            rekey_timeout: Duration::from_secs(5),
            password: Some(TEST_PASSWORD.to_string()),
        }
    }

    pub fn with_timeouts(mut self, idle: Duration, background: Duration) -> Self {
        self.timeouts = SessionTimeouts { idle, background };
        self
    }

    pub fn with_rekey_timeout(mut self, timeout: Duration) -> Self {
        self.rekey_timeout = timeout;
        self
    }

    /// Enroll `password` as the fallback slot instead of [`TEST_PASSWORD`].
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// Skip password enrollment.
    pub fn without_password(mut self) -> Self {
        self.password = None;
        self
    }

    /// Initialize the seed and, unless disabled, enroll the password slot.
    pub async fn build(self) -> Result<TestVault, KeyholdError> {
        let hardware = Arc::new(MockHardwareKeyStore::new());
        let blobs = Arc::new(MemoryKeyBlobStore::new());
        let engine = Arc::new(MemoryEncryptedStore::new());
        let audit_store = Arc::new(MemoryAuditStore::new());
        let audit = AuditChain::new(audit_store.clone());

        let seed_store =
            MasterSeedStore::new(hardware.clone(), blobs.clone()).with_audit(audit.clone());
        let password_slot = PasswordSlot::new(blobs.clone(), FAST_KDF);
        let session = SessionManager::builder(seed_store.clone(), password_slot.clone(), blobs.clone())
            .kdf(FAST_KDF)
            .timeouts(self.timeouts)
            .audit(audit.clone())
            .build();
        let storage_keys = StorageKeyManager::new(session.clone(), blobs.clone(), engine.clone())
            .with_audit(audit.clone())
            .with_rekey_timeout(self.rekey_timeout);

        seed_store.initialize_if_absent().await?;
        if let Some(password) = self.password {
            let capability = hardware.issue_capability().await;
            password_slot
                .enroll(&seed_store, capability, &SecretString::from(password))
                .await?;
        }

        Ok(TestVault {
            hardware,
            blobs,
            engine,
            audit_store,
            audit,
            seed_store,
            password_slot,
            session,
            storage_keys,
        })
    }
}

/// A complete key hierarchy over in-memory mocks.
pub struct TestVault {
    pub hardware: Arc<MockHardwareKeyStore>,
    pub blobs: Arc<MemoryKeyBlobStore>,
    pub engine: Arc<MemoryEncryptedStore>,
    pub audit_store: Arc<MemoryAuditStore>,
    pub audit: AuditChain,
    pub seed_store: MasterSeedStore,
    pub password_slot: PasswordSlot,
    pub session: SessionManager,
    pub storage_keys: StorageKeyManager,
}

impl TestVault {
    pub fn builder() -> TestVaultBuilder {
        TestVaultBuilder::new()
    }

    /// A vault with default options.
    pub async fn new() -> Result<Self, KeyholdError> {
        Self::builder().build().await
    }

    /// Unlock with a freshly issued biometric capability.
    pub async fn unlock_biometric(&self) -> Result<SessionId, KeyholdError> {
        let capability = self.hardware.issue_capability().await;
        self.session.unlock(UnlockMethod::Biometric(capability)).await
    }

    pub async fn unlock_password(&self, password: &str) -> Result<SessionId, KeyholdError> {
        self.session
            .unlock(UnlockMethod::Password(SecretString::from(password.to_string())))
            .await
    }

    /// Copy of the SessionKey, for comparing sessions in tests.
    pub async fn session_key_bytes(&self) -> Result<[u8; 32], KeyholdError> {
        self.session.with_session_key(|key| *key).await
    }
}
