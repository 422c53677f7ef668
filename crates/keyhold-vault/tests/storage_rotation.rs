// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage passphrase lifecycle and the four-phase rotation protocol.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keyhold_core::{AuditEventType, AuditOutcome, EncryptedStore, KeyholdError};
use keyhold_test_utils::{
    EngineFault, MemoryEncryptedStore, TestVault, LATE_REKEY_DELAY, TEST_PASSWORD,
};
use keyhold_vault::{LockReason, SessionManager, StorageKeyManager};

async fn unlocked_with_passphrase() -> (TestVault, Vec<u8>) {
    let vault = TestVault::new().await.unwrap();
    vault.unlock_password(TEST_PASSWORD).await.unwrap();
    let passphrase = vault.storage_keys.get_or_create_passphrase().await.unwrap();
    // Binds the store to the passphrase, as opening a fresh vault database does.
    vault.engine.probe(&passphrase).await.unwrap();
    (vault, passphrase.to_vec())
}

async fn rotation_actions(vault: &TestVault) -> Vec<(String, AuditOutcome)> {
    vault
        .audit
        .tail(100)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == AuditEventType::KeyRotation)
        .map(|e| (e.action, e.outcome))
        .collect()
}

#[tokio::test]
async fn passphrase_is_stable_within_and_across_sessions() {
    let vault = TestVault::new().await.unwrap();
    vault.unlock_password(TEST_PASSWORD).await.unwrap();

    let first = vault.storage_keys.get_or_create_passphrase().await.unwrap();
    assert_eq!(first.len(), 32);
    let again = vault.storage_keys.get_or_create_passphrase().await.unwrap();
    assert_eq!(first.as_slice(), again.as_slice());

    vault.session.lock(LockReason::Manual).await.unwrap();
    vault.unlock_password(TEST_PASSWORD).await.unwrap();
    let next_session = vault.storage_keys.get_or_create_passphrase().await.unwrap();
    assert_eq!(first.as_slice(), next_session.as_slice());

    vault.session.lock(LockReason::Manual).await.unwrap();
    vault.unlock_biometric().await.unwrap();
    let biometric = vault.storage_keys.get_or_create_passphrase().await.unwrap();
    assert_eq!(first.as_slice(), biometric.as_slice());
}

#[tokio::test]
async fn passphrase_requires_active_session() {
    let vault = TestVault::new().await.unwrap();
    let err = vault.storage_keys.get_or_create_passphrase().await.unwrap_err();
    assert!(matches!(err, KeyholdError::NoActiveSession));

    let err = vault.storage_keys.rotate_passphrase().await.unwrap_err();
    assert!(matches!(err, KeyholdError::NoActiveSession));
}

#[tokio::test]
async fn stored_passphrase_is_never_plaintext() {
    let (vault, passphrase) = unlocked_with_passphrase().await;
    let raw = vault.blobs.raw("storage_passphrase").await.unwrap();
    let hex_passphrase = passphrase.iter().map(|b| format!("{b:02x}")).collect::<String>();
    let text = String::from_utf8(raw).unwrap();
    assert!(!text.contains(&hex_passphrase));
    assert!(text.contains("\"version\":1"));
}

#[tokio::test]
async fn successful_rotation_commits_new_passphrase() {
    let (vault, old) = unlocked_with_passphrase().await;

    vault.storage_keys.rotate_passphrase().await.unwrap();

    let new = vault.storage_keys.get_or_create_passphrase().await.unwrap();
    assert_ne!(new.as_slice(), old.as_slice());
    assert!(vault.engine.opens_with(&new).await);
    assert!(!vault.engine.opens_with(&old).await);

    let actions = rotation_actions(&vault).await;
    let expected: Vec<(String, AuditOutcome)> = ["prepare", "generate", "rekey", "commit"]
        .iter()
        .map(|p| (format!("rotate_passphrase.{p}"), AuditOutcome::Success))
        .collect();
    assert_eq!(actions, expected);
    assert!(vault.audit.verify_integrity().await.unwrap().valid);
}

#[tokio::test]
async fn failed_verification_keeps_original_passphrase() {
    let (vault, old) = unlocked_with_passphrase().await;
    vault.engine.inject(EngineFault::VerifyProbe).await;

    let err = vault.storage_keys.rotate_passphrase().await.unwrap_err();
    match &err {
        KeyholdError::RekeyFailed { phase, .. } => assert_eq!(phase, "rekey"),
        other => panic!("expected RekeyFailed, got {other:?}"),
    }

    let after = vault.storage_keys.get_or_create_passphrase().await.unwrap();
    assert_eq!(after.as_slice(), old.as_slice());
    assert!(vault.engine.opens_with(&old).await);
    vault.engine.probe(&old).await.unwrap();
    // Forward re-key plus the rollback.
    assert_eq!(vault.engine.rekey_calls().await, 2);

    let actions = rotation_actions(&vault).await;
    assert_eq!(
        actions.last(),
        Some(&("rotate_passphrase.rekey".to_string(), AuditOutcome::Failure))
    );
}

#[tokio::test]
async fn rejected_rekey_needs_no_reverse_rekey() {
    let (vault, old) = unlocked_with_passphrase().await;
    vault.engine.inject(EngineFault::RekeyRejected).await;

    let err = vault.storage_keys.rotate_passphrase().await.unwrap_err();
    assert!(matches!(err, KeyholdError::RekeyFailed { .. }));
    assert!(vault.engine.opens_with(&old).await);
    assert_eq!(vault.engine.rekey_calls().await, 1);
}

#[tokio::test]
async fn rekey_error_after_apply_is_reverted() {
    let (vault, old) = unlocked_with_passphrase().await;
    vault.engine.inject(EngineFault::RekeyAppliedThenError).await;

    let err = vault.storage_keys.rotate_passphrase().await.unwrap_err();
    assert!(matches!(err, KeyholdError::RekeyFailed { .. }));
    assert!(vault.engine.opens_with(&old).await);
    assert_eq!(vault.engine.rekey_calls().await, 2);
}

#[tokio::test]
async fn commit_failure_rolls_back_store() {
    let (vault, old) = unlocked_with_passphrase().await;
    vault.blobs.fail_next_put();

    let err = vault.storage_keys.rotate_passphrase().await.unwrap_err();
    match &err {
        KeyholdError::RekeyFailed { phase, .. } => assert_eq!(phase, "commit"),
        other => panic!("expected RekeyFailed, got {other:?}"),
    }
    let after = vault.storage_keys.get_or_create_passphrase().await.unwrap();
    assert_eq!(after.as_slice(), old.as_slice());
    assert!(vault.engine.opens_with(&old).await);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn failed_rollback_is_a_security_incident() {
    let (vault, _old) = unlocked_with_passphrase().await;
    vault.engine.inject(EngineFault::VerifyProbe).await;
    vault.engine.inject(EngineFault::Rollback).await;

    let err = vault.storage_keys.rotate_passphrase().await.unwrap_err();
    assert!(matches!(err, KeyholdError::RollbackFailed { .. }));
    assert!(err.is_security_incident());
    assert!(logs_contain("SECURITY INCIDENT"));

    let last = vault.audit.tail(1).await.unwrap().pop().unwrap();
    assert_eq!(last.event_type, AuditEventType::SecurityIncident);
    assert_eq!(last.outcome, AuditOutcome::Failure);
}

#[tokio::test(start_paused = true)]
#[tracing_test::traced_test]
async fn hung_rekey_times_out_as_an_incident_without_rollback() {
    let vault = TestVault::builder()
        .with_rekey_timeout(Duration::from_secs(10))
        .build()
        .await
        .unwrap();
    vault.unlock_password(TEST_PASSWORD).await.unwrap();
    let old = vault.storage_keys.get_or_create_passphrase().await.unwrap();
    vault.engine.probe(&old).await.unwrap();
    vault.engine.inject(EngineFault::RekeyHang).await;

    let err = vault.storage_keys.rotate_passphrase().await.unwrap_err();
    match &err {
        KeyholdError::RollbackFailed { rekey_error, .. } => {
            assert!(rekey_error.contains("timed out"), "{rekey_error}");
        }
        other => panic!("expected RollbackFailed, got {other:?}"),
    }
    assert!(logs_contain("SECURITY INCIDENT"));
    assert_eq!(vault.engine.rekey_calls().await, 1);

    let persisted = vault.storage_keys.get_or_create_passphrase().await.unwrap();
    assert_eq!(persisted.as_slice(), old.as_slice());
}

#[tokio::test(start_paused = true)]
async fn rekey_landing_after_timeout_is_not_reported_as_rolled_back() {
    let vault = TestVault::builder()
        .with_rekey_timeout(Duration::from_secs(10))
        .build()
        .await
        .unwrap();
    vault.unlock_password(TEST_PASSWORD).await.unwrap();
    let old = vault.storage_keys.get_or_create_passphrase().await.unwrap();
    vault.engine.probe(&old).await.unwrap();
    vault.engine.inject(EngineFault::RekeyLandsLate).await;

    let err = vault.storage_keys.rotate_passphrase().await.unwrap_err();
    assert!(matches!(err, KeyholdError::RollbackFailed { .. }));
    assert!(err.is_security_incident());

    // The abandoned re-key completes on its own.
    tokio::time::sleep(LATE_REKEY_DELAY).await;
    assert!(!vault.engine.opens_with(&old).await);
    let persisted = vault.storage_keys.get_or_create_passphrase().await.unwrap();
    assert_eq!(persisted.as_slice(), old.as_slice());

    let last = vault.audit.tail(1).await.unwrap().pop().unwrap();
    assert_eq!(last.event_type, AuditEventType::SecurityIncident);
}

#[tokio::test]
async fn store_not_opening_fails_prepare() {
    let vault = TestVault::new().await.unwrap();
    vault.unlock_password(TEST_PASSWORD).await.unwrap();
    vault.engine.probe(b"some other passphrase").await.unwrap();
    vault.storage_keys.get_or_create_passphrase().await.unwrap();

    let err = vault.storage_keys.rotate_passphrase().await.unwrap_err();
    assert!(matches!(err, KeyholdError::CurrentPassphraseUnavailable(_)));
    assert_eq!(vault.engine.rekey_calls().await, 0);

    let actions = rotation_actions(&vault).await;
    assert_eq!(
        actions,
        vec![("rotate_passphrase.prepare".to_string(), AuditOutcome::Failure)]
    );
}

#[tokio::test]
async fn rotation_without_passphrase_fails_prepare() {
    let vault = TestVault::new().await.unwrap();
    vault.unlock_password(TEST_PASSWORD).await.unwrap();
    let err = vault.storage_keys.rotate_passphrase().await.unwrap_err();
    assert!(matches!(err, KeyholdError::CurrentPassphraseUnavailable(_)));
}

/// Engine that locks the session right after its first re-key.
struct LockingEngine {
    inner: MemoryEncryptedStore,
    session: SessionManager,
}

#[async_trait]
impl EncryptedStore for LockingEngine {
    async fn probe(&self, passphrase: &[u8]) -> Result<(), KeyholdError> {
        self.inner.probe(passphrase).await
    }

    async fn rekey(&self, old: &[u8], new: &[u8]) -> Result<(), KeyholdError> {
        self.inner.rekey(old, new).await?;
        if self.inner.rekey_calls().await == 1 {
            self.session.lock(LockReason::IdleTimeout).await?;
        }
        Ok(())
    }
}

#[tokio::test]
async fn session_locked_mid_rotation_rolls_back() {
    let vault = TestVault::new().await.unwrap();
    vault.unlock_password(TEST_PASSWORD).await.unwrap();
    let old = vault.storage_keys.get_or_create_passphrase().await.unwrap();

    let engine = Arc::new(LockingEngine {
        inner: MemoryEncryptedStore::new(),
        session: vault.session.clone(),
    });
    engine.probe(&old).await.unwrap();
    let manager = StorageKeyManager::new(vault.session.clone(), vault.blobs.clone(), engine.clone());

    let err = manager.rotate_passphrase().await.unwrap_err();
    match &err {
        KeyholdError::RekeyFailed { phase, .. } => assert_eq!(phase, "commit"),
        other => panic!("expected RekeyFailed, got {other:?}"),
    }
    assert!(!vault.session.is_unlocked());
    assert!(engine.inner.opens_with(&old).await);

    vault.unlock_password(TEST_PASSWORD).await.unwrap();
    let after = vault.storage_keys.get_or_create_passphrase().await.unwrap();
    assert_eq!(after.as_slice(), old.as_slice());
}
