// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory stand-in for the encrypted storage engine, with fault injection.
//!
//! Like a fresh SQLCipher file, the store binds to the first passphrase it
//! is probed with. After that it opens only with its current passphrase.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keyhold_core::{EncryptedStore, KeyholdError};
use tokio::sync::Mutex;
use zeroize::Zeroizing;

/// Failures [`MemoryEncryptedStore`] can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineFault {
    /// Next re-key fails before touching the store.
    RekeyRejected,
    /// Next re-key changes the passphrase but still reports failure.
    RekeyAppliedThenError,
    /// The probe that verifies the next re-key fails.
    VerifyProbe,
    /// Every re-key after the first one fails, so rollbacks fail.
    Rollback,
    /// Next re-key never completes.
    RekeyHang,
    /// Next re-key runs on a detached worker and lands after
    /// [`LATE_REKEY_DELAY`], whether or not the caller is still waiting.
    RekeyLandsLate,
}

/// How long a [`EngineFault::RekeyLandsLate`] re-key takes to land.
pub const LATE_REKEY_DELAY: Duration = Duration::from_secs(15);

#[derive(Default)]
struct EngineState {
    passphrase: Option<Zeroizing<Vec<u8>>>,
    faults: HashSet<EngineFault>,
    /// Passphrase whose verification probe must fail once.
    fail_probe_for: Option<Zeroizing<Vec<u8>>>,
    rekey_calls: usize,
}

/// Encrypted store that keeps only its current passphrase.
#[derive(Default)]
pub struct MemoryEncryptedStore {
    state: Arc<Mutex<EngineState>>,
}

impl MemoryEncryptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `fault`. One-shot faults disarm after firing.
    pub async fn inject(&self, fault: EngineFault) {
        self.state.lock().await.faults.insert(fault);
    }

    /// Disarm every pending fault.
    pub async fn clear_faults(&self) {
        let mut state = self.state.lock().await;
        state.faults.clear();
        state.fail_probe_for = None;
    }

    /// Whether the store currently opens with `passphrase`.
    pub async fn opens_with(&self, passphrase: &[u8]) -> bool {
        self.state
            .lock()
            .await
            .passphrase
            .as_ref()
            .is_some_and(|p| p.as_slice() == passphrase)
    }

    pub async fn is_bound(&self) -> bool {
        self.state.lock().await.passphrase.is_some()
    }

    pub async fn rekey_calls(&self) -> usize {
        self.state.lock().await.rekey_calls
    }
}

#[async_trait]
impl EncryptedStore for MemoryEncryptedStore {
    async fn probe(&self, passphrase: &[u8]) -> Result<(), KeyholdError> {
        let mut state = self.state.lock().await;
        if state
            .fail_probe_for
            .as_ref()
            .is_some_and(|p| p.as_slice() == passphrase)
        {
            state.fail_probe_for = None;
            return Err(KeyholdError::storage("verification read failed"));
        }
        match &state.passphrase {
            None => {
                state.passphrase = Some(Zeroizing::new(passphrase.to_vec()));
                Ok(())
            }
            Some(current) if current.as_slice() == passphrase => Ok(()),
            Some(_) => Err(KeyholdError::storage("file is not a database")),
        }
    }

    async fn rekey(&self, old: &[u8], new: &[u8]) -> Result<(), KeyholdError> {
        let (hang, late) = {
            let mut state = self.state.lock().await;
            state.rekey_calls += 1;
            if state.faults.contains(&EngineFault::Rollback) && state.rekey_calls > 1 {
                return Err(KeyholdError::storage("rekey rejected during rollback"));
            }
            (
                state.faults.remove(&EngineFault::RekeyHang),
                state.faults.remove(&EngineFault::RekeyLandsLate),
            )
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if late {
            let state = Arc::clone(&self.state);
            let old = Zeroizing::new(old.to_vec());
            let new = Zeroizing::new(new.to_vec());
            let (done, landed) = tokio::sync::oneshot::channel();
            tokio::spawn(async move {
                tokio::time::sleep(LATE_REKEY_DELAY).await;
                let result = apply_rekey(&mut *state.lock().await, &old, &new);
                let _ = done.send(result);
            });
            return landed
                .await
                .map_err(|_| KeyholdError::storage("rekey worker vanished"))?;
        }

        apply_rekey(&mut *self.state.lock().await, old, new)
    }
}

fn apply_rekey(state: &mut EngineState, old: &[u8], new: &[u8]) -> Result<(), KeyholdError> {
    if state.faults.remove(&EngineFault::RekeyRejected) {
        return Err(KeyholdError::storage("rekey rejected"));
    }
    match &state.passphrase {
        Some(current) if current.as_slice() == old => {}
        _ => return Err(KeyholdError::storage("file is not a database")),
    }
    state.passphrase = Some(Zeroizing::new(new.to_vec()));
    if state.faults.remove(&EngineFault::VerifyProbe) {
        state.fail_probe_for = Some(Zeroizing::new(new.to_vec()));
    }
    if state.faults.remove(&EngineFault::RekeyAppliedThenError) {
        return Err(KeyholdError::storage("rekey interrupted after commit"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_to_first_probe() {
        let store = MemoryEncryptedStore::new();
        assert!(!store.is_bound().await);
        store.probe(b"first").await.unwrap();
        assert!(store.opens_with(b"first").await);
        assert!(store.probe(b"second").await.is_err());
    }

    #[tokio::test]
    async fn rekey_requires_current_passphrase() {
        let store = MemoryEncryptedStore::new();
        store.probe(b"old").await.unwrap();
        assert!(store.rekey(b"wrong", b"new").await.is_err());
        store.rekey(b"old", b"new").await.unwrap();
        assert!(store.opens_with(b"new").await);
        assert_eq!(store.rekey_calls().await, 2);
    }

    #[tokio::test]
    async fn verify_fault_fails_one_probe() {
        let store = MemoryEncryptedStore::new();
        store.probe(b"old").await.unwrap();
        store.inject(EngineFault::VerifyProbe).await;
        store.rekey(b"old", b"new").await.unwrap();
        assert!(store.probe(b"new").await.is_err());
        assert!(store.probe(b"new").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn late_rekey_lands_after_the_caller_gives_up() {
        let store = MemoryEncryptedStore::new();
        store.probe(b"old").await.unwrap();
        store.inject(EngineFault::RekeyLandsLate).await;

        let gave_up =
            tokio::time::timeout(Duration::from_secs(1), store.rekey(b"old", b"new")).await;
        assert!(gave_up.is_err());
        assert!(store.opens_with(b"old").await);

        tokio::time::sleep(LATE_REKEY_DELAY).await;
        assert!(store.opens_with(b"new").await);
    }

    #[tokio::test]
    async fn rollback_fault_blocks_second_rekey() {
        let store = MemoryEncryptedStore::new();
        store.probe(b"old").await.unwrap();
        store.inject(EngineFault::Rollback).await;
        store.rekey(b"old", b"new").await.unwrap();
        assert!(store.rekey(b"new", b"old").await.is_err());
        assert!(store.opens_with(b"new").await);
    }
}
