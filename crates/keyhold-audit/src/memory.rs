// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory [`AuditStore`] for tests and ephemeral sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyhold_core::{AuditEntry, AuditStore, ChainState, KeyholdError, PurgeOutcome};
use tokio::sync::Mutex;

#[derive(Debug)]
struct Inner {
    entries: Vec<AuditEntry>,
    state: ChainState,
}

/// Audit store backed by a `Vec`, with the same append and purge contract
/// as the SQLite store.
#[derive(Debug)]
pub struct MemoryAuditStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                state: ChainState::genesis(),
            }),
        }
    }

    /// Mutate the stored entry at `sequence` in place, bypassing the chain.
    ///
    /// Simulates direct tampering with the backing storage. Returns whether
    /// an entry with that sequence was found.
    pub async fn tamper_with<F>(&self, sequence: i64, mutate: F) -> bool
    where
        F: FnOnce(&mut AuditEntry),
    {
        let mut inner = self.inner.lock().await;
        match inner.entries.iter_mut().find(|e| e.sequence == sequence) {
            Some(entry) => {
                mutate(entry);
                true
            }
            None => false,
        }
    }

    /// Drop every entry from `sequence` onwards without touching the head.
    ///
    /// Simulates an attacker deleting the newest rows. Returns how many went.
    pub async fn truncate_from(&self, sequence: i64) -> usize {
        let mut inner = self.inner.lock().await;
        let before = inner.entries.len();
        inner.entries.retain(|e| e.sequence < sequence);
        before - inner.entries.len()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn chain_state(&self) -> Result<ChainState, KeyholdError> {
        Ok(self.inner.lock().await.state.clone())
    }

    async fn append(&self, entry: &AuditEntry) -> Result<(), KeyholdError> {
        let mut inner = self.inner.lock().await;
        if inner.state.head_hash != entry.chain_prev_hash
            || inner.state.head_sequence + 1 != entry.sequence
        {
            return Err(KeyholdError::InvalidState(
                "audit chain head moved during append".into(),
            ));
        }
        inner.entries.push(entry.clone());
        inner.state.head_hash = entry.chain_hash.clone();
        inner.state.head_sequence = entry.sequence;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<AuditEntry>, KeyholdError> {
        Ok(self.inner.lock().await.entries.clone())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, KeyholdError> {
        let inner = self.inner.lock().await;
        let start = inner.entries.len().saturating_sub(limit);
        Ok(inner.entries[start..].to_vec())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeOutcome, KeyholdError> {
        let mut inner = self.inner.lock().await;
        // Only the leading run of old entries: the chain must stay contiguous
        // even when a clock step put an older timestamp after a newer one.
        let expired = inner
            .entries
            .iter()
            .take_while(|e| e.timestamp < cutoff)
            .count();
        let Some(last) = expired.checked_sub(1) else {
            return Ok(PurgeOutcome {
                purged: 0,
                anchor_hash: inner.state.anchor_hash.clone(),
                anchor_sequence: inner.state.anchor_sequence,
            });
        };
        let removed: Vec<AuditEntry> = inner.entries.drain(..=last).collect();
        let anchor = &removed[last];
        inner.state.anchor_hash = anchor.chain_hash.clone();
        inner.state.anchor_sequence = anchor.sequence;
        Ok(PurgeOutcome {
            purged: removed.len() as u64,
            anchor_hash: anchor.chain_hash.clone(),
            anchor_sequence: anchor.sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use keyhold_core::{AuditEventType, GENESIS_HASH};

    use super::*;
    use crate::{AuditChain, AuditEvent};

    #[tokio::test]
    async fn purge_keeps_everything_after_the_first_recent_entry() {
        let store = Arc::new(MemoryAuditStore::new());
        let chain = AuditChain::new(store.clone());
        for action in ["a", "b", "c"] {
            chain
                .append(AuditEvent::new(AuditEventType::KeyAccess, action))
                .await
                .unwrap();
        }
        let now = Utc::now();
        store
            .tamper_with(1, |e| e.timestamp = now - Duration::days(40))
            .await;
        // Out of order: older than the cutoff but after a recent entry.
        store
            .tamper_with(3, |e| e.timestamp = now - Duration::days(50))
            .await;

        let outcome = store.purge_before(now - Duration::days(30)).await.unwrap();
        assert_eq!(outcome.purged, 1);
        assert_eq!(outcome.anchor_sequence, 1);
        let sequences: Vec<i64> = store
            .entries()
            .await
            .unwrap()
            .iter()
            .map(|e| e.sequence)
            .collect();
        assert_eq!(sequences, vec![2, 3]);
    }

    #[tokio::test]
    async fn purge_of_nothing_leaves_genesis_anchor() {
        let store = MemoryAuditStore::new();
        let outcome = store.purge_before(Utc::now()).await.unwrap();
        assert_eq!(outcome.purged, 0);
        assert_eq!(outcome.anchor_hash, GENESIS_HASH);
    }
}
