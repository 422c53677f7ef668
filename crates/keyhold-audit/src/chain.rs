// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The audit chain: serialized append, integrity verification, retention purge.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use keyhold_core::{
    AuditEntry, AuditEventType, AuditStore, KeyholdError, PurgeOutcome, SecurityLevel,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::event::AuditEvent;
use crate::hash::seal;
use crate::verify::{verify_entries, ChainVerification};

/// Append-only, hash-linked audit log over an [`AuditStore`].
///
/// One writer lock covers the read-head, compute, write sequence so two
/// concurrent appends can never hash against the same stale head. Cloning
/// shares the lock.
#[derive(Clone)]
pub struct AuditChain {
    store: Arc<dyn AuditStore>,
    writer: Arc<Mutex<()>>,
}

impl AuditChain {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// Append `event` after the current head and return the sealed entry.
    pub async fn append(&self, event: AuditEvent) -> Result<AuditEntry, KeyholdError> {
        let _writer = self.writer.lock().await;
        self.append_locked(event).await
    }

    async fn append_locked(&self, event: AuditEvent) -> Result<AuditEntry, KeyholdError> {
        let head = self.store.chain_state().await?;
        let mut entry = event.into_entry(head.head_sequence + 1);
        seal(&mut entry, &head.head_hash);
        self.store.append(&entry).await?;
        debug!(
            entry_id = %entry.id,
            sequence = entry.sequence,
            event_type = %entry.event_type,
            outcome = %entry.outcome,
            "audit entry appended"
        );
        Ok(entry)
    }

    /// Recompute every retained entry from the anchor to the head and report what fails.
    pub async fn verify_integrity(&self) -> Result<ChainVerification, KeyholdError> {
        // Head and entries must be read as one snapshot.
        let _writer = self.writer.lock().await;
        let state = self.store.chain_state().await?;
        let entries = self.store.entries().await?;
        let result = verify_entries(&state, &entries);
        if result.valid {
            debug!(entries = result.entries_checked, "audit chain verified");
        }
        Ok(result)
    }

    /// Verify the chain and fail with [`KeyholdError::ChainIntegrityViolation`] if it is broken.
    pub async fn require_integrity(&self) -> Result<ChainVerification, KeyholdError> {
        let result = self.verify_integrity().await?;
        match &result.first_broken {
            None => Ok(result),
            Some(broken) => {
                error!(
                    entry_id = %broken.entry_id,
                    sequence = broken.sequence,
                    reason = %broken.reason,
                    issues = result.issues.len(),
                    "SECURITY INCIDENT: audit chain integrity violation"
                );
                Err(KeyholdError::ChainIntegrityViolation {
                    entry_id: broken.entry_id.clone(),
                    sequence: broken.sequence,
                    reason: broken.reason.clone(),
                })
            }
        }
    }

    /// Remove entries older than `cutoff` and record the purge as a new entry.
    ///
    /// The purge entry names the cutoff, the number of entries removed and
    /// the new anchor hash, so the break in the chain is documented inside
    /// the chain itself.
    pub async fn purge_older_than(
        &self,
        cutoff: DateTime<Utc>,
        actor_id: Option<String>,
    ) -> Result<PurgeOutcome, KeyholdError> {
        let _writer = self.writer.lock().await;
        let outcome = self.store.purge_before(cutoff).await?;

        let mut event = AuditEvent::new(
            AuditEventType::RetentionPurge,
            format!(
                "retention_purge purged_count={} cutoff={}",
                outcome.purged,
                cutoff.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
        )
        .resource("audit_chain", Some(outcome.anchor_hash.clone()))
        .level(SecurityLevel::High);
        if let Some(actor) = actor_id {
            event = event.actor(actor);
        }
        if let Err(e) = self.append_locked(event).await {
            error!(
                purged = outcome.purged,
                anchor_sequence = outcome.anchor_sequence,
                error = %e,
                "SECURITY INCIDENT: audit entries purged but the purge could not be recorded"
            );
            return Err(e);
        }

        info!(
            purged = outcome.purged,
            anchor_sequence = outcome.anchor_sequence,
            "audit retention purge complete"
        );
        Ok(outcome)
    }

    /// The most recent `limit` entries, oldest first.
    pub async fn tail(&self, limit: usize) -> Result<Vec<AuditEntry>, KeyholdError> {
        self.store.recent(limit).await
    }

    /// Number of the last appended entry (0 for an empty chain).
    pub async fn head_sequence(&self) -> Result<i64, KeyholdError> {
        Ok(self.store.chain_state().await?.head_sequence)
    }
}
