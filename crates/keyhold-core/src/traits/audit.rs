// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only persistence for audit entries and chain metadata.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::KeyholdError;
use crate::types::{AuditEntry, ChainState, PurgeOutcome};

/// Audit persistence backend.
///
/// Implementations must apply `append` atomically: the entry row and the new
/// chain head are written together, and only if `entry.chain_prev_hash`
/// still equals the stored head.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Read the chain head and verification anchor.
    async fn chain_state(&self) -> Result<ChainState, KeyholdError>;

    /// Persist `entry` and move the chain head to `entry.chain_hash`.
    async fn append(&self, entry: &AuditEntry) -> Result<(), KeyholdError>;

    /// All retained entries in insertion order.
    async fn entries(&self) -> Result<Vec<AuditEntry>, KeyholdError>;

    /// The most recent `limit` entries, newest last.
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, KeyholdError>;

    /// Remove the prefix of the chain up to the last entry older than `cutoff`
    /// and move the anchor to that entry's chain hash, atomically.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeOutcome, KeyholdError>;
}
