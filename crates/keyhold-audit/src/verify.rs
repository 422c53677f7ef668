// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chain verification.
//!
//! Walks entries in insertion order from the anchor, recomputing each
//! checksum and chain hash. Links are checked against the *recomputed* hash
//! of the predecessor, so tampering with one entry breaks it and every entry
//! after it. The walk must end exactly at the recorded chain head, so
//! removing the newest entries is caught as well.

use keyhold_core::{AuditEntry, ChainState};
use serde::Serialize;

use crate::hash::{compute_chain_hash, compute_checksum};

/// A problem found on one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainIssue {
    /// The entry's content no longer matches its stored checksum.
    ChecksumMismatch { entry_id: String, sequence: i64 },
    /// The entry does not link to the recomputed hash of its predecessor.
    PrevHashMismatch {
        entry_id: String,
        sequence: i64,
        expected: String,
        actual: String,
    },
    /// The stored chain hash differs from the recomputed one.
    ChainHashMismatch { entry_id: String, sequence: i64 },
    /// The walk ended somewhere other than the recorded head.
    HeadMismatch {
        /// Sequence the head records.
        sequence: i64,
        /// Sequence the walk actually ended at.
        last_sequence: i64,
        expected: String,
        actual: String,
    },
}

/// Pseudo entry id reported for [`ChainIssue::HeadMismatch`].
pub const HEAD_ENTRY_ID: &str = "chain_head";

impl ChainIssue {
    pub fn entry_id(&self) -> &str {
        match self {
            ChainIssue::ChecksumMismatch { entry_id, .. }
            | ChainIssue::PrevHashMismatch { entry_id, .. }
            | ChainIssue::ChainHashMismatch { entry_id, .. } => entry_id,
            ChainIssue::HeadMismatch { .. } => HEAD_ENTRY_ID,
        }
    }

    pub fn sequence(&self) -> i64 {
        match self {
            ChainIssue::ChecksumMismatch { sequence, .. }
            | ChainIssue::PrevHashMismatch { sequence, .. }
            | ChainIssue::ChainHashMismatch { sequence, .. }
            | ChainIssue::HeadMismatch { sequence, .. } => *sequence,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ChainIssue::ChecksumMismatch { .. } => "checksum mismatch",
            ChainIssue::PrevHashMismatch { .. } => "previous hash mismatch",
            ChainIssue::ChainHashMismatch { .. } => "chain hash mismatch",
            ChainIssue::HeadMismatch { .. } => "chain head mismatch",
        }
    }
}

/// The first entry that failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenEntry {
    pub entry_id: String,
    pub sequence: i64,
    pub reason: String,
}

/// Outcome of [`verify_entries`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub entries_checked: usize,
    pub first_broken: Option<BrokenEntry>,
    pub issues: Vec<ChainIssue>,
}

/// Verify `entries` (in insertion order) from the anchor of `state` up to its head.
pub fn verify_entries(state: &ChainState, entries: &[AuditEntry]) -> ChainVerification {
    let mut issues = Vec::new();
    let mut expected_prev = state.anchor_hash.clone();

    for entry in entries {
        let entry_id = entry.id.0.clone();
        let checksum = compute_checksum(entry);
        if checksum != entry.checksum {
            issues.push(ChainIssue::ChecksumMismatch {
                entry_id: entry_id.clone(),
                sequence: entry.sequence,
            });
        }
        if entry.chain_prev_hash != expected_prev {
            issues.push(ChainIssue::PrevHashMismatch {
                entry_id: entry_id.clone(),
                sequence: entry.sequence,
                expected: expected_prev.clone(),
                actual: entry.chain_prev_hash.clone(),
            });
        }
        let chain_hash = compute_chain_hash(&entry.chain_prev_hash, entry, &checksum);
        if chain_hash != entry.chain_hash {
            issues.push(ChainIssue::ChainHashMismatch {
                entry_id,
                sequence: entry.sequence,
            });
        }
        expected_prev = chain_hash;
    }

    let last_sequence = entries.last().map_or(state.anchor_sequence, |e| e.sequence);
    if expected_prev != state.head_hash || last_sequence != state.head_sequence {
        issues.push(ChainIssue::HeadMismatch {
            sequence: state.head_sequence,
            last_sequence,
            expected: state.head_hash.clone(),
            actual: expected_prev,
        });
    }

    let first_broken = issues.first().map(|issue| BrokenEntry {
        entry_id: issue.entry_id().to_string(),
        sequence: issue.sequence(),
        reason: issue.reason().to_string(),
    });

    ChainVerification {
        valid: issues.is_empty(),
        entries_checked: entries.len(),
        first_broken,
        issues,
    }
}
