// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the vault, audit, and storage crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// `chainPrevHash` of the very first audit entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Random identifier of an unlocked session, used only for audit correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a fresh random session identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier of an audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditEntryId(pub String);

impl AuditEntryId {
    /// Generate a fresh random entry identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for AuditEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuditEntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category of a security-relevant event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditEventType {
    SessionUnlock,
    SessionLock,
    SeedLifecycle,
    KeyAccess,
    KeyRotation,
    IntegrityCheck,
    RetentionPurge,
    SecurityIncident,
}

/// Result of an audited operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
}

/// Sensitivity of an audited event.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SecurityLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// One immutable, hash-linked audit record.
///
/// `checksum` covers every field except the three chain fields;
/// `chain_hash` links the entry to its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    /// 1-based insertion position.
    pub sequence: i64,
    pub timestamp: DateTime<Utc>,
    pub actor_id: Option<String>,
    pub session_id: Option<SessionId>,
    pub event_type: AuditEventType,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub outcome: AuditOutcome,
    pub security_level: SecurityLevel,
    pub error_message: Option<String>,
    pub checksum: String,
    pub chain_prev_hash: String,
    pub chain_hash: String,
}

/// Chain metadata: the head plus the anchor verification starts from.
///
/// The anchor is [`GENESIS_HASH`] at sequence 0 until a retention purge moves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainState {
    pub head_hash: String,
    pub head_sequence: i64,
    pub anchor_hash: String,
    pub anchor_sequence: i64,
}

impl ChainState {
    /// State of a chain with no entries.
    pub fn genesis() -> Self {
        Self {
            head_hash: GENESIS_HASH.to_string(),
            head_sequence: 0,
            anchor_hash: GENESIS_HASH.to_string(),
            anchor_sequence: 0,
        }
    }
}

/// What a retention purge removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeOutcome {
    /// Number of entries removed.
    pub purged: u64,
    /// Chain hash of the last purged entry (the new verification anchor).
    pub anchor_hash: String,
    /// Sequence of the last purged entry.
    pub anchor_sequence: i64,
}
