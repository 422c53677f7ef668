// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical serialization and SHA-256 hashing of audit entries.
//!
//! The canonical form is the compact JSON encoding of every non-chain field
//! in declaration order. `serde_json` emits struct fields in order and has
//! no whitespace options in compact mode, so the encoding is stable.

use chrono::{DateTime, Utc};
use keyhold_core::{AuditEntry, AuditEventType, AuditOutcome, SecurityLevel};
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Serialize)]
struct CanonicalFields<'a> {
    id: &'a str,
    sequence: i64,
    timestamp: &'a DateTime<Utc>,
    actor_id: Option<&'a str>,
    session_id: Option<&'a str>,
    event_type: AuditEventType,
    action: &'a str,
    resource_type: Option<&'a str>,
    resource_id: Option<&'a str>,
    outcome: AuditOutcome,
    security_level: SecurityLevel,
    error_message: Option<&'a str>,
}

/// Canonical bytes of `entry`, excluding `checksum` and both chain hashes.
pub fn canonical_bytes(entry: &AuditEntry) -> Vec<u8> {
    let fields = CanonicalFields {
        id: &entry.id.0,
        sequence: entry.sequence,
        timestamp: &entry.timestamp,
        actor_id: entry.actor_id.as_deref(),
        session_id: entry.session_id.as_ref().map(|s| s.0.as_str()),
        event_type: entry.event_type,
        action: &entry.action,
        resource_type: entry.resource_type.as_deref(),
        resource_id: entry.resource_id.as_deref(),
        outcome: entry.outcome,
        security_level: entry.security_level,
        error_message: entry.error_message.as_deref(),
    };
    // Serializing plain strings, integers and unit enums cannot fail.
    serde_json::to_vec(&fields).unwrap_or_default()
}

/// `hex(SHA-256(canonical))`.
pub fn compute_checksum(entry: &AuditEntry) -> String {
    hex::encode(Sha256::digest(canonical_bytes(entry)))
}

/// `hex(SHA-256(prev_hash ‖ canonical ‖ checksum))`.
pub fn compute_chain_hash(prev_hash: &str, entry: &AuditEntry, checksum: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(canonical_bytes(entry));
    hasher.update(checksum.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fill in `checksum`, `chain_prev_hash` and `chain_hash` for an entry appended after `prev_hash`.
pub fn seal(entry: &mut AuditEntry, prev_hash: &str) {
    entry.checksum = compute_checksum(entry);
    entry.chain_prev_hash = prev_hash.to_string();
    entry.chain_hash = compute_chain_hash(prev_hash, entry, &entry.checksum);
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyhold_core::{AuditEntryId, SessionId, GENESIS_HASH};

    fn sample() -> AuditEntry {
        AuditEntry {
            id: AuditEntryId("entry-1".into()),
            sequence: 1,
            timestamp: DateTime::parse_from_rfc3339("2026-03-01T12:00:00.123456789Z")
                .unwrap()
                .with_timezone(&Utc),
            actor_id: None,
            session_id: Some(SessionId("session-1".into())),
            event_type: AuditEventType::SessionUnlock,
            action: "unlock".into(),
            resource_type: None,
            resource_id: None,
            outcome: AuditOutcome::Success,
            security_level: SecurityLevel::Medium,
            error_message: None,
            checksum: String::new(),
            chain_prev_hash: String::new(),
            chain_hash: String::new(),
        }
    }

    #[test]
    fn checksum_ignores_chain_fields() {
        let mut a = sample();
        let b = sample();
        a.chain_hash = "ff".into();
        a.chain_prev_hash = "ee".into();
        assert_eq!(compute_checksum(&a), compute_checksum(&b));
        assert_eq!(compute_checksum(&a).len(), 64);
    }

    #[test]
    fn checksum_covers_outcome() {
        let a = sample();
        let mut b = sample();
        b.outcome = AuditOutcome::Failure;
        assert_ne!(compute_checksum(&a), compute_checksum(&b));
    }

    #[test]
    fn chain_hash_depends_on_predecessor() {
        let entry = sample();
        let checksum = compute_checksum(&entry);
        assert_ne!(
            compute_chain_hash(GENESIS_HASH, &entry, &checksum),
            compute_chain_hash(&"1".repeat(64), &entry, &checksum)
        );
    }

    #[test]
    fn seal_links_to_prev() {
        let mut entry = sample();
        seal(&mut entry, GENESIS_HASH);
        assert_eq!(entry.chain_prev_hash, GENESIS_HASH);
        assert_eq!(entry.checksum, compute_checksum(&entry));
        assert_eq!(
            entry.chain_hash,
            compute_chain_hash(GENESIS_HASH, &entry, &entry.checksum)
        );
    }
}
