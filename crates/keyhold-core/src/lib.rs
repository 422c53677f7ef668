// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Keyhold key hierarchy.
//!
//! This crate provides the error taxonomy, the shared audit and session
//! types, and the traits for every external collaborator: the hardware
//! key store, the unlock prompt, the encrypted storage engine, key record
//! persistence, and audit persistence.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{ErrorSeverity, KeyholdError};
pub use types::{
    AuditEntry, AuditEntryId, AuditEventType, AuditOutcome, ChainState, PurgeOutcome,
    SecurityLevel, SessionId, GENESIS_HASH,
};

pub use traits::{
    AuditStore, AuthCapability, EncryptedStore, HardwareCiphertext, HardwareKeyError,
    HardwareKeyStore, KeyBlobStore, KeyPolicy, PromptOutcome, UnlockPrompt,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn audit_enums_round_trip_through_strings() {
        for level in [
            SecurityLevel::Low,
            SecurityLevel::Medium,
            SecurityLevel::High,
            SecurityLevel::Critical,
        ] {
            let s = level.to_string();
            assert_eq!(SecurityLevel::from_str(&s).expect("should parse back"), level);
        }
        assert_eq!(AuditEventType::KeyRotation.to_string(), "key_rotation");
        assert_eq!(
            AuditOutcome::from_str("failure").expect("should parse"),
            AuditOutcome::Failure
        );
    }

    #[test]
    fn security_levels_are_ordered() {
        assert!(SecurityLevel::Critical > SecurityLevel::High);
        assert!(SecurityLevel::Low < SecurityLevel::Medium);
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
        assert_ne!(AuditEntryId::new(), AuditEntryId::new());
    }

    #[test]
    fn genesis_state_points_at_genesis_hash() {
        let state = ChainState::genesis();
        assert_eq!(state.head_hash, GENESIS_HASH);
        assert_eq!(state.anchor_hash, GENESIS_HASH);
        assert_eq!(state.head_sequence, 0);
        assert_eq!(GENESIS_HASH.len(), 64);
    }

    #[test]
    fn per_use_policy_has_zero_validity() {
        let policy = KeyPolicy::per_use_authentication();
        assert!(policy.require_user_auth);
        assert!(policy.auth_validity.is_zero());
    }

    #[test]
    fn entry_serializes_with_snake_case_enums() {
        let entry = AuditEntry {
            id: AuditEntryId("e1".into()),
            sequence: 1,
            timestamp: chrono::Utc::now(),
            actor_id: None,
            session_id: Some(SessionId("s1".into())),
            event_type: AuditEventType::SessionUnlock,
            action: "unlock".into(),
            resource_type: None,
            resource_id: None,
            outcome: AuditOutcome::Success,
            security_level: SecurityLevel::Medium,
            error_message: None,
            checksum: String::new(),
            chain_prev_hash: GENESIS_HASH.into(),
            chain_hash: String::new(),
        };
        let json = serde_json::to_string(&entry).expect("should serialize");
        assert!(json.contains("\"session_unlock\""));
        let back: AuditEntry = serde_json::from_str(&json).expect("should deserialize");
        assert_eq!(back, entry);
    }
}
