// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Keyhold key hierarchy.

use thiserror::Error;

/// How loudly an error must be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Expected condition the caller handles by re-prompting (e.g. a locked session).
    Routine,
    /// Operation failed; state on disk is still consistent.
    Error,
    /// Security incident: on-disk state may be inconsistent or tampered with.
    Critical,
}

/// The primary error type used across all Keyhold crates.
///
/// Messages never contain key material, passphrases, or decrypted plaintext.
#[derive(Debug, Error)]
pub enum KeyholdError {
    /// A fresh authentication gesture is needed (missing or stale capability).
    #[error("authentication required: a fresh authentication gesture is needed")]
    AuthenticationRequired,

    /// The session is not unlocked.
    #[error("session is locked")]
    SessionLocked,

    /// Neither an active session nor the master key is available.
    #[error("no active session: unlock the vault first")]
    NoActiveSession,

    /// The master seed has never been initialized.
    #[error("master seed unavailable: the vault has not been initialized")]
    SeedUnavailable,

    /// The sealed master seed could not be decrypted (corruption or hardware key invalidation).
    #[error("master seed decryption failed: {0}")]
    DecryptionFailed(String),

    /// The key-derivation function rejected its inputs or parameters.
    #[error("key derivation failed: {0}")]
    DerivationFailed(String),

    /// Authenticated decryption failed: tag mismatch or malformed input.
    ///
    /// Always treated as attacker activity or corruption.
    #[error("key unwrap failed: authentication tag mismatch or malformed input")]
    UnwrapFailed,

    /// The current storage passphrase could not be obtained or does not open the store.
    #[error("current storage passphrase unavailable: {0}")]
    CurrentPassphraseUnavailable(String),

    /// Re-keying the storage engine failed; the store was returned to its old passphrase.
    #[error("storage re-key failed during {phase}: {message}")]
    RekeyFailed {
        /// Rotation phase that failed.
        phase: String,
        /// Description of the failure.
        message: String,
    },

    /// Re-key failed and the store could not be returned to its old passphrase.
    #[error(
        "rollback failed after re-key error ({rekey_error}): {rollback_error}; \
         storage may be in an inconsistent state and needs manual recovery"
    )]
    RollbackFailed {
        /// The error that triggered the rollback.
        rekey_error: String,
        /// The error raised by the rollback itself.
        rollback_error: String,
    },

    /// The audit chain does not verify.
    #[error("audit chain integrity violation at entry {entry_id} (sequence {sequence}): {reason}")]
    ChainIntegrityViolation {
        /// Identifier of the first broken entry.
        entry_id: String,
        /// Insertion position of the first broken entry.
        sequence: i64,
        /// Why verification failed.
        reason: String,
    },

    /// An in-flight unlock was cancelled.
    #[error("unlock cancelled")]
    UnlockCancelled,

    /// The requested transition is not valid from the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Hardware-backed key store failure not covered by a more specific variant.
    #[error("hardware key store error: {0}")]
    HardwareKey(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KeyholdError {
    /// Classify the error for logging and incident handling.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            KeyholdError::SessionLocked
            | KeyholdError::NoActiveSession
            | KeyholdError::AuthenticationRequired
            | KeyholdError::UnlockCancelled => ErrorSeverity::Routine,
            KeyholdError::RollbackFailed { .. } | KeyholdError::ChainIntegrityViolation { .. } => {
                ErrorSeverity::Critical
            }
            _ => ErrorSeverity::Error,
        }
    }

    /// Whether this error must be reported as a security incident.
    pub fn is_security_incident(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Wrap any error as a storage error.
    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        KeyholdError::Storage {
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_session_is_routine() {
        assert_eq!(KeyholdError::SessionLocked.severity(), ErrorSeverity::Routine);
        assert!(!KeyholdError::NoActiveSession.is_security_incident());
    }

    #[test]
    fn rollback_and_integrity_failures_are_incidents() {
        let rollback = KeyholdError::RollbackFailed {
            rekey_error: "verify failed".into(),
            rollback_error: "rekey back failed".into(),
        };
        let chain = KeyholdError::ChainIntegrityViolation {
            entry_id: "e2".into(),
            sequence: 2,
            reason: "checksum mismatch".into(),
        };
        assert!(rollback.is_security_incident());
        assert!(chain.is_security_incident());
        assert!(!KeyholdError::UnwrapFailed.is_security_incident());
    }

    #[test]
    fn unwrap_failure_message_carries_no_detail() {
        let msg = KeyholdError::UnwrapFailed.to_string();
        assert!(msg.contains("authentication tag mismatch"));
    }

    #[test]
    fn storage_helper_boxes_source() {
        let err = KeyholdError::storage(std::io::Error::other("disk full"));
        assert!(err.to_string().contains("disk full"));
    }
}
