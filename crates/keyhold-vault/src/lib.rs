// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key hierarchy and session lifecycle for Keyhold.
//!
//! A random master seed, sealed by a hardware key that needs a fresh
//! authentication gesture per use, is the root of everything. Each unlock
//! decrypts it once and derives two keys with Argon2id: an ephemeral
//! SessionKey under a fresh salt, and the MasterKey under a persisted salt.
//! The MasterKey wraps the storage engine passphrase with AES-256-GCM.
//! Neither key is ever written to disk.

pub mod kdf;
pub mod memory;
pub mod password;
pub mod prompt;
pub mod records;
pub mod seed;
pub mod session;
pub mod storage_key;
pub mod wrap;

pub use kdf::{derive, derive_from_password, KdfParams};
pub use memory::{constant_time_eq, random_bytes, wipe, SecretKey};
pub use password::PasswordSlot;
pub use prompt::TerminalPrompt;
pub use records::WrappedKey;
pub use seed::MasterSeedStore;
pub use session::{
    LockReason, SessionManager, SessionManagerBuilder, SessionState, SessionTimeouts, UnlockMethod,
};
pub use storage_key::{RotationPhase, StorageKeyManager};
pub use wrap::{unwrap_key, wrap_key};

use keyhold_audit::{AuditChain, AuditEvent};

/// Append `event` if a chain is attached.
///
/// A failed append is logged and does not fail the audited operation.
pub(crate) async fn record_event(audit: Option<&AuditChain>, event: AuditEvent) {
    let Some(chain) = audit else {
        return;
    };
    let event_type = event.event_type;
    if let Err(e) = chain.append(event).await {
        tracing::error!(event_type = %event_type, error = %e, "failed to append audit entry");
    }
}
