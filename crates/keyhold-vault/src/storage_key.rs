// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage engine passphrase: creation, unwrapping and rotation.
//!
//! The passphrase is 32 random bytes wrapped under the MasterKey, so it
//! survives across sessions and is independent of the session salt.
//!
//! Rotation runs four phases, each appended to the audit chain:
//!
//! 1. `prepare`: unwrap the current passphrase and probe the store with it.
//! 2. `generate`: draw a new passphrase, kept in memory only.
//! 3. `rekey`: re-key the store old -> new, then probe with the new passphrase.
//! 4. `commit`: wrap and persist the new passphrase.
//!
//! A failure in phases 3 or 4 rolls the store back to the old passphrase
//! before the error is returned. If the rollback itself fails the store may
//! be unreadable with the persisted passphrase, which is reported as
//! [`KeyholdError::RollbackFailed`]. A re-key that times out is reported the
//! same way without a rollback attempt: the engine may still complete it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use keyhold_audit::{AuditChain, AuditEvent};
use keyhold_config::RotationConfig;
use keyhold_core::{
    AuditEventType, EncryptedStore, KeyBlobStore, KeyholdError, SecurityLevel, SessionId,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::memory::{random_bytes, wipe, KEY_LEN};
use crate::record_event;
use crate::records::{self, WrappedKey, RECORD_VERSION, STORAGE_PASSPHRASE_BLOB};
use crate::session::SessionManager;
use crate::wrap::{unwrap_key, wrap_key};

/// Phases of a passphrase rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPhase {
    Prepare,
    Generate,
    Rekey,
    Commit,
}

impl fmt::Display for RotationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationPhase::Prepare => write!(f, "prepare"),
            RotationPhase::Generate => write!(f, "generate"),
            RotationPhase::Rekey => write!(f, "rekey"),
            RotationPhase::Commit => write!(f, "commit"),
        }
    }
}

/// Pre-rotation passphrase, alive for exactly one rotation attempt.
///
/// Wiped on drop, whichever way the rotation exits.
struct RekeyBackup {
    passphrase: Vec<u8>,
}

impl RekeyBackup {
    fn capture(passphrase: Zeroizing<Vec<u8>>) -> Self {
        Self {
            passphrase: passphrase.to_vec(),
        }
    }

    fn passphrase(&self) -> &[u8] {
        &self.passphrase
    }
}

impl Drop for RekeyBackup {
    fn drop(&mut self) {
        wipe(&mut self.passphrase);
    }
}

impl fmt::Debug for RekeyBackup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RekeyBackup([REDACTED])")
    }
}

/// Owns the storage engine passphrase.
#[derive(Clone)]
pub struct StorageKeyManager {
    session: SessionManager,
    blobs: Arc<dyn KeyBlobStore>,
    engine: Arc<dyn EncryptedStore>,
    audit: Option<AuditChain>,
    rekey_timeout: Duration,
    /// Serializes creation and rotation.
    gate: Arc<Mutex<()>>,
}

impl StorageKeyManager {
    pub fn new(
        session: SessionManager,
        blobs: Arc<dyn KeyBlobStore>,
        engine: Arc<dyn EncryptedStore>,
    ) -> Self {
        Self {
            session,
            blobs,
            engine,
            audit: None,
            rekey_timeout: Duration::from_secs(RotationConfig::default().rekey_timeout_secs),
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_audit(mut self, audit: AuditChain) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Upper bound for the re-key phase and for a rollback.
    pub fn with_rekey_timeout(mut self, timeout: Duration) -> Self {
        self.rekey_timeout = timeout;
        self
    }

    /// Return the passphrase, creating and persisting one if none exists.
    ///
    /// Fails with [`KeyholdError::NoActiveSession`] while locked.
    pub async fn get_or_create_passphrase(&self) -> Result<Zeroizing<Vec<u8>>, KeyholdError> {
        let _gate = self.gate.lock().await;
        if let Some(passphrase) = self.current_passphrase().await? {
            return Ok(passphrase);
        }

        let passphrase = random_bytes(KEY_LEN)?;
        let wrapped = self
            .session
            .with_master_key(|key| wrap_key(key, &passphrase))
            .await??;
        records::store(self.blobs.as_ref(), STORAGE_PASSPHRASE_BLOB, &wrapped).await?;
        info!("storage passphrase created");

        record_event(
            self.audit.as_ref(),
            AuditEvent::new(AuditEventType::KeyAccess, "create_storage_passphrase")
                .session(self.session.session_id().await)
                .resource("storage_passphrase", None)
                .level(SecurityLevel::High),
        )
        .await;
        Ok(passphrase)
    }

    /// Replace the passphrase, re-keying the store, with rollback on failure.
    pub async fn rotate_passphrase(&self) -> Result<(), KeyholdError> {
        let _gate = self.gate.lock().await;
        let session_id = self.session.session_id().await;

        // Phase 1: the store must open with what we have on record.
        let current = match self.current_passphrase().await {
            Ok(Some(passphrase)) => passphrase,
            Ok(None) => {
                let err = KeyholdError::CurrentPassphraseUnavailable(
                    "no storage passphrase on record".into(),
                );
                self.audit_phase(RotationPhase::Prepare, &session_id, Some(&err)).await;
                return Err(err);
            }
            Err(e @ KeyholdError::NoActiveSession) => return Err(e),
            Err(e) => {
                let err = KeyholdError::CurrentPassphraseUnavailable(e.to_string());
                self.audit_phase(RotationPhase::Prepare, &session_id, Some(&err)).await;
                return Err(err);
            }
        };
        if let Err(e) = self.bounded(self.engine.probe(&current)).await {
            let err = KeyholdError::CurrentPassphraseUnavailable(format!(
                "store does not open with the current passphrase: {e}"
            ));
            self.audit_phase(RotationPhase::Prepare, &session_id, Some(&err)).await;
            return Err(err);
        }
        let backup = RekeyBackup::capture(current);
        self.audit_phase(RotationPhase::Prepare, &session_id, None).await;

        // Phase 2: in memory only.
        let new_passphrase = random_bytes(KEY_LEN)?;
        self.audit_phase(RotationPhase::Generate, &session_id, None).await;

        // Phase 3
        let rekeyed = self
            .bounded(async {
                self.engine.rekey(backup.passphrase(), &new_passphrase).await?;
                self.engine.probe(&new_passphrase).await
            })
            .await;
        match rekeyed {
            Ok(()) => {}
            // The engine may still be applying the re-key; reversing it now
            // could race the in-flight call, so the store state is unknown.
            Err(e @ KeyholdError::Timeout { .. }) => {
                return Err(self
                    .report_incident(
                        RotationPhase::Rekey,
                        e,
                        "re-key still in flight, store state unknown".to_string(),
                        &session_id,
                    )
                    .await);
            }
            Err(e) => {
                return Err(self
                    .roll_back(&backup, &new_passphrase, RotationPhase::Rekey, e, &session_id)
                    .await);
            }
        }
        self.audit_phase(RotationPhase::Rekey, &session_id, None).await;

        // Phase 4
        if let Err(e) = self.commit(&new_passphrase).await {
            return Err(self
                .roll_back(&backup, &new_passphrase, RotationPhase::Commit, e, &session_id)
                .await);
        }
        self.audit_phase(RotationPhase::Commit, &session_id, None).await;
        drop(backup);

        info!("storage passphrase rotated");
        Ok(())
    }

    /// Unwrap the stored passphrase, if one exists.
    async fn current_passphrase(&self) -> Result<Option<Zeroizing<Vec<u8>>>, KeyholdError> {
        let Some(wrapped) =
            records::load::<WrappedKey>(self.blobs.as_ref(), STORAGE_PASSPHRASE_BLOB).await?
        else {
            return Ok(None);
        };
        if wrapped.version != RECORD_VERSION {
            return Err(KeyholdError::UnwrapFailed);
        }
        let passphrase = self
            .session
            .with_master_key(|key| unwrap_key(key, &wrapped))
            .await??;
        Ok(Some(passphrase))
    }

    async fn commit(&self, new_passphrase: &[u8]) -> Result<(), KeyholdError> {
        let wrapped = self
            .session
            .with_master_key(|key| wrap_key(key, new_passphrase))
            .await??;
        records::store(self.blobs.as_ref(), STORAGE_PASSPHRASE_BLOB, &wrapped).await
    }

    /// Return the store to the backed-up passphrase and build the error to surface.
    async fn roll_back(
        &self,
        backup: &RekeyBackup,
        new_passphrase: &[u8],
        phase: RotationPhase,
        cause: KeyholdError,
        session_id: &Option<SessionId>,
    ) -> KeyholdError {
        warn!(phase = %phase, error = %cause, "passphrase rotation failed, rolling back");

        let restored = self
            .bounded(async {
                // Never re-keyed, or re-keyed and already reverted.
                if self.engine.probe(backup.passphrase()).await.is_ok() {
                    return Ok(false);
                }
                self.engine.rekey(new_passphrase, backup.passphrase()).await?;
                self.engine.probe(backup.passphrase()).await?;
                Ok::<_, KeyholdError>(true)
            })
            .await;

        match restored {
            Ok(reverted) => {
                debug!(phase = %phase, reverted, "store restored to previous passphrase");
                let err = KeyholdError::RekeyFailed {
                    phase: phase.to_string(),
                    message: cause.to_string(),
                };
                self.audit_phase(phase, session_id, Some(&err)).await;
                err
            }
            Err(rollback_error) => {
                self.report_incident(phase, cause, rollback_error.to_string(), session_id)
                    .await
            }
        }
    }

    /// Log and audit a rotation that left the store in an unknown state.
    async fn report_incident(
        &self,
        phase: RotationPhase,
        cause: KeyholdError,
        rollback_error: String,
        session_id: &Option<SessionId>,
    ) -> KeyholdError {
        error!(
            phase = %phase,
            rekey_error = %cause,
            rollback_error = %rollback_error,
            "SECURITY INCIDENT: storage rollback failed, store may need manual recovery"
        );
        let err = KeyholdError::RollbackFailed {
            rekey_error: cause.to_string(),
            rollback_error,
        };
        record_event(
            self.audit.as_ref(),
            AuditEvent::new(AuditEventType::SecurityIncident, "rotate_passphrase.rollback")
                .session(session_id.clone())
                .resource("storage_passphrase", None)
                .level(SecurityLevel::Critical)
                .failed(err.to_string()),
        )
        .await;
        err
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, KeyholdError>>,
    ) -> Result<T, KeyholdError> {
        tokio::time::timeout(self.rekey_timeout, fut)
            .await
            .map_err(|_| KeyholdError::Timeout {
                duration: self.rekey_timeout,
            })?
    }

    async fn audit_phase(
        &self,
        phase: RotationPhase,
        session_id: &Option<SessionId>,
        failure: Option<&KeyholdError>,
    ) {
        let mut event =
            AuditEvent::new(AuditEventType::KeyRotation, format!("rotate_passphrase.{phase}"))
                .session(session_id.clone())
                .resource("storage_passphrase", None)
                .level(SecurityLevel::High);
        if let Some(e) = failure {
            event = event.failed(e.to_string());
        }
        record_event(self.audit.as_ref(), event).await;
    }
}
