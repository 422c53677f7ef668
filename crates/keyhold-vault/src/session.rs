// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session state machine owning the lifetime of the ephemeral keys.
//!
//! States: Locked -> Unlocking -> Unlocked -> Locked.
//!
//! - **Unlocking**: the master seed is recovered (biometric capability or
//!   password slot) and two keys are derived from it: the SessionKey under a
//!   fresh random salt, and the MasterKey under the persisted master salt.
//! - **Unlocked**: both keys live in memory only, reachable through
//!   [`SessionManager::with_session_key`] and [`SessionManager::with_master_key`].
//! - **Locked**: both keys have been wiped. Reached by explicit lock, idle or
//!   background timeout, a detected compromise, or shutdown.
//!
//! Transitions are serialized by one async mutex; [`SessionManager::is_unlocked`]
//! reads an atomic and never waits.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use keyhold_audit::{AuditChain, AuditEvent};
use keyhold_config::SessionConfig;
use keyhold_core::{
    AuditEventType, AuditOutcome, AuthCapability, ErrorSeverity, KeyBlobStore, KeyholdError,
    PromptOutcome, SecurityLevel, SessionId, UnlockPrompt,
};
use secrecy::SecretString;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::kdf::{derive_blocking, generate_salt, KdfParams, SALT_LEN};
use crate::memory::{SecretKey, KEY_LEN};
use crate::password::PasswordSlot;
use crate::record_event;
use crate::records::{self, MasterKeySalt, MASTER_KEY_SALT_BLOB, RECORD_VERSION};
use crate::seed::MasterSeedStore;

/// Shown by the platform prompt on unlock.
const UNLOCK_PROMPT_REASON: &str = "Unlock your vault";

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// No key material in memory.
    Locked = 0,
    /// Seed recovery and key derivation in progress.
    Unlocking = 1,
    /// SessionKey and MasterKey held in memory.
    Unlocked = 2,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Unlocking,
            2 => SessionState::Unlocked,
            _ => SessionState::Locked,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Locked => write!(f, "locked"),
            SessionState::Unlocking => write!(f, "unlocking"),
            SessionState::Unlocked => write!(f, "unlocked"),
        }
    }
}

/// How the user authenticated.
pub enum UnlockMethod {
    /// Single-use capability from a successful biometric gesture.
    Biometric(AuthCapability),
    /// Password typed as a fallback.
    Password(SecretString),
}

impl UnlockMethod {
    fn action(&self) -> &'static str {
        match self {
            UnlockMethod::Biometric(_) => "unlock_biometric",
            UnlockMethod::Password(_) => "unlock_password",
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockReason {
    Manual,
    IdleTimeout,
    BackgroundTimeout,
    /// Something suspicious was detected; the description is audited.
    SecurityCompromise(String),
    Shutdown,
}

impl std::fmt::Display for LockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockReason::Manual => write!(f, "manual"),
            LockReason::IdleTimeout => write!(f, "idle_timeout"),
            LockReason::BackgroundTimeout => write!(f, "background_timeout"),
            LockReason::SecurityCompromise(_) => write!(f, "security_compromise"),
            LockReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Inactivity thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// Lock after this long without activity in the foreground.
    pub idle: Duration,
    /// Lock after this long in the background.
    pub background: Duration,
}

impl From<&SessionConfig> for SessionTimeouts {
    fn from(config: &SessionConfig) -> Self {
        Self {
            idle: Duration::from_secs(config.idle_timeout_secs),
            background: Duration::from_secs(config.background_timeout_secs),
        }
    }
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

struct ActiveSession {
    id: SessionId,
    session_key: SecretKey,
    master_key: SecretKey,
    unlocked_at: DateTime<Utc>,
}

struct Slot {
    active: Option<ActiveSession>,
    timer: Option<CancellationToken>,
    foreground: bool,
}

struct Inner {
    seed_store: MasterSeedStore,
    password_slot: PasswordSlot,
    blobs: Arc<dyn KeyBlobStore>,
    kdf: KdfParams,
    timeouts: SessionTimeouts,
    audit: Option<AuditChain>,
    state: AtomicU8,
    /// Bumped on every timer restart and lock; a timer only fires for its own generation.
    generation: AtomicU64,
    slot: Mutex<Slot>,
    pending_unlock: StdMutex<Option<CancellationToken>>,
}

impl Inner {
    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn take_pending(&self) -> Option<CancellationToken> {
        self.pending_unlock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn set_pending(&self, token: CancellationToken) {
        *self
            .pending_unlock
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(token);
    }
}

/// Returns the manager to `Locked` if an unlock future is dropped mid-flight.
struct UnlockingGuard<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl Drop for UnlockingGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.inner.state() == SessionState::Unlocking {
            self.inner.set_state(SessionState::Locked);
            debug!("unlock abandoned, session returned to locked");
        }
    }
}

/// Builder for [`SessionManager`].
pub struct SessionManagerBuilder {
    seed_store: MasterSeedStore,
    password_slot: PasswordSlot,
    blobs: Arc<dyn KeyBlobStore>,
    kdf: KdfParams,
    timeouts: SessionTimeouts,
    audit: Option<AuditChain>,
}

impl SessionManagerBuilder {
    /// Argon2id parameters for session keys and newly created master salts.
    pub fn kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn timeouts(mut self, timeouts: SessionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Append unlock and lock events to `audit`.
    pub fn audit(mut self, audit: AuditChain) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn build(self) -> SessionManager {
        SessionManager {
            inner: Arc::new(Inner {
                seed_store: self.seed_store,
                password_slot: self.password_slot,
                blobs: self.blobs,
                kdf: self.kdf,
                timeouts: self.timeouts,
                audit: self.audit,
                state: AtomicU8::new(SessionState::Locked as u8),
                generation: AtomicU64::new(0),
                slot: Mutex::new(Slot {
                    active: None,
                    timer: None,
                    foreground: true,
                }),
                pending_unlock: StdMutex::new(None),
            }),
        }
    }
}

/// Owns the SessionKey and MasterKey for the duration of a session.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn builder(
        seed_store: MasterSeedStore,
        password_slot: PasswordSlot,
        blobs: Arc<dyn KeyBlobStore>,
    ) -> SessionManagerBuilder {
        SessionManagerBuilder {
            seed_store,
            password_slot,
            blobs,
            kdf: KdfParams::V1,
            timeouts: SessionTimeouts::default(),
            audit: None,
        }
    }

    /// Current state. Lock-free.
    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Whether a session is active. Lock-free.
    pub fn is_unlocked(&self) -> bool {
        self.state() == SessionState::Unlocked
    }

    /// Identifier of the active session, if any.
    pub async fn session_id(&self) -> Option<SessionId> {
        let slot = self.inner.slot.lock().await;
        slot.active.as_ref().map(|a| a.id.clone())
    }

    /// When the active session was unlocked.
    pub async fn unlocked_at(&self) -> Option<DateTime<Utc>> {
        let slot = self.inner.slot.lock().await;
        slot.active.as_ref().map(|a| a.unlocked_at)
    }

    /// Fail with [`KeyholdError::SessionLocked`] unless a session is active.
    ///
    /// Key material is never returned; use [`Self::with_session_key`].
    pub async fn require_active_session(&self) -> Result<SessionId, KeyholdError> {
        self.session_id().await.ok_or_else(|| {
            debug!("active session required but vault is locked");
            KeyholdError::SessionLocked
        })
    }

    /// Run `f` with the SessionKey. Counts as activity for the idle timer.
    ///
    /// The key reference cannot escape the closure; nothing may copy it out.
    pub async fn with_session_key<R>(
        &self,
        f: impl FnOnce(&[u8; KEY_LEN]) -> R,
    ) -> Result<R, KeyholdError> {
        let mut slot = self.inner.slot.lock().await;
        let result = match &slot.active {
            Some(active) => f(active.session_key.expose()),
            None => {
                debug!("session key requested while locked");
                return Err(KeyholdError::SessionLocked);
            }
        };
        self.restart_timer(&mut slot);
        Ok(result)
    }

    /// Run `f` with the MasterKey. Fails with [`KeyholdError::NoActiveSession`] when locked.
    pub async fn with_master_key<R>(
        &self,
        f: impl FnOnce(&SecretKey) -> R,
    ) -> Result<R, KeyholdError> {
        let mut slot = self.inner.slot.lock().await;
        let result = match &slot.active {
            Some(active) => f(&active.master_key),
            None => {
                debug!("master key requested while locked");
                return Err(KeyholdError::NoActiveSession);
            }
        };
        self.restart_timer(&mut slot);
        Ok(result)
    }

    /// Ask `prompt` for credentials and unlock with whatever it returns.
    pub async fn unlock_with_prompt(
        &self,
        prompt: &dyn UnlockPrompt,
    ) -> Result<SessionId, KeyholdError> {
        match prompt.authenticate(UNLOCK_PROMPT_REASON).await? {
            PromptOutcome::Capability(capability) => {
                self.unlock(UnlockMethod::Biometric(capability)).await
            }
            PromptOutcome::Password(password) => self.unlock(UnlockMethod::Password(password)).await,
            PromptOutcome::Cancelled => {
                debug!("unlock prompt dismissed");
                Err(KeyholdError::UnlockCancelled)
            }
        }
    }

    /// Locked -> Unlocking -> Unlocked.
    ///
    /// On any failure, or on [`Self::cancel_unlock`], the manager returns to
    /// `Locked` with no key retained. Dropping the returned future has the
    /// same effect.
    pub async fn unlock(&self, method: UnlockMethod) -> Result<SessionId, KeyholdError> {
        let cancel = CancellationToken::new();
        self.inner.set_pending(cancel.clone());

        let mut slot = tokio::select! {
            _ = cancel.cancelled() => return Err(KeyholdError::UnlockCancelled),
            slot = self.inner.slot.lock() => slot,
        };
        if slot.active.is_some() {
            self.inner.take_pending();
            return Err(KeyholdError::InvalidState("session is already unlocked".into()));
        }

        self.inner.set_state(SessionState::Unlocking);
        let mut guard = UnlockingGuard {
            inner: &self.inner,
            armed: true,
        };
        let action = method.action();

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(KeyholdError::UnlockCancelled),
            derived = self.derive_session(method) => derived,
        };
        self.inner.take_pending();

        match result {
            Ok(active) => {
                let id = active.id.clone();
                slot.active = Some(active);
                self.inner.set_state(SessionState::Unlocked);
                guard.armed = false;
                self.restart_timer(&mut slot);
                drop(slot);

                info!(session_id = %id, method = action, "session unlocked");
                record_event(
                    self.inner.audit.as_ref(),
                    AuditEvent::new(AuditEventType::SessionUnlock, action).session(Some(id.clone())),
                )
                .await;
                Ok(id)
            }
            Err(e) => {
                self.inner.set_state(SessionState::Locked);
                guard.armed = false;
                drop(slot);

                if e.severity() == ErrorSeverity::Routine {
                    debug!(method = action, error = %e, "unlock did not complete");
                } else {
                    warn!(method = action, error = %e, "unlock failed");
                }
                let outcome = match e {
                    KeyholdError::UnwrapFailed | KeyholdError::AuthenticationRequired => {
                        AuditOutcome::Denied
                    }
                    _ => AuditOutcome::Failure,
                };
                record_event(
                    self.inner.audit.as_ref(),
                    AuditEvent::new(AuditEventType::SessionUnlock, action)
                        .failed(e.to_string())
                        .outcome(outcome),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Abort an in-flight unlock. Returns whether one was pending.
    pub fn cancel_unlock(&self) -> bool {
        match self.inner.take_pending() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Unlocked -> Locked, wiping both keys. Also aborts an in-flight unlock.
    ///
    /// Returns whether a session was ended.
    pub async fn lock(&self, reason: LockReason) -> Result<bool, KeyholdError> {
        if let Some(pending) = self.inner.take_pending() {
            pending.cancel();
        }
        let mut slot = self.inner.slot.lock().await;
        let ended = Self::end_session(&self.inner, &mut slot);
        drop(slot);
        let was_unlocked = ended.is_some();
        self.after_lock(ended, reason).await;
        Ok(was_unlocked)
    }

    /// Lock with [`LockReason::Shutdown`].
    pub async fn shutdown(&self) -> Result<(), KeyholdError> {
        self.lock(LockReason::Shutdown).await.map(|_| ())
    }

    /// The host moved the app to the foreground: the idle timeout applies.
    pub async fn on_foreground(&self) {
        let mut slot = self.inner.slot.lock().await;
        slot.foreground = true;
        self.restart_timer(&mut slot);
    }

    /// The host moved the app to the background: the background timeout applies.
    pub async fn on_background(&self) {
        let mut slot = self.inner.slot.lock().await;
        slot.foreground = false;
        self.restart_timer(&mut slot);
    }

    /// User activity: restart the current timeout.
    pub async fn touch(&self) {
        let mut slot = self.inner.slot.lock().await;
        self.restart_timer(&mut slot);
    }

    async fn derive_session(&self, method: UnlockMethod) -> Result<ActiveSession, KeyholdError> {
        let seed = match method {
            UnlockMethod::Biometric(capability) => {
                self.inner.seed_store.decrypt(Some(capability)).await?
            }
            UnlockMethod::Password(password) => self.inner.password_slot.open(&password).await?,
        };
        let master_salt = self.master_key_salt().await?;
        let master_salt_bytes: [u8; SALT_LEN] = master_salt
            .salt
            .as_slice()
            .try_into()
            .map_err(|_| KeyholdError::DerivationFailed("stored master salt is malformed".into()))?;
        let session_salt = generate_salt()?;

        let seed_bytes = || Zeroizing::new(seed.expose().to_vec());
        let (session_key, master_key) = tokio::try_join!(
            derive_blocking(seed_bytes(), session_salt, self.inner.kdf),
            derive_blocking(seed_bytes(), master_salt_bytes, master_salt.kdf),
        )?;
        drop(seed);

        Ok(ActiveSession {
            id: SessionId::new(),
            session_key,
            master_key,
            unlocked_at: Utc::now(),
        })
    }

    /// Load the master salt, creating it on the first unlock of an installation.
    async fn master_key_salt(&self) -> Result<MasterKeySalt, KeyholdError> {
        let blobs = self.inner.blobs.as_ref();
        if let Some(record) = records::load::<MasterKeySalt>(blobs, MASTER_KEY_SALT_BLOB).await? {
            if record.version != RECORD_VERSION {
                return Err(KeyholdError::DerivationFailed(format!(
                    "unsupported master salt version {}",
                    record.version
                )));
            }
            return Ok(record);
        }
        let record = MasterKeySalt {
            version: RECORD_VERSION,
            kdf: self.inner.kdf,
            salt: generate_salt()?.to_vec(),
        };
        records::store(blobs, MASTER_KEY_SALT_BLOB, &record).await?;
        info!("master key salt created");
        Ok(record)
    }

    /// Drop the active session (wiping its keys) and cancel the timer. Caller holds the slot.
    fn end_session(inner: &Inner, slot: &mut Slot) -> Option<SessionId> {
        if let Some(timer) = slot.timer.take() {
            timer.cancel();
        }
        inner.generation.fetch_add(1, Ordering::SeqCst);
        let ended = Self::drop_active(slot);
        inner.set_state(SessionState::Locked);
        ended
    }

    /// Drop the active session, wiping both keys, and return its id.
    fn drop_active(slot: &mut Slot) -> Option<SessionId> {
        let active = slot.active.take()?;
        let id = active.id.clone();
        drop(active);
        Some(id)
    }

    async fn after_lock(&self, ended: Option<SessionId>, reason: LockReason) {
        let Some(id) = ended else {
            debug!(reason = %reason, "lock requested while already locked");
            return;
        };

        let mut event = AuditEvent::new(AuditEventType::SessionLock, reason.to_string())
            .session(Some(id.clone()));
        match &reason {
            LockReason::SecurityCompromise(detail) => {
                error!(session_id = %id, detail = %detail, "SECURITY INCIDENT: session locked after compromise");
                event = event
                    .level(SecurityLevel::Critical)
                    .outcome(AuditOutcome::Denied);
                event.error_message = Some(detail.clone());
            }
            _ => {
                info!(session_id = %id, reason = %reason, "session locked");
                event = event.level(SecurityLevel::Low);
            }
        }
        record_event(self.inner.audit.as_ref(), event).await;
    }

    /// Cancel the running timer and, while unlocked, start one for the current mode.
    fn restart_timer(&self, slot: &mut Slot) {
        if let Some(timer) = slot.timer.take() {
            timer.cancel();
        }
        if slot.active.is_none() {
            return;
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (timeout, reason) = if slot.foreground {
            (self.inner.timeouts.idle, LockReason::IdleTimeout)
        } else {
            (self.inner.timeouts.background, LockReason::BackgroundTimeout)
        };
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Some(inner) = weak.upgrade() {
                        SessionManager { inner }.expire(generation, reason).await;
                    }
                }
            }
        });
        slot.timer = Some(token);
    }

    /// Timer callback: lock only if no transition happened since the timer started.
    async fn expire(&self, generation: u64, reason: LockReason) {
        let mut slot = self.inner.slot.lock().await;
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        slot.timer = None;
        let ended = Self::end_session(&self.inner, &mut slot);
        drop(slot);
        self.after_lock(ended, reason).await;
    }
}
