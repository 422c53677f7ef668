// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builder for the caller-supplied part of an audit entry.

use chrono::Utc;
use keyhold_core::{
    AuditEntry, AuditEntryId, AuditEventType, AuditOutcome, SecurityLevel, SessionId,
};

/// Fields of an entry before the chain assigns id, sequence, timestamp and hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub action: String,
    pub actor_id: Option<String>,
    pub session_id: Option<SessionId>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub outcome: AuditOutcome,
    pub security_level: SecurityLevel,
    pub error_message: Option<String>,
}

impl AuditEvent {
    /// A successful, medium-sensitivity event.
    pub fn new(event_type: AuditEventType, action: impl Into<String>) -> Self {
        Self {
            event_type,
            action: action.into(),
            actor_id: None,
            session_id: None,
            resource_type: None,
            resource_id: None,
            outcome: AuditOutcome::Success,
            security_level: SecurityLevel::Medium,
            error_message: None,
        }
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn session(mut self, session_id: Option<SessionId>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: Option<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = resource_id;
        self
    }

    pub fn outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn level(mut self, level: SecurityLevel) -> Self {
        self.security_level = level;
        self
    }

    /// Mark the event failed with `message`.
    ///
    /// The message must not contain key material; callers pass error
    /// `Display` output, which never does.
    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.outcome = AuditOutcome::Failure;
        self.error_message = Some(message.into());
        self
    }

    /// Materialize an unsealed entry at `sequence`, stamped with the current time.
    pub(crate) fn into_entry(self, sequence: i64) -> AuditEntry {
        AuditEntry {
            id: AuditEntryId::new(),
            sequence,
            timestamp: Utc::now(),
            actor_id: self.actor_id,
            session_id: self.session_id,
            event_type: self.event_type,
            action: self.action,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            outcome: self.outcome,
            security_level: self.security_level,
            error_message: self.error_message,
            checksum: String::new(),
            chain_prev_hash: String::new(),
            chain_hash: String::new(),
        }
    }
}
