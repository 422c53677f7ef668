// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audit chain persistence in the `audit_entries` and `audit_chain` tables.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use keyhold_core::{
    AuditEntry, AuditEntryId, AuditStore, ChainState, KeyholdError, PurgeOutcome, SessionId,
};
use rusqlite::{params, OptionalExtension, Row};

use crate::database::{map_tr_err, MetaDatabase};

const ENTRY_COLUMNS: &str = "id, sequence, timestamp, actor_id, session_id, event_type, action, \
     resource_type, resource_id, outcome, security_level, error_message, checksum, \
     chain_prev_hash, chain_hash";

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn conversion_error(index: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_column<T>(row: &Row<'_>, index: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(index)?;
    raw.parse::<T>().map_err(|e| conversion_error(index, e))
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let timestamp: String = row.get(2)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| conversion_error(2, e))?
        .with_timezone(&Utc);
    Ok(AuditEntry {
        id: AuditEntryId(row.get(0)?),
        sequence: row.get(1)?,
        timestamp,
        actor_id: row.get(3)?,
        session_id: row.get::<_, Option<String>>(4)?.map(SessionId),
        event_type: parse_column(row, 5)?,
        action: row.get(6)?,
        resource_type: row.get(7)?,
        resource_id: row.get(8)?,
        outcome: parse_column(row, 9)?,
        security_level: parse_column(row, 10)?,
        error_message: row.get(11)?,
        checksum: row.get(12)?,
        chain_prev_hash: row.get(13)?,
        chain_hash: row.get(14)?,
    })
}

fn read_chain_state(conn: &rusqlite::Connection) -> rusqlite::Result<ChainState> {
    conn.query_row(
        "SELECT head_hash, head_sequence, anchor_hash, anchor_sequence FROM audit_chain WHERE id = 1",
        [],
        |row| {
            Ok(ChainState {
                head_hash: row.get(0)?,
                head_sequence: row.get(1)?,
                anchor_hash: row.get(2)?,
                anchor_sequence: row.get(3)?,
            })
        },
    )
}

/// SQLite-backed [`AuditStore`].
///
/// Entry rows are insert-only; the head pointer moves in the same
/// transaction as the insert.
#[derive(Clone)]
pub struct SqliteAuditStore {
    db: MetaDatabase,
}

impl SqliteAuditStore {
    pub fn new(db: MetaDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn chain_state(&self) -> Result<ChainState, KeyholdError> {
        self.db
            .connection()
            .call(|conn| read_chain_state(conn))
            .await
            .map_err(map_tr_err)
    }

    async fn append(&self, entry: &AuditEntry) -> Result<(), KeyholdError> {
        let entry = entry.clone();
        let appended = self
            .db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let state = read_chain_state(&tx)?;
                if state.head_hash != entry.chain_prev_hash
                    || state.head_sequence + 1 != entry.sequence
                {
                    return Ok(false);
                }
                tx.execute(
                    &format!(
                        "INSERT INTO audit_entries ({ENTRY_COLUMNS}) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
                    ),
                    params![
                        entry.id.0,
                        entry.sequence,
                        format_timestamp(&entry.timestamp),
                        entry.actor_id,
                        entry.session_id.as_ref().map(|s| s.0.clone()),
                        entry.event_type.to_string(),
                        entry.action,
                        entry.resource_type,
                        entry.resource_id,
                        entry.outcome.to_string(),
                        entry.security_level.to_string(),
                        entry.error_message,
                        entry.checksum,
                        entry.chain_prev_hash,
                        entry.chain_hash,
                    ],
                )?;
                tx.execute(
                    "UPDATE audit_chain SET head_hash = ?1, head_sequence = ?2 WHERE id = 1",
                    params![entry.chain_hash, entry.sequence],
                )?;
                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(map_tr_err)?;

        if appended {
            Ok(())
        } else {
            Err(KeyholdError::InvalidState(
                "audit chain head moved during append".into(),
            ))
        }
    }

    async fn entries(&self) -> Result<Vec<AuditEntry>, KeyholdError> {
        self.db
            .connection()
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM audit_entries ORDER BY sequence ASC"
                ))?;
                let rows = stmt.query_map([], entry_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, KeyholdError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut entries = self
            .db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM audit_entries ORDER BY sequence DESC LIMIT ?1"
                ))?;
                let rows = stmt.query_map(params![limit], entry_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await
            .map_err(map_tr_err)?;
        entries.reverse();
        Ok(entries)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeOutcome, KeyholdError> {
        let cutoff = format_timestamp(&cutoff);
        self.db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let state = read_chain_state(&tx)?;
                // End of the leading run of old entries; anything at or after the
                // first recent entry stays, whatever its timestamp.
                let last: Option<(i64, String)> = tx
                    .query_row(
                        "SELECT sequence, chain_hash FROM audit_entries \
                         WHERE timestamp < ?1 AND sequence < COALESCE( \
                             (SELECT MIN(sequence) FROM audit_entries WHERE timestamp >= ?1), \
                             9223372036854775807) \
                         ORDER BY sequence DESC LIMIT 1",
                        params![cutoff],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                let Some((anchor_sequence, anchor_hash)) = last else {
                    return Ok(PurgeOutcome {
                        purged: 0,
                        anchor_hash: state.anchor_hash,
                        anchor_sequence: state.anchor_sequence,
                    });
                };

                let purged = tx.execute(
                    "DELETE FROM audit_entries WHERE sequence <= ?1",
                    params![anchor_sequence],
                )?;
                tx.execute(
                    "UPDATE audit_chain SET anchor_hash = ?1, anchor_sequence = ?2 WHERE id = 1",
                    params![anchor_hash, anchor_sequence],
                )?;
                tx.commit()?;
                Ok(PurgeOutcome {
                    purged: purged as u64,
                    anchor_hash,
                    anchor_sequence,
                })
            })
            .await
            .map_err(map_tr_err)
    }
}
