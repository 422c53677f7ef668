// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `keyhold audit` subcommands.

use std::io::IsTerminal;
use std::sync::Arc;

use chrono::{Duration, SecondsFormat, Utc};
use keyhold_audit::{AuditChain, ChainVerification};
use keyhold_core::{AuditEntry, AuditOutcome, KeyholdError};
use keyhold_storage::{MetaDatabase, SqliteAuditStore};

pub(crate) fn open_chain(db: &MetaDatabase) -> AuditChain {
    AuditChain::new(Arc::new(SqliteAuditStore::new(db.clone())))
}

/// Verify the chain and print the report. Returns whether the chain is intact.
pub(crate) async fn run_verify(chain: &AuditChain, json: bool) -> Result<bool, KeyholdError> {
    let report = match chain.require_integrity().await {
        Ok(report) => report,
        // Logged by require_integrity; re-run to get the full report for output.
        Err(KeyholdError::ChainIntegrityViolation { .. }) => chain.verify_integrity().await?,
        Err(e) => return Err(e),
    };
    if json {
        println!("{}", to_json(&report)?);
    } else {
        print!("{}", render_verification(&report, std::io::stdout().is_terminal()));
    }
    Ok(report.valid)
}

pub(crate) async fn run_tail(
    chain: &AuditChain,
    limit: usize,
    json: bool,
) -> Result<(), KeyholdError> {
    let entries = chain.tail(limit).await?;
    if json {
        println!("{}", to_json(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("audit chain is empty");
    }
    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    Ok(())
}

pub(crate) async fn run_purge(chain: &AuditChain, days: u32) -> Result<(), KeyholdError> {
    let cutoff = Utc::now() - Duration::days(i64::from(days));
    let outcome = chain.purge_older_than(cutoff, Some("cli".to_string())).await?;
    println!(
        "purged {} entries older than {} (anchor sequence {})",
        outcome.purged,
        cutoff.to_rfc3339_opts(SecondsFormat::Secs, true),
        outcome.anchor_sequence
    );
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, KeyholdError> {
    serde_json::to_string_pretty(value).map_err(|e| KeyholdError::Internal(e.to_string()))
}

fn render_verification(report: &ChainVerification, use_color: bool) -> String {
    let mut out = String::new();
    let verdict = if report.valid { "intact" } else { "BROKEN" };
    let verdict = if use_color {
        use colored::Colorize;
        if report.valid {
            verdict.green().to_string()
        } else {
            verdict.red().bold().to_string()
        }
    } else {
        verdict.to_string()
    };
    out.push_str(&format!(
        "audit chain {verdict}: {} entries checked\n",
        report.entries_checked
    ));
    if let Some(broken) = &report.first_broken {
        out.push_str(&format!(
            "  first broken: #{} {} ({})\n",
            broken.sequence, broken.entry_id, broken.reason
        ));
    }
    if report.issues.len() > 1 {
        out.push_str(&format!("  {} issues in total\n", report.issues.len()));
    }
    out
}

fn format_entry(entry: &AuditEntry) -> String {
    let outcome = match entry.outcome {
        AuditOutcome::Success => "ok",
        AuditOutcome::Failure => "FAIL",
        AuditOutcome::Denied => "DENY",
    };
    let mut line = format!(
        "#{:<5} {} {:<8} {:<4} {} {}",
        entry.sequence,
        entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        entry.security_level.to_string(),
        outcome,
        entry.event_type,
        entry.action
    );
    if let Some(actor) = &entry.actor_id {
        line.push_str(&format!(" actor={actor}"));
    }
    if let Some(message) = &entry.error_message {
        line.push_str(&format!(" error={message:?}"));
    }
    line
}
