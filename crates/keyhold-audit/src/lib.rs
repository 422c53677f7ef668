// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tamper-evident hash-chain audit trail for Keyhold.
//!
//! Every entry carries a SHA-256 checksum of its own fields and a chain hash
//! binding it to its predecessor:
//!
//! ```text
//! checksum   = SHA-256(canonical(entry))
//! chain_hash = SHA-256(chain_prev_hash ‖ canonical(entry) ‖ checksum)
//! ```
//!
//! The first entry links to [`keyhold_core::GENESIS_HASH`]; after a
//! retention purge, verification starts from the stored anchor instead.

pub mod chain;
pub mod event;
pub mod hash;
pub mod memory;
pub mod verify;

pub use chain::AuditChain;
pub use event::AuditEvent;
pub use memory::MemoryAuditStore;
pub use verify::{verify_entries, BrokenEntry, ChainIssue, ChainVerification};
