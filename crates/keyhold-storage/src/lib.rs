// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for Keyhold.
//!
//! Two databases live side by side in the data directory:
//!
//! - the metadata database (plain SQLite, WAL mode) holding encrypted key
//!   records and the hash-linked audit chain, accessed through a single
//!   `tokio-rusqlite` writer;
//! - the vault database, encrypted with SQLCipher under the storage
//!   passphrase, reached only through [`SqlCipherStore`].

pub mod audit;
pub mod blobs;
pub mod database;
pub mod migrations;
pub mod sqlcipher;

pub use audit::SqliteAuditStore;
pub use blobs::SqliteKeyBlobStore;
pub use database::MetaDatabase;
pub use sqlcipher::SqlCipherStore;
