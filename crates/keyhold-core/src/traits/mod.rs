// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Traits for the collaborators the key hierarchy consumes.
//!
//! Implementations live elsewhere: platform bindings for the hardware key
//! store and prompt, `keyhold-storage` for the SQLite-backed stores, and
//! `keyhold-test-utils` for in-memory doubles. All traits use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod audit;
pub mod blobs;
pub mod engine;
pub mod hardware;
pub mod prompt;

pub use audit::AuditStore;
pub use blobs::KeyBlobStore;
pub use engine::EncryptedStore;
pub use hardware::{AuthCapability, HardwareCiphertext, HardwareKeyError, HardwareKeyStore, KeyPolicy};
pub use prompt::{PromptOutcome, UnlockPrompt};
