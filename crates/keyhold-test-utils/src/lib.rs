// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Keyhold integration tests.
//!
//! Provides in-memory collaborators and a harness for fast, deterministic
//! tests without platform hardware or database files.
//!
//! # Components
//!
//! - [`MockHardwareKeyStore`] - Hardware key store with single-use capabilities
//! - [`MemoryEncryptedStore`] - Encrypted store with injectable re-key faults
//! - [`MemoryKeyBlobStore`] - Key record store with injectable write failures
//! - [`TestVault`] - The full key hierarchy wired over the mocks

pub mod harness;
pub mod mock_blobs;
pub mod mock_engine;
pub mod mock_hardware;

pub use harness::{TestVault, TestVaultBuilder, FAST_KDF, TEST_PASSWORD};
pub use mock_blobs::MemoryKeyBlobStore;
pub use mock_engine::{EngineFault, MemoryEncryptedStore, LATE_REKEY_DELAY};
pub use mock_hardware::MockHardwareKeyStore;
