// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Biometric / password prompt shown to the user on unlock.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::KeyholdError;
use crate::traits::hardware::AuthCapability;

/// What the prompt produced.
#[derive(Debug)]
pub enum PromptOutcome {
    /// Biometric success bound to the hardware key.
    Capability(AuthCapability),
    /// User fell back to typing a password.
    Password(SecretString),
    /// User dismissed the prompt.
    Cancelled,
}

/// Source of unlock credentials.
#[async_trait]
pub trait UnlockPrompt: Send + Sync {
    /// Ask the user to authenticate. `reason` is shown in the prompt.
    async fn authenticate(&self, reason: &str) -> Result<PromptOutcome, KeyholdError>;
}
