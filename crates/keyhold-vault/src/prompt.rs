// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Password fallback prompt via TTY or the KEYHOLD_PASSWORD environment variable.

use async_trait::async_trait;
use keyhold_core::{KeyholdError, PromptOutcome, UnlockPrompt};
use secrecy::SecretString;

/// The environment variable name for providing the vault password.
pub const PASSWORD_ENV_VAR: &str = "KEYHOLD_PASSWORD";

const NO_PASSWORD_SOURCE: &str =
    "No password provided. Set KEYHOLD_PASSWORD environment variable or run interactively.";

fn env_password() -> Option<SecretString> {
    match std::env::var(PASSWORD_ENV_VAR) {
        Ok(password) if !password.is_empty() => Some(SecretString::from(password)),
        _ => None,
    }
}

fn read_tty(label: &str) -> Result<String, KeyholdError> {
    eprint!("{label}: ");
    rpassword::read_password()
        .map_err(|e| KeyholdError::Internal(format!("failed to read password: {e}")))
}

/// Read the vault password.
///
/// Priority:
/// 1. `KEYHOLD_PASSWORD` environment variable (headless use)
/// 2. Interactive TTY prompt via `rpassword`
pub fn read_password(label: &str) -> Result<SecretString, KeyholdError> {
    if let Some(password) = env_password() {
        return Ok(password);
    }

    if std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        let password = read_tty(label)?;
        if password.is_empty() {
            return Err(KeyholdError::InvalidState("empty password not allowed".into()));
        }
        return Ok(SecretString::from(password));
    }

    Err(KeyholdError::InvalidState(NO_PASSWORD_SOURCE.into()))
}

/// Read a new password twice and require both entries to match.
///
/// The environment variable needs no confirmation.
pub fn read_password_with_confirm() -> Result<SecretString, KeyholdError> {
    if let Some(password) = env_password() {
        return Ok(password);
    }

    if std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        let first = zeroize::Zeroizing::new(read_tty("New vault password")?);
        let second = zeroize::Zeroizing::new(read_tty("Confirm vault password")?);
        if !crate::memory::constant_time_eq(first.as_bytes(), second.as_bytes()) {
            return Err(KeyholdError::InvalidState("passwords do not match".into()));
        }
        if first.is_empty() {
            return Err(KeyholdError::InvalidState("empty password not allowed".into()));
        }
        return Ok(SecretString::from(first.to_string()));
    }

    Err(KeyholdError::InvalidState(NO_PASSWORD_SOURCE.into()))
}

/// [`UnlockPrompt`] for terminals: always takes the password path.
///
/// Terminals have no biometric sensor, so this prompt never yields a capability.
#[derive(Debug, Clone, Default)]
pub struct TerminalPrompt;

#[async_trait]
impl UnlockPrompt for TerminalPrompt {
    async fn authenticate(&self, reason: &str) -> Result<PromptOutcome, KeyholdError> {
        let label = reason.to_string();
        let password = tokio::task::spawn_blocking(move || read_password(&label))
            .await
            .map_err(|e| KeyholdError::Internal(format!("prompt task failed: {e}")))??;
        Ok(PromptOutcome::Password(password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    #[test]
    #[serial]
    fn password_from_env_var() {
        // SAFETY: test-only env mutation, serialized with #[serial].
        unsafe { std::env::set_var(PASSWORD_ENV_VAR, "correct-password") };
        let result = read_password("Vault password");
        unsafe { std::env::remove_var(PASSWORD_ENV_VAR) };

        assert_eq!(result.unwrap().expose_secret(), "correct-password");
    }

    #[test]
    #[serial]
    fn confirm_skipped_for_env_var() {
        unsafe { std::env::set_var(PASSWORD_ENV_VAR, "correct-password") };
        let result = read_password_with_confirm();
        unsafe { std::env::remove_var(PASSWORD_ENV_VAR) };

        assert!(result.is_ok());
    }

    #[test]
    #[serial]
    fn empty_env_var_is_rejected() {
        unsafe { std::env::set_var(PASSWORD_ENV_VAR, "") };
        // stdin is not a terminal under the test harness.
        let result = read_password("Vault password");
        unsafe { std::env::remove_var(PASSWORD_ENV_VAR) };

        assert!(result.is_err());
    }

    #[tokio::test]
    #[serial]
    async fn terminal_prompt_yields_password() {
        unsafe { std::env::set_var(PASSWORD_ENV_VAR, "correct-password") };
        let outcome = TerminalPrompt.authenticate("Unlock your vault").await;
        unsafe { std::env::remove_var(PASSWORD_ENV_VAR) };

        match outcome.unwrap() {
            PromptOutcome::Password(p) => assert_eq!(p.expose_secret(), "correct-password"),
            other => panic!("expected password, got {other:?}"),
        }
    }
}
