// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secure memory primitives: wiping, constant-time comparison, CSPRNG bytes.

use std::fmt;

use keyhold_core::KeyholdError;
use ring::rand::{SecureRandom, SystemRandom};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

/// Length of every symmetric key in the hierarchy.
pub const KEY_LEN: usize = 32;

/// Overwrite `buffer` with random bytes, then with zeros.
///
/// Best effort: if the system RNG fails the buffer is still zeroed.
pub fn wipe(buffer: &mut [u8]) {
    let _ = SystemRandom::new().fill(buffer);
    buffer.zeroize();
}

/// Compare two byte strings without an early exit on content.
///
/// Returns `false` immediately on a length mismatch; lengths are not secret.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// `n` bytes from the system CSPRNG.
pub fn random_bytes(n: usize) -> Result<Zeroizing<Vec<u8>>, KeyholdError> {
    let mut out = Zeroizing::new(vec![0u8; n]);
    SystemRandom::new()
        .fill(out.as_mut_slice())
        .map_err(|_| KeyholdError::Internal("system random number generator failed".into()))?;
    Ok(out)
}

/// A fixed-size array from the system CSPRNG.
pub fn random_array<const N: usize>() -> Result<[u8; N], KeyholdError> {
    let mut out = [0u8; N];
    SystemRandom::new()
        .fill(&mut out)
        .map_err(|_| KeyholdError::Internal("system random number generator failed".into()))?;
    Ok(out)
}

/// A 32-byte secret key that is wiped when dropped.
///
/// Not `Clone`: copies have to be made explicitly with [`SecretKey::duplicate`].
pub struct SecretKey {
    bytes: Box<[u8; KEY_LEN]>,
}

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        let mut bytes = bytes;
        let key = Self {
            bytes: Box::new(bytes),
        };
        bytes.zeroize();
        key
    }

    /// Take a slice of exactly [`KEY_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; KEY_LEN] = bytes.try_into().ok()?;
        Some(Self::from_bytes(array))
    }

    /// A fresh random key.
    pub fn generate() -> Result<Self, KeyholdError> {
        Ok(Self::from_bytes(random_array::<KEY_LEN>()?))
    }

    pub fn expose(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Explicit copy, for the few places (rotation backup) that need two owners.
    pub fn duplicate(&self) -> Self {
        Self::from_bytes(*self.bytes)
    }

    /// Constant-time equality.
    pub fn ct_eq(&self, other: &SecretKey) -> bool {
        constant_time_eq(self.expose(), other.expose())
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        #[cfg(test)]
        let before = *self.bytes;
        wipe(self.bytes.as_mut_slice());
        #[cfg(test)]
        wipe_log::record(before, *self.bytes);
    }
}


impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wipe_leaves_only_zeros() {
        let mut buf = vec![0xAAu8; 64];
        wipe(&mut buf);
        assert!(buf.iter().all(|b| *b == 0));
    }

    #[test]
    fn constant_time_eq_semantics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn random_bytes_has_requested_length_and_varies() {
        let a = random_bytes(32).unwrap();
        let b = random_bytes(32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(*a, *b);
        assert!(random_bytes(0).unwrap().is_empty());
    }

    #[test]
    fn secret_key_debug_is_redacted() {
        let key = SecretKey::generate().unwrap();
        assert_eq!(format!("{key:?}"), "SecretKey([REDACTED])");
    }

    #[test]
    fn dropped_secret_key_is_zeroed() {
        let key = SecretKey::from_bytes([0x5Au8; KEY_LEN]);
        let copy = key.duplicate();
        drop(key);
        assert_eq!(wipe_log::after_wipe_of([0x5A; KEY_LEN]), Some([0u8; KEY_LEN]));
        // A duplicate is an independent buffer.
        assert_eq!(copy.expose(), &[0x5A; KEY_LEN]);
    }

    #[test]
    fn secret_key_from_slice_checks_length() {
        assert!(SecretKey::from_slice(&[1u8; 31]).is_none());
        let key = SecretKey::from_slice(&[1u8; 32]).unwrap();
        assert!(key.ct_eq(&key.duplicate()));
    }
}
