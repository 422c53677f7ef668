// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256-GCM key wrapping.
//!
//! Every call to [`wrap_key`] draws a fresh random 96-bit IV from the system
//! CSPRNG. IV reuse under one key would be catastrophic for GCM.

use keyhold_core::KeyholdError;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use zeroize::Zeroizing;

use crate::memory::{random_array, SecretKey};
use crate::records::{WrappedKey, RECORD_VERSION};

fn aead_key(key: &SecretKey) -> Result<LessSafeKey, KeyholdError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key.expose())
        .map_err(|_| KeyholdError::Internal("failed to create AES-256-GCM key".into()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt `plaintext` under `wrapping_key`.
pub fn wrap_key(wrapping_key: &SecretKey, plaintext: &[u8]) -> Result<WrappedKey, KeyholdError> {
    let key = aead_key(wrapping_key)?;
    let iv = random_array::<NONCE_LEN>()?;

    let mut in_out = sealing_buffer(plaintext);
    key.seal_in_place_append_tag(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut *in_out)
        .map_err(|_| KeyholdError::Internal("AES-256-GCM encryption failed".into()))?;

    Ok(WrappedKey {
        version: RECORD_VERSION,
        iv: iv.to_vec(),
        ciphertext: std::mem::take(&mut *in_out),
    })
}

/// Copy of `plaintext` with room for the tag, so sealing never reallocates
/// and leaves an unwiped plaintext copy behind.
fn sealing_buffer(plaintext: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut buf = Zeroizing::new(Vec::with_capacity(plaintext.len() + AES_256_GCM.tag_len()));
    buf.extend_from_slice(plaintext);
    buf
}

/// Decrypt `wrapped` under `wrapping_key`.
///
/// Any failure (unknown version, malformed IV, tag mismatch) is
/// [`KeyholdError::UnwrapFailed`] and no plaintext is released: the
/// decryption buffer is wiped before returning.
pub fn unwrap_key(
    wrapping_key: &SecretKey,
    wrapped: &WrappedKey,
) -> Result<Zeroizing<Vec<u8>>, KeyholdError> {
    if wrapped.version != RECORD_VERSION {
        return Err(KeyholdError::UnwrapFailed);
    }
    let iv: [u8; NONCE_LEN] = wrapped
        .iv
        .as_slice()
        .try_into()
        .map_err(|_| KeyholdError::UnwrapFailed)?;
    let key = aead_key(wrapping_key)?;

    let mut in_out = Zeroizing::new(wrapped.ciphertext.clone());
    let plaintext_len = key
        .open_in_place(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut in_out)
        .map_err(|_| KeyholdError::UnwrapFailed)?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}
