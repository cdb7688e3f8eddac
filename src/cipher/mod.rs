//! Symmetric bulk encryption and key-wrap primitives used by JWE.
//!
//! The AES block function comes from the [`aes`] / [`aes-gcm`] crates, whose
//! AES-NI / PCLMUL fast paths are cpufeatures-dispatched with a bit-identical
//! software fallback. This module owns the JWE-specific compositions on top:
//! the CBC-then-HMAC authenticated mode, the GCM invocation with a split
//! tag, and RFC 3394 key wrapping.

pub(crate) mod cbc_hmac;
pub(crate) mod gcm;
pub(crate) mod key_wrap;

use crate::TokenError;

/// Checks a key slice against the exact length an algorithm requires.
pub(crate) fn check_key_len(key: &[u8], expected: usize) -> Result<(), TokenError> {
    if key.len() == expected {
        Ok(())
    } else {
        Err(TokenError::KeySizeMismatch {
            expected,
            actual: key.len(),
        })
    }
}
