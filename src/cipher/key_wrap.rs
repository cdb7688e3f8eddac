//! AES key wrap per RFC 3394, used by the `AxxxKW` and `ECDH-ES+AxxxKW`
//! key-management algorithms.

use aes::cipher::{Block, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use zeroize::Zeroizing;

use crate::TokenError;

/// Fixed initial value from RFC 3394 §2.2.3.1.
const DEFAULT_IV: [u8; 8] = [0xA6; 8];

fn check_content_len(len: usize) -> Result<usize, TokenError> {
    // Wrapped content is n >= 2 64-bit blocks (a 128-bit key at minimum).
    if len >= 16 && len % 8 == 0 {
        Ok(len / 8)
    } else {
        Err(TokenError::KeySizeMismatch {
            expected: 16,
            actual: len,
        })
    }
}

fn wrap_with<C: BlockEncrypt>(cipher: &C, content: &[u8], n: usize) -> Vec<u8> {
    let mut a = DEFAULT_IV;
    let mut r: Vec<[u8; 8]> = content
        .chunks_exact(8)
        .map(|chunk| chunk.try_into().expect("8-byte chunk"))
        .collect();
    let mut block = Block::<C>::default();

    for j in 0..6 {
        for (i, r_i) in r.iter_mut().enumerate() {
            block[..8].copy_from_slice(&a);
            block[8..].copy_from_slice(r_i);
            cipher.encrypt_block(&mut block);

            let t = (n * j + i + 1) as u64;
            a.copy_from_slice(&block[..8]);
            for (byte, t_byte) in a.iter_mut().zip(t.to_be_bytes()) {
                *byte ^= t_byte;
            }
            r_i.copy_from_slice(&block[8..]);
        }
    }

    let mut wrapped = Vec::with_capacity(8 * (n + 1));
    wrapped.extend_from_slice(&a);
    for r_i in &r {
        wrapped.extend_from_slice(r_i);
    }
    wrapped
}

fn unwrap_with<C: BlockDecrypt>(
    cipher: &C,
    wrapped: &[u8],
    n: usize,
) -> Result<Zeroizing<Vec<u8>>, TokenError> {
    let mut a: [u8; 8] = wrapped[..8].try_into().expect("8-byte IV block");
    let mut r: Vec<[u8; 8]> = wrapped[8..]
        .chunks_exact(8)
        .map(|chunk| chunk.try_into().expect("8-byte chunk"))
        .collect();
    let mut block = Block::<C>::default();

    for j in (0..6).rev() {
        for i in (0..n).rev() {
            let t = (n * j + i + 1) as u64;
            for (byte, t_byte) in a.iter_mut().zip(t.to_be_bytes()) {
                *byte ^= t_byte;
            }
            block[..8].copy_from_slice(&a);
            block[8..].copy_from_slice(&r[i]);
            cipher.decrypt_block(&mut block);

            a.copy_from_slice(&block[..8]);
            r[i].copy_from_slice(&block[8..]);
        }
    }

    if a != DEFAULT_IV {
        return Err(TokenError::InvalidKeyWrap);
    }
    let mut content = Zeroizing::new(Vec::with_capacity(8 * n));
    for r_i in &r {
        content.extend_from_slice(r_i);
    }
    Ok(content)
}

/// Wraps `content` (an n-block key, n >= 2) under `kek`.
pub(crate) fn wrap(kek: &[u8], content: &[u8]) -> Result<Vec<u8>, TokenError> {
    let n = check_content_len(content.len())?;

    macro_rules! run {
        ($aes:ty) => {
            wrap_with(
                &<$aes>::new_from_slice(kek).expect("key length checked by the caller match"),
                content,
                n,
            )
        };
    }

    Ok(match kek.len() {
        16 => run!(Aes128),
        24 => run!(Aes192),
        32 => run!(Aes256),
        actual => return Err(TokenError::KeySizeMismatch { expected: 16, actual }),
    })
}

/// Unwraps `wrapped` under `kek`, failing with
/// [`TokenError::InvalidKeyWrap`] if the recovered integrity value does not
/// match the fixed IV.
pub(crate) fn unwrap(kek: &[u8], wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, TokenError> {
    let n = check_content_len(wrapped.len().saturating_sub(8))?;

    macro_rules! run {
        ($aes:ty) => {
            unwrap_with(
                &<$aes>::new_from_slice(kek).expect("key length checked by the caller match"),
                wrapped,
                n,
            )
        };
    }

    match kek.len() {
        16 => run!(Aes128),
        24 => run!(Aes192),
        32 => run!(Aes256),
        actual => Err(TokenError::KeySizeMismatch { expected: 16, actual }),
    }
}
