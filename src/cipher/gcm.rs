//! AES-GCM content encryption with a 96-bit IV and 128-bit tag
//! (RFC 7518 §5.3), plus the `AxxxGCMKW` key-wrapping reuse of the same
//! primitive.

use aes::cipher::consts::U12;
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{AesGcm, KeyInit, Nonce};

use crate::{cipher::check_key_len, TokenError};

/// IV length for all GCM modes.
pub(crate) const IV_LEN: usize = 12;
/// Authentication tag length.
pub(crate) const TAG_LEN: usize = 16;

type Aes128Gcm = AesGcm<aes::Aes128, U12>;
type Aes192Gcm = AesGcm<aes::Aes192, U12>;
type Aes256Gcm = AesGcm<aes::Aes256, U12>;

/// Encrypts `plaintext`, returning the ciphertext and the 16-byte tag.
pub(crate) fn encrypt(
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), TokenError> {
    check_key_len(iv, IV_LEN)?;
    let payload = Payload {
        msg: plaintext,
        aad,
    };

    macro_rules! run {
        ($aes:ty) => {
            <$aes>::new_from_slice(key)
                .expect("key length checked by the caller match")
                .encrypt(Nonce::from_slice(iv), payload)
                .map_err(|_| TokenError::InvalidTag)?
        };
    }

    let mut sealed = match key.len() {
        16 => run!(Aes128Gcm),
        24 => run!(Aes192Gcm),
        32 => run!(Aes256Gcm),
        actual => return Err(TokenError::KeySizeMismatch { expected: 16, actual }),
    };
    // The AEAD interface appends the tag to the ciphertext; JWE transports
    // the two separately.
    let tag = sealed.split_off(sealed.len() - TAG_LEN);
    Ok((sealed, tag))
}

/// Verifies `tag` and decrypts `ciphertext`; any mutation of ciphertext, IV,
/// AAD or tag fails with [`TokenError::InvalidTag`].
pub(crate) fn decrypt(
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>, TokenError> {
    check_key_len(iv, IV_LEN)?;
    if tag.len() != TAG_LEN {
        return Err(TokenError::InvalidTag);
    }
    let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);
    let payload = Payload {
        msg: &sealed,
        aad,
    };

    macro_rules! run {
        ($aes:ty) => {
            <$aes>::new_from_slice(key)
                .expect("key length checked by the caller match")
                .decrypt(Nonce::from_slice(iv), payload)
                .map_err(|_| TokenError::InvalidTag)?
        };
    }

    Ok(match key.len() {
        16 => run!(Aes128Gcm),
        24 => run!(Aes192Gcm),
        32 => run!(Aes256Gcm),
        actual => return Err(TokenError::KeySizeMismatch { expected: 16, actual }),
    })
}
