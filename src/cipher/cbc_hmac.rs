//! The `AxxxCBC-HSyyy` composite: AES-CBC with PKCS#7 padding, authenticated
//! by HMAC-SHA-2 over `AAD || IV || CT || AL` (RFC 7518 §5.2).

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};

use crate::{cipher::check_key_len, digest::HashAlg, TokenError};

/// IV length for all CBC modes.
pub(crate) const IV_LEN: usize = 16;

fn split_key(hash: HashAlg, key: &[u8]) -> Result<(&[u8], &[u8]), TokenError> {
    // The composite key is MAC key || ENC key, each half the composite length.
    check_key_len(key, hash.output_len())?;
    Ok(key.split_at(key.len() / 2))
}

fn cbc_encrypt(enc_key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, TokenError> {
    macro_rules! run {
        ($aes:ty) => {
            cbc::Encryptor::<$aes>::new_from_slices(enc_key, iv)
                .map_err(|_| TokenError::KeySizeMismatch {
                    expected: IV_LEN,
                    actual: iv.len(),
                })?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
        };
    }

    Ok(match enc_key.len() {
        16 => run!(Aes128),
        24 => run!(Aes192),
        32 => run!(Aes256),
        actual => return Err(TokenError::KeySizeMismatch { expected: 16, actual }),
    })
}

fn cbc_decrypt(enc_key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, TokenError> {
    macro_rules! run {
        ($aes:ty) => {
            cbc::Decryptor::<$aes>::new_from_slices(enc_key, iv)
                .map_err(|_| TokenError::KeySizeMismatch {
                    expected: IV_LEN,
                    actual: iv.len(),
                })?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| TokenError::InvalidTag)?
        };
    }

    Ok(match enc_key.len() {
        16 => run!(Aes128),
        24 => run!(Aes192),
        32 => run!(Aes256),
        actual => return Err(TokenError::KeySizeMismatch { expected: 16, actual }),
    })
}

fn aad_bit_len(aad: &[u8]) -> [u8; 8] {
    ((aad.len() as u64) * 8).to_be_bytes()
}

/// Encrypts `plaintext`, returning the ciphertext and the truncated
/// authentication tag.
///
/// `plaintext` must be non-empty; the ciphertext length is
/// `(plaintext.len() + 16) & !15` due to PKCS#7 padding.
pub(crate) fn encrypt(
    hash: HashAlg,
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), TokenError> {
    // Empty plaintexts are rejected rather than padded to a full block.
    if plaintext.is_empty() {
        return Err(TokenError::MalformedToken);
    }
    let (mac_key, enc_key) = split_key(hash, key)?;
    let ciphertext = cbc_encrypt(enc_key, iv, plaintext)?;

    let mut mac = vec![0_u8; hash.output_len()];
    hash.hmac_into(
        mac_key,
        &[aad, iv, &ciphertext, &aad_bit_len(aad)],
        &mut mac,
    )?;
    mac.truncate(hash.output_len() / 2);
    Ok((ciphertext, mac))
}

/// Verifies `tag` and decrypts `ciphertext`. Any mutation of the ciphertext,
/// IV, AAD or tag fails with [`TokenError::InvalidTag`].
pub(crate) fn decrypt(
    hash: HashAlg,
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>, TokenError> {
    let (mac_key, enc_key) = split_key(hash, key)?;
    if tag.len() != hash.output_len() / 2
        || !hash.hmac_verify(mac_key, &[aad, iv, ciphertext, &aad_bit_len(aad)], tag)
    {
        return Err(TokenError::InvalidTag);
    }
    cbc_decrypt(enc_key, iv, ciphertext)
}
