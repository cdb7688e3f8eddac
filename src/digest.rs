//! SHA-2 and HMAC-SHA-2, the message-digest layer every other component
//! builds on.
//!
//! Hashing is delegated to the [`sha2`] crate, whose compression function is
//! runtime-dispatched to SHA-NI / AVX2 where the CPU supports it and falls
//! back to the scalar schedule otherwise; both paths produce identical
//! output. This module owns the block/output size table and the
//! caller-buffer contract used on the hot paths.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::TokenError;

/// SHA-2 family member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlg {
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlg {
    /// Digest size in bytes.
    pub fn output_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Internal block size in bytes.
    pub fn block_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha384 | Self::Sha512 => 128,
        }
    }

    /// Hashes the concatenation of `parts` into `dst`; returns the number of
    /// bytes written.
    pub fn digest_into(self, parts: &[&[u8]], dst: &mut [u8]) -> Result<usize, TokenError> {
        let needed = self.output_len();
        if dst.len() < needed {
            return Err(TokenError::DestinationTooSmall { needed });
        }

        fn run<D: Digest>(parts: &[&[u8]], dst: &mut [u8]) {
            let mut digest = D::new();
            for part in parts {
                digest.update(part);
            }
            dst.copy_from_slice(&digest.finalize());
        }

        match self {
            Self::Sha256 => run::<Sha256>(parts, &mut dst[..needed]),
            Self::Sha384 => run::<Sha384>(parts, &mut dst[..needed]),
            Self::Sha512 => run::<Sha512>(parts, &mut dst[..needed]),
        }
        Ok(needed)
    }

    /// Hashes the concatenation of `parts` into an owned vector.
    pub fn digest(self, parts: &[&[u8]]) -> Vec<u8> {
        let mut output = vec![0_u8; self.output_len()];
        self.digest_into(parts, &mut output)
            .expect("output sized to digest length");
        output
    }

    /// Computes HMAC over the concatenation of `parts` into `dst`; returns
    /// the number of bytes written.
    ///
    /// Keys longer than the block size are pre-hashed and shorter keys are
    /// zero-padded inside the `hmac` crate, per the HMAC construction.
    pub fn hmac_into(
        self,
        key: &[u8],
        parts: &[&[u8]],
        dst: &mut [u8],
    ) -> Result<usize, TokenError> {
        let needed = self.output_len();
        if dst.len() < needed {
            return Err(TokenError::DestinationTooSmall { needed });
        }

        macro_rules! run {
            ($digest:ty) => {{
                let mut mac = Hmac::<$digest>::new_from_slice(key)
                    .expect("HMAC accepts keys of any length");
                for part in parts {
                    mac.update(part);
                }
                dst[..needed].copy_from_slice(&mac.finalize().into_bytes());
            }};
        }

        match self {
            Self::Sha256 => run!(Sha256),
            Self::Sha384 => run!(Sha384),
            Self::Sha512 => run!(Sha512),
        }
        Ok(needed)
    }

    /// Verifies an HMAC `tag` over the concatenation of `parts`.
    ///
    /// `tag` may be a truncation keeping the leftmost bytes, as in the
    /// CBC-HMAC composite encryption algorithms. Comparison is constant-time
    /// with respect to the tag contents.
    pub fn hmac_verify(self, key: &[u8], parts: &[&[u8]], tag: &[u8]) -> bool {
        if tag.is_empty() || tag.len() > self.output_len() {
            return false;
        }

        macro_rules! run {
            ($digest:ty) => {{
                let mut mac = Hmac::<$digest>::new_from_slice(key)
                    .expect("HMAC accepts keys of any length");
                for part in parts {
                    mac.update(part);
                }
                mac.verify_truncated_left(tag).is_ok()
            }};
        }

        match self {
            Self::Sha256 => run!(Sha256),
            Self::Sha384 => run!(Sha384),
            Self::Sha512 => run!(Sha512),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha384_nist_reference() {
        // FIPS 180-4 "abc" test vector.
        let digest = HashAlg::Sha384.digest(&[b"abc"]);
        assert_eq!(
            hex::encode_upper(digest),
            "CB00753F45A35E8BB5A03D699AC65007272C32AB0EDED1631A8B605A43FF5BED\
             8086072BA1E7CC2358BAECA134C825A7"
        );
    }

    #[test]
    fn sha256_and_sha512_nist_references() {
        let digest = HashAlg::Sha256.digest(&[b"abc"]);
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        let digest = HashAlg::Sha512.digest(&[b"ab", b"c"]);
        assert_eq!(
            hex::encode(digest),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
    }

    #[test]
    fn split_input_matches_contiguous_input() {
        let message = b"The quick brown fox jumps over the lazy dog";
        for alg in [HashAlg::Sha256, HashAlg::Sha384, HashAlg::Sha512] {
            let contiguous = alg.digest(&[message]);
            let split = alg.digest(&[&message[..7], &message[7..30], &message[30..]]);
            assert_eq!(contiguous, split);
        }
    }

    #[test]
    fn hmac_rfc4231_case_2() {
        let key = b"Jefe";
        let data = b"what do ya want for nothing?";
        let mut tag = [0_u8; 32];
        HashAlg::Sha256.hmac_into(key, &[data], &mut tag).unwrap();
        assert_eq!(
            hex::encode(tag),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        assert!(HashAlg::Sha256.hmac_verify(key, &[data], &tag));
        assert!(HashAlg::Sha256.hmac_verify(key, &[data], &tag[..16]));

        let mut mangled = tag;
        mangled[0] ^= 1;
        assert!(!HashAlg::Sha256.hmac_verify(key, &[data], &mangled));
        assert!(!HashAlg::Sha256.hmac_verify(key, &[data], &[]));
    }

    #[test]
    fn destination_too_small() {
        let mut dst = [0_u8; 16];
        assert!(HashAlg::Sha256.digest_into(&[b"abc"], &mut dst).is_err());
        assert!(HashAlg::Sha256.hmac_into(b"k", &[b"abc"], &mut dst).is_err());
    }
}
