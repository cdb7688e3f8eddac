//! Registries of JWA algorithm identifiers (RFC 7518).
//!
//! Each registry is a closed `Copy` enum; the discriminant doubles as the
//! algorithm id, so equality and hashing are by id. Identifier parsing is
//! O(1): a length-indexed match compares little-endian integer loads of the
//! name bytes against precomputed constants, with a fallback that recognizes
//! the JSON-escaped `ECDH-ES+AxxxKW` spelling in either hex-digit case.

use core::fmt;
use core::str::FromStr;

use crate::{digest::HashAlg, jwk::EllipticCurve, TokenError};

/// Packs up to 8 name bytes into a little-endian integer, mirroring the
/// loads performed by the parser.
const fn pack(bytes: &[u8]) -> u64 {
    let mut value = 0_u64;
    let mut i = 0;
    while i < bytes.len() {
        value |= (bytes[i] as u64) << (8 * i);
        i += 1;
    }
    value
}

#[inline]
fn le16(bytes: &[u8], at: usize) -> u64 {
    u64::from(u16::from_le_bytes([bytes[at], bytes[at + 1]]))
}

#[inline]
fn le32(bytes: &[u8], at: usize) -> u64 {
    u64::from(u32::from_le_bytes([
        bytes[at],
        bytes[at + 1],
        bytes[at + 2],
        bytes[at + 3],
    ]))
}

#[inline]
fn le64(bytes: &[u8], at: usize) -> u64 {
    let chunk: [u8; 8] = bytes[at..at + 8].try_into().expect("8-byte load");
    u64::from_le_bytes(chunk)
}

/// JWS signature algorithm (RFC 7518 §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SignatureAlgorithm {
    /// Unsecured JWS; an empty signature.
    None = 0,
    /// HMAC with SHA-256.
    Hs256 = 1,
    /// HMAC with SHA-384.
    Hs384 = 2,
    /// HMAC with SHA-512.
    Hs512 = 3,
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    Rs256 = 4,
    /// RSASSA-PKCS1-v1_5 with SHA-384.
    Rs384 = 5,
    /// RSASSA-PKCS1-v1_5 with SHA-512.
    Rs512 = 6,
    /// RSASSA-PSS with SHA-256.
    Ps256 = 7,
    /// RSASSA-PSS with SHA-384.
    Ps384 = 8,
    /// RSASSA-PSS with SHA-512.
    Ps512 = 9,
    /// ECDSA on P-256 with SHA-256.
    Es256 = 10,
    /// ECDSA on P-384 with SHA-384.
    Es384 = 11,
    /// ECDSA on P-521 with SHA-512.
    Es512 = 12,
}

impl SignatureAlgorithm {
    /// All registered signature algorithms.
    pub const ALL: [Self; 13] = [
        Self::None,
        Self::Hs256,
        Self::Hs384,
        Self::Hs512,
        Self::Rs256,
        Self::Rs384,
        Self::Rs512,
        Self::Ps256,
        Self::Ps384,
        Self::Ps512,
        Self::Es256,
        Self::Es384,
        Self::Es512,
    ];

    /// Numeric algorithm id.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Canonical `alg` name.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Hs256 => "HS256",
            Self::Hs384 => "HS384",
            Self::Hs512 => "HS512",
            Self::Rs256 => "RS256",
            Self::Rs384 => "RS384",
            Self::Rs512 => "RS512",
            Self::Ps256 => "PS256",
            Self::Ps384 => "PS384",
            Self::Ps512 => "PS512",
            Self::Es256 => "ES256",
            Self::Es384 => "ES384",
            Self::Es512 => "ES512",
        }
    }

    /// Digest backing the algorithm; `None` for the unsecured variant.
    pub fn hash(self) -> Option<HashAlg> {
        match self {
            Self::None => None,
            Self::Hs256 | Self::Rs256 | Self::Ps256 | Self::Es256 => Some(HashAlg::Sha256),
            Self::Hs384 | Self::Rs384 | Self::Ps384 | Self::Es384 => Some(HashAlg::Sha384),
            Self::Hs512 | Self::Rs512 | Self::Ps512 | Self::Es512 => Some(HashAlg::Sha512),
        }
    }

    /// Minimum key size in bits (RFC 7518 §3.2–3.5).
    pub fn min_key_bits(self) -> usize {
        match self {
            Self::None => 0,
            Self::Hs256 => 256,
            Self::Hs384 => 384,
            Self::Hs512 => 512,
            Self::Rs256 | Self::Rs384 | Self::Rs512 | Self::Ps256 | Self::Ps384 | Self::Ps512 => {
                2_048
            }
            Self::Es256 => 256,
            Self::Es384 => 384,
            Self::Es512 => 521,
        }
    }

    /// Is this one of the `HS*` algorithms?
    pub fn is_hmac(self) -> bool {
        matches!(self, Self::Hs256 | Self::Hs384 | Self::Hs512)
    }

    /// Is this one of the `RS*` / `PS*` algorithms?
    pub fn is_rsa(self) -> bool {
        matches!(
            self,
            Self::Rs256 | Self::Rs384 | Self::Rs512 | Self::Ps256 | Self::Ps384 | Self::Ps512
        )
    }

    /// Is this one of the `ES*` algorithms?
    pub fn is_ecdsa(self) -> bool {
        matches!(self, Self::Es256 | Self::Es384 | Self::Es512)
    }

    /// Curve required by an `ES*` algorithm.
    pub fn curve(self) -> Option<EllipticCurve> {
        match self {
            Self::Es256 => Some(EllipticCurve::P256),
            Self::Es384 => Some(EllipticCurve::P384),
            Self::Es512 => Some(EllipticCurve::P521),
            _ => None,
        }
    }

    /// Parses a canonical `alg` name in O(1).
    pub fn try_parse(name: &[u8]) -> Option<Self> {
        match name.len() {
            4 => (le32(name, 0) == pack(b"none")).then_some(Self::None),
            5 => {
                let value = le32(name, 0) | (u64::from(name[4]) << 32);
                Some(match value {
                    v if v == pack(b"HS256") => Self::Hs256,
                    v if v == pack(b"HS384") => Self::Hs384,
                    v if v == pack(b"HS512") => Self::Hs512,
                    v if v == pack(b"RS256") => Self::Rs256,
                    v if v == pack(b"RS384") => Self::Rs384,
                    v if v == pack(b"RS512") => Self::Rs512,
                    v if v == pack(b"PS256") => Self::Ps256,
                    v if v == pack(b"PS384") => Self::Ps384,
                    v if v == pack(b"PS512") => Self::Ps512,
                    v if v == pack(b"ES256") => Self::Es256,
                    v if v == pack(b"ES384") => Self::Es384,
                    v if v == pack(b"ES512") => Self::Es512,
                    _ => return None,
                })
            }
            _ => None,
        }
    }

    /// Linear-scan parser over the registry; agrees with [`Self::try_parse`]
    /// on every input.
    pub(crate) fn try_parse_linear(name: &[u8]) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|alg| alg.name().as_bytes() == name)
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_parse(s.as_bytes()).ok_or_else(|| TokenError::UnknownAlgorithm(s.to_owned()))
    }
}

/// JWE key-management algorithm (RFC 7518 §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeyManagementAlgorithm {
    /// Direct use of a shared symmetric key as the CEK.
    Dir = 0,
    /// AES-128 key wrap.
    A128Kw = 1,
    /// AES-192 key wrap.
    A192Kw = 2,
    /// AES-256 key wrap.
    A256Kw = 3,
    /// AES-128 GCM key wrap.
    A128GcmKw = 4,
    /// AES-192 GCM key wrap.
    A192GcmKw = 5,
    /// AES-256 GCM key wrap.
    A256GcmKw = 6,
    /// RSAES-PKCS1-v1_5. Deprecated; accepted on the read side only.
    Rsa1_5 = 7,
    /// RSAES-OAEP with the default (SHA-1) hash.
    RsaOaep = 8,
    /// RSAES-OAEP with SHA-256.
    RsaOaep256 = 9,
    /// RSAES-OAEP with SHA-384.
    RsaOaep384 = 10,
    /// RSAES-OAEP with SHA-512.
    RsaOaep512 = 11,
    /// ECDH-ES with direct CEK derivation.
    EcdhEs = 12,
    /// ECDH-ES deriving a KEK for AES-128 key wrap.
    EcdhEsA128Kw = 13,
    /// ECDH-ES deriving a KEK for AES-192 key wrap.
    EcdhEsA192Kw = 14,
    /// ECDH-ES deriving a KEK for AES-256 key wrap.
    EcdhEsA256Kw = 15,
}

impl KeyManagementAlgorithm {
    /// All registered key-management algorithms.
    pub const ALL: [Self; 16] = [
        Self::Dir,
        Self::A128Kw,
        Self::A192Kw,
        Self::A256Kw,
        Self::A128GcmKw,
        Self::A192GcmKw,
        Self::A256GcmKw,
        Self::Rsa1_5,
        Self::RsaOaep,
        Self::RsaOaep256,
        Self::RsaOaep384,
        Self::RsaOaep512,
        Self::EcdhEs,
        Self::EcdhEsA128Kw,
        Self::EcdhEsA192Kw,
        Self::EcdhEsA256Kw,
    ];

    /// Numeric algorithm id.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Canonical `alg` name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Dir => "dir",
            Self::A128Kw => "A128KW",
            Self::A192Kw => "A192KW",
            Self::A256Kw => "A256KW",
            Self::A128GcmKw => "A128GCMKW",
            Self::A192GcmKw => "A192GCMKW",
            Self::A256GcmKw => "A256GCMKW",
            Self::Rsa1_5 => "RSA1_5",
            Self::RsaOaep => "RSA-OAEP",
            Self::RsaOaep256 => "RSA-OAEP-256",
            Self::RsaOaep384 => "RSA-OAEP-384",
            Self::RsaOaep512 => "RSA-OAEP-512",
            Self::EcdhEs => "ECDH-ES",
            Self::EcdhEsA128Kw => "ECDH-ES+A128KW",
            Self::EcdhEsA192Kw => "ECDH-ES+A192KW",
            Self::EcdhEsA256Kw => "ECDH-ES+A256KW",
        }
    }

    /// Key-encryption-key length in bytes for the AES-based wraps.
    pub fn kek_len(self) -> Option<usize> {
        match self {
            Self::A128Kw | Self::A128GcmKw | Self::EcdhEsA128Kw => Some(16),
            Self::A192Kw | Self::A192GcmKw | Self::EcdhEsA192Kw => Some(24),
            Self::A256Kw | Self::A256GcmKw | Self::EcdhEsA256Kw => Some(32),
            _ => None,
        }
    }

    /// Does the algorithm use the recipient key directly, emitting an empty
    /// `encrypted_key` segment?
    pub fn is_direct(self) -> bool {
        matches!(self, Self::Dir | Self::EcdhEs)
    }

    /// Is this an RSA encryption scheme?
    pub fn is_rsa(self) -> bool {
        matches!(
            self,
            Self::Rsa1_5 | Self::RsaOaep | Self::RsaOaep256 | Self::RsaOaep384 | Self::RsaOaep512
        )
    }

    /// Is this an ECDH-ES variant?
    pub fn is_ecdh(self) -> bool {
        matches!(
            self,
            Self::EcdhEs | Self::EcdhEsA128Kw | Self::EcdhEsA192Kw | Self::EcdhEsA256Kw
        )
    }

    /// OAEP mask-generation hash; `None` for the SHA-1 default and non-OAEP
    /// algorithms.
    pub fn oaep_hash(self) -> Option<HashAlg> {
        match self {
            Self::RsaOaep256 => Some(HashAlg::Sha256),
            Self::RsaOaep384 => Some(HashAlg::Sha384),
            Self::RsaOaep512 => Some(HashAlg::Sha512),
            _ => None,
        }
    }

    /// Parses a canonical `alg` name in O(1); the escaped
    /// `ECDH-ES+AxxxKW` spelling is handled by the fallback.
    pub fn try_parse(name: &[u8]) -> Option<Self> {
        match name.len() {
            3 => {
                let value = le16(name, 0) | (u64::from(name[2]) << 16);
                (value == pack(b"dir")).then_some(Self::Dir)
            }
            6 => {
                let value = le32(name, 0) | (le16(name, 4) << 32);
                Some(match value {
                    v if v == pack(b"A128KW") => Self::A128Kw,
                    v if v == pack(b"A192KW") => Self::A192Kw,
                    v if v == pack(b"A256KW") => Self::A256Kw,
                    v if v == pack(b"RSA1_5") => Self::Rsa1_5,
                    _ => return None,
                })
            }
            7 => {
                let value = le32(name, 0) | (le16(name, 4) << 32) | (u64::from(name[6]) << 48);
                (value == pack(b"ECDH-ES")).then_some(Self::EcdhEs)
            }
            8 => (le64(name, 0) == pack(b"RSA-OAEP")).then_some(Self::RsaOaep),
            9 => {
                let prefix = le64(name, 0);
                if u64::from(name[8]) != pack(b"W") {
                    return None;
                }
                Some(match prefix {
                    v if v == pack(b"A128GCMK") => Self::A128GcmKw,
                    v if v == pack(b"A192GCMK") => Self::A192GcmKw,
                    v if v == pack(b"A256GCMK") => Self::A256GcmKw,
                    _ => return None,
                })
            }
            12 => {
                if le64(name, 0) != pack(b"RSA-OAEP") {
                    return None;
                }
                Some(match le32(name, 8) {
                    v if v == pack(b"-256") => Self::RsaOaep256,
                    v if v == pack(b"-384") => Self::RsaOaep384,
                    v if v == pack(b"-512") => Self::RsaOaep512,
                    _ => return None,
                })
            }
            14 => {
                if le64(name, 0) != pack(b"ECDH-ES+") {
                    return None;
                }
                Self::parse_wrap_suffix(le32(name, 8) | (le16(name, 12) << 32))
            }
            19 => Self::parse_escaped(name),
            _ => None,
        }
    }

    /// Recognizes `ECDH-ES+AxxxKW`: the `+` spelled as a JSON escape,
    /// with either case accepted for the hex digits.
    fn parse_escaped(name: &[u8]) -> Option<Self> {
        // Case-folding mask for the escape's hex digits; OR-ing leaves
        // decimal digits intact and lowercases `B`.
        const HEX_CASE_MASK: u64 = 0x2020;

        let prefix_matches = (le32(name, 0) | (le16(name, 4) << 32) | (u64::from(name[6]) << 48))
            == pack(b"ECDH-ES");
        let escape_matches = le32(name, 7) == pack(b"\\u00")
            && (le16(name, 11) | HEX_CASE_MASK) == pack(b"2b");
        if !prefix_matches || !escape_matches {
            return None;
        }
        Self::parse_wrap_suffix(le32(name, 13) | (le16(name, 17) << 32))
    }

    fn parse_wrap_suffix(value: u64) -> Option<Self> {
        Some(match value {
            v if v == pack(b"A128KW") => Self::EcdhEsA128Kw,
            v if v == pack(b"A192KW") => Self::EcdhEsA192Kw,
            v if v == pack(b"A256KW") => Self::EcdhEsA256Kw,
            _ => return None,
        })
    }

    /// Linear-scan parser over the registry; agrees with [`Self::try_parse`]
    /// on every input.
    pub(crate) fn try_parse_linear(name: &[u8]) -> Option<Self> {
        if let Some(alg) = Self::ALL
            .iter()
            .copied()
            .find(|alg| alg.name().as_bytes() == name)
        {
            return Some(alg);
        }
        if name.len() == 19 {
            let unescaped: Vec<u8> = name[..7]
                .iter()
                .chain(b"+")
                .chain(&name[13..])
                .copied()
                .collect();
            let escape = &name[7..13];
            // JSON mandates a lowercase `u` in escapes; only the hex digits
            // are case-insensitive.
            if escape.starts_with(b"\\u") && escape[2..].eq_ignore_ascii_case(b"002b") {
                return Self::ALL
                    .iter()
                    .copied()
                    .find(|alg| alg.name().as_bytes() == unescaped);
            }
        }
        None
    }
}

impl fmt::Display for KeyManagementAlgorithm {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

impl FromStr for KeyManagementAlgorithm {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_parse(s.as_bytes()).ok_or_else(|| TokenError::UnknownAlgorithm(s.to_owned()))
    }
}

/// JWE content-encryption algorithm (RFC 7518 §5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EncryptionAlgorithm {
    /// AES-128-CBC with HMAC-SHA-256.
    A128CbcHs256 = 0,
    /// AES-192-CBC with HMAC-SHA-384.
    A192CbcHs384 = 1,
    /// AES-256-CBC with HMAC-SHA-512.
    A256CbcHs512 = 2,
    /// AES-128-GCM.
    A128Gcm = 3,
    /// AES-192-GCM.
    A192Gcm = 4,
    /// AES-256-GCM.
    A256Gcm = 5,
}

impl EncryptionAlgorithm {
    /// All registered content-encryption algorithms.
    pub const ALL: [Self; 6] = [
        Self::A128CbcHs256,
        Self::A192CbcHs384,
        Self::A256CbcHs512,
        Self::A128Gcm,
        Self::A192Gcm,
        Self::A256Gcm,
    ];

    /// Numeric algorithm id.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Canonical `enc` name.
    pub fn name(self) -> &'static str {
        match self {
            Self::A128CbcHs256 => "A128CBC-HS256",
            Self::A192CbcHs384 => "A192CBC-HS384",
            Self::A256CbcHs512 => "A256CBC-HS512",
            Self::A128Gcm => "A128GCM",
            Self::A192Gcm => "A192GCM",
            Self::A256Gcm => "A256GCM",
        }
    }

    /// Content-encryption-key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Self::A128CbcHs256 => 32,
            Self::A192CbcHs384 => 48,
            Self::A256CbcHs512 => 64,
            Self::A128Gcm => 16,
            Self::A192Gcm => 24,
            Self::A256Gcm => 32,
        }
    }

    /// Initialization-vector length in bytes.
    pub fn iv_len(self) -> usize {
        match self {
            Self::A128CbcHs256 | Self::A192CbcHs384 | Self::A256CbcHs512 => 16,
            Self::A128Gcm | Self::A192Gcm | Self::A256Gcm => 12,
        }
    }

    /// Authentication-tag length in bytes.
    pub fn tag_len(self) -> usize {
        match self {
            Self::A128CbcHs256 => 16,
            Self::A192CbcHs384 => 24,
            Self::A256CbcHs512 => 32,
            Self::A128Gcm | Self::A192Gcm | Self::A256Gcm => 16,
        }
    }

    /// HMAC digest of a CBC-HMAC composite; `None` for the GCM family.
    pub fn cbc_hash(self) -> Option<HashAlg> {
        match self {
            Self::A128CbcHs256 => Some(HashAlg::Sha256),
            Self::A192CbcHs384 => Some(HashAlg::Sha384),
            Self::A256CbcHs512 => Some(HashAlg::Sha512),
            _ => None,
        }
    }

    /// Parses a canonical `enc` name in O(1).
    pub fn try_parse(name: &[u8]) -> Option<Self> {
        match name.len() {
            7 => {
                let value = le32(name, 0) | (le16(name, 4) << 32) | (u64::from(name[6]) << 48);
                Some(match value {
                    v if v == pack(b"A128GCM") => Self::A128Gcm,
                    v if v == pack(b"A192GCM") => Self::A192Gcm,
                    v if v == pack(b"A256GCM") => Self::A256Gcm,
                    _ => return None,
                })
            }
            13 => {
                let suffix = le32(name, 8) | (u64::from(name[12]) << 32);
                Some(match le64(name, 0) {
                    v if v == pack(b"A128CBC-") && suffix == pack(b"HS256") => Self::A128CbcHs256,
                    v if v == pack(b"A192CBC-") && suffix == pack(b"HS384") => Self::A192CbcHs384,
                    v if v == pack(b"A256CBC-") && suffix == pack(b"HS512") => Self::A256CbcHs512,
                    _ => return None,
                })
            }
            _ => None,
        }
    }

    /// Linear-scan parser over the registry; agrees with [`Self::try_parse`]
    /// on every input.
    pub(crate) fn try_parse_linear(name: &[u8]) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|alg| alg.name().as_bytes() == name)
    }
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

impl FromStr for EncryptionAlgorithm {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_parse(s.as_bytes()).ok_or_else(|| TokenError::UnknownAlgorithm(s.to_owned()))
    }
}

/// Packed algorithm id for the key-wrapper cache: `(enc_id << 8) | kw_id`.
pub(crate) fn packed_key_management_id(
    kw: KeyManagementAlgorithm,
    enc: EncryptionAlgorithm,
) -> u16 {
    (u16::from(enc.id()) << 8) | u16::from(kw.id())
}
