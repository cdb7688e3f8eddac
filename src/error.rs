//! Error handling.

use core::fmt;

/// Errors surfaced by token reading, writing and the underlying
/// cryptographic operations.
///
/// The reader reports the first error it encounters; the writer fails on the
/// first violated precondition. Primitive layers fail fast with precise kinds,
/// while the signing / key-wrapping layers translate backend failures into
/// [`InvalidSignature`](Self::InvalidSignature) / [`InvalidTag`](Self::InvalidTag)
/// so that no backend-specific detail leaks to the caller.
#[derive(Debug)]
#[non_exhaustive]
pub enum TokenError {
    /// Token does not consist of 3 (JWS) or 5 (JWE) `.`-separated segments.
    MalformedToken,
    /// Token (or its decompressed payload) exceeds the configured byte ceiling.
    TokenTooLarge {
        /// Observed size in bytes.
        actual: usize,
        /// Configured ceiling in bytes.
        limit: usize,
    },
    /// A segment is not valid base64url.
    Base64Invalid,
    /// Header is not a valid JSON object or violates the header schema.
    HeaderInvalid(anyhow::Error),
    /// `alg` / `enc` value is not a registered algorithm identifier.
    UnknownAlgorithm(String),
    /// Algorithm is registered but rejected by the validation policy.
    AlgorithmNotAllowed(String),
    /// `crit` lists a header name this implementation does not understand.
    UnknownCriticalHeader(String),
    /// No key in the policy key set matches the token.
    KeyNotFound,
    /// Signature failed verification.
    InvalidSignature,
    /// AEAD authentication tag failed verification.
    InvalidTag,
    /// AES key unwrap produced a mismatched integrity check value.
    InvalidKeyWrap,
    /// Key material is shorter than the algorithm's minimum.
    KeyTooSmall {
        /// Actual key size in bits.
        bits: usize,
        /// Minimum key size in bits.
        min_bits: usize,
    },
    /// Key material has a size other than the one the algorithm requires.
    KeySizeMismatch {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },
    /// EC key uses a curve outside {P-256, P-384, P-521}, or a curve
    /// incompatible with the requested algorithm.
    UnsupportedCurve(String),
    /// Caller-provided destination buffer is too small.
    DestinationTooSmall {
        /// Required destination length in bytes.
        needed: usize,
    },
    /// `exp` claim is in the past (beyond the configured skew).
    Expired,
    /// `nbf` claim is in the future (beyond the configured skew).
    NotYetValid,
    /// `iss` claim is not in the policy's allowed set.
    IssuerNotAllowed,
    /// `aud` claim does not intersect the policy's allowed set.
    AudienceNotAllowed,
    /// Nested `cty: JWT` tokens recurse deeper than the reader allows.
    NestedTokenLimitExceeded,
    /// Operation object or its owning factory has been disposed.
    Disposed,
}

impl TokenError {
    pub(crate) fn header(err: impl Into<anyhow::Error>) -> Self {
        Self::HeaderInvalid(err.into())
    }
}

impl fmt::Display for TokenError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedToken => {
                formatter.write_str("token is not a 3- or 5-segment compact serialization")
            }
            Self::TokenTooLarge { actual, limit } => write!(
                formatter,
                "token size ({actual} bytes) exceeds the configured ceiling ({limit} bytes)"
            ),
            Self::Base64Invalid => formatter.write_str("segment is not valid base64url"),
            Self::HeaderInvalid(e) => write!(formatter, "malformed token header: {e}"),
            Self::UnknownAlgorithm(name) => {
                write!(formatter, "unknown algorithm identifier: {name}")
            }
            Self::AlgorithmNotAllowed(name) => {
                write!(formatter, "algorithm {name} is not allowed by the policy")
            }
            Self::UnknownCriticalHeader(name) => {
                write!(formatter, "unsupported critical header: {name}")
            }
            Self::KeyNotFound => formatter.write_str("no key matches the token"),
            Self::InvalidSignature => formatter.write_str("signature has failed verification"),
            Self::InvalidTag => formatter.write_str("authentication tag has failed verification"),
            Self::InvalidKeyWrap => formatter.write_str("key unwrap integrity check failed"),
            Self::KeyTooSmall { bits, min_bits } => write!(
                formatter,
                "key is too small for the algorithm ({bits} bits; min {min_bits} bits)"
            ),
            Self::KeySizeMismatch { expected, actual } => write!(
                formatter,
                "key has invalid size (expected {expected} bytes, got {actual})"
            ),
            Self::UnsupportedCurve(curve) => write!(formatter, "unsupported curve: {curve}"),
            Self::DestinationTooSmall { needed } => write!(
                formatter,
                "destination buffer is too small ({needed} bytes required)"
            ),
            Self::Expired => formatter.write_str("token has expired"),
            Self::NotYetValid => formatter.write_str("token is not yet valid"),
            Self::IssuerNotAllowed => formatter.write_str("token issuer is not allowed"),
            Self::AudienceNotAllowed => formatter.write_str("token audience is not allowed"),
            Self::NestedTokenLimitExceeded => {
                formatter.write_str("nested tokens exceed the configured depth")
            }
            Self::Disposed => formatter.write_str("operation object has been disposed"),
        }
    }
}

impl std::error::Error for TokenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::HeaderInvalid(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}
