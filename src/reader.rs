//! Compact-serialization reader: tokenize, decrypt, verify, validate.

use std::io::Read;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use smallvec::{smallvec, SmallVec};

use crate::{
    alg::{EncryptionAlgorithm, KeyManagementAlgorithm, SignatureAlgorithm},
    base64url,
    claims::{Claims, TimeOptions},
    jwk::{Jwk, JwkSet},
    sign::SignerFactory,
    token::{JoseHeader, Jwt, TokenPayload},
    wrap::{decrypt_content, KeyWrapperFactory},
    TokenError,
};

/// Default ceiling on token size (and decompressed plaintext size).
pub const DEFAULT_MAX_TOKEN_BYTES: usize = 256 * 1024;

/// Stack size of the signature scratch; covers every non-RSA signature.
const SIGNATURE_SIZE: usize = 256;

/// Default bound on `cty: JWT` recursion: a token may nest exactly one
/// further token.
pub const DEFAULT_MAX_NESTED_DEPTH: usize = 1;

/// Everything the reader needs to decide whether a token is acceptable:
/// the key set, the algorithm allow-list, issuer / audience predicates, the
/// clock, and hard resource ceilings.
///
/// A policy is immutable once handed to a [`TokenReader`] and may be built
/// with the `with_*` methods:
///
/// ```
/// # use jose_compact::{Jwk, ValidationPolicy, SignatureAlgorithm};
/// # use chrono::Duration;
/// let policy = ValidationPolicy::new()
///     .with_key(Jwk::symmetric(vec![0x2A; 32]).with_key_id("k1"))
///     .with_allowed_signature_algorithms([SignatureAlgorithm::Hs256])
///     .with_issuers(["https://issuer.example.com"])
///     .with_clock_skew(Duration::try_seconds(5).unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct ValidationPolicy<F = fn() -> DateTime<Utc>> {
    /// Reject unsigned tokens (`alg: none`). On by default.
    pub require_signature: bool,
    /// Accepted signature algorithms; `None` admits every registered one.
    pub allowed_signature_algorithms: Option<Vec<SignatureAlgorithm>>,
    /// Candidate keys for verification and decryption.
    pub keys: JwkSet,
    /// Allowed `iss` values; empty means unrestricted.
    pub issuers: Vec<String>,
    /// Allowed `aud` values; the token's audience must intersect. Empty
    /// means unrestricted.
    pub audiences: Vec<String>,
    /// Clock and `exp` / `nbf` leeway.
    pub time_options: TimeOptions<F>,
    /// Hard cap on the token byte size, also applied to decompressed
    /// plaintexts.
    pub max_token_bytes: usize,
    /// How many nested (`cty: JWT`) layers may be unwrapped.
    pub max_nested_depth: usize,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            require_signature: true,
            allowed_signature_algorithms: None,
            keys: JwkSet::new(),
            issuers: Vec::new(),
            audiences: Vec::new(),
            time_options: TimeOptions::default(),
            max_token_bytes: DEFAULT_MAX_TOKEN_BYTES,
            max_nested_depth: DEFAULT_MAX_NESTED_DEPTH,
        }
    }
}

impl ValidationPolicy {
    /// Creates a policy with the defaults: signatures required, all
    /// registered algorithms, no issuer / audience restrictions, 60 s clock
    /// skew, 256 KiB size ceiling.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<F: Fn() -> DateTime<Utc>> ValidationPolicy<F> {
    /// Adds a key to the candidate set.
    #[must_use]
    pub fn with_key(mut self, key: Jwk) -> Self {
        self.keys.push(key);
        self
    }

    /// Replaces the candidate key set.
    #[must_use]
    pub fn with_keys(mut self, keys: JwkSet) -> Self {
        self.keys = keys;
        self
    }

    /// Restricts accepted signature algorithms.
    #[must_use]
    pub fn with_allowed_signature_algorithms(
        mut self,
        algorithms: impl IntoIterator<Item = SignatureAlgorithm>,
    ) -> Self {
        self.allowed_signature_algorithms = Some(algorithms.into_iter().collect());
        self
    }

    /// Accepts unsigned (`alg: none`) tokens.
    #[must_use]
    pub fn allow_unsigned(mut self) -> Self {
        self.require_signature = false;
        self
    }

    /// Restricts the accepted `iss` values.
    #[must_use]
    pub fn with_issuers(mut self, issuers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.issuers = issuers.into_iter().map(Into::into).collect();
        self
    }

    /// Restricts the accepted `aud` values.
    #[must_use]
    pub fn with_audiences(
        mut self,
        audiences: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.audiences = audiences.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the `exp` / `nbf` leeway.
    #[must_use]
    pub fn with_clock_skew(mut self, leeway: chrono::Duration) -> Self {
        self.time_options.leeway = leeway;
        self
    }

    /// Sets the clock source.
    #[must_use]
    pub fn with_clock<G: Fn() -> DateTime<Utc>>(self, clock_fn: G) -> ValidationPolicy<G> {
        ValidationPolicy {
            require_signature: self.require_signature,
            allowed_signature_algorithms: self.allowed_signature_algorithms,
            keys: self.keys,
            issuers: self.issuers,
            audiences: self.audiences,
            time_options: TimeOptions::new(self.time_options.leeway, clock_fn),
            max_token_bytes: self.max_token_bytes,
            max_nested_depth: self.max_nested_depth,
        }
    }

    /// Sets the token byte ceiling.
    #[must_use]
    pub fn with_max_token_bytes(mut self, max_token_bytes: usize) -> Self {
        self.max_token_bytes = max_token_bytes;
        self
    }

    fn check_size(&self, actual: usize) -> Result<(), TokenError> {
        if actual > self.max_token_bytes {
            Err(TokenError::TokenTooLarge {
                actual,
                limit: self.max_token_bytes,
            })
        } else {
            Ok(())
        }
    }
}

/// Parses, decrypts, verifies, and validates compact-serialized tokens
/// under a fixed [`ValidationPolicy`].
///
/// The reader is reentrant; its internal factories cache one operation
/// object per `(key, algorithm)` pair for the reader's lifetime.
#[derive(Debug)]
pub struct TokenReader<F = fn() -> DateTime<Utc>> {
    policy: ValidationPolicy<F>,
    signers: SignerFactory,
    wrappers: KeyWrapperFactory,
}

impl<F: Fn() -> DateTime<Utc>> TokenReader<F> {
    /// Creates a reader enforcing `policy`.
    pub fn new(policy: ValidationPolicy<F>) -> Self {
        Self {
            policy,
            signers: SignerFactory::new(),
            wrappers: KeyWrapperFactory::new(),
        }
    }

    /// The policy this reader enforces.
    pub fn policy(&self) -> &ValidationPolicy<F> {
        &self.policy
    }

    /// Reads a compact-serialized token.
    pub fn read(&self, raw: &[u8]) -> Result<Jwt, TokenError> {
        self.read_at_depth(raw, 0)
    }

    fn read_at_depth(&self, raw: &[u8], depth: usize) -> Result<Jwt, TokenError> {
        self.policy.check_size(raw.len())?;

        let segments: Vec<&[u8]> = raw.split(|&byte| byte == b'.').collect();
        match segments.len() {
            3 => self.read_jws(raw, &segments, depth),
            5 => self.read_jwe(&segments, depth),
            _ => Err(TokenError::MalformedToken),
        }
    }

    fn read_jws(
        &self,
        raw: &[u8],
        segments: &[&[u8]],
        depth: usize,
    ) -> Result<Jwt, TokenError> {
        let header = JoseHeader::parse(&base64url::decode_vec(segments[0])?)?;
        let alg_name = header.algorithm.as_deref().expect("schema-checked");
        let alg = SignatureAlgorithm::try_parse(alg_name.as_bytes())
            .ok_or_else(|| TokenError::UnknownAlgorithm(alg_name.to_owned()))?;

        if alg == SignatureAlgorithm::None && self.policy.require_signature {
            return Err(TokenError::AlgorithmNotAllowed(alg.name().to_owned()));
        }
        if let Some(allowed) = &self.policy.allowed_signature_algorithms {
            if !allowed.contains(&alg) {
                return Err(TokenError::AlgorithmNotAllowed(alg.name().to_owned()));
            }
        }

        let mut signature_buf: SmallVec<[u8; SIGNATURE_SIZE]> =
            smallvec![0; base64url::decoded_len(segments[2].len())];
        let signature = base64url::decode(segments[2], &mut signature_buf)?;
        if alg == SignatureAlgorithm::None {
            if !signature.is_empty() {
                return Err(TokenError::InvalidSignature);
            }
        } else {
            let key = self.resolve_key(&header, |key| key.supports_signature(alg))?;
            // The signed data is the raw ASCII `header.payload`.
            let signed_len = segments[0].len() + 1 + segments[1].len();
            let signer = self.signers.signer(key, alg)?;
            if !signer.verify(&raw[..signed_len], signature)? {
                return Err(TokenError::InvalidSignature);
            }
        }

        let payload = base64url::decode_vec(segments[1])?;
        if header.has_nested_token() {
            let inner = self.recurse(&payload, depth)?;
            return Ok(Jwt::new(header, TokenPayload::Nested(Box::new(inner))));
        }

        let claims: Claims<Map<String, Value>> =
            serde_json::from_slice(&payload).map_err(|_| TokenError::MalformedToken)?;
        self.validate_claims(&claims)?;
        Ok(Jwt::new(header, TokenPayload::Claims(claims)))
    }

    fn read_jwe(&self, segments: &[&[u8]], depth: usize) -> Result<Jwt, TokenError> {
        let header = JoseHeader::parse(&base64url::decode_vec(segments[0])?)?;
        let alg_name = header.algorithm.as_deref().expect("schema-checked");
        let alg = KeyManagementAlgorithm::try_parse(alg_name.as_bytes())
            .ok_or_else(|| TokenError::UnknownAlgorithm(alg_name.to_owned()))?;
        let enc_name = header
            .encryption
            .as_deref()
            .ok_or_else(|| TokenError::header(anyhow::anyhow!("header lacks the `enc` field")))?;
        let enc = EncryptionAlgorithm::try_parse(enc_name.as_bytes())
            .ok_or_else(|| TokenError::UnknownAlgorithm(enc_name.to_owned()))?;

        let encrypted_key = base64url::decode_vec(segments[1])?;
        let iv = base64url::decode_vec(segments[2])?;
        let ciphertext = base64url::decode_vec(segments[3])?;
        let tag = base64url::decode_vec(segments[4])?;

        let key = self.resolve_key(&header, |key| key.supports_key_management(alg))?;
        let wrapper = self.wrappers.wrapper(key, alg, enc)?;
        let cek = wrapper.unwrap_cek(&encrypted_key, &header)?;

        // The AAD is the raw ASCII of the encoded header, not its decoding.
        let plaintext = decrypt_content(enc, &cek, &iv, segments[0], &ciphertext, &tag)?;
        let plaintext = if header.compression.is_some() {
            self.inflate(&plaintext)?
        } else {
            plaintext
        };

        if header.has_nested_token() {
            let inner = self.recurse(&plaintext, depth)?;
            return Ok(Jwt::new(header, TokenPayload::Nested(Box::new(inner))));
        }
        Ok(Jwt::new(header, TokenPayload::Bytes(plaintext)))
    }

    fn recurse(&self, inner: &[u8], depth: usize) -> Result<Jwt, TokenError> {
        if depth >= self.policy.max_nested_depth {
            return Err(TokenError::NestedTokenLimitExceeded);
        }
        self.read_at_depth(inner, depth + 1)
    }

    fn resolve_key(
        &self,
        header: &JoseHeader,
        suitable: impl Fn(&Jwk) -> bool,
    ) -> Result<&Jwk, TokenError> {
        let keys = &self.policy.keys;
        let key = match &header.key_id {
            Some(kid) => keys.find_by_kid(kid),
            None => keys.keys.iter().find(|key| suitable(key)),
        };
        key.map(std::sync::Arc::as_ref).ok_or(TokenError::KeyNotFound)
    }

    fn validate_claims(&self, claims: &Claims<Map<String, Value>>) -> Result<(), TokenError> {
        claims.validate_expiration(&self.policy.time_options)?;
        claims.validate_maturity(&self.policy.time_options)?;

        if !self.policy.issuers.is_empty() {
            let issuer_allowed = claims
                .issuer
                .as_deref()
                .is_some_and(|issuer| self.policy.issuers.iter().any(|allowed| allowed == issuer));
            if !issuer_allowed {
                return Err(TokenError::IssuerNotAllowed);
            }
        }
        if !self.policy.audiences.is_empty() {
            let audience_allowed = claims.audience.as_ref().is_some_and(|audience| {
                self.policy
                    .audiences
                    .iter()
                    .any(|allowed| audience.contains(allowed))
            });
            if !audience_allowed {
                return Err(TokenError::AudienceNotAllowed);
            }
        }
        Ok(())
    }

    /// DEFLATE-decompresses a `zip: DEF` plaintext, keeping the configured
    /// size ceiling in force for the expanded output.
    fn inflate(&self, compressed: &[u8]) -> Result<Vec<u8>, TokenError> {
        let limit = self.policy.max_token_bytes;
        let mut decoder = flate2::read::DeflateDecoder::new(compressed).take(limit as u64 + 1);
        let mut plaintext = Vec::new();
        decoder
            .read_to_end(&mut plaintext)
            .map_err(|_| TokenError::MalformedToken)?;
        self.policy.check_size(plaintext.len())?;
        Ok(plaintext)
    }
}
