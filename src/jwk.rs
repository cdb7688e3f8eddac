//! JSON Web Keys (RFC 7517): the typed key model shared by the signing and
//! encryption layers.
//!
//! A [`Jwk`] is immutable after construction and is freely shared between
//! threads; the signer / key-wrapper factories key their caches on the
//! *instance identity* of a `Jwk` (two keys built from identical material are
//! distinct cache entries), which is why every constructed key is tagged with
//! a process-unique id.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use p256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::{
    alg::{KeyManagementAlgorithm, SignatureAlgorithm},
    base64url, TokenError,
};

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// Byte container for secret key material: zeroed on drop, redacted in
/// `Debug` output, compared in constant time.
#[derive(Clone)]
pub struct SecretBytes(Zeroizing<Vec<u8>>);

impl SecretBytes {
    /// Wraps owned secret bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_tuple("SecretBytes").field(&"_").finish()
    }
}

impl From<&[u8]> for SecretBytes {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

impl From<Vec<u8>> for SecretBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl AsRef<[u8]> for SecretBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl core::ops::Deref for SecretBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq for SecretBytes {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice().ct_eq(other.0.as_slice()).into()
    }
}

/// NIST curves supported for EC keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EllipticCurve {
    /// secp256r1.
    P256,
    /// secp384r1.
    P384,
    /// secp521r1.
    P521,
}

impl EllipticCurve {
    /// Canonical `crv` name.
    pub fn name(self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
        }
    }

    /// Length of an affine coordinate in bytes.
    pub fn coordinate_len(self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }

    /// Field size in bits.
    pub fn bits(self) -> usize {
        match self {
            Self::P256 => 256,
            Self::P384 => 384,
            Self::P521 => 521,
        }
    }

    fn from_name(name: &str) -> Result<Self, TokenError> {
        match name {
            "P-256" => Ok(Self::P256),
            "P-384" => Ok(Self::P384),
            "P-521" => Ok(Self::P521),
            _ => Err(TokenError::UnsupportedCurve(name.to_owned())),
        }
    }
}

impl fmt::Display for EllipticCurve {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

/// Private CRT components of an RSA key (`d` is required, the rest speed up
/// the private operation).
#[derive(Debug, Clone)]
pub struct RsaPrivateComponents {
    /// Private exponent.
    pub d: SecretBytes,
    /// First prime factor.
    pub p: SecretBytes,
    /// Second prime factor.
    pub q: SecretBytes,
    /// `d mod (p - 1)`.
    pub dp: Option<SecretBytes>,
    /// `d mod (q - 1)`.
    pub dq: Option<SecretBytes>,
    /// `q^-1 mod p`.
    pub qi: Option<SecretBytes>,
}

/// Key material variants; exactly one is populated per key.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum KeyMaterial {
    /// Raw octet key (`kty: oct`).
    Symmetric {
        /// Key bytes.
        k: SecretBytes,
    },
    /// RSA key (`kty: RSA`), public with optional private components.
    Rsa {
        /// Modulus, big-endian.
        n: Vec<u8>,
        /// Public exponent, big-endian.
        e: Vec<u8>,
        /// Private components, if this is a private key.
        private: Option<RsaPrivateComponents>,
    },
    /// Elliptic-curve key (`kty: EC`).
    EllipticCurve {
        /// Curve identifier.
        curve: EllipticCurve,
        /// Affine x coordinate, sized to the curve.
        x: Vec<u8>,
        /// Affine y coordinate, sized to the curve.
        y: Vec<u8>,
        /// Private scalar, if this is a private key.
        d: Option<SecretBytes>,
    },
}

/// Intended key usage (`use` attribute).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyUse {
    /// Signature creation / verification.
    #[serde(rename = "sig")]
    Signature,
    /// Encryption / decryption.
    #[serde(rename = "enc")]
    Encryption,
}

/// JSON Web Key.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawJwk")]
pub struct Jwk {
    id: u64,
    material: KeyMaterial,
    /// Key identifier (`kid`).
    pub key_id: Option<String>,
    /// Intended usage (`use`).
    pub key_use: Option<KeyUse>,
    /// Algorithm hint (`alg`).
    pub algorithm: Option<String>,
    /// Permitted operations (`key_ops`).
    pub key_ops: Vec<String>,
    /// X.509 certificate chain (`x5c`), base64 (not base64url) encoded.
    pub x5c: Vec<String>,
    /// SHA-1 certificate thumbprint (`x5t`).
    pub x5t: Option<String>,
    /// SHA-256 certificate thumbprint (`x5t#S256`).
    pub x5t_s256: Option<String>,
}

impl Jwk {
    fn new(material: KeyMaterial) -> Self {
        Self {
            id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed),
            material,
            key_id: None,
            key_use: None,
            algorithm: None,
            key_ops: Vec::new(),
            x5c: Vec::new(),
            x5t: None,
            x5t_s256: None,
        }
    }

    /// Creates a symmetric key from raw octets.
    pub fn symmetric(k: impl Into<Vec<u8>>) -> Self {
        Self::new(KeyMaterial::Symmetric {
            k: SecretBytes::new(k.into()),
        })
    }

    /// Creates a public RSA key from big-endian modulus and exponent.
    pub fn rsa_public(n: impl Into<Vec<u8>>, e: impl Into<Vec<u8>>) -> Self {
        Self::new(KeyMaterial::Rsa {
            n: n.into(),
            e: e.into(),
            private: None,
        })
    }

    /// Creates a public EC key; coordinate lengths must match the curve.
    pub fn ec_public(
        curve: EllipticCurve,
        x: impl Into<Vec<u8>>,
        y: impl Into<Vec<u8>>,
    ) -> Result<Self, TokenError> {
        let (x, y) = (x.into(), y.into());
        check_coordinate(curve, &x)?;
        check_coordinate(curve, &y)?;
        Ok(Self::new(KeyMaterial::EllipticCurve {
            curve,
            x,
            y,
            d: None,
        }))
    }

    /// Exports an `rsa` crate private key (with its public half) as a JWK.
    pub fn from_rsa_private_key(key: &rsa::RsaPrivateKey) -> Self {
        use rsa::traits::{PrivateKeyParts, PublicKeyParts};

        let primes = key.primes();
        Self::new(KeyMaterial::Rsa {
            n: key.n().to_bytes_be(),
            e: key.e().to_bytes_be(),
            private: Some(RsaPrivateComponents {
                d: SecretBytes::new(key.d().to_bytes_be()),
                p: SecretBytes::new(primes[0].to_bytes_be()),
                q: SecretBytes::new(primes[1].to_bytes_be()),
                dp: key.dp().map(|v| SecretBytes::new(v.to_bytes_be())),
                dq: key.dq().map(|v| SecretBytes::new(v.to_bytes_be())),
                qi: None,
            }),
        })
    }

    /// Exports an `rsa` crate public key as a JWK.
    pub fn from_rsa_public_key(key: &rsa::RsaPublicKey) -> Self {
        use rsa::traits::PublicKeyParts;

        Self::rsa_public(key.n().to_bytes_be(), key.e().to_bytes_be())
    }

    /// Instance identity used by the crypto caches.
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Key material.
    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// Key type name (`kty`).
    pub fn key_type(&self) -> &'static str {
        match &self.material {
            KeyMaterial::Symmetric { .. } => "oct",
            KeyMaterial::Rsa { .. } => "RSA",
            KeyMaterial::EllipticCurve { .. } => "EC",
        }
    }

    /// Key size in bits: octet length × 8 for symmetric keys, modulus size
    /// for RSA, field size for EC.
    pub fn bits(&self) -> usize {
        match &self.material {
            KeyMaterial::Symmetric { k } => k.len() * 8,
            KeyMaterial::Rsa { n, .. } => {
                let leading = n.iter().take_while(|&&byte| byte == 0).count();
                let stripped = &n[leading..];
                match stripped.first() {
                    Some(first) => (stripped.len() - 1) * 8 + (8 - first.leading_zeros() as usize),
                    None => 0,
                }
            }
            KeyMaterial::EllipticCurve { curve, .. } => curve.bits(),
        }
    }

    /// Does the key carry a private component (symmetric keys always do)?
    pub fn is_private(&self) -> bool {
        match &self.material {
            KeyMaterial::Symmetric { .. } => true,
            KeyMaterial::Rsa { private, .. } => private.is_some(),
            KeyMaterial::EllipticCurve { d, .. } => d.is_some(),
        }
    }

    /// Can this key verify (or, if private, produce) signatures under `alg`?
    pub fn supports_signature(&self, alg: SignatureAlgorithm) -> bool {
        match (&self.material, alg) {
            (_, SignatureAlgorithm::None) => false,
            (KeyMaterial::Symmetric { .. }, alg) => alg.is_hmac(),
            (KeyMaterial::Rsa { .. }, alg) => alg.is_rsa(),
            (KeyMaterial::EllipticCurve { curve, .. }, alg) => alg.curve() == Some(*curve),
        }
    }

    /// Can this key participate in `alg` key management?
    pub fn supports_key_management(&self, alg: KeyManagementAlgorithm) -> bool {
        match (&self.material, alg) {
            (KeyMaterial::Symmetric { .. }, KeyManagementAlgorithm::Dir) => true,
            (KeyMaterial::Symmetric { k }, alg) => alg.kek_len() == Some(k.len()) && !alg.is_ecdh(),
            (KeyMaterial::Rsa { .. }, alg) => alg.is_rsa(),
            (KeyMaterial::EllipticCurve { .. }, alg) => alg.is_ecdh(),
        }
    }

    /// Sets the `kid` attribute.
    #[must_use]
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Sets the `use` attribute.
    #[must_use]
    pub fn with_key_use(mut self, key_use: KeyUse) -> Self {
        self.key_use = Some(key_use);
        self
    }

    /// Sets the `alg` hint.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }

    /// Converts RSA material into backend keys (public plus, when present,
    /// private).
    pub(crate) fn to_rsa_keys(
        &self,
    ) -> Result<(rsa::RsaPublicKey, Option<rsa::RsaPrivateKey>), TokenError> {
        use rsa::BigUint;

        let KeyMaterial::Rsa { n, e, private } = &self.material else {
            return Err(TokenError::KeyNotFound);
        };
        let invalid = |_| TokenError::KeySizeMismatch {
            expected: 256,
            actual: n.len(),
        };
        let public = rsa::RsaPublicKey::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
            .map_err(invalid)?;
        let private = private
            .as_ref()
            .map(|components| {
                rsa::RsaPrivateKey::from_components(
                    BigUint::from_bytes_be(n),
                    BigUint::from_bytes_be(e),
                    BigUint::from_bytes_be(&components.d),
                    vec![
                        BigUint::from_bytes_be(&components.p),
                        BigUint::from_bytes_be(&components.q),
                    ],
                )
                .map_err(invalid)
            })
            .transpose()?;
        Ok((public, private))
    }

    /// Computes the RFC 7638 thumbprint: SHA-256 over the canonical JSON of
    /// the required fields in lexicographic order.
    pub fn thumbprint(&self) -> [u8; 32] {
        let mut digest = Sha256::new();
        let mut fields = ThumbprintWriter::new(&mut digest);
        match &self.material {
            KeyMaterial::Symmetric { k } => {
                fields.bytes_field("k", k);
                fields.str_field("kty", "oct");
            }
            KeyMaterial::Rsa { n, e, .. } => {
                fields.bytes_field("e", e);
                fields.str_field("kty", "RSA");
                fields.bytes_field("n", n);
            }
            KeyMaterial::EllipticCurve { curve, x, y, .. } => {
                fields.str_field("crv", curve.name());
                fields.str_field("kty", "EC");
                fields.bytes_field("x", x);
                fields.bytes_field("y", y);
            }
        }
        fields.finish();
        digest.finalize().into()
    }
}

macro_rules! ec_conversions {
    ($curve:expr, $module:ident, $from_secret:ident, $from_public:ident) => {
        impl Jwk {
            /// Exports an EC private key (with its public half) as a JWK.
            pub fn $from_secret(key: &$module::SecretKey) -> Self {
                let point = key.public_key().to_encoded_point(false);
                Self::new(KeyMaterial::EllipticCurve {
                    curve: $curve,
                    x: point.x().expect("uncompressed point").to_vec(),
                    y: point.y().expect("uncompressed point").to_vec(),
                    d: Some(SecretBytes::new(key.to_bytes().to_vec())),
                })
            }

            /// Exports an EC public key as a JWK.
            pub fn $from_public(key: &$module::PublicKey) -> Self {
                let point = key.to_encoded_point(false);
                Self::new(KeyMaterial::EllipticCurve {
                    curve: $curve,
                    x: point.x().expect("uncompressed point").to_vec(),
                    y: point.y().expect("uncompressed point").to_vec(),
                    d: None,
                })
            }
        }
    };
}

ec_conversions!(EllipticCurve::P256, p256, from_p256_secret_key, from_p256_public_key);
ec_conversions!(EllipticCurve::P384, p384, from_p384_secret_key, from_p384_public_key);
ec_conversions!(EllipticCurve::P521, p521, from_p521_secret_key, from_p521_public_key);

fn check_coordinate(curve: EllipticCurve, coordinate: &[u8]) -> Result<(), TokenError> {
    if coordinate.len() == curve.coordinate_len() {
        Ok(())
    } else {
        Err(TokenError::KeySizeMismatch {
            expected: curve.coordinate_len(),
            actual: coordinate.len(),
        })
    }
}

/// Streams `{"name":"value",...}` into a digest without materializing the
/// canonical JSON.
struct ThumbprintWriter<'a, D: Digest> {
    digest: &'a mut D,
    first: bool,
}

impl<'a, D: Digest> ThumbprintWriter<'a, D> {
    fn new(digest: &'a mut D) -> Self {
        digest.update(b"{");
        Self {
            digest,
            first: true,
        }
    }

    fn key(&mut self, name: &str) {
        if !self.first {
            self.digest.update(b",");
        }
        self.first = false;
        self.digest.update(b"\"");
        self.digest.update(name.as_bytes());
        self.digest.update(b"\":\"");
    }

    fn str_field(&mut self, name: &str, value: &str) {
        self.key(name);
        self.digest.update(value.as_bytes());
        self.digest.update(b"\"");
    }

    fn bytes_field(&mut self, name: &str, value: &[u8]) {
        self.key(name);
        self.digest.update(base64url::encode_string(value).as_bytes());
        self.digest.update(b"\"");
    }

    fn finish(self) {
        self.digest.update(b"}");
    }
}

/// Raw serde image of a JWK; converted to [`Jwk`] with validation.
#[derive(Serialize, Deserialize)]
struct RawJwk {
    kty: String,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    key_use: Option<KeyUse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    key_ops: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    x5c: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    x5t: Option<String>,
    #[serde(rename = "x5t#S256", default, skip_serializing_if = "Option::is_none")]
    x5t_s256: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    k: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    p: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    qi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    y: Option<String>,
}

fn require(field: Option<String>, name: &str) -> Result<Vec<u8>, TokenError> {
    let value =
        field.ok_or_else(|| TokenError::header(anyhow::anyhow!("JWK lacks `{name}` field")))?;
    base64url::decode_vec(value.as_bytes())
}

fn optional(field: Option<String>) -> Result<Option<SecretBytes>, TokenError> {
    field
        .map(|value| base64url::decode_vec(value.as_bytes()).map(SecretBytes::from))
        .transpose()
}

impl TryFrom<RawJwk> for Jwk {
    type Error = TokenError;

    fn try_from(raw: RawJwk) -> Result<Self, Self::Error> {
        let material = match raw.kty.as_str() {
            "oct" => KeyMaterial::Symmetric {
                k: SecretBytes::from(require(raw.k, "k")?),
            },
            "RSA" => {
                let n = require(raw.n, "n")?;
                let e = require(raw.e, "e")?;
                let private = match optional(raw.d)? {
                    Some(d) => Some(RsaPrivateComponents {
                        d,
                        p: optional(raw.p)?.ok_or_else(|| {
                            TokenError::header(anyhow::anyhow!("private RSA JWK lacks `p` field"))
                        })?,
                        q: optional(raw.q)?.ok_or_else(|| {
                            TokenError::header(anyhow::anyhow!("private RSA JWK lacks `q` field"))
                        })?,
                        dp: optional(raw.dp)?,
                        dq: optional(raw.dq)?,
                        qi: optional(raw.qi)?,
                    }),
                    None => None,
                };
                KeyMaterial::Rsa { n, e, private }
            }
            "EC" => {
                let curve = EllipticCurve::from_name(raw.crv.as_deref().unwrap_or_default())?;
                let x = require(raw.x, "x")?;
                let y = require(raw.y, "y")?;
                check_coordinate(curve, &x)?;
                check_coordinate(curve, &y)?;
                KeyMaterial::EllipticCurve {
                    curve,
                    x,
                    y,
                    d: optional(raw.d)?,
                }
            }
            other => {
                return Err(TokenError::header(anyhow::anyhow!(
                    "unsupported JWK key type: {other}"
                )))
            }
        };

        let mut key = Jwk::new(material);
        key.key_id = raw.kid;
        key.key_use = raw.key_use;
        key.algorithm = raw.alg;
        key.key_ops = raw.key_ops;
        key.x5c = raw.x5c;
        key.x5t = raw.x5t;
        key.x5t_s256 = raw.x5t_s256;
        Ok(key)
    }
}

impl Serialize for Jwk {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let b64 = |bytes: &[u8]| Some(base64url::encode_string(bytes));
        let mut raw = RawJwk {
            kty: self.key_type().to_owned(),
            key_use: self.key_use,
            key_ops: self.key_ops.clone(),
            alg: self.algorithm.clone(),
            kid: self.key_id.clone(),
            x5c: self.x5c.clone(),
            x5t: self.x5t.clone(),
            x5t_s256: self.x5t_s256.clone(),
            k: None,
            n: None,
            e: None,
            d: None,
            p: None,
            q: None,
            dp: None,
            dq: None,
            qi: None,
            crv: None,
            x: None,
            y: None,
        };
        match &self.material {
            KeyMaterial::Symmetric { k } => raw.k = b64(k),
            KeyMaterial::Rsa { n, e, private } => {
                raw.n = b64(n);
                raw.e = b64(e);
                if let Some(private) = private {
                    raw.d = b64(&private.d);
                    raw.p = b64(&private.p);
                    raw.q = b64(&private.q);
                    raw.dp = private.dp.as_ref().and_then(|v| b64(v));
                    raw.dq = private.dq.as_ref().and_then(|v| b64(v));
                    raw.qi = private.qi.as_ref().and_then(|v| b64(v));
                }
            }
            KeyMaterial::EllipticCurve { curve, x, y, d } => {
                raw.crv = Some(curve.name().to_owned());
                raw.x = b64(x);
                raw.y = b64(y);
                raw.d = d.as_ref().and_then(|v| b64(v));
            }
        }
        raw.serialize(serializer)
    }
}

/// JSON Web Key Set (RFC 7517 §5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwkSet {
    /// Keys in the set.
    pub keys: Vec<std::sync::Arc<Jwk>>,
}

impl JwkSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key to the set.
    pub fn push(&mut self, key: Jwk) {
        self.keys.push(std::sync::Arc::new(key));
    }

    /// Finds a key by its `kid` attribute.
    pub fn find_by_kid(&self, kid: &str) -> Option<&std::sync::Arc<Jwk>> {
        self.keys
            .iter()
            .find(|key| key.key_id.as_deref() == Some(kid))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn rfc7638_thumbprint_reference() {
        // The RSA key from RFC 7638 §3.1; expected thumbprint
        // NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs.
        let jwk = json!({
            "kty": "RSA",
            "n": "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAt\
                  VT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn6\
                  4tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FD\
                  W2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n9\
                  1CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINH\
                  aQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw",
            "e": "AQAB",
            "alg": "RS256",
            "kid": "2011-04-29",
        });
        let jwk: Jwk = serde_json::from_value(jwk).unwrap();

        assert_eq!(
            base64url::encode_string(&jwk.thumbprint()),
            "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs"
        );
        assert_eq!(jwk.key_id.as_deref(), Some("2011-04-29"));
        assert!(!jwk.is_private());
    }

    #[test]
    fn symmetric_key_round_trips_through_json() {
        let jwk = Jwk::symmetric(b"0123456789abcdef0123456789abcdef".to_vec())
            .with_key_id("hmac-1")
            .with_key_use(KeyUse::Signature);
        let json = serde_json::to_value(&jwk).unwrap();
        assert_eq!(json["kty"], "oct");
        assert_eq!(json["kid"], "hmac-1");
        assert_eq!(json["use"], "sig");

        let restored: Jwk = serde_json::from_value(json).unwrap();
        assert_matches!(
            restored.material(),
            KeyMaterial::Symmetric { k } if **k == *b"0123456789abcdef0123456789abcdef"
        );
        // Identity is per instance, not per material.
        assert_ne!(restored.id(), jwk.id());
    }

    #[test]
    fn ec_coordinate_lengths_are_validated() {
        let jwk = json!({
            "kty": "EC",
            "crv": "P-256",
            "x": base64url::encode_string(&[1; 31]),
            "y": base64url::encode_string(&[2; 32]),
        });
        let err = serde_json::from_value::<Jwk>(jwk).unwrap_err();
        assert!(err.to_string().contains("invalid size"), "{err}");
    }

    #[test]
    fn unknown_curves_are_rejected() {
        let jwk = json!({
            "kty": "EC",
            "crv": "secp256k1",
            "x": base64url::encode_string(&[1; 32]),
            "y": base64url::encode_string(&[2; 32]),
        });
        let err = serde_json::from_value::<Jwk>(jwk).unwrap_err();
        assert!(err.to_string().contains("unsupported curve"), "{err}");
    }

    #[test]
    fn algorithm_compatibility_predicates() {
        use crate::alg::{KeyManagementAlgorithm as Km, SignatureAlgorithm as Sig};

        let oct16 = Jwk::symmetric(vec![0; 16]);
        let oct32 = Jwk::symmetric(vec![0; 32]);
        assert!(oct32.supports_signature(Sig::Hs256));
        assert!(!oct32.supports_signature(Sig::Rs256));
        assert!(!oct32.supports_signature(Sig::None));
        assert!(oct16.supports_key_management(Km::A128Kw));
        assert!(!oct16.supports_key_management(Km::A256Kw));
        assert!(oct16.supports_key_management(Km::Dir));
        assert!(!oct16.supports_key_management(Km::EcdhEsA128Kw));

        let secret = p256::SecretKey::random(&mut rand_core::OsRng);
        let ec = Jwk::from_p256_secret_key(&secret);
        assert!(ec.supports_signature(Sig::Es256));
        assert!(!ec.supports_signature(Sig::Es384));
        assert!(ec.supports_key_management(Km::EcdhEs));
        assert!(ec.is_private());
        assert_eq!(ec.bits(), 256);

        let public = Jwk::from_p256_public_key(&secret.public_key());
        assert!(!public.is_private());
    }

    #[test]
    fn jwk_set_lookup() {
        let mut set = JwkSet::new();
        set.push(Jwk::symmetric(vec![1; 32]).with_key_id("a"));
        set.push(Jwk::symmetric(vec![2; 32]).with_key_id("b"));

        assert_eq!(set.find_by_kid("b").unwrap().key_id.as_deref(), Some("b"));
        assert!(set.find_by_kid("c").is_none());

        let json = serde_json::to_string(&set).unwrap();
        let restored: JwkSet = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.keys.len(), 2);
    }

    #[test]
    fn secret_bytes_are_redacted_in_debug_output() {
        let secret = SecretBytes::new(b"hunter2".to_vec());
        assert_eq!(format!("{secret:?}"), "SecretBytes(\"_\")");
        assert_eq!(secret, SecretBytes::new(b"hunter2".to_vec()));
        assert_ne!(secret, SecretBytes::new(b"hunter3".to_vec()));
    }
}
