//! Signature creation and verification (JWS), with per-`(key, algorithm)`
//! operation objects cached for the process lifetime.
//!
//! A [`Signer`] is reentrant: the immutable key parameters are parsed once,
//! and the stateful backend engines (RSA / ECDSA handles) live in an
//! [`ObjectPool`](crate::pool) that serializes their use. The
//! [`SignerFactory`] cache maps [`Jwk` identity](crate::jwk::Jwk) plus the
//! algorithm id to at most one operation object; when two threads race to
//! construct the same entry, the loser's object is disposed and the winner's
//! is shared.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use rand_core::OsRng;

use crate::{
    alg::SignatureAlgorithm,
    digest::HashAlg,
    jwk::{EllipticCurve, Jwk, KeyMaterial, SecretBytes},
    pool::ObjectPool,
    TokenError,
};

/// Cache key of the factory maps: `Jwk` instance identity plus algorithm id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CryptoCacheKey {
    pub key_id: u64,
    pub alg_id: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RsaPadding {
    Pkcs1v15,
    Pss,
}

struct RsaEngine {
    private: Option<rsa::RsaPrivateKey>,
    public: rsa::RsaPublicKey,
}

struct EcEngine<S, V> {
    signing: Option<S>,
    verifying: V,
}

type P256Engine = EcEngine<p256::ecdsa::SigningKey, p256::ecdsa::VerifyingKey>;
type P384Engine = EcEngine<p384::ecdsa::SigningKey, p384::ecdsa::VerifyingKey>;
type P521Engine = EcEngine<p521::ecdsa::SigningKey, p521::ecdsa::VerifyingKey>;

enum SignOp {
    None,
    Hmac {
        hash: HashAlg,
        key: SecretBytes,
    },
    Rsa {
        hash: HashAlg,
        padding: RsaPadding,
        pool: ObjectPool<RsaEngine>,
    },
    P256(ObjectPool<P256Engine>),
    P384(ObjectPool<P384Engine>),
    P521(ObjectPool<P521Engine>),
}

/// Reentrant signing / verification operation for one `(key, algorithm)`
/// pair. Obtained from a [`SignerFactory`].
pub struct Signer {
    alg: SignatureAlgorithm,
    signature_len: usize,
    can_sign: bool,
    op: SignOp,
    disposed: AtomicBool,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Signer")
            .field("alg", &self.alg)
            .field("signature_len", &self.signature_len)
            .finish()
    }
}

macro_rules! build_ec_op {
    ($module:ident, $x:expr, $y:expr, $d:expr) => {{
        let point = $module::EncodedPoint::from_affine_coordinates(
            $module::FieldBytes::from_slice($x),
            $module::FieldBytes::from_slice($y),
            false,
        );
        let verifying = $module::ecdsa::VerifyingKey::from_encoded_point(&point)
            .map_err(|_| TokenError::InvalidSignature)?;
        let signing = $d
            .map(|d| {
                $module::ecdsa::SigningKey::from_slice(d)
                    .map_err(|_| TokenError::KeySizeMismatch {
                        expected: $module::FieldBytes::default().len(),
                        actual: d.len(),
                    })
            })
            .transpose()?;
        ObjectPool::new(move || EcEngine {
            signing: signing.clone(),
            verifying: verifying.clone(),
        })
    }};
}

macro_rules! ec_sign {
    ($module:ident, $pool:expr, $message:expr) => {{
        use p256::ecdsa::signature::Signer as _;

        let engine = $pool.acquire();
        let signing = engine.signing.as_ref().ok_or(TokenError::KeyNotFound)?;
        let signature: $module::ecdsa::Signature = signing.sign($message);
        signature.to_bytes().to_vec()
    }};
}

macro_rules! ec_verify {
    ($module:ident, $pool:expr, $message:expr, $signature:expr) => {{
        use p256::ecdsa::signature::Verifier as _;

        match $module::ecdsa::Signature::from_slice($signature) {
            Ok(signature) => {
                let engine = $pool.acquire();
                engine.verifying.verify($message, &signature).is_ok()
            }
            Err(_) => false,
        }
    }};
}

impl Signer {
    fn new(key: &Jwk, alg: SignatureAlgorithm) -> Result<Self, TokenError> {
        let (op, signature_len, can_sign) = match (key.material(), alg) {
            (_, SignatureAlgorithm::None) => (SignOp::None, 0, true),

            // HMAC accepts keys of any size (short keys are zero-padded per
            // the construction); RFC 7518's hash-length minimum is exposed
            // as `min_key_bits` metadata, not enforced here, since widely
            // deployed reference tokens use shorter secrets.
            (KeyMaterial::Symmetric { k }, alg) if alg.is_hmac() => {
                let hash = alg.hash().expect("HMAC algorithms carry a digest");
                (
                    SignOp::Hmac {
                        hash,
                        key: k.clone(),
                    },
                    hash.output_len(),
                    true,
                )
            }

            (KeyMaterial::Rsa { .. }, alg) if alg.is_rsa() => {
                let bits = key.bits();
                if bits < alg.min_key_bits() {
                    return Err(TokenError::KeyTooSmall {
                        bits,
                        min_bits: alg.min_key_bits(),
                    });
                }
                let (public, private) = key.to_rsa_keys()?;
                let signature_len = (bits + 7) / 8;
                let can_sign = private.is_some();
                let padding = if matches!(
                    alg,
                    SignatureAlgorithm::Ps256 | SignatureAlgorithm::Ps384 | SignatureAlgorithm::Ps512
                ) {
                    RsaPadding::Pss
                } else {
                    RsaPadding::Pkcs1v15
                };
                let pool = ObjectPool::new(move || RsaEngine {
                    private: private.clone(),
                    public: public.clone(),
                });
                (
                    SignOp::Rsa {
                        hash: alg.hash().expect("RSA algorithms carry a digest"),
                        padding,
                        pool,
                    },
                    signature_len,
                    can_sign,
                )
            }

            (KeyMaterial::EllipticCurve { curve, x, y, d }, alg) if alg.is_ecdsa() => {
                if alg.curve() != Some(*curve) {
                    return Err(TokenError::UnsupportedCurve(curve.name().to_owned()));
                }
                let d = d.as_ref().map(|d| &**d);
                let can_sign = d.is_some();
                let signature_len = curve.coordinate_len() * 2;
                let op = match curve {
                    EllipticCurve::P256 => SignOp::P256(build_ec_op!(p256, x, y, d)),
                    EllipticCurve::P384 => SignOp::P384(build_ec_op!(p384, x, y, d)),
                    EllipticCurve::P521 => SignOp::P521(build_ec_op!(p521, x, y, d)),
                };
                (op, signature_len, can_sign)
            }

            _ => {
                return Err(TokenError::AlgorithmNotAllowed(alg.name().to_owned()));
            }
        };

        Ok(Self {
            alg,
            signature_len,
            can_sign,
            op,
            disposed: AtomicBool::new(false),
        })
    }

    /// Algorithm this operation implements.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.alg
    }

    /// Exact signature size in bytes.
    pub fn signature_len(&self) -> usize {
        self.signature_len
    }

    /// Can this operation produce signatures (i.e. was it built from a
    /// private key)?
    pub fn can_sign(&self) -> bool {
        self.can_sign
    }

    fn check_disposed(&self) -> Result<(), TokenError> {
        if self.disposed.load(Ordering::Acquire) {
            Err(TokenError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Signs `message` into `dest`, returning the number of bytes written.
    pub fn try_sign(&self, message: &[u8], dest: &mut [u8]) -> Result<usize, TokenError> {
        self.check_disposed()?;
        if dest.len() < self.signature_len {
            return Err(TokenError::DestinationTooSmall {
                needed: self.signature_len,
            });
        }
        if !self.can_sign {
            return Err(TokenError::KeyNotFound);
        }
        let dest = &mut dest[..self.signature_len];

        match &self.op {
            SignOp::None => {}
            SignOp::Hmac { hash, key } => {
                hash.hmac_into(key, &[message], dest)?;
            }
            SignOp::Rsa {
                hash,
                padding,
                pool,
            } => {
                let mut digest = [0_u8; 64];
                let digest_len = hash.digest_into(&[message], &mut digest)?;
                let engine = pool.acquire();
                let private = engine.private.as_ref().ok_or(TokenError::KeyNotFound)?;
                let signature = rsa_sign(*hash, *padding, private, &digest[..digest_len])?;
                dest.copy_from_slice(&signature);
            }
            SignOp::P256(pool) => dest.copy_from_slice(&ec_sign!(p256, pool, message)),
            SignOp::P384(pool) => dest.copy_from_slice(&ec_sign!(p384, pool, message)),
            SignOp::P521(pool) => dest.copy_from_slice(&ec_sign!(p521, pool, message)),
        }
        Ok(self.signature_len)
    }

    /// Signs `message` into a fresh vector.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, TokenError> {
        let mut signature = vec![0_u8; self.signature_len];
        let written = self.try_sign(message, &mut signature)?;
        signature.truncate(written);
        Ok(signature)
    }

    /// Verifies `signature` over `message`. Backend failures (malformed or
    /// mismatched signatures alike) report as `false`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool, TokenError> {
        self.check_disposed()?;

        Ok(match &self.op {
            SignOp::None => signature.is_empty(),
            SignOp::Hmac { hash, key } => {
                signature.len() == hash.output_len()
                    && hash.hmac_verify(key, &[message], signature)
            }
            SignOp::Rsa {
                hash,
                padding,
                pool,
            } => {
                let mut digest = [0_u8; 64];
                let digest_len = hash
                    .digest_into(&[message], &mut digest)
                    .expect("stack scratch fits any SHA-2 output");
                let engine = pool.acquire();
                rsa_verify(
                    *hash,
                    *padding,
                    &engine.public,
                    &digest[..digest_len],
                    signature,
                )
            }
            SignOp::P256(pool) => ec_verify!(p256, pool, message, signature),
            SignOp::P384(pool) => ec_verify!(p384, pool, message, signature),
            SignOp::P521(pool) => ec_verify!(p521, pool, message, signature),
        })
    }

    pub(crate) fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        match &self.op {
            SignOp::Rsa { pool, .. } => pool.drain(),
            SignOp::P256(pool) => pool.drain(),
            SignOp::P384(pool) => pool.drain(),
            SignOp::P521(pool) => pool.drain(),
            SignOp::None | SignOp::Hmac { .. } => {}
        }
    }
}

fn rsa_sign(
    hash: HashAlg,
    padding: RsaPadding,
    key: &rsa::RsaPrivateKey,
    digest: &[u8],
) -> Result<Vec<u8>, TokenError> {
    let result = match padding {
        RsaPadding::Pkcs1v15 => key.sign_with_rng(&mut OsRng, pkcs1v15_scheme(hash), digest),
        RsaPadding::Pss => key.sign_with_rng(&mut OsRng, pss_scheme(hash), digest),
    };
    result.map_err(|_| TokenError::InvalidSignature)
}

fn rsa_verify(
    hash: HashAlg,
    padding: RsaPadding,
    key: &rsa::RsaPublicKey,
    digest: &[u8],
    signature: &[u8],
) -> bool {
    match padding {
        RsaPadding::Pkcs1v15 => key.verify(pkcs1v15_scheme(hash), digest, signature).is_ok(),
        RsaPadding::Pss => key.verify(pss_scheme(hash), digest, signature).is_ok(),
    }
}

fn pkcs1v15_scheme(hash: HashAlg) -> rsa::Pkcs1v15Sign {
    match hash {
        HashAlg::Sha256 => rsa::Pkcs1v15Sign::new::<sha2::Sha256>(),
        HashAlg::Sha384 => rsa::Pkcs1v15Sign::new::<sha2::Sha384>(),
        HashAlg::Sha512 => rsa::Pkcs1v15Sign::new::<sha2::Sha512>(),
    }
}

fn pss_scheme(hash: HashAlg) -> rsa::Pss {
    // RFC 7518 §3.5: the salt length equals the hash output length.
    match hash {
        HashAlg::Sha256 => rsa::Pss::new_with_salt::<sha2::Sha256>(32),
        HashAlg::Sha384 => rsa::Pss::new_with_salt::<sha2::Sha384>(48),
        HashAlg::Sha512 => rsa::Pss::new_with_salt::<sha2::Sha512>(64),
    }
}

/// Process-lifetime cache of [`Signer`] objects keyed by `(key, algorithm)`.
#[derive(Debug, Default)]
pub struct SignerFactory {
    cache: DashMap<CryptoCacheKey, Arc<Signer>>,
    disposed: AtomicBool,
}

impl SignerFactory {
    /// Creates an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the operation object for `(key, alg)`, constructing it if
    /// this is the first request.
    ///
    /// A given pair ever yields one retained object; when two threads race
    /// to construct it, exactly one instance is inserted and the other is
    /// disposed.
    pub fn signer(&self, key: &Jwk, alg: SignatureAlgorithm) -> Result<Arc<Signer>, TokenError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(TokenError::Disposed);
        }
        let cache_key = CryptoCacheKey {
            key_id: key.id(),
            alg_id: u16::from(alg.id()),
        };
        if let Some(existing) = self.cache.get(&cache_key) {
            return Ok(Arc::clone(&existing));
        }

        let created = Arc::new(Signer::new(key, alg)?);
        match self.cache.entry(cache_key) {
            Entry::Occupied(entry) => {
                created.dispose();
                Ok(Arc::clone(entry.get()))
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&created));
                Ok(created)
            }
        }
    }

    /// Number of retained operation objects.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Is the cache empty?
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Disposes every cached operation and marks the factory itself
    /// disposed; subsequent calls fail with [`TokenError::Disposed`].
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        for entry in self.cache.iter() {
            entry.value().dispose();
        }
        self.cache.clear();
    }
}
