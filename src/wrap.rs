//! Key management for JWE: producing and recovering content-encryption keys
//! (CEKs), plus the content-encryption dispatch itself.
//!
//! A [`KeyWrapper`] is the cached per-`(key, kw-alg, enc-alg)` operation
//! object; the cache key packs both algorithm ids as
//! `(enc_id << 8) | kw_id`. The same construct-then-insert race resolution
//! as the signer factory applies.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use p256::elliptic_curve::generic_array::typenum::Unsigned;
use p256::elliptic_curve::sec1::FromEncodedPoint;
use rand_core::{OsRng, RngCore};
use zeroize::Zeroizing;

use crate::{
    alg::{packed_key_management_id, EncryptionAlgorithm, KeyManagementAlgorithm},
    base64url,
    cipher::{cbc_hmac, check_key_len, gcm, key_wrap},
    digest::HashAlg,
    jwk::{EllipticCurve, Jwk, KeyMaterial, SecretBytes},
    pool::ObjectPool,
    sign::CryptoCacheKey,
    token::JoseHeader,
    TokenError,
};

/// Encrypts a JWE plaintext under `enc`, returning ciphertext and tag.
pub(crate) fn encrypt_content(
    enc: EncryptionAlgorithm,
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), TokenError> {
    check_key_len(cek, enc.key_len())?;
    match enc.cbc_hash() {
        Some(hash) => cbc_hmac::encrypt(hash, cek, iv, aad, plaintext),
        None => gcm::encrypt(cek, iv, aad, plaintext),
    }
}

/// Verifies the tag and decrypts a JWE ciphertext under `enc`.
pub(crate) fn decrypt_content(
    enc: EncryptionAlgorithm,
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>, TokenError> {
    check_key_len(cek, enc.key_len())?;
    match enc.cbc_hash() {
        Some(hash) => cbc_hmac::decrypt(hash, cek, iv, aad, ciphertext, tag),
        None => gcm::decrypt(cek, iv, aad, ciphertext, tag),
    }
}

struct RsaEngine {
    public: rsa::RsaPublicKey,
    private: Option<rsa::RsaPrivateKey>,
}

enum EcdhKeys {
    P256 {
        public: p256::PublicKey,
        secret: Option<p256::SecretKey>,
    },
    P384 {
        public: p384::PublicKey,
        secret: Option<p384::SecretKey>,
    },
    P521 {
        public: p521::PublicKey,
        secret: Option<p521::SecretKey>,
    },
}

enum WrapKind {
    Direct { key: SecretBytes },
    AesKw { kek: SecretBytes },
    AesGcmKw { kek: SecretBytes },
    Rsa { pool: ObjectPool<RsaEngine> },
    Ecdh(EcdhKeys),
}

/// CEK produced by [`KeyWrapper::produce_cek`]; any header parameters the
/// key management contributed (`epk`, `iv`, `tag`) are recorded on the
/// header passed in.
pub struct ProducedCek {
    /// The plaintext content-encryption key; zeroed on drop.
    pub cek: Zeroizing<Vec<u8>>,
    /// The `encrypted_key` segment (empty for direct key agreement).
    pub encrypted_key: Vec<u8>,
}

impl std::fmt::Debug for ProducedCek {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ProducedCek")
            .field("cek", &"_")
            .field("encrypted_key_len", &self.encrypted_key.len())
            .finish()
    }
}

/// Reentrant key-management operation for one `(key, alg, enc)` triple.
pub struct KeyWrapper {
    alg: KeyManagementAlgorithm,
    enc: EncryptionAlgorithm,
    kind: WrapKind,
    disposed: AtomicBool,
}

impl std::fmt::Debug for KeyWrapper {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("KeyWrapper")
            .field("alg", &self.alg)
            .field("enc", &self.enc)
            .finish()
    }
}

macro_rules! public_from_coordinates {
    ($module:ident, $x:expr, $y:expr) => {{
        let point = $module::EncodedPoint::from_affine_coordinates(
            $module::FieldBytes::from_slice($x),
            $module::FieldBytes::from_slice($y),
            false,
        );
        Option::<$module::PublicKey>::from($module::PublicKey::from_encoded_point(&point))
            .ok_or(TokenError::InvalidKeyWrap)?
    }};
}

impl KeyWrapper {
    fn new(
        key: &Jwk,
        alg: KeyManagementAlgorithm,
        enc: EncryptionAlgorithm,
    ) -> Result<Self, TokenError> {
        use KeyManagementAlgorithm as Km;

        let kind = match (key.material(), alg) {
            (KeyMaterial::Symmetric { k }, Km::Dir) => WrapKind::Direct { key: k.clone() },
            (KeyMaterial::Symmetric { k }, alg) if alg.kek_len().is_some() && !alg.is_ecdh() => {
                check_key_len(k, alg.kek_len().expect("checked by the guard"))?;
                let kek = k.clone();
                match alg {
                    Km::A128Kw | Km::A192Kw | Km::A256Kw => WrapKind::AesKw { kek },
                    _ => WrapKind::AesGcmKw { kek },
                }
            }
            (KeyMaterial::Rsa { .. }, alg) if alg.is_rsa() => {
                let bits = key.bits();
                if bits < 2_048 {
                    return Err(TokenError::KeyTooSmall {
                        bits,
                        min_bits: 2_048,
                    });
                }
                let (public, private) = key.to_rsa_keys()?;
                WrapKind::Rsa {
                    pool: ObjectPool::new(move || RsaEngine {
                        public: public.clone(),
                        private: private.clone(),
                    }),
                }
            }
            (KeyMaterial::EllipticCurve { curve, x, y, d }, alg) if alg.is_ecdh() => {
                let d = d.as_ref().map(|d| &**d);
                let keys = match curve {
                    EllipticCurve::P256 => EcdhKeys::P256 {
                        public: public_from_coordinates!(p256, x, y),
                        secret: parse_secret::<p256::NistP256>(d)?,
                    },
                    EllipticCurve::P384 => EcdhKeys::P384 {
                        public: public_from_coordinates!(p384, x, y),
                        secret: parse_secret::<p384::NistP384>(d)?,
                    },
                    EllipticCurve::P521 => EcdhKeys::P521 {
                        public: public_from_coordinates!(p521, x, y),
                        secret: parse_secret::<p521::NistP521>(d)?,
                    },
                };
                WrapKind::Ecdh(keys)
            }
            _ => return Err(TokenError::AlgorithmNotAllowed(alg.name().to_owned())),
        };

        Ok(Self {
            alg,
            enc,
            kind,
            disposed: AtomicBool::new(false),
        })
    }

    fn check_disposed(&self) -> Result<(), TokenError> {
        if self.disposed.load(Ordering::Acquire) {
            Err(TokenError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Produces the CEK for a new token: generates fresh key material where
    /// the algorithm calls for it, wraps it, and records any derived header
    /// parameters (`epk`, `iv`, `tag`) in `header`.
    pub fn produce_cek(&self, header: &mut JoseHeader) -> Result<ProducedCek, TokenError> {
        self.check_disposed()?;
        let enc = self.enc;

        match &self.kind {
            WrapKind::Direct { key } => {
                check_key_len(key, enc.key_len())?;
                Ok(ProducedCek {
                    cek: Zeroizing::new(key.as_ref().to_vec()),
                    encrypted_key: Vec::new(),
                })
            }
            WrapKind::AesKw { kek } => {
                let cek = random_cek(enc);
                let encrypted_key = key_wrap::wrap(kek, &cek)?;
                Ok(ProducedCek { cek, encrypted_key })
            }
            WrapKind::AesGcmKw { kek } => {
                let cek = random_cek(enc);
                let mut iv = [0_u8; gcm::IV_LEN];
                OsRng.fill_bytes(&mut iv);
                let (encrypted_key, tag) = gcm::encrypt(kek, &iv, b"", &cek)?;
                header.wrap_iv = Some(base64url::encode_string(&iv));
                header.wrap_tag = Some(base64url::encode_string(&tag));
                Ok(ProducedCek { cek, encrypted_key })
            }
            WrapKind::Rsa { pool } => {
                // RSA1_5 is decrypt-only; producing new tokens with it is
                // refused.
                if self.alg == KeyManagementAlgorithm::Rsa1_5 {
                    return Err(TokenError::AlgorithmNotAllowed(self.alg.name().to_owned()));
                }
                let cek = random_cek(enc);
                let engine = pool.acquire();
                let encrypted_key = rsa_encrypt(self.alg, &engine.public, &cek)?;
                Ok(ProducedCek { cek, encrypted_key })
            }
            WrapKind::Ecdh(keys) => {
                let (z, epk) = keys.agree_ephemeral()?;
                header.ephemeral_key = Some(epk);
                let derived = self.derive_kdf_key(&z, header)?;
                match self.alg.kek_len() {
                    // ECDH-ES+AxxxKW: the derived key wraps a fresh CEK.
                    Some(_) => {
                        let cek = random_cek(enc);
                        let encrypted_key = key_wrap::wrap(&derived, &cek)?;
                        Ok(ProducedCek { cek, encrypted_key })
                    }
                    // ECDH-ES direct: the derived key is the CEK.
                    None => Ok(ProducedCek {
                        cek: derived,
                        encrypted_key: Vec::new(),
                    }),
                }
            }
        }
    }

    /// Recovers the CEK of a received token.
    pub fn unwrap_cek(
        &self,
        encrypted_key: &[u8],
        header: &JoseHeader,
    ) -> Result<Zeroizing<Vec<u8>>, TokenError> {
        self.check_disposed()?;
        let enc = self.enc;

        match &self.kind {
            WrapKind::Direct { key } => {
                if !encrypted_key.is_empty() {
                    return Err(TokenError::InvalidKeyWrap);
                }
                check_key_len(key, enc.key_len())?;
                Ok(Zeroizing::new(key.as_ref().to_vec()))
            }
            WrapKind::AesKw { kek } => key_wrap::unwrap(kek, encrypted_key),
            WrapKind::AesGcmKw { kek } => {
                let iv = header_param(header.wrap_iv.as_deref(), "iv")?;
                let tag = header_param(header.wrap_tag.as_deref(), "tag")?;
                gcm::decrypt(kek, &iv, b"", encrypted_key, &tag)
                    .map(Zeroizing::new)
                    .map_err(|_| TokenError::InvalidKeyWrap)
            }
            WrapKind::Rsa { pool } => {
                let engine = pool.acquire();
                let private = engine.private.as_ref().ok_or(TokenError::KeyNotFound)?;
                rsa_decrypt(self.alg, private, encrypted_key)
            }
            WrapKind::Ecdh(keys) => {
                let epk = header
                    .ephemeral_key
                    .as_ref()
                    .ok_or_else(|| TokenError::header(anyhow::anyhow!("missing `epk` field")))?;
                let z = keys.agree_with_ephemeral(epk)?;
                let derived = self.derive_kdf_key(&z, header)?;
                match self.alg.kek_len() {
                    Some(_) => key_wrap::unwrap(&derived, encrypted_key),
                    None => {
                        if !encrypted_key.is_empty() {
                            return Err(TokenError::InvalidKeyWrap);
                        }
                        Ok(derived)
                    }
                }
            }
        }
    }

    /// Runs the Concat-KDF over a shared secret, binding the algorithm name
    /// and the `apu` / `apv` parties from the header.
    fn derive_kdf_key(
        &self,
        z: &[u8],
        header: &JoseHeader,
    ) -> Result<Zeroizing<Vec<u8>>, TokenError> {
        let (algorithm_id, key_len) = match self.alg.kek_len() {
            Some(kek_len) => (self.alg.name(), kek_len),
            None => (self.enc.name(), self.enc.key_len()),
        };
        let apu = match &header.agreement_party_u {
            Some(apu) => base64url::decode_vec(apu.as_bytes())?,
            None => Vec::new(),
        };
        let apv = match &header.agreement_party_v {
            Some(apv) => base64url::decode_vec(apv.as_bytes())?,
            None => Vec::new(),
        };
        Ok(concat_kdf(z, algorithm_id, &apu, &apv, key_len))
    }

    pub(crate) fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        if let WrapKind::Rsa { pool } = &self.kind {
            pool.drain();
        }
    }
}

fn parse_secret<C>(
    d: Option<&[u8]>,
) -> Result<Option<p256::elliptic_curve::SecretKey<C>>, TokenError>
where
    C: p256::elliptic_curve::Curve,
{
    d.map(|d| {
        p256::elliptic_curve::SecretKey::<C>::from_slice(d).map_err(|_| {
            TokenError::KeySizeMismatch {
                expected: C::FieldBytesSize::USIZE,
                actual: d.len(),
            }
        })
    })
    .transpose()
}

impl EcdhKeys {
    /// Sender side: generates an ephemeral key pair, agrees with the
    /// recipient public key, and returns the shared secret plus the `epk`.
    fn agree_ephemeral(&self) -> Result<(Zeroizing<Vec<u8>>, Jwk), TokenError> {
        macro_rules! run {
            ($module:ident, $public:expr, $to_jwk:path) => {{
                let ephemeral = $module::ecdh::EphemeralSecret::random(&mut OsRng);
                let epk = $to_jwk(&ephemeral.public_key());
                let shared = ephemeral.diffie_hellman($public);
                (
                    Zeroizing::new(shared.raw_secret_bytes().to_vec()),
                    epk,
                )
            }};
        }

        Ok(match self {
            Self::P256 { public, .. } => run!(p256, public, Jwk::from_p256_public_key),
            Self::P384 { public, .. } => run!(p384, public, Jwk::from_p384_public_key),
            Self::P521 { public, .. } => run!(p521, public, Jwk::from_p521_public_key),
        })
    }

    /// Recipient side: agrees the static secret with the sender's `epk`.
    fn agree_with_ephemeral(&self, epk: &Jwk) -> Result<Zeroizing<Vec<u8>>, TokenError> {
        let KeyMaterial::EllipticCurve {
            curve: epk_curve,
            x,
            y,
            ..
        } = epk.material()
        else {
            return Err(TokenError::header(anyhow::anyhow!(
                "`epk` must be an EC key"
            )));
        };

        macro_rules! run {
            ($module:ident, $curve:expr, $secret:expr) => {{
                if epk_curve != &$curve {
                    return Err(TokenError::UnsupportedCurve(epk_curve.name().to_owned()));
                }
                let secret = $secret.as_ref().ok_or(TokenError::KeyNotFound)?;
                let public = public_from_coordinates!($module, x, y);
                let shared = $module::ecdh::diffie_hellman(
                    secret.to_nonzero_scalar(),
                    public.as_affine(),
                );
                Zeroizing::new(shared.raw_secret_bytes().to_vec())
            }};
        }

        Ok(match self {
            Self::P256 { secret, .. } => run!(p256, EllipticCurve::P256, secret),
            Self::P384 { secret, .. } => run!(p384, EllipticCurve::P384, secret),
            Self::P521 { secret, .. } => run!(p521, EllipticCurve::P521, secret),
        })
    }
}

fn random_cek(enc: EncryptionAlgorithm) -> Zeroizing<Vec<u8>> {
    let mut cek = Zeroizing::new(vec![0_u8; enc.key_len()]);
    OsRng.fill_bytes(&mut cek);
    cek
}

fn header_param(value: Option<&str>, name: &str) -> Result<Vec<u8>, TokenError> {
    let value = value
        .ok_or_else(|| TokenError::header(anyhow::anyhow!("missing `{name}` field")))?;
    base64url::decode_vec(value.as_bytes())
}

fn rsa_encrypt(
    alg: KeyManagementAlgorithm,
    key: &rsa::RsaPublicKey,
    cek: &[u8],
) -> Result<Vec<u8>, TokenError> {
    let result = match alg {
        KeyManagementAlgorithm::RsaOaep => {
            key.encrypt(&mut OsRng, rsa::Oaep::new::<sha1::Sha1>(), cek)
        }
        _ => key.encrypt(&mut OsRng, oaep_sha2(alg), cek),
    };
    result.map_err(|_| TokenError::InvalidKeyWrap)
}

fn rsa_decrypt(
    alg: KeyManagementAlgorithm,
    key: &rsa::RsaPrivateKey,
    encrypted_key: &[u8],
) -> Result<Zeroizing<Vec<u8>>, TokenError> {
    let result = match alg {
        KeyManagementAlgorithm::Rsa1_5 => key.decrypt(rsa::Pkcs1v15Encrypt, encrypted_key),
        KeyManagementAlgorithm::RsaOaep => {
            key.decrypt(rsa::Oaep::new::<sha1::Sha1>(), encrypted_key)
        }
        _ => key.decrypt(oaep_sha2(alg), encrypted_key),
    };
    result
        .map(Zeroizing::new)
        .map_err(|_| TokenError::InvalidKeyWrap)
}

fn oaep_sha2(alg: KeyManagementAlgorithm) -> rsa::Oaep {
    match alg.oaep_hash() {
        Some(HashAlg::Sha256) => rsa::Oaep::new::<sha2::Sha256>(),
        Some(HashAlg::Sha384) => rsa::Oaep::new::<sha2::Sha384>(),
        _ => rsa::Oaep::new::<sha2::Sha512>(),
    }
}

/// Single-step KDF from NIST SP 800-56A §5.8.1 with SHA-256, as profiled by
/// RFC 7518 §4.6.2: otherInfo is the length-prefixed algorithm id, the
/// length-prefixed party infos, and the key bit length.
fn concat_kdf(
    z: &[u8],
    algorithm_id: &str,
    apu: &[u8],
    apv: &[u8],
    key_len: usize,
) -> Zeroizing<Vec<u8>> {
    let len32 = |bytes: &[u8]| (bytes.len() as u32).to_be_bytes();
    let alg_len = len32(algorithm_id.as_bytes());
    let apu_len = len32(apu);
    let apv_len = len32(apv);
    let bits = ((key_len * 8) as u32).to_be_bytes();

    let mut derived = Zeroizing::new(Vec::with_capacity(key_len.next_multiple_of(32)));
    let reps = key_len.div_ceil(32);
    for counter in 1..=reps as u32 {
        let round = HashAlg::Sha256.digest(&[
            &counter.to_be_bytes(),
            z,
            &alg_len,
            algorithm_id.as_bytes(),
            &apu_len,
            apu,
            &apv_len,
            apv,
            &bits,
        ]);
        derived.extend_from_slice(&round);
    }
    derived.truncate(key_len);
    derived
}

/// Process-lifetime cache of [`KeyWrapper`] objects keyed by
/// `(key, kw-alg, enc-alg)`.
#[derive(Debug, Default)]
pub struct KeyWrapperFactory {
    cache: DashMap<CryptoCacheKey, Arc<KeyWrapper>>,
    disposed: AtomicBool,
}

impl KeyWrapperFactory {
    /// Creates an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the operation object for `(key, alg, enc)`, constructing it
    /// on first request; racing constructions retain exactly one object.
    pub fn wrapper(
        &self,
        key: &Jwk,
        alg: KeyManagementAlgorithm,
        enc: EncryptionAlgorithm,
    ) -> Result<Arc<KeyWrapper>, TokenError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(TokenError::Disposed);
        }
        let cache_key = CryptoCacheKey {
            key_id: key.id(),
            alg_id: packed_key_management_id(alg, enc),
        };
        if let Some(existing) = self.cache.get(&cache_key) {
            return Ok(Arc::clone(&existing));
        }

        let created = Arc::new(KeyWrapper::new(key, alg, enc)?);
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

    /// Disposes every cached operation and the factory itself.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        for entry in self.cache.iter() {
            entry.value().dispose();
        }
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::alg::{EncryptionAlgorithm as Enc, KeyManagementAlgorithm as Km};

    fn produce_and_unwrap(key: &Jwk, alg: Km, enc: Enc) {
        let factory = KeyWrapperFactory::new();
        let wrapper = factory.wrapper(key, alg, enc).unwrap();

        let mut header = JoseHeader::empty();
        let produced = wrapper.produce_cek(&mut header).unwrap();
        assert_eq!(produced.cek.len(), enc.key_len());

        let recovered = wrapper
            .unwrap_cek(&produced.encrypted_key, &header)
            .unwrap();
        assert_eq!(recovered, produced.cek);
    }

    #[test]
    fn direct_key_management() {
        let key = Jwk::symmetric(vec![0xCE; 32]);
        produce_and_unwrap(&key, Km::Dir, Enc::A128CbcHs256);
        produce_and_unwrap(&key, Km::Dir, Enc::A256Gcm);

        // Key length must match the CEK size of the `enc`.
        let factory = KeyWrapperFactory::new();
        let wrapper = factory.wrapper(&key, Km::Dir, Enc::A256CbcHs512).unwrap();
        assert_matches!(
            wrapper.produce_cek(&mut JoseHeader::empty()).unwrap_err(),
            TokenError::KeySizeMismatch {
                expected: 64,
                actual: 32
            }
        );
    }

    #[test]
    fn aes_key_wrap_round_trip() {
        for (len, alg) in [(16, Km::A128Kw), (24, Km::A192Kw), (32, Km::A256Kw)] {
            let key = Jwk::symmetric(vec![0x11; len]);
            produce_and_unwrap(&key, alg, Enc::A128CbcHs256);
        }
    }

    #[test]
    fn aes_gcm_key_wrap_round_trip_and_header_params() {
        let key = Jwk::symmetric(vec![0x22; 16]);
        let factory = KeyWrapperFactory::new();
        let wrapper = factory.wrapper(&key, Km::A128GcmKw, Enc::A128Gcm).unwrap();

        let mut header = JoseHeader::empty();
        let produced = wrapper.produce_cek(&mut header).unwrap();
        assert!(header.wrap_iv.is_some());
        assert!(header.wrap_tag.is_some());

        let recovered = wrapper
            .unwrap_cek(&produced.encrypted_key, &header)
            .unwrap();
        assert_eq!(recovered, produced.cek);

        // Tampering with the wrapped key is caught by the GCM tag.
        let mut mangled = produced.encrypted_key.clone();
        mangled[0] ^= 1;
        assert_matches!(
            wrapper.unwrap_cek(&mangled, &header).unwrap_err(),
            TokenError::InvalidKeyWrap
        );
    }

    #[test]
    fn kek_length_is_enforced() {
        let key = Jwk::symmetric(vec![0; 16]);
        let factory = KeyWrapperFactory::new();
        assert_matches!(
            factory.wrapper(&key, Km::A256Kw, Enc::A128Gcm).unwrap_err(),
            TokenError::KeySizeMismatch {
                expected: 32,
                actual: 16
            }
        );
    }

    #[test]
    fn ecdh_es_direct_round_trip() {
        let secret = p256::SecretKey::random(&mut OsRng);
        let recipient = Jwk::from_p256_secret_key(&secret);
        produce_and_unwrap(&recipient, Km::EcdhEs, Enc::A128CbcHs256);
    }

    #[test]
    fn ecdh_es_with_key_wrap_round_trip() {
        let secret = p384::SecretKey::random(&mut OsRng);
        let recipient = Jwk::from_p384_secret_key(&secret);
        produce_and_unwrap(&recipient, Km::EcdhEsA128Kw, Enc::A128Gcm);
        produce_and_unwrap(&recipient, Km::EcdhEsA256Kw, Enc::A256CbcHs512);
    }

    #[test]
    fn concat_kdf_reference() {
        // RFC 7518 Appendix C: ECDH-ES direct derivation for A128GCM with
        // parties "Alice" and "Bob".
        let z = [
            158, 86, 217, 29, 129, 113, 53, 211, 114, 131, 66, 131, 191, 132, 38, 156, 251, 49,
            110, 163, 218, 128, 106, 72, 246, 218, 167, 121, 140, 254, 144, 196,
        ];
        let derived = concat_kdf(&z, "A128GCM", b"Alice", b"Bob", 16);
        assert_eq!(
            base64url::encode_string(&derived),
            "VqqN6vgjbSBcIijNcacQGg"
        );
    }

    #[test]
    fn rsa1_5_is_decrypt_only() {
        let private = rsa::RsaPrivateKey::new(&mut OsRng, 2_048).unwrap();
        let key = Jwk::from_rsa_private_key(&private);
        let factory = KeyWrapperFactory::new();
        let wrapper = factory.wrapper(&key, Km::Rsa1_5, Enc::A128CbcHs256).unwrap();
        assert_matches!(
            wrapper.produce_cek(&mut JoseHeader::empty()).unwrap_err(),
            TokenError::AlgorithmNotAllowed(name) if name == "RSA1_5"
        );
    }

    #[test]
    fn rsa_oaep_round_trip() {
        let private = rsa::RsaPrivateKey::new(&mut OsRng, 2_048).unwrap();
        let key = Jwk::from_rsa_private_key(&private);
        produce_and_unwrap(&key, Km::RsaOaep, Enc::A128Gcm);
        produce_and_unwrap(&key, Km::RsaOaep256, Enc::A256Gcm);
    }

    #[test]
    fn factory_cache_is_keyed_by_packed_algorithm_pair() {
        let key = Jwk::symmetric(vec![0x33; 16]);
        let factory = KeyWrapperFactory::new();

        let first = factory.wrapper(&key, Km::A128Kw, Enc::A128Gcm).unwrap();
        let second = factory.wrapper(&key, Km::A128Kw, Enc::A128Gcm).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        factory.wrapper(&key, Km::A128Kw, Enc::A256Gcm).unwrap();
        factory.wrapper(&key, Km::A128GcmKw, Enc::A128Gcm).unwrap();
        assert_eq!(factory.len(), 3);

        factory.dispose();
        assert_matches!(
            first.produce_cek(&mut JoseHeader::empty()).unwrap_err(),
            TokenError::Disposed
        );
        assert_matches!(
            factory.wrapper(&key, Km::A128Kw, Enc::A128Gcm).unwrap_err(),
            TokenError::Disposed
        );
    }
}
