//! Compact-serialization writer: build header, sign, optionally compress
//! and encrypt, emit.

use std::io::Write;
use std::sync::Arc;

use rand_core::{OsRng, RngCore};
use serde::Serialize;

use crate::{
    alg::{EncryptionAlgorithm, KeyManagementAlgorithm, SignatureAlgorithm},
    base64url,
    claims::{Claims, Empty},
    jwk::Jwk,
    sign::SignerFactory,
    token::JoseHeader,
    wrap::{encrypt_content, KeyWrapperFactory},
    TokenError,
};

/// Signing half of a [`TokenDescriptor`].
#[derive(Debug, Clone)]
pub struct SigningOptions {
    /// Signing key; may be omitted only for `alg: none`.
    pub key: Option<Arc<Jwk>>,
    /// Signature algorithm.
    pub algorithm: SignatureAlgorithm,
}

impl SigningOptions {
    /// Signs with `key` under `algorithm`.
    pub fn new(key: impl Into<Arc<Jwk>>, algorithm: SignatureAlgorithm) -> Self {
        Self {
            key: Some(key.into()),
            algorithm,
        }
    }

    /// Produces an unsecured (`alg: none`) token.
    pub fn unsecured() -> Self {
        Self {
            key: None,
            algorithm: SignatureAlgorithm::None,
        }
    }
}

/// Encryption half of a [`TokenDescriptor`].
#[derive(Debug, Clone)]
pub struct EncryptionOptions {
    /// Recipient (or shared) key.
    pub key: Arc<Jwk>,
    /// Key-management algorithm.
    pub algorithm: KeyManagementAlgorithm,
    /// Content-encryption algorithm.
    pub encryption: EncryptionAlgorithm,
    /// DEFLATE-compress the plaintext (`zip: DEF`).
    pub compress: bool,
}

impl EncryptionOptions {
    /// Encrypts for `key` with the given algorithms.
    pub fn new(
        key: impl Into<Arc<Jwk>>,
        algorithm: KeyManagementAlgorithm,
        encryption: EncryptionAlgorithm,
    ) -> Self {
        Self {
            key: key.into(),
            algorithm,
            encryption,
            compress: false,
        }
    }

    /// Turns on `zip: DEF` compression.
    #[must_use]
    pub fn with_compression(mut self) -> Self {
        self.compress = true;
        self
    }
}

/// Payload of a token to produce.
#[derive(Debug, Clone)]
pub enum TokenContent<T = Empty> {
    /// A claims object, serialized to JSON.
    Claims(Claims<T>),
    /// Raw bytes (JWE only).
    Bytes(Vec<u8>),
}

/// Everything needed to produce one token: header, payload, and the signing
/// and/or encryption options. Signing alone yields a JWS; encryption wraps
/// either the raw payload or, when both are present, the signed token as a
/// nested `cty: JWT`.
#[derive(Debug, Clone)]
pub struct TokenDescriptor<T = Empty> {
    /// Header fields of the outermost produced token; `alg` / `enc` / `zip`
    /// are filled by the writer.
    pub header: JoseHeader,
    /// Token payload.
    pub payload: TokenContent<T>,
    /// Signature options; `None` produces an unsigned JWE.
    pub signing: Option<SigningOptions>,
    /// Encryption options; `None` produces a plain JWS.
    pub encryption: Option<EncryptionOptions>,
}

impl<T> TokenDescriptor<T> {
    /// Describes a signed token with the given claims.
    pub fn signed(
        claims: Claims<T>,
        key: impl Into<Arc<Jwk>>,
        algorithm: SignatureAlgorithm,
    ) -> Self {
        Self {
            header: JoseHeader::empty(),
            payload: TokenContent::Claims(claims),
            signing: Some(SigningOptions::new(key, algorithm)),
            encryption: None,
        }
    }

    /// Describes an encrypted token with the given claims.
    pub fn encrypted(
        claims: Claims<T>,
        key: impl Into<Arc<Jwk>>,
        algorithm: KeyManagementAlgorithm,
        encryption: EncryptionAlgorithm,
    ) -> Self {
        Self {
            header: JoseHeader::empty(),
            payload: TokenContent::Claims(claims),
            signing: None,
            encryption: Some(EncryptionOptions::new(key, algorithm, encryption)),
        }
    }

    /// Replaces the header.
    #[must_use]
    pub fn with_header(mut self, header: JoseHeader) -> Self {
        self.header = header;
        self
    }

    /// Adds encryption on top of an existing descriptor, nesting any signed
    /// token as `cty: JWT`.
    #[must_use]
    pub fn encrypt_with(mut self, encryption: EncryptionOptions) -> Self {
        self.encryption = Some(encryption);
        self
    }
}

impl TokenDescriptor<Empty> {
    /// Describes an encrypted token with an opaque byte payload.
    pub fn encrypted_bytes(
        payload: impl Into<Vec<u8>>,
        key: impl Into<Arc<Jwk>>,
        algorithm: KeyManagementAlgorithm,
        encryption: EncryptionAlgorithm,
    ) -> Self {
        Self {
            header: JoseHeader::empty(),
            payload: TokenContent::Bytes(payload.into()),
            signing: None,
            encryption: Some(EncryptionOptions::new(key, algorithm, encryption)),
        }
    }
}

/// Produces compact-serialized tokens; reentrant, with the same
/// per-`(key, algorithm)` operation caches as the reader.
#[derive(Debug, Default)]
pub struct TokenWriter {
    signers: SignerFactory,
    wrappers: KeyWrapperFactory,
}

impl TokenWriter {
    /// Creates a writer with empty operation caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Produces the compact serialization described by `descriptor`.
    pub fn write<T: Serialize>(
        &self,
        descriptor: &TokenDescriptor<T>,
    ) -> Result<String, TokenError> {
        let payload = match &descriptor.payload {
            TokenContent::Claims(claims) => {
                serde_json::to_vec(claims).map_err(|_| TokenError::MalformedToken)?
            }
            TokenContent::Bytes(bytes) => {
                if descriptor.encryption.is_none() {
                    // A JWS payload must be a JSON claims object.
                    return Err(TokenError::MalformedToken);
                }
                bytes.clone()
            }
        };

        match (&descriptor.signing, &descriptor.encryption) {
            (Some(signing), None) => self.write_jws(&descriptor.header, &payload, signing),
            (None, Some(encryption)) => {
                self.write_jwe(&descriptor.header, payload, encryption, false)
            }
            (Some(signing), Some(encryption)) => {
                // Sign first; the JWE then wraps the JWS as a nested token.
                let inner_header = JoseHeader::empty().with_token_type("JWT");
                let signed = self.write_jws(&inner_header, &payload, signing)?;
                self.write_jwe(&descriptor.header, signed.into_bytes(), encryption, true)
            }
            (None, None) => Err(TokenError::MalformedToken),
        }
    }

    fn write_jws(
        &self,
        header: &JoseHeader,
        payload: &[u8],
        signing: &SigningOptions,
    ) -> Result<String, TokenError> {
        let alg = signing.algorithm;
        let mut header = header.clone();
        header.algorithm = Some(alg.name().to_owned());
        if header.key_id.is_none() {
            header.key_id = signing.key.as_deref().and_then(|key| key.key_id.clone());
        }
        let header_json = header.to_compact_json()?;

        let signer = match (&signing.key, alg) {
            (_, SignatureAlgorithm::None) => None,
            (Some(key), alg) => Some(self.signers.signer(key, alg)?),
            (None, _) => return Err(TokenError::KeyNotFound),
        };
        let signature_len = signer.as_ref().map_or(0, |signer| signer.signature_len());

        // One allocation, sized by the closed-form bound.
        let capacity = base64url::encode_capacity(header_json.len())
            + 1
            + base64url::encode_capacity(payload.len())
            + 1
            + base64url::encode_capacity(signature_len);
        let mut token = String::with_capacity(capacity);
        base64url::encode_to_string(header_json.as_bytes(), &mut token);
        token.push('.');
        base64url::encode_to_string(payload, &mut token);

        if let Some(signer) = signer {
            let signature = signer.sign(token.as_bytes())?;
            token.push('.');
            base64url::encode_to_string(&signature, &mut token);
        } else {
            token.push('.');
        }
        debug_assert!(token.len() <= capacity);
        Ok(token)
    }

    fn write_jwe(
        &self,
        header: &JoseHeader,
        plaintext: Vec<u8>,
        encryption: &EncryptionOptions,
        nested: bool,
    ) -> Result<String, TokenError> {
        let alg = encryption.algorithm;
        let enc = encryption.encryption;

        let mut header = header.clone();
        header.algorithm = Some(alg.name().to_owned());
        header.encryption = Some(enc.name().to_owned());
        if encryption.compress {
            header.compression = Some("DEF".to_owned());
        }
        if header.key_id.is_none() {
            header.key_id = encryption.key.key_id.clone();
        }
        if nested {
            header.content_type = Some("JWT".to_owned());
        }

        let wrapper = self
            .wrappers
            .wrapper(&encryption.key, alg, enc)?;
        // Key management may contribute header fields (`epk`, `iv`, `tag`),
        // so the CEK is produced before the header is serialized.
        let produced = wrapper.produce_cek(&mut header)?;
        let header_json = header.to_compact_json()?;

        let plaintext = if encryption.compress {
            deflate(&plaintext)?
        } else {
            plaintext
        };

        let mut iv = vec![0_u8; enc.iv_len()];
        OsRng.fill_bytes(&mut iv);

        let capacity = base64url::encode_capacity(header_json.len())
            + 1
            + base64url::encode_capacity(produced.encrypted_key.len())
            + 1
            + base64url::encode_capacity(iv.len())
            + 1
            + base64url::encode_capacity(plaintext.len() + 16)
            + 1
            + base64url::encode_capacity(enc.tag_len());
        let mut token = String::with_capacity(capacity);
        base64url::encode_to_string(header_json.as_bytes(), &mut token);

        // The AAD is the raw ASCII of the encoded header.
        let (ciphertext, tag) =
            encrypt_content(enc, &produced.cek, &iv, token.as_bytes(), &plaintext)?;

        token.push('.');
        base64url::encode_to_string(&produced.encrypted_key, &mut token);
        token.push('.');
        base64url::encode_to_string(&iv, &mut token);
        token.push('.');
        base64url::encode_to_string(&ciphertext, &mut token);
        token.push('.');
        base64url::encode_to_string(&tag, &mut token);
        debug_assert!(token.len() <= capacity);
        Ok(token)
    }
}

fn deflate(plaintext: &[u8]) -> Result<Vec<u8>, TokenError> {
    let mut encoder =
        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(plaintext)
        .map_err(|_| TokenError::MalformedToken)?;
    encoder.finish().map_err(|_| TokenError::MalformedToken)
}
