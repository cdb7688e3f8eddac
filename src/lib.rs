//! Compact-serialization [JSON Web Tokens (JWT)][JWT] with focus on type
//! safety and secure cryptographic primitives: the signed form ([JWS]), the
//! encrypted form ([JWE]), and the accompanying key model ([JWK]).
//!
//! # Design choices
//!
//! - Algorithm identifiers are closed enums ([`SignatureAlgorithm`],
//!   [`KeyManagementAlgorithm`], [`EncryptionAlgorithm`]); nothing outside
//!   the RFC 7518 registries parses. Identifier parsing is O(1) over the
//!   name bytes.
//! - Keys are typed [`Jwk`] values, immutable after construction. The
//!   [`TokenReader`] never trusts the token to pick an algorithm family the
//!   key does not support, which forecloses [algorithm switching
//!   attacks][switching].
//! - Per-`(key, algorithm)` operation objects (signers, verifiers, key
//!   wrappers) are constructed once and cached for the lifetime of the
//!   reader / writer; the primitive engines inside them are pooled, so
//!   producing or consuming a token is allocation-light and reentrant.
//! - Reading is governed by an explicit [`ValidationPolicy`]: required
//!   signatures, allowed algorithms, candidate keys, issuer / audience
//!   predicates, clock skew, and a hard token-size ceiling.
//!
//! # Supported algorithms
//!
//! | Purpose | Algorithms |
//! |---------|------------|
//! | Signature (`alg`) | `HS256`/`384`/`512`, `RS256`/`384`/`512`, `PS256`/`384`/`512`, `ES256`/`384`/`512`, `none` |
//! | Key management (`alg`) | `dir`, `A128KW`/`A192KW`/`A256KW`, `A128GCMKW`/`A192GCMKW`/`A256GCMKW`, `RSA1_5` (read-only), `RSA-OAEP`, `RSA-OAEP-256`/`384`/`512`, `ECDH-ES`, `ECDH-ES+A128KW`/`A192KW`/`A256KW` |
//! | Content encryption (`enc`) | `A128CBC-HS256`, `A192CBC-HS384`, `A256CBC-HS512`, `A128GCM`, `A192GCM`, `A256GCM` |
//!
//! Symmetric primitives come from the pure-Rust [RustCrypto] crates; RSA and
//! elliptic-curve arithmetic from the [`rsa`] and [`p256`] / [`p384`] /
//! [`p521`] crates.
//!
//! [JWT]: https://tools.ietf.org/html/rfc7519
//! [JWS]: https://tools.ietf.org/html/rfc7515
//! [JWE]: https://tools.ietf.org/html/rfc7516
//! [JWK]: https://tools.ietf.org/html/rfc7517
//! [switching]: https://auth0.com/blog/critical-vulnerabilities-in-json-web-token-libraries/
//! [RustCrypto]: https://github.com/RustCrypto
//! [`rsa`]: https://docs.rs/rsa/
//! [`p256`]: https://docs.rs/p256/
//! [`p384`]: https://docs.rs/p384/
//! [`p521`]: https://docs.rs/p521/
//!
//! # Examples
//!
//! Signed token lifecycle:
//!
//! ```
//! use chrono::Duration;
//! use jose_compact::{prelude::*, Jwk, SignatureAlgorithm};
//!
//! # fn main() -> anyhow::Result<()> {
//! let time_options = TimeOptions::default();
//! let key = Jwk::symmetric(b"super_secret_key_donut_steel_32b".to_vec())
//!     .with_key_id("my-key");
//! let claims = Claims::empty()
//!     .with_subject("alice")
//!     .set_duration_and_issuance(&time_options, Duration::try_days(7).unwrap());
//!
//! let writer = TokenWriter::new();
//! let descriptor = TokenDescriptor::signed(claims, key.clone(), SignatureAlgorithm::Hs256);
//! let token = writer.write(&descriptor)?;
//!
//! let reader = TokenReader::new(ValidationPolicy::new().with_key(key));
//! let jwt = reader.read(token.as_bytes())?;
//! assert_eq!(jwt.header().key_id.as_deref(), Some("my-key"));
//! assert_eq!(jwt.claims().unwrap().subject.as_deref(), Some("alice"));
//! # Ok(())
//! # } // end main()
//! ```
//!
//! Encrypted token with a shared symmetric key:
//!
//! ```
//! use jose_compact::{
//!     prelude::*, EncryptionAlgorithm, Jwk, KeyManagementAlgorithm,
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let key = Jwk::symmetric(vec![0x42; 32]);
//! let descriptor = TokenDescriptor::encrypted_bytes(
//!     b"Live long and prosper.".to_vec(),
//!     key.clone(),
//!     KeyManagementAlgorithm::Dir,
//!     EncryptionAlgorithm::A128CbcHs256,
//! );
//! let token = TokenWriter::new().write(&descriptor)?;
//!
//! let reader = TokenReader::new(ValidationPolicy::new().with_key(key));
//! let jwt = reader.read(token.as_bytes())?;
//! assert_eq!(jwt.bytes(), Some(&b"Live long and prosper."[..]));
//! # Ok(())
//! # } // end main()
//! ```

// Linter settings.
#![warn(missing_debug_implementations, missing_docs, bare_trait_objects)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]

pub mod alg;
pub mod base64url;
mod cipher;
mod claims;
mod digest;
mod error;
pub mod jwk;
mod pool;
mod reader;
mod sign;
mod token;
mod wrap;
mod writer;

/// Prelude to neatly import all necessary stuff from the crate.
pub mod prelude {
    #[doc(no_inline)]
    pub use crate::{
        Claims, JoseHeader, TimeOptions, TokenDescriptor, TokenReader, TokenWriter,
        ValidationPolicy,
    };
}

#[cfg(doctest)]
doc_comment::doctest!("../README.md");

pub use crate::{
    alg::{EncryptionAlgorithm, KeyManagementAlgorithm, SignatureAlgorithm},
    claims::{Audience, Claims, Empty, TimeOptions},
    digest::HashAlg,
    error::TokenError,
    jwk::{EllipticCurve, Jwk, JwkSet, KeyMaterial, KeyUse, SecretBytes},
    reader::{TokenReader, ValidationPolicy, DEFAULT_MAX_NESTED_DEPTH, DEFAULT_MAX_TOKEN_BYTES},
    sign::{Signer, SignerFactory},
    token::{JoseHeader, Jwt, TokenPayload},
    wrap::{KeyWrapper, KeyWrapperFactory, ProducedCek},
    writer::{
        EncryptionOptions, SigningOptions, TokenContent, TokenDescriptor, TokenWriter,
    },
};
