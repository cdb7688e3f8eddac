//! Functionality shared by the `jws` and `jwe` integration tests.
#![allow(dead_code)] // not every test crate uses every helper

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rand::{seq::index::sample as sample_indexes, thread_rng};
use serde::{Deserialize, Serialize};

use jose_compact::{
    base64url, prelude::*, Jwk, SignatureAlgorithm, TokenError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleClaims {
    pub name: String,
    #[serde(default)]
    pub admin: bool,
}

pub fn create_claims() -> Claims<SampleClaims> {
    let claims = SampleClaims {
        name: "John Doe".to_owned(),
        admin: true,
    };
    Claims::new(claims)
        .with_subject("1234567890")
        .set_duration_and_issuance(&TimeOptions::default(), Duration::try_days(7).unwrap())
}

/// Round-trips a signed token and checks that mangling the signature, the
/// header, or the claims breaks verification.
pub fn test_signature_algorithm(signing_key: &Jwk, verifying_key: Jwk, alg: SignatureAlgorithm) {
    // Maximum number of signature bits mangled.
    const MAX_MANGLED_BITS: usize = 128;

    let claims = create_claims();
    let writer = TokenWriter::new();
    let token_string = writer
        .write(&TokenDescriptor::signed(
            claims.clone(),
            signing_key.clone(),
            alg,
        ))
        .unwrap();

    let reader = TokenReader::new(ValidationPolicy::new().with_key(verifying_key));

    // Successful case.
    let token = reader.read(token_string.as_bytes()).unwrap();
    let read_claims = token.claims().unwrap();
    assert_eq!(read_claims.subject.as_deref(), Some("1234567890"));
    assert_eq!(
        read_claims.expiration.unwrap().timestamp(),
        claims.expiration.unwrap().timestamp()
    );
    assert_eq!(read_claims.custom["name"], serde_json::json!("John Doe"));

    // Mutate signature bits.
    let signature = token_string.rsplit('.').next().unwrap();
    let signature_start = token_string.rfind('.').unwrap() + 1;
    let signature = base64url::decode_vec(signature.as_bytes()).unwrap();
    let signature_bits = signature.len() * 8;

    let mangled_bits: Box<dyn Iterator<Item = usize>> = if signature_bits <= MAX_MANGLED_BITS {
        Box::new(0..signature_bits)
    } else {
        let indexes = sample_indexes(&mut thread_rng(), signature_bits, MAX_MANGLED_BITS);
        Box::new(indexes.into_iter())
    };

    for i in mangled_bits {
        let mut mangled_signature = signature.clone();
        mangled_signature[i / 8] ^= 1 << (i % 8) as u8;
        let mangled_signature = base64url::encode_string(&mangled_signature);

        let mut mangled_str = token_string.clone();
        mangled_str.replace_range(signature_start.., &mangled_signature);
        assert_matches!(
            reader.read(mangled_str.as_bytes()).unwrap_err(),
            TokenError::InvalidSignature
        );
    }

    // Mutate the header.
    let mangled_header = format!(r#"{{"alg":"{}","typ":"JWT"}}"#, alg.name());
    let mangled_header = base64url::encode_string(mangled_header.as_bytes());
    let header_end = token_string.find('.').unwrap();
    assert_ne!(mangled_header, token_string[..header_end]);
    let mut mangled_str = token_string.clone();
    mangled_str.replace_range(..header_end, &mangled_header);
    assert_matches!(
        reader.read(mangled_str.as_bytes()).unwrap_err(),
        TokenError::InvalidSignature
    );

    // Mutate the claims.
    let mangled_claims = {
        let mut mangled = claims;
        let issued_at = mangled.issued_at.as_mut().unwrap();
        *issued_at += Duration::try_seconds(1).unwrap();
        mangled
    };
    let claims_string =
        base64url::encode_string(&serde_json::to_vec(&mangled_claims).unwrap());
    assert_ne!(
        claims_string,
        token_string[(header_end + 1)..(signature_start - 1)]
    );
    let mut mangled_str = token_string.clone();
    mangled_str.replace_range((header_end + 1)..(signature_start - 1), &claims_string);
    assert_matches!(
        reader.read(mangled_str.as_bytes()).unwrap_err(),
        TokenError::InvalidSignature
    );
}

/// A claims object with an `exp` this far in the past / future relative to
/// the real clock.
pub fn claims_expiring_at(offset: Duration) -> Claims<SampleClaims> {
    let mut claims = create_claims();
    claims.expiration = Some(Utc::now() + offset);
    claims
}
