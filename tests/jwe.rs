//! Tests for encrypted (JWE) tokens: the key-management / content-encryption
//! matrix, nesting, compression, and tamper detection.

use assert_matches::assert_matches;
use rand_core::OsRng;

mod shared;

use crate::shared::create_claims;
use jose_compact::{
    base64url, prelude::*, EncryptionAlgorithm, EncryptionOptions, Jwk, JwkSet,
    KeyManagementAlgorithm, SignatureAlgorithm, TokenError, TokenPayload,
};

const PLAINTEXT: &[u8] = b"Live long and prosper.";

fn all_encryption_algorithms() -> [EncryptionAlgorithm; 6] {
    EncryptionAlgorithm::ALL
}

/// Writes `PLAINTEXT` for `write_key`, reads it back with `read_key`.
fn test_key_management(
    write_key: Jwk,
    read_key: Jwk,
    alg: KeyManagementAlgorithm,
    enc: EncryptionAlgorithm,
) {
    let descriptor = TokenDescriptor::encrypted_bytes(PLAINTEXT.to_vec(), write_key, alg, enc);
    let token = TokenWriter::new().write(&descriptor).unwrap();

    let reader = TokenReader::new(ValidationPolicy::new().with_key(read_key));
    let jwt = reader.read(token.as_bytes()).unwrap();
    assert_eq!(jwt.header().algorithm.as_deref(), Some(alg.name()));
    assert_eq!(jwt.header().encryption.as_deref(), Some(enc.name()));
    assert_eq!(jwt.bytes(), Some(PLAINTEXT), "{alg} / {enc}");
}

#[test]
fn rfc7516_a3_reference_token() {
    //! Example from https://tools.ietf.org/html/rfc7516#appendix-A.3
    //! (A128KW key management with A128CBC-HS256 content encryption).

    const TOKEN: &str =
        "eyJhbGciOiJBMTI4S1ciLCJlbmMiOiJBMTI4Q0JDLUhTMjU2In0.\
         6KB707dM9YTIgHtLvtgWQ8mKwboJW3of9locizkDTHzBC2IlrT1oOQ.\
         AxY8DCtDaGlsbGljb3RoZQ.\
         KDlTtXchhZTGufMYmOYGS4HffxPSUrfmqCHXaI9wOGY.\
         U0m_YmjN04DJvceFICbCVQ";

    let jwk = r#"{"kty":"oct","k":"GawgguFyGrWKav7AX4VKUg"}"#;
    let key: Jwk = serde_json::from_str(jwk).unwrap();
    let reader = TokenReader::new(ValidationPolicy::new().with_key(key));

    let jwt = reader.read(TOKEN.as_bytes()).unwrap();
    let plaintext = jwt.bytes().unwrap();
    let claims: serde_json::Value = serde_json::from_slice(plaintext).unwrap();
    assert_eq!(claims["iss"], "joe");
    assert_eq!(claims["exp"], 1_300_819_380);

    // Flipping a tag bit must break decryption.
    let tag_start = TOKEN.rfind('.').unwrap() + 1;
    let mut tag = base64url::decode_vec(TOKEN[tag_start..].as_bytes()).unwrap();
    tag[0] ^= 1;
    let mut mangled = TOKEN.to_owned();
    mangled.replace_range(tag_start.., &base64url::encode_string(&tag));
    assert_matches!(
        reader.read(mangled.as_bytes()).unwrap_err(),
        TokenError::InvalidTag
    );
}

#[test]
fn direct_encryption_round_trips() {
    for enc in all_encryption_algorithms() {
        let key = Jwk::symmetric(vec![0xCE; enc.key_len()]);
        test_key_management(key.clone(), key, KeyManagementAlgorithm::Dir, enc);
    }
}

#[test]
fn aes_key_wrap_round_trips() {
    use KeyManagementAlgorithm as Km;

    for (len, alg) in [(16, Km::A128Kw), (24, Km::A192Kw), (32, Km::A256Kw)] {
        for enc in all_encryption_algorithms() {
            let key = Jwk::symmetric(vec![0x7F; len]);
            test_key_management(key.clone(), key, alg, enc);
        }
    }
}

#[test]
fn aes_gcm_key_wrap_round_trips() {
    use KeyManagementAlgorithm as Km;

    for (len, alg) in [(16, Km::A128GcmKw), (24, Km::A192GcmKw), (32, Km::A256GcmKw)] {
        for enc in all_encryption_algorithms() {
            let key = Jwk::symmetric(vec![0x2D; len]);
            test_key_management(key.clone(), key, alg, enc);
        }
    }
}

#[test]
fn aes_gcm_key_wrap_emits_header_params() {
    let key = Jwk::symmetric(vec![0x2D; 16]);
    let descriptor = TokenDescriptor::encrypted_bytes(
        PLAINTEXT.to_vec(),
        key.clone(),
        KeyManagementAlgorithm::A128GcmKw,
        EncryptionAlgorithm::A128Gcm,
    );
    let token = TokenWriter::new().write(&descriptor).unwrap();

    let header_end = token.find('.').unwrap();
    let header = base64url::decode_vec(token[..header_end].as_bytes()).unwrap();
    let header: serde_json::Value = serde_json::from_slice(&header).unwrap();
    assert_eq!(header["alg"], "A128GCMKW");
    assert_eq!(
        base64url::decode_vec(header["iv"].as_str().unwrap().as_bytes())
            .unwrap()
            .len(),
        12
    );
    assert_eq!(
        base64url::decode_vec(header["tag"].as_str().unwrap().as_bytes())
            .unwrap()
            .len(),
        16
    );

    let reader = TokenReader::new(ValidationPolicy::new().with_key(key));
    assert_eq!(reader.read(token.as_bytes()).unwrap().bytes(), Some(PLAINTEXT));
}

#[test]
fn rsa_oaep_round_trips() {
    use KeyManagementAlgorithm as Km;

    let private = rsa::RsaPrivateKey::new(&mut OsRng, 2_048).unwrap();
    let write_key = Jwk::from_rsa_public_key(&private.to_public_key());
    let read_key = Jwk::from_rsa_private_key(&private);

    for alg in [Km::RsaOaep, Km::RsaOaep256, Km::RsaOaep384, Km::RsaOaep512] {
        for enc in all_encryption_algorithms() {
            test_key_management(write_key.clone(), read_key.clone(), alg, enc);
        }
    }
}

#[test]
fn ecdh_es_round_trips() {
    use KeyManagementAlgorithm as Km;

    // Receiver key pair on P-256; the sender only sees the public half.
    let secret = p256::SecretKey::random(&mut OsRng);
    let write_key = Jwk::from_p256_public_key(&secret.public_key());
    let read_key = Jwk::from_p256_secret_key(&secret);

    for alg in [Km::EcdhEs, Km::EcdhEsA128Kw, Km::EcdhEsA192Kw, Km::EcdhEsA256Kw] {
        for enc in all_encryption_algorithms() {
            test_key_management(write_key.clone(), read_key.clone(), alg, enc);
        }
    }
}

#[test]
fn ecdh_es_on_larger_curves() {
    use KeyManagementAlgorithm as Km;

    let secret = p384::SecretKey::random(&mut OsRng);
    let write_key = Jwk::from_p384_public_key(&secret.public_key());
    let read_key = Jwk::from_p384_secret_key(&secret);
    test_key_management(write_key, read_key, Km::EcdhEs, EncryptionAlgorithm::A128Gcm);

    let secret = p521::SecretKey::random(&mut OsRng);
    let write_key = Jwk::from_p521_public_key(&secret.public_key());
    let read_key = Jwk::from_p521_secret_key(&secret);
    test_key_management(
        write_key,
        read_key,
        Km::EcdhEsA256Kw,
        EncryptionAlgorithm::A256CbcHs512,
    );
}

#[test]
fn nested_token_unwraps_one_layer() {
    let sign_key = Jwk::symmetric(vec![0x6B; 32]).with_key_id("sig");
    let enc_key = Jwk::symmetric(vec![0xCE; 32]).with_key_id("enc");

    let descriptor = TokenDescriptor::signed(
        create_claims().with_issuer("joe"),
        sign_key.clone(),
        SignatureAlgorithm::Hs256,
    )
    .encrypt_with(EncryptionOptions::new(
        enc_key.clone(),
        KeyManagementAlgorithm::Dir,
        EncryptionAlgorithm::A128CbcHs256,
    ));
    let token = TokenWriter::new().write(&descriptor).unwrap();

    let mut keys = JwkSet::new();
    keys.push(sign_key);
    keys.push(enc_key);
    let reader = TokenReader::new(ValidationPolicy::new().with_keys(keys));

    let jwt = reader.read(token.as_bytes()).unwrap();
    assert_eq!(jwt.header().content_type.as_deref(), Some("JWT"));
    let inner = match jwt.payload() {
        TokenPayload::Nested(inner) => inner,
        other => panic!("unexpected payload: {other:?}"),
    };
    assert_eq!(inner.header().algorithm.as_deref(), Some("HS256"));
    // `claims()` drills through exactly one nesting level.
    let claims = jwt.claims().unwrap();
    assert_eq!(claims.issuer.as_deref(), Some("joe"));
    assert_eq!(claims.subject.as_deref(), Some("1234567890"));
}

#[test]
fn nested_depth_is_bounded() {
    let sign_key = Jwk::symmetric(vec![0x6B; 32]).with_key_id("sig");
    let enc_key = Jwk::symmetric(vec![0xCE; 32]).with_key_id("enc");

    let inner = TokenDescriptor::signed(
        create_claims(),
        sign_key.clone(),
        SignatureAlgorithm::Hs256,
    )
    .encrypt_with(EncryptionOptions::new(
        enc_key.clone(),
        KeyManagementAlgorithm::Dir,
        EncryptionAlgorithm::A128CbcHs256,
    ));
    let inner_token = TokenWriter::new().write(&inner).unwrap();

    // Wrap the JWE in another JWE by hand, marking it as a nested token.
    let mut header = JoseHeader::empty();
    header.content_type = Some("JWT".to_owned());
    let outer = TokenDescriptor::encrypted_bytes(
        inner_token.into_bytes(),
        enc_key.clone(),
        KeyManagementAlgorithm::Dir,
        EncryptionAlgorithm::A128CbcHs256,
    )
    .with_header(header);
    let token = TokenWriter::new().write(&outer).unwrap();

    let mut keys = JwkSet::new();
    keys.push(sign_key);
    keys.push(enc_key);

    let strict = TokenReader::new(ValidationPolicy::new().with_keys(keys.clone()));
    assert_matches!(
        strict.read(token.as_bytes()).unwrap_err(),
        TokenError::NestedTokenLimitExceeded
    );

    let mut policy = ValidationPolicy::new().with_keys(keys);
    policy.max_nested_depth = 2;
    let lenient = TokenReader::new(policy);
    let jwt = lenient.read(token.as_bytes()).unwrap();
    assert_eq!(jwt.claims().unwrap().subject.as_deref(), Some("1234567890"));
}

#[test]
fn compressed_tokens_round_trip() {
    let key = Jwk::symmetric(vec![0xCE; 32]);
    let payload = vec![0x41_u8; 8 * 1024];
    let descriptor = TokenDescriptor::encrypted_bytes(
        payload.clone(),
        key.clone(),
        KeyManagementAlgorithm::Dir,
        EncryptionAlgorithm::A128CbcHs256,
    )
    .encrypt_with(
        EncryptionOptions::new(
            key.clone(),
            KeyManagementAlgorithm::Dir,
            EncryptionAlgorithm::A128CbcHs256,
        )
        .with_compression(),
    );
    let token = TokenWriter::new().write(&descriptor).unwrap();
    // 8 KiB of a single letter compresses well below the raw payload.
    assert!(token.len() < payload.len() / 2);

    let header = base64url::decode_vec(token[..token.find('.').unwrap()].as_bytes()).unwrap();
    let header: serde_json::Value = serde_json::from_slice(&header).unwrap();
    assert_eq!(header["zip"], "DEF");

    let reader = TokenReader::new(ValidationPolicy::new().with_key(key));
    assert_eq!(
        reader.read(token.as_bytes()).unwrap().bytes(),
        Some(&payload[..])
    );
}

#[test]
fn decompression_respects_the_size_ceiling() {
    let key = Jwk::symmetric(vec![0xCE; 32]);
    // Compresses to a couple hundred bytes, expands to 64 KiB.
    let descriptor = TokenDescriptor::encrypted_bytes(
        vec![0x41_u8; 64 * 1024],
        key.clone(),
        KeyManagementAlgorithm::Dir,
        EncryptionAlgorithm::A128CbcHs256,
    )
    .encrypt_with(
        EncryptionOptions::new(
            key.clone(),
            KeyManagementAlgorithm::Dir,
            EncryptionAlgorithm::A128CbcHs256,
        )
        .with_compression(),
    );
    let token = TokenWriter::new().write(&descriptor).unwrap();
    assert!(token.len() < 16 * 1024);

    let reader = TokenReader::new(
        ValidationPolicy::new()
            .with_key(key)
            .with_max_token_bytes(16 * 1024),
    );
    assert_matches!(
        reader.read(token.as_bytes()).unwrap_err(),
        TokenError::TokenTooLarge {
            limit: 16_384,
            ..
        }
    );
}

#[test]
fn tampering_with_any_segment_is_detected() {
    let key = Jwk::symmetric(vec![0x7F; 16]);
    let descriptor = TokenDescriptor::encrypted_bytes(
        PLAINTEXT.to_vec(),
        key.clone(),
        KeyManagementAlgorithm::A128Kw,
        EncryptionAlgorithm::A128CbcHs256,
    );
    let token = TokenWriter::new().write(&descriptor).unwrap();
    let reader = TokenReader::new(ValidationPolicy::new().with_key(key));

    let segments: Vec<&str> = token.split('.').collect();
    let rebuild = |segments: &[String]| segments.join(".");

    // Encrypted key: unwrap integrity fails.
    let mut mangled: Vec<String> = segments.iter().map(|s| (*s).to_owned()).collect();
    let mut ek = base64url::decode_vec(segments[1].as_bytes()).unwrap();
    ek[0] ^= 1;
    mangled[1] = base64url::encode_string(&ek);
    assert_matches!(
        reader.read(rebuild(&mangled).as_bytes()).unwrap_err(),
        TokenError::InvalidKeyWrap
    );

    // IV, ciphertext and tag: the composite MAC fails.
    for segment in 2..5 {
        let mut mangled: Vec<String> = segments.iter().map(|s| (*s).to_owned()).collect();
        let mut bytes = base64url::decode_vec(segments[segment].as_bytes()).unwrap();
        bytes[0] ^= 1;
        mangled[segment] = base64url::encode_string(&bytes);
        assert_matches!(
            reader.read(rebuild(&mangled).as_bytes()).unwrap_err(),
            TokenError::InvalidTag,
            "segment = {segment}"
        );
    }

    // Header (the AAD): the MAC fails as well.
    let mut mangled: Vec<String> = segments.iter().map(|s| (*s).to_owned()).collect();
    mangled[0] = base64url::encode_string(
        br#"{"alg":"A128KW","enc":"A128CBC-HS256","x":1}"#,
    );
    assert_matches!(
        reader.read(rebuild(&mangled).as_bytes()).unwrap_err(),
        TokenError::InvalidTag
    );
}

#[test]
fn missing_enc_header_is_rejected() {
    let key = Jwk::symmetric(vec![0xCE; 32]);
    let reader = TokenReader::new(ValidationPolicy::new().with_key(key));
    let header = base64url::encode_string(br#"{"alg":"dir"}"#);
    let token = format!("{header}....");
    assert_matches!(
        reader.read(token.as_bytes()).unwrap_err(),
        TokenError::HeaderInvalid(_)
    );
}

#[test]
fn empty_cbc_plaintext_is_rejected() {
    let key = Jwk::symmetric(vec![0xCE; 32]);
    let descriptor = TokenDescriptor::encrypted_bytes(
        Vec::new(),
        key,
        KeyManagementAlgorithm::Dir,
        EncryptionAlgorithm::A128CbcHs256,
    );
    assert_matches!(
        TokenWriter::new().write(&descriptor).unwrap_err(),
        TokenError::MalformedToken
    );
}

#[test]
fn direct_key_must_match_cek_length() {
    let key = Jwk::symmetric(vec![0xCE; 16]);
    let descriptor = TokenDescriptor::encrypted_bytes(
        PLAINTEXT.to_vec(),
        key,
        KeyManagementAlgorithm::Dir,
        EncryptionAlgorithm::A128CbcHs256,
    );
    assert_matches!(
        TokenWriter::new().write(&descriptor).unwrap_err(),
        TokenError::KeySizeMismatch {
            expected: 32,
            actual: 16
        }
    );
}
