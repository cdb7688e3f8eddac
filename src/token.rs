//! Token header and the decoded token representation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{claims::Claims, jwk::Jwk, TokenError};

/// JOSE header of a JWS or JWE (RFC 7515 §4, RFC 7516 §4).
///
/// Field declaration order is serialization order: `alg` always leads,
/// followed by `enc` / `zip` / `kid` when present; unknown fields captured
/// in [`Self::extra`] keep their insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub struct JoseHeader {
    /// `alg`: signature or key-management algorithm name.
    #[serde(rename = "alg", default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,

    /// `enc`: content-encryption algorithm name (JWE only).
    #[serde(rename = "enc", default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<String>,

    /// `zip`: compression applied to the plaintext; only `"DEF"` is
    /// understood.
    #[serde(rename = "zip", default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,

    /// `kid`: identifier of the key that secured the token.
    #[serde(rename = "kid", default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    /// `typ`: application-specific token type.
    #[serde(rename = "typ", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// `cty`: content type of the payload; `"JWT"` marks a nested token.
    #[serde(rename = "cty", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// `crit`: extension headers the producer requires the consumer to
    /// understand.
    #[serde(rename = "crit", default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<Vec<String>>,

    /// `epk`: ephemeral public key of an ECDH-ES exchange.
    #[serde(rename = "epk", default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_key: Option<Jwk>,

    /// `apu`: agreement PartyUInfo (base64url), fed into the Concat-KDF.
    #[serde(rename = "apu", default, skip_serializing_if = "Option::is_none")]
    pub agreement_party_u: Option<String>,

    /// `apv`: agreement PartyVInfo (base64url), fed into the Concat-KDF.
    #[serde(rename = "apv", default, skip_serializing_if = "Option::is_none")]
    pub agreement_party_v: Option<String>,

    /// `iv`: initialization vector of an `AxxxGCMKW` key wrap (base64url).
    #[serde(rename = "iv", default, skip_serializing_if = "Option::is_none")]
    pub wrap_iv: Option<String>,

    /// `tag`: authentication tag of an `AxxxGCMKW` key wrap (base64url).
    #[serde(rename = "tag", default, skip_serializing_if = "Option::is_none")]
    pub wrap_tag: Option<String>,

    /// Application-specific header fields, in insertion order.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JoseHeader {
    /// Creates an empty header.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sets the `typ` field.
    #[must_use]
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    /// Sets the `kid` field.
    #[must_use]
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Adds an application-specific field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    pub(crate) fn parse(bytes: &[u8]) -> Result<Self, TokenError> {
        let header: Self = serde_json::from_slice(bytes).map_err(TokenError::header)?;
        header.validate_schema()?;
        Ok(header)
    }

    fn validate_schema(&self) -> Result<(), TokenError> {
        if self.algorithm.is_none() {
            return Err(TokenError::header(anyhow::anyhow!(
                "header lacks the `alg` field"
            )));
        }
        if let Some(zip) = &self.compression {
            if zip != "DEF" {
                return Err(TokenError::header(anyhow::anyhow!(
                    "unsupported `zip` value: {zip}"
                )));
            }
        }
        if let Some(critical) = &self.critical {
            if critical.is_empty() {
                return Err(TokenError::header(anyhow::anyhow!(
                    "`crit` must not be empty"
                )));
            }
            // No extension headers are implemented, so any criticality
            // demand is unsatisfiable.
            return Err(TokenError::UnknownCriticalHeader(critical[0].clone()));
        }
        Ok(())
    }

    /// Is the payload itself a JWT (`cty: JWT`)?
    pub(crate) fn has_nested_token(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|cty| cty.eq_ignore_ascii_case("JWT"))
    }

    pub(crate) fn to_compact_json(&self) -> Result<String, TokenError> {
        serde_json::to_string(self).map_err(TokenError::header)
    }
}

/// Payload of a decoded token.
#[derive(Debug)]
#[non_exhaustive]
pub enum TokenPayload {
    /// JSON claims of a JWS (or of a JWE whose plaintext is a claims
    /// object).
    Claims(Claims<Map<String, Value>>),
    /// A token nested inside a JWE (`cty: JWT`), already decoded.
    Nested(Box<Jwt>),
    /// Opaque JWE plaintext.
    Bytes(Vec<u8>),
}

/// A token decoded (and, where applicable, decrypted and verified) by the
/// reader. Immutable.
#[derive(Debug)]
#[non_exhaustive]
pub struct Jwt {
    header: JoseHeader,
    payload: TokenPayload,
}

impl Jwt {
    pub(crate) fn new(header: JoseHeader, payload: TokenPayload) -> Self {
        Self { header, payload }
    }

    /// Token header.
    pub fn header(&self) -> &JoseHeader {
        &self.header
    }

    /// Token payload.
    pub fn payload(&self) -> &TokenPayload {
        &self.payload
    }

    /// Claims of this token, or of the singly-nested token for a JWE
    /// wrapping a JWS.
    pub fn claims(&self) -> Option<&Claims<Map<String, Value>>> {
        match &self.payload {
            TokenPayload::Claims(claims) => Some(claims),
            TokenPayload::Nested(inner) => inner.claims(),
            TokenPayload::Bytes(_) => None,
        }
    }

    /// Raw plaintext of a JWE with an opaque payload.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            TokenPayload::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn header_serialization_order() {
        let mut header = JoseHeader::empty()
            .with_key_id("key-1")
            .with_field("custom", true)
            .with_field("other", 42);
        header.algorithm = Some("A128KW".to_owned());
        header.encryption = Some("A128CBC-HS256".to_owned());
        header.compression = Some("DEF".to_owned());

        let json = serde_json::to_string(&header).unwrap();
        assert_eq!(
            json,
            r#"{"alg":"A128KW","enc":"A128CBC-HS256","zip":"DEF","kid":"key-1","custom":true,"other":42}"#
        );
    }

    #[test]
    fn missing_alg_is_rejected() {
        let err = JoseHeader::parse(br#"{"typ":"JWT"}"#).unwrap_err();
        assert_matches!(err, TokenError::HeaderInvalid(_));
    }

    #[test]
    fn non_object_headers_are_rejected() {
        for bytes in [&b"[]"[..], b"42", b"\"alg\"", b"", b"{\"alg\":5}"] {
            assert_matches!(
                JoseHeader::parse(bytes).unwrap_err(),
                TokenError::HeaderInvalid(_)
            );
        }
    }

    #[test]
    fn unknown_zip_is_rejected() {
        let err = JoseHeader::parse(br#"{"alg":"dir","zip":"GZIP"}"#).unwrap_err();
        assert_matches!(err, TokenError::HeaderInvalid(_));
    }

    #[test]
    fn critical_headers_are_rejected() {
        let err =
            JoseHeader::parse(br#"{"alg":"HS256","crit":["b64"],"b64":false}"#).unwrap_err();
        assert_matches!(err, TokenError::UnknownCriticalHeader(name) if name == "b64");
    }

    #[test]
    fn nested_content_type_detection() {
        let header = JoseHeader::parse(br#"{"alg":"dir","cty":"jwt"}"#).unwrap();
        assert!(header.has_nested_token());
        let header = JoseHeader::parse(br#"{"alg":"dir","cty":"json"}"#).unwrap();
        assert!(!header.has_nested_token());
    }
}
