//! Registered JWT claims and time-related validation options.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::TokenError;

/// Clock configuration shared by claim issuance and validation: where the
/// current time comes from, and how much skew the `exp` / `nbf` checks
/// forgive.
///
/// The default reads [`Utc::now()`] and forgives 60 seconds of skew; the
/// reader's [`ValidationPolicy`](crate::ValidationPolicy) carries one of
/// these. A frozen clock makes validation deterministic:
///
/// ```
/// # use chrono::{Duration, Utc};
/// # use jose_compact::{Claims, TimeOptions};
/// let frozen = Utc::now();
/// let options = TimeOptions::new(Duration::zero(), move || frozen);
/// let claims = Claims::empty();
/// assert!(claims.validate_expiration(&options).is_ok());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TimeOptions<F = fn() -> DateTime<Utc>> {
    /// Skew tolerated when comparing time claims against the clock.
    pub leeway: Duration,
    /// Returns the current time.
    pub clock_fn: F,
}

impl<F: Fn() -> DateTime<Utc>> TimeOptions<F> {
    /// Combines a leeway with an arbitrary clock function.
    pub fn new(leeway: Duration, clock_fn: F) -> Self {
        Self { leeway, clock_fn }
    }
}

impl TimeOptions {
    /// Uses the system UTC clock with the given leeway.
    pub fn from_leeway(leeway: Duration) -> Self {
        Self::new(leeway, Utc::now)
    }
}

impl Default for TimeOptions {
    fn default() -> Self {
        Self::from_leeway(Duration::try_seconds(60).expect("60 s fits into Duration"))
    }
}

/// A structure with no fields that can be used as a type parameter to
/// `Claims`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Empty {}

/// `aud` claim: a single audience or a list of them (RFC 7519 §4.1.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// Single audience.
    Single(String),
    /// Several audiences.
    List(Vec<String>),
}

impl Audience {
    /// Does the claim mention `audience`?
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::Single(aud) => aud == audience,
            Self::List(auds) => auds.iter().any(|aud| aud == audience),
        }
    }
}

impl From<&str> for Audience {
    fn from(audience: &str) -> Self {
        Self::Single(audience.to_owned())
    }
}

impl From<Vec<String>> for Audience {
    fn from(audiences: Vec<String>) -> Self {
        Self::List(audiences)
    }
}

/// Claims encoded in a token: the registered claims of RFC 7519 §4.1 plus
/// flattened custom fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Claims<T = Empty> {
    /// `iss` claim: token issuer.
    #[serde(rename = "iss", default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// `sub` claim: token subject.
    #[serde(rename = "sub", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// `aud` claim: intended audience(s).
    #[serde(rename = "aud", default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<Audience>,

    /// `exp` claim: expiration time of the token.
    #[serde(
        rename = "exp",
        default,
        skip_serializing_if = "Option::is_none",
        with = "self::serde_timestamp"
    )]
    pub expiration: Option<DateTime<Utc>>,

    /// `nbf` claim: minimum time at which the token is valid.
    #[serde(
        rename = "nbf",
        default,
        skip_serializing_if = "Option::is_none",
        with = "self::serde_timestamp"
    )]
    pub not_before: Option<DateTime<Utc>>,

    /// `iat` claim: time of token issuance.
    #[serde(
        rename = "iat",
        default,
        skip_serializing_if = "Option::is_none",
        with = "self::serde_timestamp"
    )]
    pub issued_at: Option<DateTime<Utc>>,

    /// `jti` claim: token identifier.
    #[serde(rename = "jti", default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,

    /// Custom claims.
    #[serde(flatten)]
    pub custom: T,
}

impl Claims<Empty> {
    /// Creates an empty claims instance.
    pub fn empty() -> Self {
        Self::new(Empty {})
    }
}

impl<T> Claims<T> {
    /// Creates a new instance with the provided custom claims.
    pub fn new(custom_claims: T) -> Self {
        Self {
            issuer: None,
            subject: None,
            audience: None,
            expiration: None,
            not_before: None,
            issued_at: None,
            token_id: None,
            custom: custom_claims,
        }
    }

    /// Sets the `exp` claim so that the token has the specified `duration`.
    /// The current timestamp is taken from `options`.
    #[must_use]
    pub fn set_duration<F>(self, options: &TimeOptions<F>, duration: Duration) -> Self
    where
        F: Fn() -> DateTime<Utc>,
    {
        Self {
            expiration: Some((options.clock_fn)() + duration),
            ..self
        }
    }

    /// Atomically sets the `iat` and `exp` claims: the first to the current
    /// time from `options`, the second to match the specified `duration`.
    #[must_use]
    pub fn set_duration_and_issuance<F>(self, options: &TimeOptions<F>, duration: Duration) -> Self
    where
        F: Fn() -> DateTime<Utc>,
    {
        let issued_at = (options.clock_fn)();
        Self {
            expiration: Some(issued_at + duration),
            issued_at: Some(issued_at),
            ..self
        }
    }

    /// Sets the `nbf` claim.
    #[must_use]
    pub fn set_not_before(self, moment: DateTime<Utc>) -> Self {
        Self {
            not_before: Some(moment),
            ..self
        }
    }

    /// Sets the `iss` claim.
    #[must_use]
    pub fn with_issuer(self, issuer: impl Into<String>) -> Self {
        Self {
            issuer: Some(issuer.into()),
            ..self
        }
    }

    /// Sets the `sub` claim.
    #[must_use]
    pub fn with_subject(self, subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            ..self
        }
    }

    /// Sets the `aud` claim.
    #[must_use]
    pub fn with_audience(self, audience: impl Into<Audience>) -> Self {
        Self {
            audience: Some(audience.into()),
            ..self
        }
    }

    /// Validates the `exp` claim against the clock and leeway in `options`;
    /// a missing claim passes.
    pub fn validate_expiration<F>(&self, options: &TimeOptions<F>) -> Result<&Self, TokenError>
    where
        F: Fn() -> DateTime<Utc>,
    {
        if let Some(expiration) = self.expiration {
            let expiration_with_leeway = expiration
                .checked_add_signed(options.leeway)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            if (options.clock_fn)() > expiration_with_leeway {
                return Err(TokenError::Expired);
            }
        }
        Ok(self)
    }

    /// Validates the `nbf` claim against the clock and leeway in `options`;
    /// a missing claim passes.
    pub fn validate_maturity<F>(&self, options: &TimeOptions<F>) -> Result<&Self, TokenError>
    where
        F: Fn() -> DateTime<Utc>,
    {
        if let Some(not_before) = self.not_before {
            if (options.clock_fn)() < not_before - options.leeway {
                return Err(TokenError::NotYetValid);
            }
        }
        Ok(self)
    }
}

mod serde_timestamp {
    use core::fmt;

    use chrono::{offset::TimeZone, DateTime, Utc};
    use serde::{
        de::{Error as DeError, Visitor},
        Deserializer, Serializer,
    };

    struct TimestampVisitor;

    impl Visitor<'_> for TimestampVisitor {
        type Value = DateTime<Utc>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("UTC timestamp")
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Utc.timestamp_opt(value, 0)
                .single()
                .ok_or_else(|| E::custom("UTC timestamp overflow"))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            let value = i64::try_from(value).map_err(DeError::custom)?;
            Utc.timestamp_opt(value, 0)
                .single()
                .ok_or_else(|| E::custom("UTC timestamp overflow"))
        }

        #[allow(clippy::cast_possible_truncation)]
        // ^ If truncation occurs, `timestamp_opt()` won't return a single value anyway
        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Utc.timestamp_opt(value as i64, 0)
                .single()
                .ok_or_else(|| E::custom("UTC timestamp overflow"))
        }
    }

    pub fn serialize<S: Serializer>(
        time: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        // `unwrap` is safe due to the `skip_serializing_if` option
        serializer.serialize_i64(time.unwrap().timestamp())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        deserializer.deserialize_i64(TimestampVisitor).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn claims_serialize_to_registered_names() {
        let now = Utc.timestamp_opt(1_516_239_022, 0).single().unwrap();
        let claims = Claims::empty()
            .with_issuer("issuer.example.com")
            .with_subject("1")
            .with_audience("aud.example.com");
        let mut claims = claims;
        claims.expiration = Some(now);

        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "iss": "issuer.example.com",
                "sub": "1",
                "aud": "aud.example.com",
                "exp": 1_516_239_022,
            })
        );
    }

    #[test]
    fn audience_deserializes_from_string_or_array() {
        let claims: Claims = serde_json::from_str(r#"{"aud":"a"}"#).unwrap();
        assert_matches!(&claims.audience, Some(aud) if aud.contains("a"));

        let claims: Claims = serde_json::from_str(r#"{"aud":["a","b"]}"#).unwrap();
        let audience = claims.audience.unwrap();
        assert!(audience.contains("b"));
        assert!(!audience.contains("c"));
    }

    #[test]
    fn expired_claim() {
        let time_options = TimeOptions::default();
        let mut claims = Claims::empty();
        // A missing `exp` claim passes; the reader policy decides whether to
        // require it.
        assert!(claims.validate_expiration(&time_options).is_ok());

        claims.expiration = Some(Utc::now() - Duration::try_hours(1).unwrap());
        assert_matches!(
            claims.validate_expiration(&time_options).unwrap_err(),
            TokenError::Expired
        );

        claims.expiration = Some(Utc::now() - Duration::try_seconds(10).unwrap());
        // Within the default leeway, the claim is still valid.
        assert!(claims.validate_expiration(&time_options).is_ok());
        assert_matches!(
            claims
                .validate_expiration(&TimeOptions::from_leeway(
                    Duration::try_seconds(5).unwrap()
                ))
                .unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn immature_claim() {
        let time_options = TimeOptions::default();
        let mut claims = Claims::empty();
        claims.not_before = Some(Utc::now() + Duration::try_hours(1).unwrap());
        assert_matches!(
            claims.validate_maturity(&time_options).unwrap_err(),
            TokenError::NotYetValid
        );

        claims.not_before = Some(Utc::now() + Duration::try_seconds(10).unwrap());
        assert!(claims.validate_maturity(&time_options).is_ok());
        assert_matches!(
            claims
                .validate_maturity(&TimeOptions::from_leeway(Duration::try_seconds(5).unwrap()))
                .unwrap_err(),
            TokenError::NotYetValid
        );
    }

    #[test]
    fn float_timestamp() {
        let claims = "{\"exp\": 1.691203462e+9}";
        let claims: Claims = serde_json::from_str(claims).unwrap();
        let timestamp = Utc.timestamp_opt(1_691_203_462, 0).single().unwrap();
        assert_eq!(claims.expiration, Some(timestamp));
    }

    #[test]
    fn float_timestamp_errors() {
        let invalid_claims = ["{\"exp\": 1e20}", "{\"exp\": -1e20}"];
        for claims in invalid_claims {
            let err = serde_json::from_str::<Claims>(claims).unwrap_err();
            let err = err.to_string();
            assert!(err.contains("UTC timestamp overflow"), "{err}");
        }
    }
}
