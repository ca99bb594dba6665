//! Access/refresh credential pair and JWT expiry decoding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Lifetime assumed for a token that carries no `exp` claim, in seconds.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 31_449_600;

/// The session's credential pair with the expiry of each half.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    /// Bearer token for API calls.
    pub access_token: String,
    /// Token exchanged for a new pair at `/auth/refresh`.
    pub refresh_token: String,
    /// When the access token stops being accepted.
    pub access_expiry: DateTime<Utc>,
    /// When the refresh token stops being accepted.
    pub refresh_expiry: DateTime<Utc>,
}

impl CredentialPair {
    /// Builds a pair from two JWTs, taking each expiry from its `exp` claim.
    pub fn from_tokens(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();
        let fallback = Utc::now() + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS);
        Ok(Self {
            access_expiry: token_expiry(&access_token)?.unwrap_or(fallback),
            refresh_expiry: token_expiry(&refresh_token)?.unwrap_or(fallback),
            access_token,
            refresh_token,
        })
    }
}

// Tokens never show up in logs.
impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_expiry", &self.access_expiry)
            .field("refresh_expiry", &self.refresh_expiry)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Reads the `exp` claim (seconds since the epoch) of a JWT without
/// verifying its signature. `Ok(None)` when the claim is absent.
pub fn token_expiry(token: &str) -> Result<Option<DateTime<Utc>>, AuthError> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => return Err(AuthError::MalformedToken("expected three segments".into())),
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|err| AuthError::MalformedToken(err.to_string()))?;
    let claims: Claims = serde_json::from_slice(&bytes)
        .map_err(|err| AuthError::MalformedToken(err.to_string()))?;
    match claims.exp {
        None => Ok(None),
        Some(exp) => Utc
            .timestamp_opt(exp, 0)
            .single()
            .map(Some)
            .ok_or_else(|| AuthError::MalformedToken(format!("exp out of range: {exp}"))),
    }
}

#[cfg(test)]
pub(crate) fn test_jwt(exp: Option<i64>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = match exp {
        Some(exp) => format!(r#"{{"sub":"student","exp":{exp}}}"#),
        None => r#"{"sub":"student"}"#.to_string(),
    };
    format!("{header}.{}.sig", URL_SAFE_NO_PAD.encode(claims))
}
