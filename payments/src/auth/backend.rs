//! The refresh endpoint of the academy backend.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AuthError, CredentialPair};
use crate::http::{read_body, HttpClient};

/// Exchanges a refresh token for a new credential pair.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Performs one refresh round-trip.
    async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair, AuthError>;
}

/// `jwt_info` object returned by sign-in and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtInfo {
    /// New access token.
    pub access_token: String,
    /// New refresh token.
    pub refresh_token: String,
}

impl JwtInfo {
    /// Decodes both expiries into a [`CredentialPair`].
    pub fn into_pair(self) -> Result<CredentialPair, AuthError> {
        CredentialPair::from_tokens(self.access_token, self.refresh_token)
    }
}

/// Envelope shared by `/auth/signin` and `/auth/refresh`.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtResponse {
    /// The issued pair.
    pub jwt_info: JwtInfo,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// [`AuthBackend`] over `POST /auth/refresh`.
///
/// Requests go straight through [`HttpClient`], never through the
/// authenticated gateway, so a failing refresh cannot recurse into another
/// refresh.
#[derive(Debug, Clone)]
pub struct HttpAuthBackend {
    http: HttpClient,
}

impl HttpAuthBackend {
    /// Backend rooted at the academy API base URL.
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair, AuthError> {
        let request = self
            .http
            .request(Method::POST, "/auth/refresh")
            .json(&RefreshRequest { refresh_token });
        let (status, body) = read_body(self.http.send(request).await?).await?;
        debug!(status, "refresh response");

        if !(200..300).contains(&status) {
            return Err(AuthError::Rejected(status));
        }
        let parsed: JwtResponse = serde_json::from_slice(&body)
            .map_err(|err| AuthError::MalformedToken(err.to_string()))?;
        parsed.jwt_info.into_pair()
    }
}
