//! Authorization-code and refresh-token exchanges against the token endpoint.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use serde::Deserialize;

use crate::http::{HttpRequest, HttpTransport};
use crate::store::{CredentialRecord, unix_now};

use super::error::AuthError;

/// Spotify token endpoint.
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Application credentials issued by the provider.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// The `Authorization` header value: `Basic base64(id:secret)`.
    pub fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.client_id, self.client_secret);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Successful response from the token endpoint.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default)]
    pub token_type: Option<String>,

    #[serde(default)]
    pub expires_in: Option<u64>,

    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Convert into a credential record issued at `issued_at`.
    pub fn into_record(self, issued_at: u64) -> CredentialRecord {
        let mut record =
            CredentialRecord::new(self.access_token, self.refresh_token, self.expires_in, issued_at);
        record.token_type = self.token_type;
        record.scope = self.scope;
        record
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scope", &self.scope)
            .finish()
    }
}

/// Error response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
}

/// Performs the two token-endpoint exchanges. Never retries.
#[derive(Clone)]
pub struct TokenExchanger {
    transport: Arc<dyn HttpTransport>,
    credentials: ClientCredentials,
    token_url: String,
    redirect_uri: String,
}

impl TokenExchanger {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: ClientCredentials,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credentials,
            token_url: TOKEN_URL.to_string(),
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Point the exchanger at a different token endpoint.
    #[must_use]
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub fn client_id(&self) -> &str {
        &self.credentials.client_id
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Exchange an authorization code for a credential record.
    pub async fn exchange_code(&self, code: &str) -> Result<CredentialRecord, AuthError> {
        tracing::debug!("Exchanging authorization code for tokens");
        self.post(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }

    /// Obtain a new access token from a refresh token.
    ///
    /// The returned record carries no refresh token when the provider omitted
    /// one; carry the previous one forward with
    /// [`CredentialRecord::with_fallback_refresh_token`].
    pub async fn refresh(&self, refresh_token: &str) -> Result<CredentialRecord, AuthError> {
        tracing::debug!("Refreshing access token");
        self.post(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn post(&self, fields: &[(&str, &str)]) -> Result<CredentialRecord, AuthError> {
        let request = HttpRequest::form(&self.token_url, fields.iter().copied())
            .header("Authorization", self.credentials.basic_auth_header())
            .header("Accept", "application/json");

        let response = self.transport.send(request).await?;

        if !response.is_success() {
            let body = response.text();
            let error = serde_json::from_slice::<TokenErrorResponse>(&response.body)
                .ok()
                .map(|e| e.error);
            return Err(AuthError::Exchange {
                status: response.status,
                error,
                body,
            });
        }

        let token: TokenResponse = serde_json::from_slice(&response.body)
            .map_err(|e| AuthError::Parse(e.to_string()))?;
        Ok(token.into_record(unix_now()))
    }
}
