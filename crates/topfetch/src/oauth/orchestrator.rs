//! Decides between a silent refresh and a full interactive authorization.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::retry::{RetryConfig, with_retry};
use crate::store::{CredentialRecord, TokenStore};

use super::callback::{CallbackReceiver, DEFAULT_CALLBACK_ADDR};
use super::error::AuthError;
use super::exchange::TokenExchanger;

/// Spotify authorization endpoint.
pub const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";

/// Scopes requested on every interactive authorization.
pub const SCOPE: &str = "user-top-read user-read-private user-read-email";

/// How long to wait for the user to finish in the browser.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// What the user needs to complete an interactive authorization.
#[derive(Debug, Clone)]
pub struct AuthorizationSession {
    /// URL to open in a browser.
    pub url: String,
    /// Address the callback listener is bound to.
    pub listening_on: SocketAddr,
}

/// Presents an [`AuthorizationSession`] to the user (print, open a browser...).
///
/// Called once the callback listener is already bound, so the redirect
/// cannot arrive before anyone is listening.
pub trait AuthPrompt: Send + Sync {
    fn present(&self, session: &AuthorizationSession);
}

impl<F> AuthPrompt for F
where
    F: Fn(&AuthorizationSession) + Send + Sync,
{
    fn present(&self, session: &AuthorizationSession) {
        self(session)
    }
}

/// Tunables for [`Authenticator`].
#[derive(Clone)]
pub struct AuthSettings {
    pub authorize_url: String,
    pub callback_addr: SocketAddr,
    /// `None` waits forever.
    pub callback_timeout: Option<Duration>,
    /// Refresh token supplied by configuration, preferred over the stored one.
    pub refresh_token_override: Option<String>,
    /// Backoff for transient refresh failures.
    pub retry: RetryConfig,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            authorize_url: AUTHORIZE_URL.to_string(),
            callback_addr: DEFAULT_CALLBACK_ADDR,
            callback_timeout: Some(DEFAULT_CALLBACK_TIMEOUT),
            refresh_token_override: None,
            retry: RetryConfig::default(),
        }
    }
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("authorize_url", &self.authorize_url)
            .field("callback_addr", &self.callback_addr)
            .field("callback_timeout", &self.callback_timeout)
            .field(
                "refresh_token_override",
                &self.refresh_token_override.as_ref().map(|_| "[REDACTED]"),
            )
            .field("retry", &self.retry)
            .finish()
    }
}

/// Snapshot of the stored credential, computed without network access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStatus {
    /// Nothing has been stored yet.
    Missing,
    Stored {
        expires_at: u64,
        /// Seconds left, zero once expired.
        expires_in: u64,
        expired: bool,
        has_refresh_token: bool,
        scope: Option<String>,
    },
}

/// Obtains a usable access token, refreshing or re-authorizing as needed.
pub struct Authenticator {
    exchanger: TokenExchanger,
    store: Arc<dyn TokenStore>,
    settings: AuthSettings,
}

impl Authenticator {
    pub fn new(exchanger: TokenExchanger, store: Arc<dyn TokenStore>, settings: AuthSettings) -> Self {
        Self {
            exchanger,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Build the provider authorization URL for an interactive flow.
    pub fn authorization_url(&self) -> Result<String, AuthError> {
        if self.exchanger.client_id().is_empty() {
            return Err(AuthError::Configuration("client_id is empty".into()));
        }

        let url = Url::parse_with_params(
            &self.settings.authorize_url,
            &[
                ("client_id", self.exchanger.client_id()),
                ("response_type", "code"),
                ("redirect_uri", self.exchanger.redirect_uri()),
                ("scope", SCOPE),
                ("show_dialog", "true"),
            ],
        )
        .map_err(|e| {
            AuthError::Configuration(format!(
                "invalid authorize URL {}: {e}",
                self.settings.authorize_url
            ))
        })?;

        Ok(url.into())
    }

    /// Return a valid access token.
    ///
    /// Tries a refresh first (configured override, else the stored refresh
    /// token). Any refresh failure falls back to the interactive flow, whose
    /// errors are returned to the caller.
    pub async fn access_token(&self, prompt: &dyn AuthPrompt) -> Result<String, AuthError> {
        if let Some(record) = self.try_refresh().await {
            return Ok(record.access_token);
        }
        let record = self.login(prompt).await?;
        Ok(record.access_token)
    }

    /// Run the interactive flow unconditionally.
    pub async fn login(&self, prompt: &dyn AuthPrompt) -> Result<CredentialRecord, AuthError> {
        let receiver = CallbackReceiver::bind(
            self.settings.callback_addr,
            self.exchanger.clone(),
            Arc::clone(&self.store),
        )
        .await?;

        let session = AuthorizationSession {
            url: self.authorization_url()?,
            listening_on: receiver.local_addr(),
        };

        tracing::info!(listening_on = %session.listening_on, "Starting interactive authorization");
        prompt.present(&session);

        receiver.wait(self.settings.callback_timeout).await
    }

    /// Inspect the stored credential.
    pub fn status(&self) -> Result<CredentialStatus, AuthError> {
        let Some(record) = self.store.load()? else {
            return Ok(CredentialStatus::Missing);
        };

        Ok(CredentialStatus::Stored {
            expires_at: record.expires_at,
            expires_in: record.expires_in_from_now(),
            expired: record.is_expired(0),
            has_refresh_token: record.refresh_token.is_some(),
            scope: record.scope,
        })
    }

    /// Attempt a silent refresh. `None` means the caller should fall back.
    async fn try_refresh(&self) -> Option<CredentialRecord> {
        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable credential store");
                None
            }
        };

        let candidate = self
            .settings
            .refresh_token_override
            .clone()
            .or_else(|| stored.and_then(|r| r.refresh_token))?;

        tracing::info!("Refreshing access token");

        let result = with_retry(
            || self.exchanger.refresh(&candidate),
            AuthError::is_transient,
            "Token refresh",
            &self.settings.retry,
        )
        .await;

        let record = match result {
            Ok(record) => record.with_fallback_refresh_token(Some(&candidate)),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    grant_rejected = e.is_invalid_grant(),
                    retried = e.is_transient(),
                    "Could not refresh token, starting new authorization"
                );
                return None;
            }
        };

        if let Err(e) = self.store.save(&record) {
            tracing::warn!(error = %e, "Could not persist refreshed token, starting new authorization");
            return None;
        }

        tracing::info!("Token refreshed");
        Some(record)
    }
}
