//! OAuth error types.

use thiserror::Error;

use crate::http::HttpError;
use crate::store::StoreError;

/// OAuth `error` codes that mean the grant itself is unusable.
const INVALID_GRANT_CODES: &[&str] = &["invalid_grant", "invalid_client", "invalid_request"];

/// Errors that can occur while obtaining or renewing credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint rejected a code or refresh exchange.
    #[error("Token exchange rejected ({status}): {}", detail(.error, .body))]
    Exchange {
        /// HTTP status returned by the provider.
        status: u16,
        /// OAuth `error` code, when the body was a JSON error object.
        error: Option<String>,
        /// Raw response body.
        body: String,
    },

    /// The token endpoint could not be reached.
    #[error("Could not reach the authorization server: {0}")]
    Transport(String),

    /// A success response could not be decoded.
    #[error("Failed to parse token response: {0}")]
    Parse(String),

    /// The user (or provider) rejected the authorization request.
    #[error("Authorization was rejected: {}", detail(.description, .error))]
    Denied {
        error: String,
        description: Option<String>,
    },

    /// No callback arrived before the configured deadline.
    #[error("Timed out waiting for the authorization callback. Please try again.")]
    CallbackTimeout,

    /// The callback listener failed.
    #[error("Callback server error: {0}")]
    Server(String),

    /// The credential record could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Client configuration is missing or invalid.
    #[error("OAuth configuration error: {0}")]
    Configuration(String),
}

fn detail<'a>(preferred: &'a Option<String>, fallback: &'a str) -> &'a str {
    preferred.as_deref().unwrap_or(fallback)
}

impl AuthError {
    /// True when the provider says the grant is invalid, revoked or expired.
    ///
    /// These failures require a fresh interactive authorization.
    pub fn is_invalid_grant(&self) -> bool {
        match self {
            Self::Exchange {
                status: 400 | 401,
                error: Some(code),
                ..
            } => INVALID_GRANT_CODES.contains(&code.as_str()),
            _ => false,
        }
    }

    /// True for failures worth retrying with the same grant.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Exchange { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// True when the interactive flow itself failed, as opposed to an exchange.
    pub fn is_flow_error(&self) -> bool {
        matches!(
            self,
            Self::Denied { .. } | Self::CallbackTimeout | Self::Server(_)
        )
    }
}

impl From<HttpError> for AuthError {
    fn from(err: HttpError) -> Self {
        Self::Transport(err.to_string())
    }
}
