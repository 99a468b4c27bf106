use thiserror::Error;

use crate::http::HttpError;

/// Errors from the paged top-items API.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The access token was rejected. Fatal for the whole fetch.
    #[error("Access token rejected (401). Re-authenticate and try again.")]
    Unauthorized,

    /// The token is valid but lacks access (missing scope, unregistered user...).
    #[error("Access forbidden (403): {0}")]
    Forbidden(String),

    /// The API is throttling requests.
    #[error("Rate limited by the API{}", retry_hint(.retry_after))]
    RateLimited {
        /// Seconds from the `Retry-After` header, when present.
        retry_after: Option<u64>,
    },

    /// Network or connection failure.
    #[error("Network error: {0}")]
    Transport(String),

    /// Any other non-success status.
    #[error("API error ({status}): {body}")]
    Http { status: u16, body: String },

    /// The body did not match the expected page shape.
    #[error("Failed to decode page: {0}")]
    Decode(String),

    /// A page worker ended without producing a result.
    #[error("Page task failed: {0}")]
    Task(String),
}

fn retry_hint(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!(" (retry after {secs}s)"),
        None => String::new(),
    }
}

impl FetchError {
    /// Errors that invalidate every remaining page.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl From<HttpError> for FetchError {
    fn from(err: HttpError) -> Self {
        Self::Transport(err.to_string())
    }
}
