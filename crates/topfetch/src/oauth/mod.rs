//! Credential lifecycle for the Spotify Accounts service.
//!
//! - [`exchange`] - authorization-code and refresh-token exchanges
//! - [`callback`] - loopback listener that captures the redirect
//! - [`orchestrator`] - refresh-or-authorize decision
//! - [`AuthError`] - error type shared by all of the above
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use topfetch::oauth::{AuthSettings, Authenticator, ClientCredentials, TokenExchanger, redirect_uri, DEFAULT_CALLBACK_ADDR};
//! use topfetch::store::FileTokenStore;
//!
//! let exchanger = TokenExchanger::new(transport, ClientCredentials::new(id, secret), redirect_uri(DEFAULT_CALLBACK_ADDR));
//! let auth = Authenticator::new(exchanger, Arc::new(FileTokenStore::new(path)), AuthSettings::default());
//!
//! let token = auth
//!     .access_token(&|session: &AuthorizationSession| println!("Open {}", session.url))
//!     .await?;
//! ```

mod error;

pub mod callback;
pub mod exchange;
pub mod orchestrator;

pub use callback::{CALLBACK_PATH, CallbackReceiver, DEFAULT_CALLBACK_ADDR, redirect_uri};
pub use error::AuthError;
pub use exchange::{ClientCredentials, TOKEN_URL, TokenExchanger, TokenResponse};
pub use orchestrator::{
    AUTHORIZE_URL, AuthPrompt, AuthSettings, AuthorizationSession, Authenticator,
    CredentialStatus, DEFAULT_CALLBACK_TIMEOUT, SCOPE,
};
