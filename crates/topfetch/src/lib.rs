//! topfetch - fetch a Spotify user's complete top tracks and artists.
//!
//! The library covers two concerns:
//!
//! - [`oauth`] keeps a renewable credential: it refreshes a stored refresh
//!   token when possible and otherwise runs the authorization-code flow with a
//!   loopback callback listener.
//! - [`fetch`] retrieves a whole paged collection, fetching pages
//!   concurrently and tolerating individual page failures.
//!
//! All HTTP goes through the [`http::HttpTransport`] trait; the production
//! implementation is [`http::reqwest_transport::ReqwestTransport`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use topfetch::fetch::{FetchRequest, ItemType, TimeRange, TopItemsClient};
//! use topfetch::http::reqwest_transport::ReqwestTransport;
//!
//! let transport = Arc::new(ReqwestTransport::with_timeout(DEFAULT_TIMEOUT)?);
//! let token = authenticator.access_token(&prompt).await?;
//!
//! let client = TopItemsClient::new(transport, token);
//! let outcome = client
//!     .fetch_all::<serde_json::Value>(&FetchRequest::new(ItemType::Tracks, TimeRange::LongTerm), None)
//!     .await?;
//! ```

pub mod fetch;
pub mod http;
pub mod oauth;
pub mod rate_limit;
pub mod retry;
pub mod store;

pub use fetch::{FetchError, FetchOutcome, FetchProgress, FetchRequest, ItemType, TimeRange, TopItemsClient};
pub use oauth::{AuthError, AuthSettings, Authenticator, ClientCredentials, TokenExchanger};
pub use rate_limit::ApiRateLimiter;
pub use store::{CredentialRecord, FileTokenStore, MemoryTokenStore, StoreError, TokenStore};
