//! Loopback listener that captures the authorization redirect.
//!
//! A [`CallbackReceiver`] is bound first, so the caller knows the listening
//! address before the user is sent to the provider, and then awaited with
//! [`CallbackReceiver::wait`]. The first request carrying either `code` or
//! `error` is terminal: on `code` the receiver exchanges it for tokens and
//! persists the record before answering. The listener is shut down after the
//! terminal request.
//!
//! ```ignore
//! let receiver = CallbackReceiver::bind(DEFAULT_CALLBACK_ADDR, exchanger, store).await?;
//! open::that(authorize_url)?;
//! let record = receiver.wait(Some(Duration::from_secs(300))).await?;
//! ```

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};

use crate::store::{CredentialRecord, TokenStore};

use super::error::AuthError;
use super::exchange::TokenExchanger;

/// Address registered as the redirect target with the provider.
pub const DEFAULT_CALLBACK_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8888));

/// Path the provider redirects to.
pub const CALLBACK_PATH: &str = "/callback";

/// How long in-flight responses get to drain after the terminal request.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Build the redirect URI for a listener on `addr`.
pub fn redirect_uri(addr: SocketAddr) -> String {
    format!("http://{addr}{CALLBACK_PATH}")
}

/// Query parameters of the redirect.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

enum CallbackRequest {
    Code(String),
    Denied {
        error: String,
        description: Option<String>,
    },
    Malformed,
}

impl CallbackParams {
    fn classify(self) -> CallbackRequest {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());

        if let Some(code) = non_empty(self.code) {
            return CallbackRequest::Code(code);
        }
        match non_empty(self.error) {
            Some(error) => CallbackRequest::Denied {
                error,
                description: non_empty(self.error_description),
            },
            None => CallbackRequest::Malformed,
        }
    }
}

type Completion = oneshot::Sender<Result<CredentialRecord, AuthError>>;

/// Shared state for the callback handler.
struct CallbackState {
    /// `None` once a terminal request has been handled.
    tx: Option<Completion>,
    exchanger: TokenExchanger,
    store: Arc<dyn TokenStore>,
}

impl CallbackState {
    async fn complete(&self, code: &str) -> Result<CredentialRecord, AuthError> {
        let record = self.exchanger.exchange_code(code).await?;
        self.store.save(&record)?;
        Ok(record)
    }
}

type SharedState = Arc<Mutex<CallbackState>>;

/// A bound, not yet serving, callback listener.
pub struct CallbackReceiver {
    listener: TcpListener,
    local_addr: SocketAddr,
    exchanger: TokenExchanger,
    store: Arc<dyn TokenStore>,
}

impl std::fmt::Debug for CallbackReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackReceiver")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

impl CallbackReceiver {
    /// Bind the listener. Use port 0 to let the OS pick one.
    pub async fn bind(
        addr: SocketAddr,
        exchanger: TokenExchanger,
        store: Arc<dyn TokenStore>,
    ) -> Result<Self, AuthError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AuthError::Server(format!("Failed to bind to {addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AuthError::Server(format!("Failed to read bound address: {e}")))?;

        tracing::debug!(
            "OAuth callback server listening on {}",
            redirect_uri(local_addr)
        );

        Ok(Self {
            listener,
            local_addr,
            exchanger,
            store,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until a terminal callback arrives or `timeout` elapses.
    ///
    /// `None` waits indefinitely. The returned record has already been
    /// persisted to the store.
    pub async fn wait(self, timeout: Option<Duration>) -> Result<CredentialRecord, AuthError> {
        let (tx, rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state: SharedState = Arc::new(Mutex::new(CallbackState {
            tx: Some(tx),
            exchanger: self.exchanger,
            store: self.store,
        }));

        let app = Router::new()
            .route(CALLBACK_PATH, get(handle_callback))
            .with_state(state);

        let listener = self.listener;
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let deadline = async {
            match timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending().await,
            }
        };

        let outcome = tokio::select! {
            result = rx => {
                result.unwrap_or_else(|_| {
                    Err(AuthError::Server("Callback channel closed unexpectedly".into()))
                })
            }
            () = deadline => Err(AuthError::CallbackTimeout),
            result = &mut server => match result {
                Ok(Ok(())) => Err(AuthError::Server("Server shut down unexpectedly".into())),
                Ok(Err(e)) => Err(AuthError::Server(format!("Server error: {e}"))),
                Err(e) => Err(AuthError::Server(format!("Server task failed: {e}"))),
            },
        };

        let _ = shutdown_tx.send(());
        if !server.is_finished() && tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err()
        {
            tracing::debug!("Callback server did not drain in time, aborting");
            server.abort();
        }

        match &outcome {
            Ok(_) => tracing::info!("Authorization completed"),
            Err(e) => tracing::debug!(error = %e, "Authorization session ended without a token"),
        }
        outcome
    }
}

async fn handle_callback(
    State(state): State<SharedState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    // Held across the exchange so concurrent requests see a single terminal outcome.
    let mut state = state.lock().await;

    if state.tx.is_none() {
        return (StatusCode::GONE, Html(GONE_HTML)).into_response();
    }

    let (outcome, response) = match params.classify() {
        CallbackRequest::Malformed => {
            tracing::warn!("Ignoring malformed callback request (no code or error)");
            return (StatusCode::BAD_REQUEST, Html(MALFORMED_HTML)).into_response();
        }
        CallbackRequest::Denied { error, description } => {
            tracing::warn!(%error, "Authorization denied by provider");
            (
                Err(AuthError::Denied { error, description }),
                (StatusCode::BAD_REQUEST, Html(ERROR_HTML)),
            )
        }
        CallbackRequest::Code(code) => match state.complete(&code).await {
            Ok(record) => (Ok(record), (StatusCode::OK, Html(SUCCESS_HTML))),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to complete authorization");
                (
                    Err(e),
                    (StatusCode::INTERNAL_SERVER_ERROR, Html(ERROR_HTML)),
                )
            }
        },
    };

    if let Some(tx) = state.tx.take() {
        let _ = tx.send(outcome);
    }
    response.into_response()
}

const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>topfetch</title></head>
<body>
<h1>Authorization successful</h1>
<p>You can close this window and return to the terminal.</p>
</body>
</html>"#;

const ERROR_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>topfetch</title></head>
<body>
<h1>Authorization failed</h1>
<p>Check the terminal for details, then try again.</p>
</body>
</html>"#;

const MALFORMED_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>topfetch</title></head>
<body>
<h1>Malformed callback</h1>
<p>The request carried neither an authorization code nor an error.</p>
</body>
</html>"#;

const GONE_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>topfetch</title></head>
<body>
<h1>Already handled</h1>
<p>This authorization session has finished.</p>
</body>
</html>"#;
