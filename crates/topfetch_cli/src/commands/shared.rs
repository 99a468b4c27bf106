//! Setup shared by the commands that talk to Spotify.

use std::sync::Arc;

use console::style;
use topfetch::http::HttpTransport;
use topfetch::http::reqwest_transport::{DEFAULT_TIMEOUT, ReqwestTransport};
use topfetch::oauth::{
    AuthError, AuthSettings, AuthorizationSession, Authenticator, ClientCredentials,
    DEFAULT_CALLBACK_ADDR, TokenExchanger, redirect_uri,
};
use topfetch::store::FileTokenStore;

use crate::config::Config;

/// Production HTTP transport.
pub(crate) fn transport() -> Result<Arc<dyn HttpTransport>, Box<dyn std::error::Error>> {
    Ok(Arc::new(ReqwestTransport::with_timeout(DEFAULT_TIMEOUT)?))
}

/// Build an authenticator backed by the configured token file.
pub(crate) fn authenticator(
    config: &Config,
    credentials: ClientCredentials,
    transport: Arc<dyn HttpTransport>,
) -> Result<Authenticator, AuthError> {
    let token_file = config.token_file().ok_or_else(|| {
        AuthError::Configuration(
            "Could not determine where to store tokens. Set [auth] token_file in the config."
                .to_string(),
        )
    })?;
    tracing::debug!("Using token file {}", token_file.display());

    let exchanger = TokenExchanger::new(transport, credentials, redirect_uri(DEFAULT_CALLBACK_ADDR));
    let settings = AuthSettings {
        callback_addr: DEFAULT_CALLBACK_ADDR,
        callback_timeout: config.callback_timeout(),
        refresh_token_override: config.spotify.refresh_token.clone(),
        retry: config.refresh_retry(),
        ..AuthSettings::default()
    };

    Ok(Authenticator::new(
        exchanger,
        Arc::new(FileTokenStore::new(token_file)),
        settings,
    ))
}

/// Prompt that prints the authorization URL and, unless disabled, opens it.
pub(crate) fn browser_prompt(
    open_browser: bool,
    is_tty: bool,
) -> impl Fn(&AuthorizationSession) + Send + Sync {
    move |session| {
        if is_tty {
            println!(
                "\n{} Authorize topfetch in your browser:\n\n  {}\n",
                style("→").cyan(),
                style(&session.url).underlined()
            );
            println!(
                "Waiting for the redirect on {}...",
                style(redirect_uri(session.listening_on)).dim()
            );
        } else {
            tracing::info!(url = %session.url, "Authorization required");
            println!("{}", session.url);
        }

        if open_browser && let Err(e) = open::that(&session.url) {
            tracing::warn!("Could not open a browser: {}", e);
            if is_tty {
                println!(
                    "{} Could not open a browser. Open the URL above manually.",
                    style("!").yellow()
                );
            }
        }
    }
}

/// Mask all but the start of a client id.
pub(crate) fn mask(value: &str) -> String {
    let visible: String = value.chars().take(6).collect();
    if visible.len() == value.len() {
        visible
    } else {
        format!("{visible}...")
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_mask() {
        assert_eq!(mask("abc"), "abc");
        assert_eq!(mask("0123456789"), "012345...");
    }

    #[test]
    fn test_authenticator_uses_configured_values() {
        let mut config = Config::default();
        config.auth.token_file = Some(PathBuf::from("/tmp/topfetch-test/tokens.json"));
        config.auth.callback_timeout_secs = 0;
        config.spotify.refresh_token = Some("from-config".into());
        config.auth.refresh_retries = 0;

        let auth = authenticator(
            &config,
            ClientCredentials::new("id", "secret"),
            transport().unwrap(),
        )
        .unwrap();

        let settings = auth.settings();
        assert_eq!(settings.callback_addr, DEFAULT_CALLBACK_ADDR);
        assert!(settings.callback_timeout.is_none());
        assert_eq!(settings.refresh_token_override.as_deref(), Some("from-config"));
        assert_eq!(settings.retry.max_retries, 0);
        assert!(
            auth.authorization_url()
                .unwrap()
                .contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A8888%2Fcallback")
        );
    }
}
