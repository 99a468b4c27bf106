//! Configuration file support for topfetch.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `TOPFETCH_`, e.g., `TOPFETCH_SPOTIFY__CLIENT_ID`)
//! 3. Config file (./topfetch.toml, then ~/.config/topfetch/config.toml)
//! 4. Legacy `SPOTIFY_CLIENT_ID` / `SPOTIFY_CLIENT_SECRET` / `SPOTIFY_REFRESH_TOKEN`
//!    variables, only for credentials still unset
//! 5. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [spotify]
//! client_id = "..."
//! client_secret = "..."     # or use TOPFETCH_SPOTIFY__CLIENT_SECRET
//! refresh_token = "..."     # optional, skips the stored token
//!
//! [auth]
//! callback_timeout_secs = 300   # 0 waits forever
//! token_file = "/path/to/tokens.json"
//! refresh_retries = 3           # 0 disables retrying a failed refresh
//!
//! [fetch]
//! time_range = "medium_term"
//! page_size = 50
//! concurrency = 10
//! requests_per_second = 5
//! keep_markets = false
//! output_dir = "."
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

use topfetch::fetch::{DEFAULT_CONCURRENCY, DEFAULT_PAGE_SIZE, TimeRange};
use topfetch::oauth::{AuthError, ClientCredentials};
use topfetch::retry::{MAX_RETRIES, RetryConfig};

/// Legacy variable names read when the prefixed ones are absent.
pub const LEGACY_CLIENT_ID: &str = "SPOTIFY_CLIENT_ID";
pub const LEGACY_CLIENT_SECRET: &str = "SPOTIFY_CLIENT_SECRET";
pub const LEGACY_REFRESH_TOKEN: &str = "SPOTIFY_REFRESH_TOKEN";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application credentials.
    pub spotify: SpotifyConfig,
    /// Authorization flow options.
    pub auth: AuthConfig,
    /// Default fetch options.
    pub fetch: FetchConfig,
}

/// Application credentials registered with Spotify.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Takes precedence over the stored refresh token.
    pub refresh_token: Option<String>,
}

impl fmt::Debug for SpotifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("SpotifyConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}

/// Authorization flow options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// How long to wait for the browser redirect. Zero waits forever.
    pub callback_timeout_secs: u64,
    /// Where credentials are persisted. Defaults to the state directory.
    pub token_file: Option<PathBuf>,
    /// Retries for a refresh that fails transiently.
    pub refresh_retries: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            callback_timeout_secs: 300,
            token_file: None,
            refresh_retries: MAX_RETRIES,
        }
    }
}

/// Default fetch options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub time_range: TimeRange,
    pub page_size: usize,
    /// Maximum concurrent page requests.
    pub concurrency: usize,
    /// Proactive pacing. Unset means no pacing.
    pub requests_per_second: Option<u32>,
    /// Keep `available_markets` in the saved tracks.
    pub keep_markets: bool,
    pub output_dir: Option<PathBuf>,
    /// Stop after this many items per collection.
    pub max_items: Option<usize>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            time_range: TimeRange::default(),
            page_size: DEFAULT_PAGE_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            requests_per_second: None,
            keep_markets: false,
            output_dir: None,
            max_items: None,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/topfetch/config.toml)
    /// 3. Local config file (./topfetch.toml)
    /// 4. Environment variables with TOPFETCH_ prefix
    /// 5. Legacy environment variables, only for values still missing
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("topfetch.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./topfetch.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // TOPFETCH_SPOTIFY__CLIENT_ID -> spotify.client_id
        builder = builder.add_source(
            Environment::with_prefix("TOPFETCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config = match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        };

        config.apply_legacy_env(|key| std::env::var(key).ok());
        config
    }

    /// Fill unset credentials from the unprefixed `SPOTIFY_*` variables.
    pub fn apply_legacy_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fill = |slot: &mut Option<String>, key: &str| {
            if slot.is_none() {
                *slot = lookup(key).filter(|v| !v.trim().is_empty());
            }
        };
        fill(&mut self.spotify.client_id, LEGACY_CLIENT_ID);
        fill(&mut self.spotify.client_secret, LEGACY_CLIENT_SECRET);
        fill(&mut self.spotify.refresh_token, LEGACY_REFRESH_TOKEN);
    }

    /// Client id and secret, or a message telling the user how to set them.
    pub fn client_credentials(&self) -> Result<ClientCredentials, AuthError> {
        fn present(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim).filter(|v| !v.is_empty())
        }

        match (
            present(&self.spotify.client_id),
            present(&self.spotify.client_secret),
        ) {
            (Some(id), Some(secret)) => Ok(ClientCredentials::new(id, secret)),
            _ => Err(AuthError::Configuration(format!(
                "Spotify client credentials are not configured. Set {LEGACY_CLIENT_ID} and \
                 {LEGACY_CLIENT_SECRET} (or [spotify] client_id / client_secret in {})",
                Self::default_config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "topfetch.toml".to_string())
            ))),
        }
    }

    /// Redirect wait, with zero meaning no limit.
    pub fn callback_timeout(&self) -> Option<Duration> {
        match self.auth.callback_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Backoff for token refresh. Zero retries disables it.
    pub fn refresh_retry(&self) -> RetryConfig {
        match self.auth.refresh_retries {
            0 => RetryConfig::disabled(),
            n => RetryConfig {
                max_retries: n,
                ..RetryConfig::default()
            },
        }
    }

    /// Credential file, falling back to the state directory.
    pub fn token_file(&self) -> Option<PathBuf> {
        self.auth
            .token_file
            .clone()
            .or_else(|| Self::default_state_dir().map(|dir| dir.join("tokens.json")))
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "topfetch").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the default state directory.
    ///
    /// On Linux this is `~/.local/state/topfetch`. Platforms without a state
    /// directory use the data directory instead.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "topfetch").map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}
