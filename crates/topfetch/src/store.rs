//! Persisted credential record and its storage backends.
//!
//! The record is always written wholesale. Carrying a refresh token forward
//! across refreshes is the caller's job (see
//! [`CredentialRecord::with_fallback_refresh_token`]); the store never merges.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifetime assumed when the provider omits `expires_in`.
pub const DEFAULT_EXPIRES_IN: u64 = 3600;

/// Errors raised by a [`TokenStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("token store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("token store contains invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The credential record persisted between runs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Lifetime in seconds as reported by the provider.
    pub expires_in: u64,

    /// Unix timestamp at which the access token expires.
    pub expires_at: u64,
}

impl CredentialRecord {
    /// Build a record, deriving `expires_at` from `issued_at + expires_in`.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in: Option<u64>,
        issued_at: u64,
    ) -> Self {
        let expires_in = expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        Self {
            access_token: access_token.into(),
            token_type: None,
            refresh_token,
            scope: None,
            expires_in,
            expires_at: issued_at.saturating_add(expires_in),
        }
    }

    /// Keep `previous` as the refresh token when this record has none.
    #[must_use]
    pub fn with_fallback_refresh_token(mut self, previous: Option<&str>) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous.map(ToString::to_string);
        }
        self
    }

    /// Whether the access token is expired or expires within `buffer_secs`.
    pub fn is_expired(&self, buffer_secs: u64) -> bool {
        unix_now().saturating_add(buffer_secs) >= self.expires_at
    }

    /// Seconds until expiry, zero if already expired.
    pub fn expires_in_from_now(&self) -> u64 {
        self.expires_at.saturating_sub(unix_now())
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scope", &self.scope)
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Durable storage for the credential record.
pub trait TokenStore: Send + Sync {
    /// Load the stored record, `None` if nothing has been saved yet.
    fn load(&self) -> Result<Option<CredentialRecord>, StoreError>;

    /// Replace the stored record.
    fn save(&self, record: &CredentialRecord) -> Result<(), StoreError>;
}

/// Stores the record as pretty-printed JSON in a single file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<CredentialRecord>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_string_pretty(record)?;

        // Write a sibling file, then rename it over the target.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        restrict_permissions(&tmp).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;

        tracing::debug!(path = %self.path.display(), "Saved credential record");
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// In-memory store, used by tests and for one-shot runs that should not persist.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    record: Mutex<Option<CredentialRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: CredentialRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self
            .record
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    fn save(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        *self.record.lock().unwrap_or_else(|e| e.into_inner()) = Some(record.clone());
        Ok(())
    }
}
