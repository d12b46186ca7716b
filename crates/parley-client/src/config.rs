//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so a local development setup needs no
//! configuration at all.

use std::path::PathBuf;

use parley_store::{Database, RealtimeStore, StoreError};

use crate::unread::IncrementMode;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// SQLite file backing the store.
    /// Env: `PARLEY_DB_PATH`
    /// Default: the platform data directory (see [`Database::new`]).
    pub database_path: Option<PathBuf>,

    /// Base URL of the user directory service (`GET {url}/users`).
    /// Env: `PARLEY_DIRECTORY_URL`
    /// Default: `http://localhost:3000/api`
    pub directory_url: String,

    /// Bearer token scoping directory requests to the caller's session.
    /// Env: `PARLEY_SESSION_TOKEN`
    /// Default: none.
    pub session_token: Option<String>,

    /// How unread counters are bumped on send.
    /// Env: `PARLEY_UNREAD_INCREMENT` (`atomic` / `read-modify-write`)
    /// Default: `atomic`
    pub unread_increment: IncrementMode,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            directory_url: "http://localhost:3000/api".to_string(),
            session_token: None,
            unread_increment: IncrementMode::Atomic,
        }
    }
}

impl ChatConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("PARLEY_DB_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Some(url) = lookup("PARLEY_DIRECTORY_URL") {
            if url.starts_with("http://") || url.starts_with("https://") {
                config.directory_url = url;
            } else {
                tracing::warn!(value = %url, "Invalid PARLEY_DIRECTORY_URL, using default");
            }
        }

        if let Some(token) = lookup("PARLEY_SESSION_TOKEN") {
            if !token.is_empty() {
                config.session_token = Some(token);
            }
        }

        if let Some(mode) = lookup("PARLEY_UNREAD_INCREMENT") {
            match mode.parse::<IncrementMode>() {
                Ok(mode) => config.unread_increment = mode,
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid PARLEY_UNREAD_INCREMENT, using default");
                }
            }
        }

        config
    }

    /// Open the configured database and serve it as a store.
    pub fn open_store(&self) -> Result<RealtimeStore, StoreError> {
        let db = match &self.database_path {
            Some(path) => Database::open_at(path)?,
            None => Database::new()?,
        };
        Ok(RealtimeStore::open(db))
    }
}
