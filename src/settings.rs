//! Durable backend settings store
//!
//! Holds the two backend base URLs and the active backend selection in a
//! small SQLite key/value table so they survive restarts. URLs are
//! normalized to end with a trailing slash before they are persisted.

use crate::config::Config;
use crate::error::Result;
use rusqlite::{Connection, OptionalExtension};
use std::path::PathBuf;
use tracing::{debug, warn};

const KEY_PRIMARY_URL: &str = "primary_base_url";
const KEY_SECONDARY_URL: &str = "secondary_base_url";
const KEY_ACTIVE_BACKEND: &str = "active_backend";

/// One of the two configured backend endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Primary,
    Secondary,
}

impl Backend {
    /// Parse a backend name; returns None for anything but
    /// "primary"/"secondary" (case-insensitive).
    pub fn parse(name: &str) -> Option<Backend> {
        match name.trim().to_lowercase().as_str() {
            "primary" => Some(Backend::Primary),
            "secondary" => Some(Backend::Secondary),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Primary => "primary",
            Backend::Secondary => "secondary",
        }
    }

    /// The other endpoint of the pair
    pub fn other(&self) -> Backend {
        match self {
            Backend::Primary => Backend::Secondary,
            Backend::Secondary => Backend::Primary,
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trim the input and append a trailing slash unless it is empty or
/// already has one. Already-normalized input comes back unchanged.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

/// Settings store backed by a SQLite KV table
pub struct SettingsStore {
    db_path: PathBuf,
    default_primary_url: String,
    default_secondary_url: String,
}

impl SettingsStore {
    /// Open (creating if needed) the settings database under the config's
    /// data directory.
    pub fn open(config: &Config) -> Result<Self> {
        if let Some(parent) = config.settings_db.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self {
            db_path: config.settings_db.clone(),
            default_primary_url: config.default_primary_url.clone(),
            default_secondary_url: config.default_secondary_url.clone(),
        };
        let conn = store.open_db()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(store)
    }

    fn open_db(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        Ok(conn)
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.open_db()?;
        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.open_db()?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }

    fn url_key(backend: Backend) -> &'static str {
        match backend {
            Backend::Primary => KEY_PRIMARY_URL,
            Backend::Secondary => KEY_SECONDARY_URL,
        }
    }

    /// Base URL for the given backend, falling back to the built-in default
    /// when nothing has been saved yet.
    pub fn endpoint_url(&self, backend: Backend) -> Result<String> {
        let stored = self.get(Self::url_key(backend))?;
        Ok(stored.unwrap_or_else(|| match backend {
            Backend::Primary => self.default_primary_url.clone(),
            Backend::Secondary => self.default_secondary_url.clone(),
        }))
    }

    /// Persist a backend base URL, normalizing the trailing slash first.
    /// An empty (or all-whitespace) URL leaves the stored value untouched.
    pub fn set_endpoint_url(&self, backend: Backend, url: &str) -> Result<()> {
        let normalized = normalize_base_url(url);
        if normalized.is_empty() {
            warn!(backend = %backend, "ignoring empty base URL");
            return Ok(());
        }
        debug!(backend = %backend, url = %normalized, "saving base URL");
        self.set(Self::url_key(backend), &normalized)
    }

    /// The currently selected backend. Defaults to primary, including when
    /// the stored value is unrecognized.
    pub fn active_backend(&self) -> Result<Backend> {
        let stored = self.get(KEY_ACTIVE_BACKEND)?;
        Ok(stored
            .as_deref()
            .and_then(Backend::parse)
            .unwrap_or(Backend::Primary))
    }

    /// Select the active backend by name. Unknown names are ignored without
    /// error; the stored selection stays as it was.
    pub fn set_active_backend(&self, name: &str) -> Result<()> {
        match Backend::parse(name) {
            Some(backend) => {
                debug!(backend = %backend, "saving active backend");
                self.set(KEY_ACTIVE_BACKEND, backend.as_str())
            }
            None => {
                warn!(name = %name, "ignoring unknown backend name");
                Ok(())
            }
        }
    }
}
