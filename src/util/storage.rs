//! Durable key/value storage for the session token and cached user profile.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every read and write of session data goes through [`SessionStorage`], so
//! the backing store can be swapped: [`MemoryStore`] for tests and throwaway
//! sessions, [`FileStore`] for sessions that survive process restarts.
//!
//! TRADE-OFFS
//! ==========
//! `FileStore` re-reads its file on every access and has no cross-process
//! locking. Two processes sharing a session directory race the same way two
//! browser tabs race on `localStorage`: last write wins.

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use reqwest::Url;

use crate::net::types::User;

/// Storage key holding the bearer token.
pub const TOKEN_KEY: &str = "token";
/// Storage key holding the serialized user profile.
pub const USER_KEY: &str = "user";

/// Errors raised while writing session storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io failed: {0}")]
    Io(#[from] io::Error),

    #[error("storage encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// String key/value storage with browser `localStorage` semantics.
///
/// Reads never fail: an unreadable store looks empty.
pub trait SessionStore: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;

    /// # Errors
    ///
    /// Returns an error if the value could not be persisted.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns an error if the removal could not be persisted.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Process-memory store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get_item(&self, key: &str) -> Option<String> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
        Ok(())
    }
}

// =============================================================================
// FILE STORE
// =============================================================================

/// JSON-object file store, one file per API origin.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Store backed by the file at `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    /// Store scoped to the origin of `base_url` inside `dir`.
    #[must_use]
    pub fn for_origin(dir: &Path, base_url: &Url) -> Self {
        Self::new(dir.join(origin_file_name(base_url)))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_items(&self) -> BTreeMap<String, String> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "session file unreadable");
                return BTreeMap::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(items) => items,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "session file corrupt; treating as empty");
                BTreeMap::new()
            }
        }
    }

    fn write_items(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let raw = serde_json::to_string_pretty(items)?;
        // Unique sibling temp file: concurrent writers never share it.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(raw.as_bytes())?;
        tmp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }

    fn modify(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut items = self.read_items();
        f(&mut items);
        self.write_items(&items)
    }
}

impl SessionStore for FileStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.read_items().remove(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.modify(|items| {
            items.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.modify(|items| {
            items.remove(key);
        })
    }
}

/// File name for an origin, e.g. `https_api.geosiaga.id_443.json`.
fn origin_file_name(base_url: &Url) -> String {
    let host = base_url.host_str().unwrap_or("local");
    let port = base_url.port_or_known_default().unwrap_or(0);
    let sanitized: String = host
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    format!("{}_{sanitized}_{port}.json", base_url.scheme())
}

// =============================================================================
// SESSION STORAGE
// =============================================================================

/// Typed access to the token and user keys of a [`SessionStore`].
#[derive(Clone)]
pub struct SessionStorage {
    store: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for SessionStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStorage").finish_non_exhaustive()
    }
}

impl SessionStorage {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Storage over a fresh [`MemoryStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.store.get_item(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// Write the token, or remove it when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails to persist the change.
    pub fn set_token(&self, token: Option<&str>) -> Result<(), StorageError> {
        match token {
            Some(token) => self.store.set_item(TOKEN_KEY, token),
            None => self.store.remove_item(TOKEN_KEY),
        }
    }

    /// Cached user profile. Missing or malformed content reads as `None`.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        let raw = self.store.get_item(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(err) => {
                tracing::warn!(error = %err, "stored user is malformed; ignoring");
                None
            }
        }
    }

    /// Write the serialized profile, or remove it when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the underlying store fails.
    pub fn set_user(&self, user: Option<&User>) -> Result<(), StorageError> {
        match user {
            Some(user) => {
                let raw = serde_json::to_string(user)?;
                self.store.set_item(USER_KEY, &raw)
            }
            None => self.store.remove_item(USER_KEY),
        }
    }

    /// Remove both token and user.
    ///
    /// Both removals are attempted even if the first fails.
    ///
    /// # Errors
    ///
    /// Returns the first failure encountered.
    pub fn clear(&self) -> Result<(), StorageError> {
        let token = self.set_token(None);
        let user = self.set_user(None);
        token.and(user)
    }

    /// [`Self::clear`] for cleanup paths: failures are logged, not returned.
    pub fn clear_best_effort(&self) {
        if let Err(err) = self.clear() {
            tracing::warn!(error = %err, "failed to clear session storage");
        }
    }
}
