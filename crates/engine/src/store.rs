//! Local Store: durable key-value persistence of serialized state.
//!
//! Persistence is a convenience cache, never a consistency authority. The
//! [`Persisted`] wrapper is the only way the engine touches a store and it
//! never returns an error: a failed load yields the default value and a
//! failed save is logged and dropped.

use std::collections::HashMap;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by a key-value backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Value could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Backend refused the operation.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// A string key-value store.
///
/// Backends report their faults; callers go through [`Persisted`], which
/// swallows them.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn save(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete the value stored under `key`. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).load(key)
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).save(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).load(key)
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).save(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

// =============================================================================
// FileStore
// =============================================================================

/// One JSON file per key under a directory.
///
/// Writes go to a temporary file that is then renamed over the target, so a
/// crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the store's files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let target = self.path_for(key);
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &target)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-process store for ephemeral sessions and tests.
///
/// Can be switched into an unavailable mode to simulate storage faults.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store disabled".to_string()));
        }
        Ok(())
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        Ok(self.values().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.values().remove(key);
        Ok(())
    }
}

// =============================================================================
// Persisted
// =============================================================================

/// Best-effort typed view of one key in a store.
pub struct Persisted<T, S> {
    store: S,
    key: String,
    _value: PhantomData<fn() -> T>,
}

impl<T, S> Persisted<T, S>
where
    T: Serialize + DeserializeOwned + Default,
    S: KeyValueStore,
{
    /// Bind a value type to `key` in `store`.
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            _value: PhantomData,
        }
    }

    /// Key this value is stored under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the stored value, or the default if it is missing or unreadable.
    #[must_use]
    pub fn load(&self) -> T {
        match self.try_load() {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(key = %self.key, "No persisted state, starting empty");
                T::default()
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to load persisted state, starting empty");
                T::default()
            }
        }
    }

    /// Store a value. Failures are logged and dropped.
    pub fn save(&self, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(StoreError::from)
            .and_then(|json| self.store.save(&self.key, &json));
        if let Err(e) = result {
            warn!(key = %self.key, error = %e, "Failed to persist state");
        }
    }

    fn try_load(&self) -> Result<Option<T>, StoreError> {
        self.store
            .load(&self.key)?
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(StoreError::from)
    }
}
