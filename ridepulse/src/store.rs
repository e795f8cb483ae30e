//! Persistence for state that must survive restarts.
//!
//! The store is a namespaced key-value document: one JSON object whose
//! `ridepulse-storage` key holds `{version, state}`. Other keys in the file
//! are left untouched.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::reconcile::MetricsSnapshot;

/// Namespace key under which state is stored.
pub const STORAGE_KEY: &str = "ridepulse-storage";

/// Bumped when the persisted shape changes incompatibly.
const STATE_VERSION: u32 = 1;

/// Errors from reading or writing persisted state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state store lock poisoned")]
    Poisoned,
}

/// The persisted part of the pipeline state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Snapshot history, newest first.
    #[serde(default)]
    pub snapshots: Vec<MetricsSnapshot>,
    /// Milliseconds since the epoch of the last successful refresh.
    #[serde(default)]
    pub last_update: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Stored {
    version: u32,
    state: PersistedState,
}

/// Backend for persisted state.
pub trait StateStore: Send + Sync {
    /// The saved state, or `None` if nothing (compatible) has been saved.
    fn load(&self) -> Result<Option<PersistedState>, StoreError>;

    fn save(&self, state: &PersistedState) -> Result<(), StoreError>;
}

/// JSON file store.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store state under [`STORAGE_KEY`] in the JSON file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read_document(&self) -> Result<Option<Map<String, Value>>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

impl StateStore for FileStore {
    fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        let Some(mut document) = self.read_document()? else {
            return Ok(None);
        };
        let Some(value) = document.remove(STORAGE_KEY) else {
            return Ok(None);
        };

        let stored: Stored = serde_json::from_value(value)?;
        if stored.version != STATE_VERSION {
            warn!(
                path = %self.path.display(),
                found = stored.version,
                expected = STATE_VERSION,
                "ignoring persisted state with unknown version"
            );
            return Ok(None);
        }

        Ok(Some(stored.state))
    }

    fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        let mut document = match self.read_document() {
            Ok(document) => document.unwrap_or_default(),
            Err(StoreError::Json(e)) => {
                warn!(path = %self.path.display(), error = %e, "overwriting unreadable state file");
                Map::new()
            }
            Err(e) => return Err(e),
        };

        let stored = Stored {
            version: STATE_VERSION,
            state: state.clone(),
        };
        document.insert(STORAGE_KEY.to_string(), serde_json::to_value(stored)?);

        // Create parent directories if needed
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        // Write then rename so a crash never leaves a half-written file.
        let json = serde_json::to_string_pretty(&document)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;

        Ok(())
    }
}

/// In-memory store, for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Option<PersistedState>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that starts out holding `state`.
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            saves: Mutex::new(0),
        }
    }

    /// Number of successful saves.
    pub fn saves(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        let guard = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(guard.clone())
    }

    fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        *self.state.lock().map_err(|_| StoreError::Poisoned)? = Some(state.clone());
        *self.saves.lock().map_err(|_| StoreError::Poisoned)? += 1;
        Ok(())
    }
}
