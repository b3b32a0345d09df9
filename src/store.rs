//! State persistence
//!
//! The engine's durable state is one JSON document: model weights,
//! normalization statistics, training history and the intervention ledger.
//! The storage engine itself is a collaborator; the crate ships a
//! file-backed reference store that writes then swaps, so a crash mid-write
//! can never leave weights and statistics mismatched, plus an in-memory
//! store for tests.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::ledger::InterventionLedger;
use crate::model::ModelState;
use crate::normalizer::NormalizationStats;
use crate::types::TrainingHistory;

/// Version stamp on the persisted document.
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// The single persisted document, replaced wholesale on every write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    pub model: Option<ModelState>,
    pub stats: Option<NormalizationStats>,
    pub history: Option<TrainingHistory>,
    pub ledger: InterventionLedger,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: STATE_SCHEMA_VERSION,
            model: None,
            stats: None,
            history: None,
            ledger: InterventionLedger::default(),
        }
    }
}

impl PersistedState {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Durable storage for the engine's state blob.
pub trait StateStore: Send + Sync {
    /// Load the current blob, `None` when nothing was persisted yet.
    fn load(&self) -> Result<Option<String>, EngineError>;

    /// Durably replace the current blob.
    fn save(&self, blob: &str) -> Result<(), EngineError>;
}

/// File-backed store using write-then-swap.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn swap_path(&self) -> PathBuf {
        let mut os = self.path.clone().into_os_string();
        os.push(".tmp");
        PathBuf::from(os)
    }
}

impl StateStore for FileStore {
    fn load(&self) -> Result<Option<String>, EngineError> {
        match fs::read_to_string(&self.path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, blob: &str) -> Result<(), EngineError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let swap = self.swap_path();
        fs::write(&swap, blob)?;
        fs::rename(&swap, &self.path)?;
        Ok(())
    }
}

/// In-memory store for tests and embedders that persist elsewhere.
#[derive(Default)]
pub struct MemoryStore {
    blob: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeded store, used to exercise load paths.
    pub fn with_blob(blob: &str) -> Self {
        Self {
            blob: Mutex::new(Some(blob.to_string())),
        }
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<String>, EngineError> {
        Ok(self
            .blob
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    fn save(&self, blob: &str) -> Result<(), EngineError> {
        *self.blob.lock().unwrap_or_else(|e| e.into_inner()) = Some(blob.to_string());
        Ok(())
    }
}
