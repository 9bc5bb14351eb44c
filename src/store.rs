//! Durable storage for the engine catalog.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::EngineRecord;
use crate::{Result, SuggestError};

/// Snapshot of the catalog as written to storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCatalog {
    /// Default engines in user order.
    pub defaults_order: Vec<EngineRecord>,
    /// Known but inactive engines.
    pub others: Vec<EngineRecord>,
}

impl StoredCatalog {
    /// Returns true if neither collection holds an engine.
    pub fn is_empty(&self) -> bool {
        self.defaults_order.is_empty() && self.others.is_empty()
    }
}

/// Key-value style persistence of the two engine lists.
///
/// `save` returns [`SuggestError::QuotaExceeded`] when the snapshot does not
/// fit; the catalog reacts by evicting engines and retrying.
pub trait CatalogStore: Send + Sync {
    /// Loads the last saved snapshot, or `None` on first run.
    fn load(&self) -> Result<Option<StoredCatalog>>;

    /// Replaces the stored snapshot.
    fn save(&self, catalog: &StoredCatalog) -> Result<()>;

    /// Removes all stored data.
    fn clear(&self) -> Result<()>;
}

fn check_quota(bytes: usize, quota: Option<usize>) -> Result<()> {
    match quota {
        Some(limit) if bytes > limit => Err(SuggestError::QuotaExceeded { used: bytes, limit }),
        _ => Ok(()),
    }
}

/// In-memory store, mainly for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<Option<StoredCatalog>>,
    quota: Option<usize>,
}

impl MemoryStore {
    /// Creates an empty store without a quota.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with a snapshot.
    pub fn with_catalog(catalog: StoredCatalog) -> Self {
        Self {
            data: Mutex::new(Some(catalog)),
            quota: None,
        }
    }

    /// Limits the serialized snapshot size in bytes.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Returns a copy of the stored snapshot.
    pub fn snapshot(&self) -> Option<StoredCatalog> {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl CatalogStore for MemoryStore {
    fn load(&self) -> Result<Option<StoredCatalog>> {
        Ok(self.snapshot())
    }

    fn save(&self, catalog: &StoredCatalog) -> Result<()> {
        let bytes = serde_json::to_vec(catalog)?;
        check_quota(bytes.len(), self.quota)?;
        *self.data.lock().unwrap_or_else(|e| e.into_inner()) = Some(catalog.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.data.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

/// Store backed by a single JSON file.
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so a crash never leaves a truncated catalog behind.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    quota: Option<usize>,
}

impl JsonFileStore {
    /// Creates a store writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            quota: None,
        }
    }

    /// Limits the file size in bytes.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogStore for JsonFileStore {
    fn load(&self) -> Result<Option<StoredCatalog>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let catalog = serde_json::from_str(&content)?;
        Ok(Some(catalog))
    }

    fn save(&self, catalog: &StoredCatalog) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(catalog)?;
        check_quota(bytes.len(), self.quota)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Saved catalog to {} ({} bytes)", self.path.display(), bytes.len());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
