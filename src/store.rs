//! Persistent association store: learned (label -> key) mappings and the
//! last selected label.
//!
//! Persistence is an optimization, not a correctness requirement. The engine
//! treats every store error as soft and degrades to "always use fallbacks";
//! implementations are expected to fail soft on decode errors themselves.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

/// File format version. Bumped when the shape of the durable entries
/// changes; older or unknown shapes decode to the default.
const STORE_VERSION: u32 = 2;

/// Durable state: the association mapping and the last-selected-label
/// scalar, stored under fixed field identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct StoreFile {
    version: u32,
    model_key_by_label: BTreeMap<String, String>,
    last_label: Option<String>,
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            model_key_by_label: BTreeMap::new(),
            last_label: None,
        }
    }
}

/// Injected persistence seam for the engine and the change observer.
///
/// Associations are keyed by *normalized* label, at most one key per label.
/// Callers only ever write an association after an observed confirmation.
pub trait AssociationStore: Send + Sync {
    fn read_associations(&self) -> Result<BTreeMap<String, String>>;
    fn write_associations(&self, associations: &BTreeMap<String, String>) -> Result<()>;
    fn read_last_label(&self) -> Result<Option<String>>;
    fn write_last_label(&self, label: &str) -> Result<()>;
    /// Explicit external deletion op; never invoked by the engine itself.
    fn clear_associations(&self) -> Result<()>;
}

/// JSON-file-backed store with atomic replace.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StoreFile {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                debug!(path = %self.path.display(), %err, "state file did not decode, starting empty");
                StoreFile::default()
            }),
            Err(_) => StoreFile::default(),
        }
    }

    fn persist(&self, file: &StoreFile) -> Result<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }

        let mut contents = serde_json::to_string_pretty(file)?;
        contents.push('\n');

        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| {
            Error::storage(format!(
                "failed to persist state file to {}: {}",
                self.path.display(),
                err.error
            ))
        })?;

        Ok(())
    }
}

impl AssociationStore for JsonFileStore {
    fn read_associations(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.load().model_key_by_label)
    }

    fn write_associations(&self, associations: &BTreeMap<String, String>) -> Result<()> {
        let mut file = self.load();
        file.model_key_by_label = associations.clone();
        self.persist(&file)
    }

    fn read_last_label(&self) -> Result<Option<String>> {
        Ok(self.load().last_label)
    }

    fn write_last_label(&self, label: &str) -> Result<()> {
        let mut file = self.load();
        file.last_label = Some(label.to_string());
        self.persist(&file)
    }

    fn clear_associations(&self) -> Result<()> {
        let mut file = self.load();
        file.model_key_by_label.clear();
        self.persist(&file)
    }
}

/// In-memory store for tests and embedders that manage their own
/// persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<StoreFile>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssociationStore for MemoryStore {
    fn read_associations(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.inner.lock().unwrap().model_key_by_label.clone())
    }

    fn write_associations(&self, associations: &BTreeMap<String, String>) -> Result<()> {
        self.inner.lock().unwrap().model_key_by_label = associations.clone();
        Ok(())
    }

    fn read_last_label(&self) -> Result<Option<String>> {
        Ok(self.inner.lock().unwrap().last_label.clone())
    }

    fn write_last_label(&self, label: &str) -> Result<()> {
        self.inner.lock().unwrap().last_label = Some(label.to_string());
        Ok(())
    }

    fn clear_associations(&self) -> Result<()> {
        self.inner.lock().unwrap().model_key_by_label.clear();
        Ok(())
    }
}
