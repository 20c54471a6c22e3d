//! Permission inventory snapshot storage
//!
//! Rows are keyed by `(object_type, object_id)`. Appending a row whose key is
//! already stored replaces the earlier row, so re-running a crawl after a
//! partial failure converges on one row per object.

use crate::error::InventoryError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One crawled object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    /// Object id within its type
    pub object_id: String,
    /// Object type, matching a registered permission support
    pub object_type: String,
    /// Whether the ACL was fetched
    pub success: bool,
    /// Serialized ACL on success, error text otherwise
    pub payload: String,
}

impl SnapshotRow {
    /// Row for a fetched ACL
    #[must_use]
    pub fn fetched(
        object_type: impl Into<String>,
        object_id: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            object_type: object_type.into(),
            success: true,
            payload: payload.into(),
        }
    }

    /// Row recording a failed fetch
    #[must_use]
    pub fn failed(
        object_type: impl Into<String>,
        object_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            object_type: object_type.into(),
            success: false,
            payload: error.into(),
        }
    }

    fn key(&self) -> (String, String) {
        (self.object_type.clone(), self.object_id.clone())
    }
}

/// Snapshot store collaborator
pub trait InventoryStore: Send + Sync {
    /// Persist `rows`
    fn append(&self, rows: &[SnapshotRow]) -> Result<(), InventoryError>;

    /// Every stored row, ordered by `(object_type, object_id)`
    fn load_all(&self) -> Result<Vec<SnapshotRow>, InventoryError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryInventory {
    rows: RwLock<BTreeMap<(String, String), SnapshotRow>>,
}

impl MemoryInventory {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Check if nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl InventoryStore for MemoryInventory {
    fn append(&self, rows: &[SnapshotRow]) -> Result<(), InventoryError> {
        let mut stored = self.rows.write();
        for row in rows {
            stored.insert(row.key(), row.clone());
        }
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<SnapshotRow>, InventoryError> {
        Ok(self.rows.read().values().cloned().collect())
    }
}

/// Store backed by a JSON file, rewritten atomically on every append
#[derive(Debug)]
pub struct JsonFileInventory {
    path: PathBuf,
    lock: RwLock<()>,
}

impl JsonFileInventory {
    /// Store at `path`; the file is created on first append
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    /// Backing file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_rows(&self) -> Result<BTreeMap<(String, String), SnapshotRow>, InventoryError> {
        let display = self.path.display().to_string();
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(InventoryError::Io {
                    path: display,
                    source,
                })
            }
        };
        let rows: Vec<SnapshotRow> = serde_json::from_str(&raw).map_err(|source| {
            InventoryError::Encoding {
                path: display,
                source,
            }
        })?;
        Ok(rows.into_iter().map(|row| (row.key(), row)).collect())
    }

    fn write_rows(&self, rows: &BTreeMap<(String, String), SnapshotRow>) -> Result<(), InventoryError> {
        let display = self.path.display().to_string();
        let io_err = |source| InventoryError::Io {
            path: display.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(io_err)?;

        let values: Vec<&SnapshotRow> = rows.values().collect();
        let encoded = serde_json::to_vec_pretty(&values).map_err(|source| {
            InventoryError::Encoding {
                path: display.clone(),
                source,
            }
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&encoded).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

impl InventoryStore for JsonFileInventory {
    fn append(&self, rows: &[SnapshotRow]) -> Result<(), InventoryError> {
        let _guard = self.lock.write();
        let mut stored = self.read_rows()?;
        for row in rows {
            stored.insert(row.key(), row.clone());
        }
        self.write_rows(&stored)
    }

    fn load_all(&self) -> Result<Vec<SnapshotRow>, InventoryError> {
        let _guard = self.lock.read();
        Ok(self.read_rows()?.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn memory_append_replaces_same_key() {
        let store = MemoryInventory::new();
        store
            .append(&[
                SnapshotRow::failed("clusters", "c1", "timeout"),
                SnapshotRow::fetched("jobs", "7", "{}"),
            ])
            .unwrap();
        store
            .append(&[SnapshotRow::fetched("clusters", "c1", "{\"acl\":1}")])
            .unwrap();

        let rows = store.load_all().unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(rows[0], SnapshotRow::fetched("clusters", "c1", "{\"acl\":1}"));
        assert_eq!(rows[1].object_type, "jobs");
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileInventory::new(dir.path().join("nope.json"));
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_is_an_encoding_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        fs::write(&path, "not json").unwrap();

        let err = JsonFileInventory::new(&path).load_all().unwrap_err();
        assert!(matches!(err, InventoryError::Encoding { .. }));
    }
}
