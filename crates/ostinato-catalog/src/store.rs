//! JSON persistence for user-managed loopback endpoints.
//!
//! The on-disk document is a flat array `[{ id, name, ... }]`. Writes are
//! atomic (write a sibling tmp file, then rename). A file that fails to
//! parse is moved aside with a timestamped `.corrupt-*.bak` suffix and
//! replaced by the empty set, so a bad document never blocks startup.

use crate::error::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One persisted loopback endpoint. Backend-specific fields a newer (or
/// older) build wrote are retained in `extra` and round-trip untouched;
/// the legacy id+name-only shape loads the same way and is upgraded on
/// the next write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedLoopback {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PersistedLoopback {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }
}

/// File-backed store with atomic replace semantics.
pub struct LoopbackStore {
    path: PathBuf,
}

impl LoopbackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted set. Missing file means empty; a malformed file
    /// is backed up and treated as empty.
    pub fn load(&self) -> Result<Vec<PersistedLoopback>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(list) => Ok(list),
            Err(e) => {
                let backup = self.backup_path();
                warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "loopback store is corrupt; backing up and starting empty"
                );
                fs::rename(&self.path, &backup)?;
                Ok(Vec::new())
            }
        }
    }

    /// Replace the persisted set atomically.
    pub fn save(&self, endpoints: &[PersistedLoopback]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_vec_pretty(endpoints)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn backup_path(&self) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "loopbacks.json".to_string());
        self.path
            .with_file_name(format!("{file_name}.corrupt-{stamp}.bak"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> LoopbackStore {
        LoopbackStore::new(dir.path().join("loopbacks.json"))
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        assert!(store_in(&dir).load().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let endpoints = vec![
            PersistedLoopback::new("loop:a", "Bus A"),
            PersistedLoopback::new("loop:b", "Bus B"),
        ];
        store.save(&endpoints).unwrap();
        assert_eq!(store.load().unwrap(), endpoints);
    }

    #[test]
    fn test_legacy_id_name_shape_is_accepted() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), r#"[{"id":"loop:x","name":"Old Bus"}]"#).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "loop:x");
        assert!(loaded[0].extra.is_empty());
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            r#"[{"id":"loop:x","name":"Bus","deviceGuid":"abc-123"}]"#,
        )
        .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded[0].extra["deviceGuid"], "abc-123");

        store.save(&loaded).unwrap();
        let reloaded = store.load().unwrap();
        assert_eq!(reloaded[0].extra["deviceGuid"], "abc-123");
    }

    #[test]
    fn test_corrupt_file_backed_up_and_replaced_with_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "{not json").unwrap();

        assert!(store.load().unwrap().is_empty());
        assert!(!store.path().exists());

        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.contains(".corrupt-") && name.ends_with(".bak")
            })
            .collect();
        assert_eq!(backups.len(), 1);
    }

    #[test]
    fn test_save_replaces_not_appends() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .save(&[PersistedLoopback::new("loop:a", "Bus A")])
            .unwrap();
        store
            .save(&[PersistedLoopback::new("loop:b", "Bus B")])
            .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "loop:b");
    }
}
