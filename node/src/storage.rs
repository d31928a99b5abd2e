//! File-backed slot storage.
//!
//! Each [`FileStorage`] is one JSON object on disk mapping slot names to
//! strings. The whole file is loaded on open and rewritten on every mutation
//! through a temp file and a rename, so a crash leaves either the old or the
//! new contents. Inside a batch, mutations stay in memory and the file is
//! rewritten once on commit.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hearth_engine::{error::Result, Error, Storage};

/// Slot storage persisted as a single JSON file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    slots: BTreeMap<String, String>,
    batching: bool,
    dirty: bool,
}

impl FileStorage {
    /// Open (or create) the storage file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        let slots = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                Error::Storage(format!("{}: not a slot file: {e}", path.display()))
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(io_error(&path, e)),
        };

        tracing::debug!(path = %path.display(), slots = slots.len(), "Opened storage file");
        Ok(Self {
            path,
            slots,
            batching: false,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Write now, or mark the batch dirty.
    fn flush(&mut self) -> Result<()> {
        if self.batching {
            self.dirty = true;
            return Ok(());
        }
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let text = serde_json::to_string(&self.slots)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text).map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| io_error(&self.path, e))
    }
}

impl Storage for FileStorage {
    fn get_item(&self, slot: &str) -> Result<Option<String>> {
        Ok(self.slots.get(slot).cloned())
    }

    fn set_item(&mut self, slot: &str, value: &str) -> Result<()> {
        if self.slots.get(slot).map(String::as_str) == Some(value) {
            return Ok(());
        }
        self.slots.insert(slot.to_string(), value.to_string());
        self.flush()
    }

    fn remove_item(&mut self, slot: &str) -> Result<()> {
        if self.slots.remove(slot).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn begin_batch(&mut self) {
        self.batching = true;
    }

    fn commit(&mut self) -> Result<()> {
        self.batching = false;
        if !std::mem::take(&mut self.dirty) {
            return Ok(());
        }
        tracing::trace!(path = %self.path.display(), slots = self.slots.len(), "Committing batch");
        self.persist()
    }
}

fn io_error(path: &Path, err: io::Error) -> Error {
    Error::Storage(format!("{}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_engine::{Lz4Codec, MemoryStorage, RecordStore};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn missing_file_opens_empty() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path().join("nested/store.json")).unwrap();
        assert!(storage.is_empty());
        assert!(!storage.path().exists());
    }

    #[test]
    fn writes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let mut storage = FileStorage::open(&path).unwrap();
        storage.set_item("meta:age", "42").unwrap();
        storage.set_item("record:a", "blob").unwrap();
        storage.remove_item("record:a").unwrap();

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get_item("meta:age").unwrap().as_deref(), Some("42"));
        assert_eq!(reopened.get_item("record:a").unwrap(), None);
        assert_eq!(reopened.len(), 1);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(FileStorage::open(&path), Err(Error::Storage(_))));
    }

    #[test]
    fn record_store_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let mut store = RecordStore::open(FileStorage::open(&path).unwrap(), Lz4Codec).unwrap();
        store.set("tasks", &json!(["T1", "T2"]), 1000).unwrap();
        store.set("settings", &json!({"theme": "dark"}), 2000).unwrap();
        drop(store);

        let store = RecordStore::open(FileStorage::open(&path).unwrap(), Lz4Codec).unwrap();
        assert_eq!(store.age(), 2000);
        assert_eq!(store.keys(), ["tasks", "settings"]);
        assert_eq!(store.get("tasks"), Some(json!(["T1", "T2"])));
    }

    #[test]
    fn batch_reaches_disk_on_commit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let mut storage = FileStorage::open(&path).unwrap();
        storage.set_item("meta:age", "1").unwrap();

        storage.begin_batch();
        storage.set_item("meta:age", "2").unwrap();
        storage.set_item("record:a", "blob").unwrap();
        storage.remove_item("record:missing").unwrap();
        assert_eq!(storage.get_item("record:a").unwrap().as_deref(), Some("blob"));

        let before = FileStorage::open(&path).unwrap();
        assert_eq!(before.get_item("meta:age").unwrap().as_deref(), Some("1"));
        assert_eq!(before.get_item("record:a").unwrap(), None);

        storage.commit().unwrap();
        let after = FileStorage::open(&path).unwrap();
        assert_eq!(after.get_item("meta:age").unwrap().as_deref(), Some("2"));
        assert_eq!(after.get_item("record:a").unwrap().as_deref(), Some("blob"));

        // Writes after the batch persist immediately again
        storage.set_item("meta:age", "3").unwrap();
        let later = FileStorage::open(&path).unwrap();
        assert_eq!(later.get_item("meta:age").unwrap().as_deref(), Some("3"));
    }

    #[test]
    fn applied_snapshot_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let mut remote = RecordStore::open(MemoryStorage::new(), Lz4Codec).unwrap();
        remote.set("tasks", &json!(["T1"]), 1000).unwrap();
        remote.set("notes", &json!("n"), 2000).unwrap();
        remote.set("settings", &json!({"theme": "dark"}), 3000).unwrap();
        let snapshot = remote.snapshot(false, 3000);

        let mut store = RecordStore::open(FileStorage::open(&path).unwrap(), Lz4Codec).unwrap();
        store.set("stale", &json!(1), 500).unwrap();
        store.apply(&snapshot).unwrap();
        drop(store);

        let store = RecordStore::open(FileStorage::open(&path).unwrap(), Lz4Codec).unwrap();
        assert_eq!(store.age(), 3000);
        assert_eq!(store.keys(), ["tasks", "notes", "settings"]);
        assert_eq!(store.get("settings"), Some(json!({"theme": "dark"})));
        assert_eq!(store.get("stale"), None);
    }
}
