//! Store - the record container.
//!
//! The RecordStore holds every record as a compressed blob in a storage slot,
//! a master key index saying which records exist, and the store-wide age.
//! It is the single writer for all three.

use crate::{
    clock::StoreClock,
    codec::{Blob, Codec, Lz4Codec},
    error::Result,
    storage::{record_slot, Storage, AGE_SLOT, KEY_INDEX_SLOT},
    Key, Timestamp,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Ordered set of keys with a live record.
///
/// A key is in the index iff its record exists. The index is a cache of
/// existence, never a source of values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyIndex {
    keys: Vec<Key>,
}

impl KeyIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Build an index from a key list, keeping the first occurrence of each key.
    pub fn from_keys<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = Key>,
    {
        let mut index = Self::new();
        for key in keys {
            index.insert(key);
        }
        index
    }

    /// Check if a key is indexed.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Append a key if absent. Returns true if it was added.
    pub fn insert(&mut self, key: Key) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.keys.push(key);
        true
    }

    /// Drop a key. Returns true if it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.keys.len();
        self.keys.retain(|k| k != key);
        self.keys.len() != before
    }

    /// Keys in insertion order.
    pub fn as_slice(&self) -> &[Key] {
        &self.keys
    }

    /// Number of indexed keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Result of a `set` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOutcome {
    /// The record was written and the age advanced.
    Written,
    /// The value serialized identically to the stored one; nothing changed.
    Unchanged,
    /// The value was null; nothing changed.
    Ignored,
}

impl SetOutcome {
    /// Whether the call advanced the store age.
    pub fn changed(self) -> bool {
        matches!(self, SetOutcome::Written)
    }
}

/// The main store holding all records.
#[derive(Debug)]
pub struct RecordStore<S, C = Lz4Codec> {
    /// Slot storage for blobs, index and age
    storage: S,
    /// Compression for record values and snapshots
    codec: C,
    /// Which records exist
    index: KeyIndex,
    /// Store-wide age
    clock: StoreClock,
}

impl<S: Storage, C: Codec> RecordStore<S, C> {
    /// Open a store over existing storage, loading the key index and age.
    ///
    /// Missing slots start empty. Corrupt metadata is logged and reset rather
    /// than refusing to open.
    pub fn open(storage: S, codec: C) -> Result<Self> {
        let index = match storage.get_item(KEY_INDEX_SLOT)? {
            Some(raw) => match serde_json::from_str::<Vec<Key>>(&raw) {
                Ok(keys) => KeyIndex::from_keys(keys),
                Err(e) => {
                    tracing::warn!(error = %e, "Key index is corrupt; starting empty");
                    KeyIndex::new()
                }
            },
            None => KeyIndex::new(),
        };

        let age = match storage.get_item(AGE_SLOT)? {
            Some(raw) => raw.trim().parse::<Timestamp>().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Stored age is corrupt; starting at 0");
                0
            }),
            None => 0,
        };

        tracing::debug!(keys = index.len(), age, "Record store opened");

        Ok(Self {
            storage,
            codec,
            index,
            clock: StoreClock::at(age),
        })
    }

    /// Current store age.
    pub fn age(&self) -> Timestamp {
        self.clock.age()
    }

    /// The store clock.
    pub fn clock(&self) -> &StoreClock {
        &self.clock
    }

    /// Keys with a live record, in index order.
    pub fn keys(&self) -> &[Key] {
        self.index.as_slice()
    }

    /// The key index.
    pub fn index(&self) -> &KeyIndex {
        &self.index
    }

    /// Check if a record exists.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the store has no records.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// The codec in use.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// The underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Give back the underlying storage.
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Write a value under `key`.
    ///
    /// Null values are ignored with a warning. A value that serializes to the
    /// same JSON as the stored one is a no-op and does not touch the age.
    pub fn set<T>(&mut self, key: &str, value: &T, now: Timestamp) -> Result<SetOutcome>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value)?;
        if value.is_null() {
            tracing::warn!(key, "Value is null; ignoring set");
            return Ok(SetOutcome::Ignored);
        }

        let updated = serde_json::to_string(&value)?;
        let before = if self.index.contains(key) {
            self.read_value(key)
                .map(|v| serde_json::to_string(&v))
                .transpose()?
        } else {
            None
        };
        if before.as_deref() == Some(updated.as_str()) {
            tracing::info!(key, "Value did not change; ignoring set");
            return Ok(SetOutcome::Unchanged);
        }

        let blob = self.codec.compress(&updated);
        self.storage.set_item(&record_slot(key), blob.as_str())?;
        if self.index.insert(key.to_string()) {
            self.persist_index()?;
        }
        let age = self.clock.advance(now);
        self.persist_age()?;

        tracing::debug!(key, age, "Value updated");
        Ok(SetOutcome::Written)
    }

    /// Read the value under `key`.
    ///
    /// Returns `None` if the key is absent (logged) or its blob no longer
    /// decodes. Never fails.
    pub fn get(&self, key: &str) -> Option<Value> {
        if !self.index.contains(key) {
            tracing::warn!(key, "No such key in store");
            return None;
        }
        self.read_value(key)
    }

    /// Read and deserialize the value under `key`.
    ///
    /// A value of the wrong shape reads as absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                tracing::warn!(key, error = %e, "Stored value has unexpected shape");
                None
            }
        }
    }

    /// The raw compressed blob stored for `key`.
    pub fn raw(&self, key: &str) -> Option<Blob> {
        if !self.index.contains(key) {
            return None;
        }
        self.read_blob(key)
    }

    /// Delete the record under `key`.
    ///
    /// Removal is itself a change: the age advances even if the key was not
    /// present, so peers that are behind pick up the deletion.
    pub fn remove(&mut self, key: &str, now: Timestamp) -> Result<()> {
        self.storage.remove_item(&record_slot(key))?;
        if self.index.remove(key) {
            self.persist_index()?;
        }
        let age = self.clock.advance(now);
        self.persist_age()?;

        tracing::debug!(key, age, "Value removed");
        Ok(())
    }

    /// Delete every indexed record. Returns how many were removed.
    pub fn remove_all(&mut self, now: Timestamp) -> Result<usize> {
        if self.index.is_empty() {
            tracing::warn!("No keys were found");
            return Ok(0);
        }

        let keys = self.index.as_slice().to_vec();
        self.batched(|store| {
            for key in &keys {
                store.remove(key, now)?;
            }
            Ok(keys.len())
        })
    }

    /// Run `f` inside one storage batch. The batch is committed even when `f`
    /// fails.
    pub(crate) fn batched<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.storage.begin_batch();
        let result = f(self);
        let committed = self.storage.commit();
        let value = result?;
        committed?;
        Ok(value)
    }

    pub(crate) fn write_blob(&mut self, key: &str, blob: &Blob) -> Result<()> {
        self.storage.set_item(&record_slot(key), blob.as_str())
    }

    pub(crate) fn drop_blob(&mut self, key: &str) -> Result<()> {
        self.storage.remove_item(&record_slot(key))
    }

    pub(crate) fn has_blob(&self, key: &str) -> bool {
        self.read_blob(key).is_some()
    }

    pub(crate) fn replace_index(&mut self, index: KeyIndex) -> Result<()> {
        self.index = index;
        self.persist_index()
    }

    pub(crate) fn adopt_age(&mut self, age: Timestamp) -> Result<()> {
        self.clock.set(age);
        self.persist_age()
    }

    fn read_blob(&self, key: &str) -> Option<Blob> {
        match self.storage.get_item(&record_slot(key)) {
            Ok(raw) => raw.map(Blob::from_encoded),
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to read record");
                None
            }
        }
    }

    fn read_value(&self, key: &str) -> Option<Value> {
        let blob = self.read_blob(key)?;
        let Some(text) = self.codec.decompress(&blob) else {
            tracing::warn!(key, "Stored blob failed to decompress");
            return None;
        };
        match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Stored value is not valid JSON");
                None
            }
        }
    }

    fn persist_index(&mut self) -> Result<()> {
        let raw = serde_json::to_string(self.index.as_slice())?;
        self.storage.set_item(KEY_INDEX_SLOT, &raw)
    }

    fn persist_age(&mut self) -> Result<()> {
        self.storage.set_item(AGE_SLOT, &self.clock.age().to_string())
    }
}
