//! Slot storage backing the store and the peer directory.
//!
//! The engine never touches files. It reads and writes named text slots
//! through [`Storage`]; the host decides where those slots live.

use crate::error::Result;
use std::collections::BTreeMap;

/// Slot holding the master key index (JSON array of strings).
pub const KEY_INDEX_SLOT: &str = "meta:keys";
/// Slot holding the store age (JSON integer).
pub const AGE_SLOT: &str = "meta:age";
/// Slot holding the known peers (JSON array of strings).
pub const PEERS_SLOT: &str = "meta:peers";
/// Slot holding this device's identity.
pub const IDENTITY_SLOT: &str = "meta:identity";

const RECORD_PREFIX: &str = "record:";

/// Slot name for a record's blob. Record slots are namespaced so user keys
/// never collide with the metadata slots.
pub fn record_slot(key: &str) -> String {
    format!("{RECORD_PREFIX}{key}")
}

/// A string-keyed text store.
pub trait Storage {
    /// Read a slot.
    fn get_item(&self, slot: &str) -> Result<Option<String>>;

    /// Write a slot, replacing any previous contents.
    fn set_item(&mut self, slot: &str, value: &str) -> Result<()>;

    /// Delete a slot. Deleting a missing slot is not an error.
    fn remove_item(&mut self, slot: &str) -> Result<()>;

    /// Start grouping writes. Until [`Storage::commit`] they may be held in
    /// memory and reach durable storage together.
    fn begin_batch(&mut self) {}

    /// End the current batch, making its writes durable.
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-process storage, used by tests and ephemeral replicas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStorage {
    slots: BTreeMap<String, String>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate over all slot names.
    pub fn slots(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, slot: &str) -> Result<Option<String>> {
        Ok(self.slots.get(slot).cloned())
    }

    fn set_item(&mut self, slot: &str, value: &str) -> Result<()> {
        self.slots.insert(slot.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&mut self, slot: &str) -> Result<()> {
        self.slots.remove(slot);
        Ok(())
    }
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn get_item(&self, slot: &str) -> Result<Option<String>> {
        (**self).get_item(slot)
    }

    fn set_item(&mut self, slot: &str, value: &str) -> Result<()> {
        (**self).set_item(slot, value)
    }

    fn remove_item(&mut self, slot: &str) -> Result<()> {
        (**self).remove_item(slot)
    }

    fn begin_batch(&mut self) {
        (**self).begin_batch()
    }

    fn commit(&mut self) -> Result<()> {
        (**self).commit()
    }
}
