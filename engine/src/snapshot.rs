//! Whole-store snapshots, the unit of replication.
//!
//! A snapshot is every indexed key, its already-compressed blob, and the
//! store age. On the wire it is the JSON `{"keys", "values", "age"}` passed
//! through the store's codec, so one message carries one full store.

use crate::{
    codec::{Blob, Codec},
    error::Result,
    storage::Storage,
    store::{KeyIndex, RecordStore},
    Key, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A point-in-time export of the store.
///
/// `values[i]` belongs to `keys[i]`; `None` means the key had no blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub keys: Vec<Key>,
    pub values: Vec<Option<Blob>>,
    pub age: Timestamp,
}

impl Snapshot {
    /// The empty snapshot returned for malformed input. Its age of 0 never
    /// wins a merge.
    pub fn sentinel() -> Self {
        Self::default()
    }

    /// Whether this is the empty, age-0 snapshot.
    pub fn is_sentinel(&self) -> bool {
        self.keys.is_empty() && self.values.is_empty() && self.age == 0
    }

    /// Serialize and compress into the wire payload.
    pub fn encode<C: Codec>(&self, codec: &C) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(codec.compress(&json).into_string())
    }

    /// Decode a wire payload.
    ///
    /// Anything that does not decompress to `{keys: string[], values:
    /// (string|null)[]}` yields [`Snapshot::sentinel`]. Nothing is ever
    /// partially decoded.
    pub fn decode<C: Codec>(codec: &C, text: &str) -> Self {
        let Some(json) = codec.decompress(&Blob::from_encoded(text)) else {
            tracing::warn!(len = text.len(), "Snapshot payload failed to decompress");
            return Self::sentinel();
        };

        let parsed: Value = match serde_json::from_str(&json) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "Snapshot payload is not valid JSON");
                return Self::sentinel();
            }
        };

        match Self::from_value(&parsed) {
            Some(snapshot) => snapshot,
            None => {
                tracing::warn!("Snapshot keys and values must both be arrays");
                Self::sentinel()
            }
        }
    }

    fn from_value(parsed: &Value) -> Option<Self> {
        let keys = parsed
            .get("keys")?
            .as_array()?
            .iter()
            .map(|k| k.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()?;

        let values = parsed
            .get("values")?
            .as_array()?
            .iter()
            .map(|v| match v {
                Value::Null => Some(None),
                Value::String(s) => Some(Some(Blob::from_encoded(s.clone()))),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;

        let age = parsed.get("age").map(parse_age).unwrap_or(0);

        Some(Self { keys, values, age })
    }

    /// Number of keys carried.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if no keys are carried.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The blob paired with `keys[i]`, if any.
    pub fn value_at(&self, i: usize) -> Option<&Blob> {
        self.values.get(i).and_then(Option::as_ref)
    }
}

/// Largest accepted age, the upper bound of a JS `Date` in milliseconds.
pub const MAX_AGE: Timestamp = 8_640_000_000_000_000;

/// Read an age that may be epoch milliseconds or an RFC 3339 date string.
/// Unreadable or out-of-range ages are 0.
fn parse_age(raw: &Value) -> Timestamp {
    let age = match raw {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f as u64)
            })
            .unwrap_or(0),
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .and_then(|dt| u64::try_from(dt.timestamp_millis()).ok())
            .unwrap_or(0),
        _ => 0,
    };
    if age > MAX_AGE {
        tracing::warn!(age, "Snapshot age out of range; treating as unreadable");
        return 0;
    }
    age
}

/// Summary of a snapshot (without the blobs), for logs and status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub key_count: usize,
    pub value_count: usize,
    pub age: Timestamp,
}

impl From<&Snapshot> for SnapshotSummary {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            key_count: snapshot.keys.len(),
            value_count: snapshot.values.iter().filter(|v| v.is_some()).count(),
            age: snapshot.age,
        }
    }
}

impl<S: Storage, C: Codec> RecordStore<S, C> {
    /// Capture the store as a snapshot.
    ///
    /// Blobs are copied as stored, not re-encoded. With `force_fresh_age`
    /// the snapshot claims age `now` instead of the store's age, so it wins
    /// against any replica that has not changed since.
    pub fn snapshot(&self, force_fresh_age: bool, now: Timestamp) -> Snapshot {
        let keys = self.keys().to_vec();
        let values = keys.iter().map(|key| self.raw(key)).collect();
        let age = if force_fresh_age { now } else { self.age() };
        Snapshot { keys, values, age }
    }

    /// Export the store as a wire payload.
    pub fn export(&self, force_fresh_age: bool, now: Timestamp) -> Result<String> {
        self.snapshot(force_fresh_age, now).encode(self.codec())
    }

    /// Decode a wire payload with this store's codec.
    pub fn import(&self, text: &str) -> Snapshot {
        Snapshot::decode(self.codec(), text)
    }

    /// Overwrite the store with a snapshot.
    ///
    /// Blobs are written as-is. The key index becomes the snapshot's key
    /// list: keys that leave the index lose their blob, and a key whose
    /// value is null survives only if a local blob already exists for it.
    /// The age becomes the snapshot's age.
    pub fn apply(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.batched(|store| store.apply_unbatched(snapshot))
    }

    fn apply_unbatched(&mut self, snapshot: &Snapshot) -> Result<()> {
        let mut index = KeyIndex::new();
        for (i, key) in snapshot.keys.iter().enumerate() {
            if index.contains(key) {
                continue;
            }
            match snapshot.value_at(i) {
                Some(blob) => {
                    self.write_blob(key, blob)?;
                    index.insert(key.clone());
                }
                None if self.has_blob(key) => {
                    index.insert(key.clone());
                }
                None => {
                    tracing::debug!(key = %key, "Snapshot key has no value; dropping");
                }
            }
        }

        let dropped: Vec<Key> = self
            .keys()
            .iter()
            .filter(|k| !index.contains(k))
            .cloned()
            .collect();
        for key in &dropped {
            self.drop_blob(key)?;
        }

        self.replace_index(index)?;
        self.adopt_age(snapshot.age)?;

        tracing::info!(
            keys = self.len(),
            dropped = dropped.len(),
            age = snapshot.age,
            "Snapshot applied"
        );
        Ok(())
    }
}
