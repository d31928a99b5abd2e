//! Store-wide logical clock ("age").
//!
//! A single timestamp covers the whole store, not individual records. It is
//! the only signal used to order replicas during a merge.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// The store clock.
///
/// Rules:
/// 1. A local mutation moves the age to `max(now, age + 1)`, so the local age
///    strictly increases even if the wall clock stalls or steps back.
/// 2. A remote age is only adopted when it is strictly greater.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreClock {
    age: Timestamp,
}

impl StoreClock {
    /// Create a clock at a specific age.
    pub fn at(age: Timestamp) -> Self {
        Self { age }
    }

    /// Current age in milliseconds since epoch.
    pub fn age(&self) -> Timestamp {
        self.age
    }

    /// Record a local mutation observed at wall-clock `now`.
    pub fn advance(&mut self, now: Timestamp) -> Timestamp {
        self.age = now.max(self.age.saturating_add(1));
        self.age
    }

    /// Whether a replica at `remote` age should replace this one.
    pub fn is_older_than(&self, remote: Timestamp) -> bool {
        remote > self.age
    }

    /// Force the clock to an accepted remote age.
    pub(crate) fn set(&mut self, age: Timestamp) {
        self.age = age;
    }
}
