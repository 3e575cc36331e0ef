use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Opaque per-instance token handed to the host at init time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        InstanceId(s.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        InstanceId(s)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Directory of live sink instances keyed by [`InstanceId`].
///
/// Entries are insert-once: a second insert under the same id keeps the
/// first value. Lookups take the read lock only. Ids come from a counter
/// that never goes backwards, so an id is never handed out twice even after
/// its entry is removed.
#[derive(Debug)]
pub struct Registry<T> {
    entries: RwLock<HashMap<InstanceId, T>>,
    next_id: AtomicU64,
}

impl<T: Clone> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Mint a fresh identifier.
    pub fn next_id(&self) -> InstanceId {
        InstanceId(self.next_id.fetch_add(1, Ordering::Relaxed).to_string())
    }

    /// Store `value` under `id` unless something is already there.
    ///
    /// Returns `true` if `value` was stored.
    pub fn insert(&self, id: InstanceId, value: T) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    /// Mint an id and store `value` under it.
    pub fn register(&self, value: T) -> InstanceId {
        let id = self.next_id();
        self.insert(id.clone(), value);
        id
    }

    pub fn get(&self, id: &InstanceId) -> Option<T> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(id).cloned()
    }

    pub fn remove(&self, id: &InstanceId) -> Option<T> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
