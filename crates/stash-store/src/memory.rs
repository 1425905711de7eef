use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::naming::{validate_key, KeyNaming};
use crate::traits::RecordStore;

/// In-memory, HashMap-based record store.
///
/// Intended for tests and embedding. Records are held behind a `RwLock`
/// keyed by their storage name, so the prefix rules match [`JsonFileStore`]:
/// several stores may share one map through [`InMemoryRecordStore::with_shared`].
///
/// [`JsonFileStore`]: crate::JsonFileStore
pub struct InMemoryRecordStore {
    records: Arc<RwLock<HashMap<String, Value>>>,
    naming: KeyNaming,
}

impl InMemoryRecordStore {
    /// Create a new empty, unprefixed store.
    pub fn new() -> Self {
        Self::with_prefix("")
    }

    /// Create a new empty store with a namespace prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            records: Default::default(),
            naming: KeyNaming::new(prefix),
        }
    }

    /// A second store over the same records, using another prefix.
    pub fn with_shared(&self, prefix: impl Into<String>) -> Self {
        Self {
            records: Arc::clone(&self.records),
            naming: KeyNaming::new(prefix),
        }
    }

    /// Number of records across every store sharing this map.
    pub fn len(&self) -> usize {
        self.records.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no store sharing this map holds a record.
    pub fn is_empty(&self) -> bool {
        self.records.read().expect("lock poisoned").is_empty()
    }

    /// Remove every record in the shared map.
    pub fn clear(&self) {
        self.records.write().expect("lock poisoned").clear();
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn save(&self, key: &str, payload: &Value) -> StoreResult<()> {
        validate_key(key)?;
        let name = self.naming.file_name(key);
        self.records
            .write()
            .expect("lock poisoned")
            .insert(name, payload.clone());
        Ok(())
    }

    fn load(&self, key: &str) -> StoreResult<Value> {
        validate_key(key)?;
        let name = self.naming.file_name(key);
        let map = self.records.read().expect("lock poisoned");
        map.get(&name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn list_keys(&self) -> StoreResult<BTreeSet<String>> {
        let map = self.records.read().expect("lock poisoned");
        Ok(map
            .keys()
            .filter_map(|name| self.naming.key_from_file_name(name))
            .map(str::to_string)
            .collect())
    }
}

impl std::fmt::Debug for InMemoryRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRecordStore")
            .field("prefix", &self.naming.prefix())
            .field("record_count", &self.len())
            .finish()
    }
}
