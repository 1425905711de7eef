use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::StoreResult;

/// Synchronous keyed record store.
///
/// All implementations must satisfy these invariants:
/// - `save` overwrites: after two saves of the same key only the latest
///   payload is returned by `load`.
/// - `save` may be called from a background thread while other threads read.
///   Implementations serialize their own internal state; callers add no
///   locking around individual keys.
/// - `load` fails with `StoreError::NotFound` for keys never saved.
/// - `list_keys` returns only keys of this store's namespace and skips any
///   stored name that does not map back to a key.
/// - All I/O errors are propagated, never silently ignored.
pub trait RecordStore: Send + Sync {
    /// Durably store `payload` under `key`, replacing any previous record.
    fn save(&self, key: &str, payload: &Value) -> StoreResult<()>;

    /// Read the record stored under `key`.
    fn load(&self, key: &str) -> StoreResult<Value>;

    /// All keys currently durable in this store's namespace.
    fn list_keys(&self) -> StoreResult<BTreeSet<String>>;
}
