use std::collections::BTreeSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use stash_queue::WriteQueue;
use stash_store::{validate_key, JsonFileStore, RecordStore, StoreConfig, StoreError};
use tracing::debug;

use crate::error::{SdkError, SdkResult};

/// Typed object persister over a [`RecordStore`].
///
/// In synchronous mode every call goes straight to the store. In deferred
/// mode `save_item` encodes the object, enqueues it, and returns; the drain
/// thread writes it later. Reads (`get_item`, `list_keys`) first wait until
/// the queue has drained, so they observe every write enqueued before the
/// read started.
///
/// Deferred writes that fail in the background are not reported here. Use
/// [`DrainController::start_with_observer`](stash_queue::DrainController::start_with_observer)
/// to hear about them.
///
/// Mixing deferred and synchronous persisters that write the same key from
/// concurrent producers leaves the final value undefined.
pub struct Persister {
    store: Arc<dyn RecordStore>,
    queue: Option<WriteQueue>,
}

impl Persister {
    /// Open a synchronous persister over a [`JsonFileStore`].
    ///
    /// A config with `deferred` set is rejected: use
    /// [`open_with_queue`](Self::open_with_queue).
    pub fn open(config: StoreConfig) -> SdkResult<Self> {
        if config.deferred {
            return Err(SdkError::Config(
                "deferred writes need a write queue; use Persister::open_with_queue".into(),
            ));
        }
        let store = JsonFileStore::open(&config)?;
        Ok(Self::from_store(Arc::new(store), None))
    }

    /// Open a persister over a [`JsonFileStore`] that uses `queue` when
    /// `config.deferred` is set. Without the flag the queue is not used.
    pub fn open_with_queue(config: StoreConfig, queue: WriteQueue) -> SdkResult<Self> {
        let store = JsonFileStore::open(&config)?;
        let queue = config.deferred.then_some(queue);
        Ok(Self::from_store(Arc::new(store), queue))
    }

    /// Wrap any record store. `Some(queue)` enables deferred writes.
    pub fn from_store(store: Arc<dyn RecordStore>, queue: Option<WriteQueue>) -> Self {
        Self { store, queue }
    }

    pub fn is_deferred(&self) -> bool {
        self.queue.is_some()
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Save `item` under `key`.
    ///
    /// The item is encoded before this returns in both modes, so encoding
    /// failures are always reported to the caller. In deferred mode write
    /// failures are not.
    pub fn save_item<T>(&self, key: &str, item: &T) -> SdkResult<()>
    where
        T: Serialize + ?Sized,
    {
        validate_key(key)?;
        let payload =
            serde_json::to_value(item).map_err(|e| StoreError::Serialization(e.to_string()))?;

        match &self.queue {
            Some(queue) => {
                queue.enqueue(Arc::clone(&self.store), key, payload)?;
                debug!(key, "write deferred");
            }
            None => self.store.save(key, &payload)?,
        }
        Ok(())
    }

    /// Load the record stored under `key` as a `T`.
    pub fn get_item<T: DeserializeOwned>(&self, key: &str) -> SdkResult<T> {
        self.flush()?;
        let value = self.store.load(key)?;
        serde_json::from_value(value).map_err(|e| {
            StoreError::Deserialization {
                key: key.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Keys currently stored in this persister's namespace.
    pub fn list_keys(&self) -> SdkResult<BTreeSet<String>> {
        self.flush()?;
        Ok(self.store.list_keys()?)
    }

    /// Wait until every deferred write enqueued so far has been applied.
    /// A no-op in synchronous mode.
    pub fn flush(&self) -> SdkResult<()> {
        if let Some(queue) = &self.queue {
            queue.drain_barrier()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Persister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persister")
            .field("deferred", &self.is_deferred())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::{json, Value};
    use stash_queue::{DrainController, QueueConfig};
    use stash_store::{InMemoryRecordStore, StoreResult};
    use std::collections::HashMap;
    use std::thread;
    use std::time::{Duration, Instant};

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Obj {
        string_val: String,
        int_val: i64,
        test_val: String,
    }

    fn obj(s: &str, i: i64) -> Obj {
        Obj {
            string_val: s.into(),
            int_val: i,
            ..Default::default()
        }
    }

    fn keys(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    fn drain() -> DrainController {
        DrainController::start(QueueConfig::default()).unwrap()
    }

    /// Store whose saves sleep before delegating to a shared in-memory map.
    struct SlowStore {
        inner: InMemoryRecordStore,
        delay: Duration,
    }

    impl RecordStore for SlowStore {
        fn save(&self, key: &str, payload: &Value) -> StoreResult<()> {
            thread::sleep(self.delay);
            self.inner.save(key, payload)
        }

        fn load(&self, key: &str) -> StoreResult<Value> {
            self.inner.load(key)
        }

        fn list_keys(&self) -> StoreResult<BTreeSet<String>> {
            self.inner.list_keys()
        }
    }

    struct BrokenStore;

    impl RecordStore for BrokenStore {
        fn save(&self, _key: &str, _payload: &Value) -> StoreResult<()> {
            Err(StoreError::Io(std::io::Error::other("read-only filesystem")))
        }

        fn load(&self, key: &str) -> StoreResult<Value> {
            Err(StoreError::NotFound(key.to_string()))
        }

        fn list_keys(&self) -> StoreResult<BTreeSet<String>> {
            Ok(BTreeSet::new())
        }
    }

    // -----------------------------------------------------------------------
    // Opening
    // -----------------------------------------------------------------------

    #[test]
    fn open_creates_store() {
        let dir = tempfile::tempdir().unwrap();
        let persister = Persister::open(StoreConfig::new(dir.path().join("test"))).unwrap();
        assert!(!persister.is_deferred());
        assert!(dir.path().join("test").is_dir());
    }

    #[test]
    fn open_rejects_deferred_without_queue() {
        let dir = tempfile::tempdir().unwrap();
        let err = Persister::open(StoreConfig::new(dir.path()).with_deferred(true)).unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }

    #[test]
    fn queue_is_ignored_when_not_deferred() {
        let dir = tempfile::tempdir().unwrap();
        let controller = drain();
        let persister =
            Persister::open_with_queue(StoreConfig::new(dir.path()), controller.queue()).unwrap();
        assert!(!persister.is_deferred());
    }

    #[test]
    fn open_on_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file");
        std::fs::write(&path, b"").unwrap();
        let err = Persister::open(StoreConfig::new(&path)).unwrap_err();
        assert!(matches!(err, SdkError::Store(StoreError::Config { .. })));
    }

    // -----------------------------------------------------------------------
    // Synchronous mode
    // -----------------------------------------------------------------------

    #[test]
    fn sync_save_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let persister = Persister::open(StoreConfig::new(dir.path())).unwrap();
        let item = obj("stringb", 5);

        persister.save_item("testkey", &item).unwrap();
        let back: Obj = persister.get_item("testkey").unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn sync_get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let persister = Persister::open(StoreConfig::new(dir.path())).unwrap();
        let err = persister.get_item::<Obj>("never").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn sync_write_failure_is_reported() {
        let persister = Persister::from_store(Arc::new(BrokenStore), None);
        let err = persister.save_item("k", &obj("x", 1)).unwrap_err();
        assert!(matches!(err, SdkError::Store(StoreError::Io(_))));
    }

    #[test]
    fn wrong_shape_is_deserialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let persister = Persister::open(StoreConfig::new(dir.path())).unwrap();
        persister.save_item("text", "just a string").unwrap();

        let err = persister.get_item::<Obj>("text").unwrap_err();
        assert!(matches!(
            err,
            SdkError::Store(StoreError::Deserialization { .. })
        ));
    }

    #[test]
    fn unencodable_item_is_serialization_error() {
        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys cannot become JSON object keys");

        let dir = tempfile::tempdir().unwrap();
        let sync = Persister::open(StoreConfig::new(dir.path())).unwrap();
        assert!(matches!(
            sync.save_item("bad", &bad),
            Err(SdkError::Store(StoreError::Serialization(_)))
        ));

        let controller = drain();
        let deferred =
            Persister::from_store(Arc::new(InMemoryRecordStore::new()), Some(controller.queue()));
        assert!(matches!(
            deferred.save_item("bad", &bad),
            Err(SdkError::Store(StoreError::Serialization(_)))
        ));
    }

    #[test]
    fn invalid_key_is_rejected_in_both_modes() {
        let controller = drain();
        let deferred =
            Persister::from_store(Arc::new(InMemoryRecordStore::new()), Some(controller.queue()));
        assert!(matches!(
            deferred.save_item("a/b", &1),
            Err(SdkError::Store(StoreError::InvalidKey { .. }))
        ));
        assert_eq!(controller.queue().pending(), 0);
    }

    // -----------------------------------------------------------------------
    // Deferred mode
    // -----------------------------------------------------------------------

    #[test]
    fn deferred_save_is_visible_to_immediate_get() {
        let dir = tempfile::tempdir().unwrap();
        let controller = drain();
        let config = StoreConfig::new(dir.path()).with_deferred(true);
        let persister = Persister::open_with_queue(config, controller.queue()).unwrap();
        assert!(persister.is_deferred());

        let item = obj("deferred", 7);
        persister.save_item("k", &item).unwrap();
        let back: Obj = persister.get_item("k").unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn deferred_save_returns_before_the_write_lands() {
        let inner = InMemoryRecordStore::new();
        let observer_view = inner.with_shared("");
        let store = Arc::new(SlowStore {
            inner,
            delay: Duration::from_millis(100),
        });
        let controller = drain();
        let persister = Persister::from_store(store, Some(controller.queue()));

        let started = Instant::now();
        persister.save_item("k", &obj("late", 1)).unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(observer_view.load("k").unwrap_err().is_not_found());

        let back: Obj = persister.get_item("k").unwrap();
        assert_eq!(back, obj("late", 1));
    }

    #[test]
    fn deferred_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let controller = drain();
        let config = StoreConfig::new(dir.path()).with_deferred(true);
        let persister = Persister::open_with_queue(config, controller.queue()).unwrap();

        for i in 0..50 {
            persister.save_item("counter", &obj("n", i)).unwrap();
        }
        let back: Obj = persister.get_item("counter").unwrap();
        assert_eq!(back.int_val, 49);
    }

    #[test]
    fn deferred_get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let controller = drain();
        let config = StoreConfig::new(dir.path()).with_deferred(true);
        let persister = Persister::open_with_queue(config, controller.queue()).unwrap();

        persister.save_item("present", &obj("x", 1)).unwrap();
        let err = persister.get_item::<Obj>("absent").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn deferred_payload_is_captured_at_save() {
        let store = Arc::new(SlowStore {
            inner: InMemoryRecordStore::new(),
            delay: Duration::from_millis(20),
        });
        let controller = drain();
        let persister = Persister::from_store(store, Some(controller.queue()));

        let mut item = obj("before", 1);
        persister.save_item("k", &item).unwrap();
        item.string_val = "after".into();

        let back: Obj = persister.get_item("k").unwrap();
        assert_eq!(back.string_val, "before");
    }

    #[test]
    fn save_after_controller_dropped_is_closed() {
        let controller = drain();
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
        let persister = Persister::from_store(Arc::clone(&store), Some(controller.queue()));

        persister.save_item("early", &obj("kept", 1)).unwrap();
        drop(controller);

        let err = persister.save_item("late", &obj("lost", 2)).unwrap_err();
        assert!(matches!(err, SdkError::Queue(stash_queue::QueueError::Closed)));

        // The backlog was applied on shutdown and reads still work.
        let back: Obj = persister.get_item("early").unwrap();
        assert_eq!(back, obj("kept", 1));
        assert_eq!(persister.list_keys().unwrap(), keys(&["early"]));
    }

    #[test]
    fn deferred_failure_is_swallowed() {
        let controller = drain();
        let persister = Persister::from_store(Arc::new(BrokenStore), Some(controller.queue()));

        persister.save_item("k", &obj("x", 1)).unwrap();
        let err = persister.get_item::<Obj>("k").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn flush_honours_configured_timeout() {
        let store = Arc::new(SlowStore {
            inner: InMemoryRecordStore::new(),
            delay: Duration::from_millis(200),
        });
        let controller = DrainController::start(
            QueueConfig::default().with_drain_timeout(Duration::from_millis(20)),
        )
        .unwrap();
        let persister = Persister::from_store(store, Some(controller.queue()));

        persister.save_item("k", &obj("x", 1)).unwrap();
        let err = persister.flush().unwrap_err();
        assert!(matches!(
            err,
            SdkError::Queue(stash_queue::QueueError::DrainTimeout { .. })
        ));
    }

    #[test]
    fn backpressure_throttles_deferred_saves() {
        let store = Arc::new(SlowStore {
            inner: InMemoryRecordStore::new(),
            delay: Duration::from_millis(5),
        });
        let controller = DrainController::start(QueueConfig::default().with_max_len(3)).unwrap();
        let persister = Persister::from_store(store, Some(controller.queue()));

        let started = Instant::now();
        for i in 0..8 {
            persister.save_item(&format!("k{i}"), &obj("x", i)).unwrap();
        }
        assert!(started.elapsed() >= Duration::from_millis(15));
        assert_eq!(persister.list_keys().unwrap().len(), 8);
    }

    // -----------------------------------------------------------------------
    // Namespaces
    // -----------------------------------------------------------------------

    #[test]
    fn list_keys_isolated_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let a = Persister::open(StoreConfig::new(dir.path()).with_prefix("a_")).unwrap();
        let b = Persister::open(StoreConfig::new(dir.path()).with_prefix("b_")).unwrap();

        a.save_item("one", &obj("a", 1)).unwrap();
        a.save_item("two", &obj("a", 2)).unwrap();
        b.save_item("three", &obj("b", 3)).unwrap();

        assert_eq!(a.list_keys().unwrap(), keys(&["one", "two"]));
        assert_eq!(b.list_keys().unwrap(), keys(&["three"]));
    }

    #[test]
    fn shared_directory_scenario_with_deferred_store() {
        let dir = tempfile::tempdir().unwrap();
        let controller = drain();
        let first = Persister::open_with_queue(
            StoreConfig::new(dir.path())
                .with_prefix("objprefix_")
                .with_deferred(true),
            controller.queue(),
        )
        .unwrap();
        let item = Obj {
            string_val: "a string".into(),
            ..Default::default()
        };
        first.save_item("test1", &item).unwrap();
        first.save_item("test2", &item).unwrap();
        assert_eq!(first.list_keys().unwrap(), keys(&["test1", "test2"]));

        let second =
            Persister::open(StoreConfig::new(dir.path()).with_prefix("objprefix2_")).unwrap();
        second.save_item("test1", &item).unwrap();
        assert_eq!(second.list_keys().unwrap(), keys(&["test1"]));
        assert_eq!(first.list_keys().unwrap(), keys(&["test1", "test2"]));

        let raw: Value = second.get_item("test1").unwrap();
        assert_eq!(raw["string_val"], json!("a string"));
    }
}
