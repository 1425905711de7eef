use std::sync::Arc;

use serde_json::Value;
use stash_store::{RecordStore, StoreResult};

use crate::queue::Shared;

/// One pending write: a payload headed for `key` in `target`.
///
/// The payload is owned by the entry. Producers encode their object into a
/// [`Value`] before enqueueing, so changes made to the original object after
/// `enqueue` returns are never observed by the deferred write.
pub struct QueueEntry {
    target: Arc<dyn RecordStore>,
    key: String,
    payload: Value,
}

impl QueueEntry {
    pub fn new(target: Arc<dyn RecordStore>, key: impl Into<String>, payload: Value) -> Self {
        Self {
            target,
            key: key.into(),
            payload,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Write the payload into the target store now.
    pub fn apply(&self) -> StoreResult<()> {
        self.target.save(&self.key, &self.payload)
    }
}

impl std::fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEntry")
            .field("key", &self.key)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

/// An entry removed from the head of the queue and not yet finished.
///
/// While a claim is alive the queue counts it as in flight, so
/// [`WriteQueue::wait_for_drain`](crate::WriteQueue::wait_for_drain) keeps
/// waiting. Dropping the claim (after [`apply`](Self::apply) or without
/// applying) releases it; there is no way to put it back.
pub struct ClaimedEntry {
    entry: QueueEntry,
    shared: Arc<Shared>,
}

impl ClaimedEntry {
    pub(crate) fn new(entry: QueueEntry, shared: Arc<Shared>) -> Self {
        Self { entry, shared }
    }

    pub fn entry(&self) -> &QueueEntry {
        &self.entry
    }

    /// Apply the write. The claim stays in flight until it is dropped.
    pub fn apply(&self) -> StoreResult<()> {
        self.entry.apply()
    }
}

impl Drop for ClaimedEntry {
    fn drop(&mut self) {
        self.shared.release();
    }
}

impl std::fmt::Debug for ClaimedEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ClaimedEntry").field(&self.entry).finish()
    }
}
