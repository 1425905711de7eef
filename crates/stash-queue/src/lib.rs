//! Deferred write path for Stash.
//!
//! Producers hand records to a [`WriteQueue`] instead of writing them
//! synchronously. A [`DrainController`] owns one background thread that
//! removes entries in FIFO order and saves each one into its target
//! [`RecordStore`](stash_store::RecordStore).
//!
//! # Guarantees
//!
//! - Entries are applied in enqueue order by a single thread, so two deferred
//!   writes to the same key end in last-writer-wins.
//! - [`WriteQueue::wait_for_drain`] returns only once nothing is queued and
//!   nothing is being applied. Readers call it before reading so they never
//!   miss a write enqueued before the read started.
//! - Backpressure is strict: once the queue holds `max_len` entries no
//!   producer is admitted until it has fully drained.
//! - A deferred write that fails is logged, reported to the optional
//!   [`FailureObserver`], and discarded. It is never retried and never
//!   reaches the producer, whose `enqueue` already returned.

pub mod config;
pub mod drain;
pub mod entry;
pub mod error;
pub mod queue;

pub use config::QueueConfig;
pub use drain::{DrainController, FailureObserver};
pub use entry::{ClaimedEntry, QueueEntry};
pub use error::{QueueError, QueueResult};
pub use queue::WriteQueue;
