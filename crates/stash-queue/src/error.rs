use std::io;

/// Errors produced by the deferred write queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue has been shut down and accepts no more entries.
    #[error("write queue is closed")]
    Closed,

    /// The queue did not drain before the deadline.
    #[error("write queue did not drain in time ({pending} writes pending)")]
    DrainTimeout { pending: usize },

    /// The background drain thread could not be started.
    #[error("failed to spawn drain thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Convenience alias used throughout the queue crate.
pub type QueueResult<T> = std::result::Result<T, QueueError>;
