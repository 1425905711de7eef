use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default maximum number of queued writes before producers are throttled.
pub const DEFAULT_MAX_LEN: usize = 1000;

/// Interval used by [`QueueConfig::with_status_logging`].
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration for a [`WriteQueue`](crate::WriteQueue) and its drain loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue length at which producers block until the queue is empty.
    /// Values below 1 are treated as 1.
    pub max_len: usize,
    /// Deadline for drain barriers taken by reads and by backpressure.
    /// `None` waits indefinitely.
    pub drain_timeout: Option<Duration>,
    /// Log the queue depth at this interval from the drain thread.
    pub status_interval: Option<Duration>,
}

impl QueueConfig {
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = Some(timeout);
        self
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = Some(interval);
        self
    }

    /// Enable periodic status logging at [`DEFAULT_STATUS_INTERVAL`].
    pub fn with_status_logging(self) -> Self {
        self.with_status_interval(DEFAULT_STATUS_INTERVAL)
    }

    pub(crate) fn effective_max_len(&self) -> usize {
        self.max_len.max(1)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_LEN,
            drain_timeout: None,
            status_interval: None,
        }
    }
}
