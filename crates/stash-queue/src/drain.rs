use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_json::Value;
use stash_store::StoreError;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::queue::{Claim, WriteQueue};

/// Name given to the background drain thread.
const DRAIN_THREAD_NAME: &str = "stash-drain";

/// Opt-in hook told about deferred writes that failed.
///
/// Called on the drain thread before the failed entry is released, so a
/// drain barrier taken after the write was enqueued returns only after the
/// observer has run. The write is discarded afterwards either way. A panic
/// inside the observer is caught and logged.
pub trait FailureObserver: Send + Sync {
    fn on_failure(&self, key: &str, payload: &Value, error: &StoreError);
}

impl<F> FailureObserver for F
where
    F: Fn(&str, &Value, &StoreError) + Send + Sync,
{
    fn on_failure(&self, key: &str, payload: &Value, error: &StoreError) {
        self(key, payload, error)
    }
}

/// Owns a [`WriteQueue`] and the background thread that drains it.
///
/// The drain loop claims entries one at a time in FIFO order and saves each
/// into its target store. Failed writes are logged at `warn`, handed to the
/// [`FailureObserver`] if one was given, and discarded. A store whose `save`
/// panics counts as a failed write.
///
/// Dropping the controller shuts it down: the queue is closed, the backlog
/// is applied, and the thread is joined.
pub struct DrainController {
    queue: WriteQueue,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DrainController {
    /// Create a queue and start draining it.
    pub fn start(config: QueueConfig) -> QueueResult<Self> {
        Self::start_inner(config, None)
    }

    /// Like [`start`](Self::start), reporting failed writes to `observer`.
    pub fn start_with_observer(
        config: QueueConfig,
        observer: Arc<dyn FailureObserver>,
    ) -> QueueResult<Self> {
        Self::start_inner(config, Some(observer))
    }

    fn start_inner(
        config: QueueConfig,
        observer: Option<Arc<dyn FailureObserver>>,
    ) -> QueueResult<Self> {
        let queue = WriteQueue::new(&config);
        let status_interval = config.status_interval;

        let handle = {
            let queue = queue.clone();
            thread::Builder::new()
                .name(DRAIN_THREAD_NAME.into())
                .spawn(move || drain_loop(queue, observer, status_interval))
                .map_err(QueueError::Spawn)?
        };

        info!(max_len = queue.max_len(), "drain controller started");

        Ok(Self {
            queue,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Handle to the queue, for stores that opt into deferred writes.
    pub fn queue(&self) -> WriteQueue {
        self.queue.clone()
    }

    /// Block until every write enqueued so far has been applied or discarded.
    pub fn wait_for_drain(&self) {
        self.queue.wait_for_drain();
    }

    pub fn wait_for_drain_timeout(&self, timeout: Duration) -> QueueResult<()> {
        self.queue.wait_for_drain_timeout(timeout)
    }

    /// Close the queue, apply what is already queued, and stop the thread.
    ///
    /// Idempotent. Later `enqueue` calls fail with [`QueueError::Closed`].
    pub fn shutdown(&self) {
        self.queue.close();
        let handle = self.handle.lock().expect("drain handle mutex poisoned").take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("drain thread panicked");
            }
        }
    }
}

impl Drop for DrainController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DrainController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainController")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

/// Closes the queue when the drain thread exits, however it exits, so
/// producers get [`QueueError::Closed`] instead of filling a queue nobody
/// drains.
struct CloseOnExit(WriteQueue);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.0.close();
    }
}

fn drain_loop(
    queue: WriteQueue,
    observer: Option<Arc<dyn FailureObserver>>,
    status_interval: Option<Duration>,
) {
    debug!("drain loop started");
    let _close = CloseOnExit(queue.clone());
    let mut applied: u64 = 0;
    let mut failed: u64 = 0;
    let mut last_status = Instant::now();

    loop {
        let wait = status_interval.map(|interval| interval.saturating_sub(last_status.elapsed()));
        match queue.claim_next(wait) {
            Claim::Entry(claimed) => {
                let entry = claimed.entry();
                match panic::catch_unwind(AssertUnwindSafe(|| claimed.apply())) {
                    Ok(Ok(())) => {
                        applied += 1;
                        debug!(key = entry.key(), "deferred write applied");
                    }
                    Ok(Err(error)) => {
                        failed += 1;
                        warn!(key = entry.key(), %error, "deferred write failed; discarding");
                        if let Some(observer) = &observer {
                            let notified = panic::catch_unwind(AssertUnwindSafe(|| {
                                observer.on_failure(entry.key(), entry.payload(), &error)
                            }));
                            if let Err(payload) = notified {
                                warn!(
                                    key = entry.key(),
                                    panic = panic_message(&*payload),
                                    "failure observer panicked"
                                );
                            }
                        }
                    }
                    Err(payload) => {
                        failed += 1;
                        warn!(
                            key = entry.key(),
                            panic = panic_message(&*payload),
                            "deferred write panicked; discarding"
                        );
                    }
                }
            }
            Claim::Idle => {}
            Claim::Closed => break,
        }

        if let Some(interval) = status_interval {
            if last_status.elapsed() >= interval {
                info!(pending = queue.pending(), applied, failed, "write queue status");
                last_status = Instant::now();
            }
        }
    }

    info!(applied, failed, "drain loop stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
