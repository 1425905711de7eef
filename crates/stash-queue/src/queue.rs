use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use stash_store::RecordStore;
use tracing::debug;

use crate::config::QueueConfig;
use crate::entry::{ClaimedEntry, QueueEntry};
use crate::error::{QueueError, QueueResult};

/// Queue state. Every field is read and written under `Shared::state`.
struct QueueState {
    entries: VecDeque<QueueEntry>,
    /// Entries claimed from the head and not yet released.
    in_flight: usize,
    /// Set when the queue reached `max_len`; cleared once fully drained.
    throttled: bool,
    closed: bool,
}

impl QueueState {
    fn pending(&self) -> usize {
        self.entries.len() + self.in_flight
    }

    fn is_drained(&self) -> bool {
        self.pending() == 0
    }
}

pub(crate) struct Shared {
    state: Mutex<QueueState>,
    /// Signalled when an entry is appended or the queue is closed.
    work: Condvar,
    /// Signalled when the queue becomes fully drained or is closed.
    drained: Condvar,
    max_len: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().expect("write queue mutex poisoned")
    }

    /// Called when a [`ClaimedEntry`] is dropped.
    pub(crate) fn release(&self) {
        let mut state = self.lock();
        state.in_flight -= 1;
        if state.is_drained() {
            if state.throttled {
                debug!("write queue drained; admitting producers");
            }
            state.throttled = false;
            self.drained.notify_all();
        }
    }
}

/// Outcome of a blocking claim by the drain loop.
pub(crate) enum Claim {
    Entry(ClaimedEntry),
    /// The wait elapsed with nothing to do.
    Idle,
    /// The queue is closed and empty.
    Closed,
}

/// Bounded FIFO of pending writes, shared between producers and the drain
/// loop.
///
/// Cloning is cheap and yields a handle to the same queue. Normally the
/// queue is created by [`DrainController::start`](crate::DrainController::start)
/// and handed to stores that opt into deferred writes. A queue without a
/// running drain loop never empties on its own, so producers throttled by
/// backpressure and callers of [`wait_for_drain`](Self::wait_for_drain)
/// block until someone calls [`dequeue_one`](Self::dequeue_one).
#[derive(Clone)]
pub struct WriteQueue {
    shared: Arc<Shared>,
    drain_timeout: Option<Duration>,
}

impl WriteQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    entries: VecDeque::new(),
                    in_flight: 0,
                    throttled: false,
                    closed: false,
                }),
                work: Condvar::new(),
                drained: Condvar::new(),
                max_len: config.effective_max_len(),
            }),
            drain_timeout: config.drain_timeout,
        }
    }

    /// Append a write to the tail of the queue.
    ///
    /// If the queue holds `max_len` entries, or is still draining after
    /// having reached that length, the caller blocks until it is fully
    /// drained. The length check and the append happen under the same lock,
    /// so the queue never holds more than `max_len` entries.
    ///
    /// Fails with [`QueueError::Closed`] after shutdown, or with
    /// [`QueueError::DrainTimeout`] if a drain timeout is configured and the
    /// queue does not drain in time.
    pub fn enqueue(
        &self,
        target: Arc<dyn RecordStore>,
        key: impl Into<String>,
        payload: Value,
    ) -> QueueResult<()> {
        let entry = QueueEntry::new(target, key, payload);
        let deadline = self.deadline();

        let mut state = self.shared.lock();
        loop {
            if state.closed {
                return Err(QueueError::Closed);
            }
            if state.entries.len() >= self.shared.max_len && !state.throttled {
                debug!(
                    len = state.entries.len(),
                    max_len = self.shared.max_len,
                    "write queue full; throttling producers"
                );
                state.throttled = true;
            }
            if !state.throttled {
                break;
            }
            state = self.wait_drained(state, deadline)?;
        }

        state.entries.push_back(entry);
        drop(state);
        self.shared.work.notify_one();
        Ok(())
    }

    /// Remove the head entry, if any.
    ///
    /// Each entry is handed to exactly one caller. The returned claim counts
    /// as in flight until it is dropped.
    pub fn dequeue_one(&self) -> Option<ClaimedEntry> {
        let mut state = self.shared.lock();
        let entry = state.entries.pop_front()?;
        state.in_flight += 1;
        Some(ClaimedEntry::new(entry, Arc::clone(&self.shared)))
    }

    /// Number of entries waiting to be claimed.
    pub fn len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries waiting plus entries claimed and still being applied.
    pub fn pending(&self) -> usize {
        self.shared.lock().pending()
    }

    pub fn max_len(&self) -> usize {
        self.shared.max_len
    }

    /// Whether producers are currently held back by backpressure.
    pub fn is_throttled(&self) -> bool {
        self.shared.lock().throttled
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Block until nothing is queued and nothing is in flight.
    ///
    /// This is a point-in-time barrier: every write enqueued before the call
    /// has been applied when it returns. Writes enqueued concurrently by
    /// other producers may or may not have been applied.
    pub fn wait_for_drain(&self) {
        let state = self.shared.lock();
        let _state = self
            .shared
            .drained
            .wait_while(state, |s| !s.is_drained())
            .expect("write queue mutex poisoned");
    }

    /// [`wait_for_drain`](Self::wait_for_drain) with a deadline.
    pub fn wait_for_drain_timeout(&self, timeout: Duration) -> QueueResult<()> {
        self.wait_until_drained(Some(Instant::now() + timeout))
    }

    /// Drain barrier honouring the configured drain timeout, if any.
    pub fn drain_barrier(&self) -> QueueResult<()> {
        self.wait_until_drained(self.deadline())
    }

    /// Stop accepting entries. Entries already queued remain claimable.
    pub fn close(&self) {
        let mut state = self.shared.lock();
        state.closed = true;
        drop(state);
        self.shared.work.notify_all();
        self.shared.drained.notify_all();
    }

    /// Block until an entry can be claimed, the queue is closed and empty,
    /// or `wait` elapses.
    pub(crate) fn claim_next(&self, wait: Option<Duration>) -> Claim {
        let mut state = self.shared.lock();
        loop {
            if let Some(entry) = state.entries.pop_front() {
                state.in_flight += 1;
                return Claim::Entry(ClaimedEntry::new(entry, Arc::clone(&self.shared)));
            }
            if state.closed {
                return Claim::Closed;
            }
            match wait {
                None => {
                    state = self
                        .shared
                        .work
                        .wait(state)
                        .expect("write queue mutex poisoned");
                }
                Some(wait) => {
                    let (guard, result) = self
                        .shared
                        .work
                        .wait_timeout(state, wait)
                        .expect("write queue mutex poisoned");
                    state = guard;
                    if result.timed_out() && state.entries.is_empty() && !state.closed {
                        return Claim::Idle;
                    }
                }
            }
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.drain_timeout.map(|timeout| Instant::now() + timeout)
    }

    fn wait_until_drained(&self, deadline: Option<Instant>) -> QueueResult<()> {
        let mut state = self.shared.lock();
        while !state.is_drained() {
            state = self.wait_drained(state, deadline)?;
        }
        Ok(())
    }

    /// Wait once on the `drained` condvar, failing if `deadline` has passed.
    fn wait_drained<'a>(
        &self,
        state: MutexGuard<'a, QueueState>,
        deadline: Option<Instant>,
    ) -> QueueResult<MutexGuard<'a, QueueState>> {
        let Some(deadline) = deadline else {
            return Ok(self
                .shared
                .drained
                .wait(state)
                .expect("write queue mutex poisoned"));
        };
        let now = Instant::now();
        if now >= deadline {
            return Err(QueueError::DrainTimeout {
                pending: state.pending(),
            });
        }
        let (state, _) = self
            .shared
            .drained
            .wait_timeout(state, deadline - now)
            .expect("write queue mutex poisoned");
        Ok(state)
    }
}

impl std::fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("WriteQueue")
            .field("len", &state.entries.len())
            .field("in_flight", &state.in_flight)
            .field("max_len", &self.shared.max_len)
            .field("throttled", &state.throttled)
            .field("closed", &state.closed)
            .finish()
    }
}
