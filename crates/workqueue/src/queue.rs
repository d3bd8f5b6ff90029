//! Deduplicating work queue.
//!
//! The queue hands items to workers one at a time and guarantees that two
//! equal items are never in flight at the same moment. Equality is whatever
//! `Eq`/`Hash` of the item says, so callers control what "the same item"
//! means (for controller events: the identity key).
//!
//! Three sets of state are kept per item:
//! - `queue`: ordering of items waiting to be handed out
//! - `dirty`: items that need processing (the latest payload for each key)
//! - `processing`: items currently held by a worker
//!
//! An item that is re-added while in flight stays in `dirty` only and is moved
//! back onto `queue` when the worker calls [`WorkQueue::done`].

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

struct State<T> {
    queue: VecDeque<T>,
    dirty: HashSet<T>,
    processing: HashSet<T>,
    shutting_down: bool,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    item_available: Notify,
    // Cancels pending `add_after` timers on shutdown
    timers: CancellationToken,
}

/// A deduplicating FIFO work queue shared between one or more producers and
/// any number of workers.
///
/// `WorkQueue` is a cheap handle; clones share the same queue.
pub struct WorkQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("WorkQueue")
            .field("queued", &state.queue.len())
            .field("processing", &state.processing.len())
            .field("shutting_down", &state.shutting_down)
            .finish()
    }
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // A worker that panicked mid-update leaves the sets consistent enough
        // to keep serving; recover instead of poisoning every other worker.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for WorkQueue<T>
where
    T: Hash + Eq + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T>
where
    T: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    shutting_down: false,
                }),
                item_available: Notify::new(),
                timers: CancellationToken::new(),
            }),
        }
    }

    /// Marks `item` as needing processing.
    ///
    /// - If an equal item is already waiting, the waiting payload is replaced
    ///   by `item` (latest wins) and keeps its place in line.
    /// - If an equal item is in flight, `item` is parked and handed out again
    ///   after the in-flight one is marked [`done`](Self::done).
    /// - After [`shut_down`](Self::shut_down) the call is a no-op.
    pub fn add(&self, item: T) {
        self.add_inner(item, true);
    }

    /// Shared body of [`add`](Self::add) and delayed adds. With `overwrite`
    /// unset an equal item that is already waiting is left untouched.
    fn add_inner(&self, item: T, overwrite: bool) {
        let mut state = self.inner.lock();
        if state.shutting_down {
            trace!("Queue is shutting down, ignoring add");
            return;
        }

        if state.dirty.contains(&item) {
            // Coalesce: keep the position, refresh the payload unless a
            // newer one is already waiting
            if overwrite {
                state.dirty.replace(item);
            }
            return;
        }

        state.dirty.insert(item.clone());
        if state.processing.contains(&item) {
            return;
        }

        state.queue.push_back(item);
        drop(state);
        self.inner.item_available.notify_one();
    }

    /// Waits for the next item.
    ///
    /// Returns `None` once the queue is shutting down and has nothing left to
    /// hand out; that is the signal for a worker loop to exit. The returned
    /// item is in flight until [`done`](Self::done) is called with it.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.inner.item_available.notified();
            tokio::pin!(notified);
            // Register interest before inspecting state so a notify between the
            // check and the await cannot be lost.
            notified.as_mut().enable();

            {
                let mut state = self.inner.lock();
                if let Some(front) = state.queue.pop_front() {
                    let item = state.dirty.take(&front).unwrap_or(front);
                    state.processing.insert(item.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        // Pass the baton in case several adds were coalesced
                        // into a single stored permit.
                        self.inner.item_available.notify_one();
                    }
                    return Some(item);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Marks `item` as no longer in flight.
    ///
    /// If an equal item was added while this one was being processed, it is
    /// put back on the queue now.
    pub fn done(&self, item: &T) {
        let mut state = self.inner.lock();
        state.processing.remove(item);
        if let Some(pending) = state.dirty.get(item).cloned() {
            state.queue.push_back(pending);
            drop(state);
            self.inner.item_available.notify_one();
        }
    }

    /// Adds `item` once `delay` has elapsed.
    ///
    /// A zero delay adds immediately. When the timer fires and an equal item
    /// is already waiting, the waiting payload is kept: it was added after
    /// this one was scheduled. Pending timers are dropped when the queue shuts
    /// down.
    pub fn add_after(&self, item: T, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add_inner(item, false);
            return;
        }

        let queue = self.clone();
        let cancelled = self.inner.timers.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => {}
                () = tokio::time::sleep(delay) => queue.add_inner(item, false),
            }
        });
    }

    /// Starts shutting the queue down.
    ///
    /// New adds are ignored, delayed adds are cancelled, and every worker
    /// blocked in [`get`](Self::get) wakes up. Items already queued are still
    /// handed out; once the queue is empty `get` returns `None`.
    pub fn shut_down(&self) {
        {
            let mut state = self.inner.lock();
            if state.shutting_down {
                return;
            }
            state.shutting_down = true;
            debug!(
                queued = state.queue.len(),
                processing = state.processing.len(),
                "Work queue shutting down"
            );
        }
        self.inner.timers.cancel();
        self.inner.item_available.notify_waiters();
    }

    /// Returns true once [`shut_down`](Self::shut_down) has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.lock().shutting_down
    }

    /// Number of items waiting to be handed out (not counting in-flight ones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Returns true if no item is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
