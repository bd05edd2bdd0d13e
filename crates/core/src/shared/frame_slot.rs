use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Capacity-one, latest-wins handoff between two pipeline stages.
///
/// `publish` never blocks the producer: an item that was not taken yet is
/// discarded (and dropped) when a newer one arrives. `take` never blocks
/// the consumer indefinitely, so a stage can observe its stop flag between
/// attempts.
pub struct FrameSlot<T> {
    item: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> FrameSlot<T> {
    pub fn new() -> Self {
        Self {
            item: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Stores `item`, replacing any pending one.
    ///
    /// Returns `true` when a pending item was discarded.
    pub fn publish(&self, item: T) -> bool {
        let superseded = self.lock().replace(item);
        self.ready.notify_one();
        // Dropped here, outside the lock.
        superseded.is_some()
    }

    /// Removes and returns the pending item, if any.
    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    /// Like [`take`](Self::take), but waits up to `timeout` for an item.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock();
        loop {
            if let Some(item) = guard.take() {
                return Some(item);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            guard = self
                .ready
                .wait_timeout(guard, deadline - now)
                .map(|(g, _)| g)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Drops the pending item, if any.
    pub fn clear(&self) {
        let discarded = self.lock().take();
        drop(discarded);
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    // A panic while holding the lock cannot leave a half-written item:
    // the only mutations are whole-value swaps.
    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.item.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for FrameSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
