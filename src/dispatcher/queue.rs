//! Bounded FIFO of pending connections shared by producers and workers.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct QueueState<T> {
    items: VecDeque<T>,
    /// Threads currently blocked in `dequeue_timeout`.
    waiting: usize,
    /// Bumped by `wake_all`; waiters that see it change return empty-handed.
    wake_epoch: u64,
}

/// Thread-safe bounded queue with blocking, timed dequeue.
///
/// Admission never blocks: [`try_enqueue`](Self::try_enqueue) hands the item
/// back when the queue is at capacity.
pub struct BoundedWorkQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
    capacity: usize,
}

impl<T> BoundedWorkQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                waiting: 0,
                wake_epoch: 0,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Append to the tail. Returns the item back if the queue is full.
    pub fn try_enqueue(&self, item: T) -> Result<(), T> {
        let mut state = self.state.lock();
        if state.items.len() >= self.capacity {
            return Err(item);
        }
        state.items.push_back(item);
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    /// Wait up to `timeout` for the head item.
    ///
    /// Returns `None` when the timeout elapses or the queue is woken through
    /// [`wake_all`](Self::wake_all) / [`clear_and_wake_all`](Self::clear_and_wake_all).
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<T> {
        let mut state = self.state.lock();
        if let Some(item) = state.items.pop_front() {
            return Some(item);
        }

        // Timeouts too large to represent as a deadline wait until woken.
        let deadline = Instant::now().checked_add(timeout);
        let epoch = state.wake_epoch;
        state.waiting += 1;

        let item = loop {
            if state.wake_epoch != epoch {
                break None;
            }
            if let Some(item) = state.items.pop_front() {
                break Some(item);
            }
            let timed_out = match deadline {
                Some(deadline) => self.available.wait_until(&mut state, deadline).timed_out(),
                None => {
                    self.available.wait(&mut state);
                    false
                }
            };
            if timed_out {
                // A producer may have slipped in just before the deadline.
                break if state.wake_epoch == epoch {
                    state.items.pop_front()
                } else {
                    None
                };
            }
        };

        state.waiting -= 1;
        item
    }

    /// Whether a blocked consumer is free to take the next item.
    ///
    /// Waiters already spoken for by queued items are not counted, so after an
    /// enqueue this answers "will somebody pick up *another* item promptly".
    pub fn has_idle_consumer(&self) -> bool {
        let state = self.state.lock();
        state.waiting > state.items.len()
    }

    /// Release every blocked waiter without touching queued items.
    pub fn wake_all(&self) {
        let mut state = self.state.lock();
        state.wake_epoch = state.wake_epoch.wrapping_add(1);
        drop(state);
        self.available.notify_all();
    }

    /// Drop every queued item and release every blocked waiter.
    ///
    /// Items are dropped after the lock is released.
    pub fn clear_and_wake_all(&self) -> usize {
        let drained: Vec<T> = {
            let mut state = self.state.lock();
            state.wake_epoch = state.wake_epoch.wrapping_add(1);
            state.items.drain(..).collect()
        };
        self.available.notify_all();
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
