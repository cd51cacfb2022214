//! Shared ownership of the dispatcher core.
//!
//! The creator holds one reference, and every running worker holds one more
//! for as long as its loop runs. The core is destroyed exactly once, when
//! the last holder lets go, which may well be a worker thread finishing after
//! the creator is long gone.

use std::ops::Deref;
use std::sync::{Arc, Weak};

/// Reference-counted holder. `retain` and `release` always come in pairs.
pub struct SharedLifetime<T> {
    inner: Arc<T>,
}

impl<T> SharedLifetime<T> {
    /// Wrap `value` with a count of one.
    pub fn new(value: T) -> Self {
        Self { inner: Arc::new(value) }
    }

    /// Take another reference.
    pub fn retain(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }

    /// Give this reference back; destroys the value if it was the last one.
    pub fn release(self) {
        drop(self);
    }

    /// Number of live holders.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Non-owning handle, mostly for observing destruction.
    pub fn downgrade(&self) -> Weak<T> {
        Arc::downgrade(&self.inner)
    }
}

impl<T> Deref for SharedLifetime<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_destroyed_once_on_last_release() {
        let drops = Arc::new(AtomicUsize::new(0));
        let owner = SharedLifetime::new(DropCounter(drops.clone()));
        assert_eq!(owner.holders(), 1);

        let worker = owner.retain();
        assert_eq!(owner.holders(), 2);

        owner.release();
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(worker.holders(), 1);

        worker.release();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_outlives_creator_on_other_thread() {
        let drops = Arc::new(AtomicUsize::new(0));
        let owner = SharedLifetime::new(DropCounter(drops.clone()));
        let weak = owner.downgrade();
        let worker = owner.retain();
        owner.release();

        let handle = std::thread::spawn(move || {
            assert!(worker.0.load(Ordering::SeqCst) == 0);
            worker.release();
        });
        handle.join().unwrap();

        assert!(weak.upgrade().is_none());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
