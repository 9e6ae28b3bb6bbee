//! Scoped exclusive object locks

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

/// Lock acquisition / release counters of one pool
#[derive(Debug, Default)]
pub struct LockStats {
    acquired: AtomicU64,
    released: AtomicU64,
}

impl LockStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    /// Locks currently held
    pub fn held(&self) -> u64 {
        self.acquired().saturating_sub(self.released())
    }
}

/// An exclusively locked pool object.
///
/// Dereferences to a working copy. [`Locked::commit`] writes the working
/// copy back to the stored object; dropping the guard releases the lock
/// and throws away uncommitted changes.
pub struct Locked<T: Clone> {
    working: T,
    guard: OwnedMutexGuard<Option<T>>,
    stats: Arc<LockStats>,
}

impl<T: Clone> Locked<T> {
    /// Wrap an acquired slot guard. Returns `None` (releasing the slot) if
    /// the slot is empty, i.e. the object was removed while we waited.
    pub fn new(guard: OwnedMutexGuard<Option<T>>, stats: Arc<LockStats>) -> Option<Self> {
        let working = guard.as_ref()?.clone();
        stats.acquired.fetch_add(1, Ordering::SeqCst);
        Some(Self {
            working,
            guard,
            stats,
        })
    }

    /// Persist the working copy into the locked slot
    pub fn commit(&mut self) {
        *self.guard = Some(self.working.clone());
    }
}

impl<T: Clone> Deref for Locked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.working
    }
}

impl<T: Clone> DerefMut for Locked<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.working
    }
}

impl<T: Clone> Drop for Locked<T> {
    fn drop(&mut self) {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
    }
}
