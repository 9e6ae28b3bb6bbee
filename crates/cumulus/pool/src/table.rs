use crate::lock::{LockStats, Locked};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type Slot<T> = Arc<Mutex<Option<T>>>;

/// Id -> lockable slot table shared by the in-memory pools
pub(crate) struct Table<T> {
    slots: DashMap<u32, Slot<T>>,
    stats: Arc<LockStats>,
}

impl<T: Clone + Send + 'static> Table<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: DashMap::new(),
            stats: Arc::new(LockStats::new()),
        }
    }

    pub(crate) fn stats(&self) -> Arc<LockStats> {
        self.stats.clone()
    }

    /// Insert a new object; false if the id is taken
    pub(crate) fn insert(&self, id: u32, value: T) -> bool {
        match self.slots.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(Some(value))));
                true
            }
        }
    }

    pub(crate) async fn lock(&self, id: u32) -> Option<Locked<T>> {
        // Clone the slot handle first: the map shard must not be held
        // across the await.
        let slot = self.slots.get(&id).map(|s| s.value().clone())?;
        let guard = slot.lock_owned().await;
        tracing::trace!(id, "object locked");
        Locked::new(guard, self.stats.clone())
    }

    pub(crate) fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.slots.iter().map(|s| *s.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}
