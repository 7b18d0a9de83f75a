use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use fitness_core::model::WorkoutId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-workout mutation queue.
///
/// Holding the guard for an id makes every other read-modify-write of that
/// id's cached record wait its turn, in arrival order. Different ids never
/// block each other.
#[derive(Default)]
pub(crate) struct WorkoutLocks {
    slots: Mutex<HashMap<WorkoutId, Arc<AsyncMutex<()>>>>,
}

impl WorkoutLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn acquire(&self, id: WorkoutId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(id).or_default())
        };
        slot.lock_owned().await
    }

    /// Drop the slot for a deleted workout once nobody is waiting on it.
    pub(crate) fn forget(&self, id: WorkoutId) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.get(&id).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(&id);
        }
    }
}
