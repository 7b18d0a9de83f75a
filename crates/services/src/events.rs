use std::sync::{Mutex, PoisonError, Weak};

use fitness_core::model::WorkoutId;

/// Receives workout lifecycle events from the repository.
pub trait WorkoutObserver: Send + Sync {
    /// The workout no longer exists locally.
    fn workout_deleted(&self, id: WorkoutId);
}

/// Weakly held observers, so a dropped session machine simply stops listening.
#[derive(Default)]
pub(crate) struct WorkoutEvents {
    observers: Mutex<Vec<Weak<dyn WorkoutObserver>>>,
}

impl WorkoutEvents {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(&self, observer: Weak<dyn WorkoutObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub(crate) fn workout_deleted(&self, id: WorkoutId) {
        let live: Vec<_> = {
            let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
            observers.retain(|o| o.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in live {
            observer.workout_deleted(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct Counter(Mutex<Vec<WorkoutId>>);

    impl WorkoutObserver for Counter {
        fn workout_deleted(&self, id: WorkoutId) {
            self.0.lock().unwrap().push(id);
        }
    }

    #[test]
    fn delivers_to_live_observers_and_prunes_dropped_ones() {
        let events = WorkoutEvents::new();
        let kept = Arc::new(Counter::default());
        let dropped = Arc::new(Counter::default());
        let kept_weak: Weak<Counter> = Arc::downgrade(&kept);
        let dropped_weak: Weak<Counter> = Arc::downgrade(&dropped);
        events.subscribe(kept_weak);
        events.subscribe(dropped_weak);
        drop(dropped);

        let id = WorkoutId::generate();
        events.workout_deleted(id);

        assert_eq!(*kept.0.lock().unwrap(), vec![id]);
        assert_eq!(events.observers.lock().unwrap().len(), 1);
    }
}
