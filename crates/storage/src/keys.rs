//! Key layout inside the local cache.

use fitness_core::model::WorkoutId;

pub const WORKOUT_PREFIX: &str = "workout:";
pub const HISTORY_PREFIX: &str = "history:";
pub const SYNC_QUEUE_KEY: &str = "sync:queue";

#[must_use]
pub fn workout_key(id: WorkoutId) -> String {
    format!("{WORKOUT_PREFIX}{id}")
}

/// Session history for one workout.
#[must_use]
pub fn history_key(id: WorkoutId) -> String {
    format!("{HISTORY_PREFIX}{id}")
}

#[must_use]
pub fn workout_id_from_key(key: &str) -> Option<WorkoutId> {
    key.strip_prefix(WORKOUT_PREFIX)?.parse().ok()
}
