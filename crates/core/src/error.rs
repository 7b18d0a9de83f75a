use thiserror::Error;

use crate::model::{ExerciseError, SessionSummaryError, SetError, WorkoutError};

/// Umbrella error for the core crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Exercise(#[from] ExerciseError),
    #[error(transparent)]
    Workout(#[from] WorkoutError),
    #[error(transparent)]
    Set(#[from] SetError),
    #[error(transparent)]
    SessionSummary(#[from] SessionSummaryError),
}
