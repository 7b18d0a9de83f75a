mod exercise;
mod ids;
mod session;
mod workout;

pub use ids::{OwnerId, ParseIdError, WorkoutId};

pub use exercise::{Exercise, ExerciseDraft, ExerciseError, Reps};
pub use session::{
    ActiveSession, SessionExercise, SessionSummary, SessionSummaryError, SetEntry, SetError,
};
pub use workout::{Workout, WorkoutDraft, WorkoutError, WorkoutPatch};
