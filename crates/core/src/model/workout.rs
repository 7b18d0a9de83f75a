use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::exercise::{Exercise, ExerciseDraft, ExerciseError};
use crate::model::ids::{OwnerId, WorkoutId};
use crate::progress::{compute_workout_progress, is_workout_complete};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WorkoutError {
    #[error("workout name cannot be empty")]
    EmptyName,

    #[error("exercise {index} is invalid: {source}")]
    InvalidExercise {
        index: usize,
        #[source]
        source: ExerciseError,
    },

    #[error("exercise index {index} out of range for {len} exercises")]
    ExerciseIndexOutOfRange { index: usize, len: usize },

    #[error("stored progress {stored} does not match derived progress {derived}")]
    ProgressMismatch { stored: u8, derived: u8 },

    #[error("completed_at must be set exactly when every exercise is completed")]
    CompletionMismatch,
}

//
// ─── INPUTS ────────────────────────────────────────────────────────────────────
//

/// User input for a new workout.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkoutDraft {
    pub name: String,
    pub description: String,
    pub exercises: Vec<ExerciseDraft>,
}

impl WorkoutDraft {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_exercise(mut self, exercise: ExerciseDraft) -> Self {
        self.exercises.push(exercise);
        self
    }
}

/// Partial update merged onto a stored workout. `None` leaves a field untouched.
///
/// `owner_id`, when present, must match the stored owner; it is never written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkoutPatch {
    pub owner_id: Option<OwnerId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub exercises: Option<Vec<Exercise>>,
}

impl WorkoutPatch {
    #[must_use]
    pub fn exercises(exercises: Vec<Exercise>) -> Self {
        Self {
            exercises: Some(exercises),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_owner(mut self, owner_id: OwnerId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.exercises.is_none()
    }
}

//
// ─── WORKOUT ───────────────────────────────────────────────────────────────────
//

/// A named, ordered list of prescribed exercises owned by one user.
///
/// `progress` and `completed_at` are derived from the exercise flags and are
/// kept in sync by every mutating method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workout {
    id: WorkoutId,
    owner_id: OwnerId,
    name: String,
    description: String,
    created_at: DateTime<Utc>,
    exercises: Vec<Exercise>,
    progress: u8,
    completed_at: Option<DateTime<Utc>>,
    revision: Option<u64>,
}

impl Workout {
    /// Build a fresh workout with zeroed progress.
    ///
    /// # Errors
    ///
    /// Returns `WorkoutError::EmptyName` or `WorkoutError::InvalidExercise`.
    pub fn create(
        id: WorkoutId,
        owner_id: OwnerId,
        draft: WorkoutDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, WorkoutError> {
        let name = validate_name(draft.name)?;
        let exercises = draft
            .exercises
            .into_iter()
            .enumerate()
            .map(|(index, exercise)| {
                exercise
                    .validate()
                    .map_err(|source| WorkoutError::InvalidExercise { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id,
            owner_id,
            name,
            description: draft.description,
            created_at: now,
            exercises,
            progress: 0,
            completed_at: None,
            revision: None,
        })
    }

    /// Rehydrate a workout from a persisted record.
    ///
    /// # Errors
    ///
    /// Returns `WorkoutError::ProgressMismatch` or `WorkoutError::CompletionMismatch`
    /// when the stored derived fields disagree with the exercise flags.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: WorkoutId,
        owner_id: OwnerId,
        name: String,
        description: String,
        created_at: DateTime<Utc>,
        exercises: Vec<Exercise>,
        progress: u8,
        completed_at: Option<DateTime<Utc>>,
        revision: Option<u64>,
    ) -> Result<Self, WorkoutError> {
        let name = validate_name(name)?;
        let derived = compute_workout_progress(&exercises);
        if derived != progress {
            return Err(WorkoutError::ProgressMismatch {
                stored: progress,
                derived,
            });
        }
        if completed_at.is_some() != is_workout_complete(&exercises) {
            return Err(WorkoutError::CompletionMismatch);
        }

        Ok(Self {
            id,
            owner_id,
            name,
            description,
            created_at,
            exercises,
            progress,
            completed_at,
            revision,
        })
    }

    #[must_use]
    pub fn id(&self) -> WorkoutId {
        self.id
    }

    #[must_use]
    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn exercises(&self) -> &[Exercise] {
        &self.exercises
    }

    /// Derived completion percentage in `0..=100`.
    #[must_use]
    pub fn progress(&self) -> u8 {
        self.progress
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Revision marker assigned by the remote store, if the record has reached it.
    #[must_use]
    pub fn revision(&self) -> Option<u64> {
        self.revision
    }

    pub fn set_revision(&mut self, revision: Option<u64>) {
        self.revision = revision;
    }

    /// Set one exercise's completion flag and re-derive progress.
    ///
    /// Returns `false` when the flag already had the requested value, in which
    /// case nothing changes.
    ///
    /// # Errors
    ///
    /// Returns `WorkoutError::ExerciseIndexOutOfRange` for a bad index.
    pub fn set_exercise_completed(
        &mut self,
        index: usize,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, WorkoutError> {
        let len = self.exercises.len();
        let exercise = self
            .exercises
            .get_mut(index)
            .ok_or(WorkoutError::ExerciseIndexOutOfRange { index, len })?;
        if exercise.is_completed() == completed {
            return Ok(false);
        }
        exercise.set_completed(completed);
        self.refresh_progress(now);
        Ok(true)
    }

    /// Merge a patch onto this workout. Ownership checks are the caller's job.
    ///
    /// # Errors
    ///
    /// Returns `WorkoutError::EmptyName` if the patch blanks the name.
    pub fn apply_patch(&mut self, patch: WorkoutPatch, now: DateTime<Utc>) -> Result<(), WorkoutError> {
        let name = patch.name.map(validate_name).transpose()?;
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(exercises) = patch.exercises {
            self.exercises = exercises;
            self.refresh_progress(now);
        }
        Ok(())
    }

    /// Copy completion flags from a session's exercise list.
    ///
    /// Flags are taken by position, and only where the exercise at that
    /// position still has the same name. Anything added, renamed or moved
    /// since the session started keeps its current flag. Returns how many
    /// exercises were matched.
    pub fn apply_completion(&mut self, outcome: &[Exercise], now: DateTime<Utc>) -> usize {
        let mut matched = 0;
        for (current, done) in self.exercises.iter_mut().zip(outcome) {
            if current.name() == done.name() {
                current.set_completed(done.is_completed());
                matched += 1;
            }
        }
        self.refresh_progress(now);
        matched
    }

    fn refresh_progress(&mut self, now: DateTime<Utc>) {
        self.progress = compute_workout_progress(&self.exercises);
        if is_workout_complete(&self.exercises) {
            // Keep the original completion time if it was already complete.
            if self.completed_at.is_none() {
                self.completed_at = Some(now);
            }
        } else {
            self.completed_at = None;
        }
    }
}

fn validate_name(name: String) -> Result<String, WorkoutError> {
    if name.trim().is_empty() {
        return Err(WorkoutError::EmptyName);
    }
    Ok(name)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
