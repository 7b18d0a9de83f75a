use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::model::exercise::Exercise;
use crate::model::ids::WorkoutId;
use crate::model::workout::Workout;
use crate::progress::{compute_session_volume, compute_workout_progress};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SetError {
    #[error("set weight must be a finite, non-negative number")]
    InvalidWeight,

    #[error("exercise index {index} out of range for {len} exercises")]
    ExerciseIndexOutOfRange { index: usize, len: usize },

    #[error("set index {index} out of range for {len} sets")]
    SetIndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionSummaryError {
    #[error("ended_at is before started_at")]
    InvalidTimeRange,

    #[error("session volume must be finite and non-negative")]
    InvalidVolume,

    #[error("completed exercises ({completed}) exceed exercise count ({total})")]
    CountMismatch { completed: u32, total: u32 },
}

//
// ─── SETS ──────────────────────────────────────────────────────────────────────
//

/// One performed set inside an active session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetEntry {
    weight: f64,
    reps: u32,
    completed: bool,
}

impl SetEntry {
    /// A finished set.
    ///
    /// # Errors
    ///
    /// Returns `SetError::InvalidWeight` for negative, NaN or infinite weights.
    pub fn completed(weight: f64, reps: u32) -> Result<Self, SetError> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(SetError::InvalidWeight);
        }
        Ok(Self {
            weight,
            reps,
            completed: true,
        })
    }

    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    #[must_use]
    pub fn reps(&self) -> u32 {
        self.reps
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// `weight × reps`, or zero for a set that was not finished.
    #[must_use]
    pub fn volume(&self) -> f64 {
        if self.completed {
            self.weight * f64::from(self.reps)
        } else {
            0.0
        }
    }
}

//
// ─── ACTIVE SESSION ────────────────────────────────────────────────────────────
//

/// Working copy of one exercise while a session runs.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionExercise {
    exercise: Exercise,
    sets: Vec<SetEntry>,
}

impl SessionExercise {
    #[must_use]
    pub fn exercise(&self) -> &Exercise {
        &self.exercise
    }

    #[must_use]
    pub fn sets(&self) -> &[SetEntry] {
        &self.sets
    }

    /// True once any completed set reaches the prescribed rep target.
    #[must_use]
    pub fn meets_target(&self) -> bool {
        let target = self.exercise.reps().target().unwrap_or(1);
        self.sets
            .iter()
            .any(|set| set.is_completed() && set.reps() >= target)
    }
}

/// Draft state of a workout being performed. Discarded on cancel.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSession {
    workout_id: WorkoutId,
    exercises: Vec<SessionExercise>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl ActiveSession {
    /// Start from a workout snapshot with an empty set list per exercise.
    #[must_use]
    pub fn begin(workout: &Workout, started_at: DateTime<Utc>) -> Self {
        let exercises = workout
            .exercises()
            .iter()
            .map(|exercise| SessionExercise {
                exercise: exercise.clone(),
                sets: Vec::new(),
            })
            .collect();
        Self {
            workout_id: workout.id(),
            exercises,
            started_at,
            ended_at: None,
        }
    }

    #[must_use]
    pub fn workout_id(&self) -> WorkoutId {
        self.workout_id
    }

    #[must_use]
    pub fn exercises(&self) -> &[SessionExercise] {
        &self.exercises
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Time spent so far, or the final duration once ended.
    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        self.ended_at.unwrap_or(now) - self.started_at
    }

    /// Append a set to the given exercise.
    ///
    /// # Errors
    ///
    /// Returns `SetError::ExerciseIndexOutOfRange` for a bad index.
    pub fn record_set(&mut self, exercise_index: usize, set: SetEntry) -> Result<(), SetError> {
        let len = self.exercises.len();
        let entry = self
            .exercises
            .get_mut(exercise_index)
            .ok_or(SetError::ExerciseIndexOutOfRange {
                index: exercise_index,
                len,
            })?;
        entry.sets.push(set);
        Ok(())
    }

    /// Remove a previously recorded set.
    ///
    /// # Errors
    ///
    /// Returns `SetError::ExerciseIndexOutOfRange` or `SetError::SetIndexOutOfRange`.
    pub fn remove_set(
        &mut self,
        exercise_index: usize,
        set_index: usize,
    ) -> Result<SetEntry, SetError> {
        let len = self.exercises.len();
        let entry = self
            .exercises
            .get_mut(exercise_index)
            .ok_or(SetError::ExerciseIndexOutOfRange {
                index: exercise_index,
                len,
            })?;
        if set_index >= entry.sets.len() {
            return Err(SetError::SetIndexOutOfRange {
                index: set_index,
                len: entry.sets.len(),
            });
        }
        Ok(entry.sets.remove(set_index))
    }

    pub fn finish(&mut self, ended_at: DateTime<Utc>) {
        self.ended_at = Some(ended_at);
    }

    /// Exercises with their completion flag replaced by the session outcome.
    #[must_use]
    pub fn completed_exercises(&self) -> Vec<Exercise> {
        self.exercises
            .iter()
            .map(|entry| entry.exercise.clone().with_completed(entry.meets_target()))
            .collect()
    }

    #[must_use]
    pub fn total_sets(&self) -> usize {
        self.exercises.iter().map(|e| e.sets.len()).sum()
    }
}

//
// ─── SUMMARY ───────────────────────────────────────────────────────────────────
//

/// Outcome of a committed session, kept as workout history.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    workout_id: WorkoutId,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    total_volume: f64,
    total_sets: u32,
    completed_exercises: u32,
    exercise_count: u32,
    progress: u8,
}

impl SessionSummary {
    /// Rehydrate a summary from storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionSummaryError` when the stored values are inconsistent.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        workout_id: WorkoutId,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        total_volume: f64,
        total_sets: u32,
        completed_exercises: u32,
        exercise_count: u32,
        progress: u8,
    ) -> Result<Self, SessionSummaryError> {
        if ended_at < started_at {
            return Err(SessionSummaryError::InvalidTimeRange);
        }
        if !total_volume.is_finite() || total_volume < 0.0 {
            return Err(SessionSummaryError::InvalidVolume);
        }
        if completed_exercises > exercise_count {
            return Err(SessionSummaryError::CountMismatch {
                completed: completed_exercises,
                total: exercise_count,
            });
        }

        Ok(Self {
            workout_id,
            started_at,
            ended_at,
            total_volume,
            total_sets,
            completed_exercises,
            exercise_count,
            progress,
        })
    }

    /// Summarize a session ending at `ended_at`.
    ///
    /// # Errors
    ///
    /// Returns `SessionSummaryError::InvalidTimeRange` if `ended_at` precedes the start.
    pub fn from_session(
        session: &ActiveSession,
        ended_at: DateTime<Utc>,
    ) -> Result<Self, SessionSummaryError> {
        let exercises = session.completed_exercises();
        let completed = exercises.iter().filter(|e| e.is_completed()).count();

        Self::from_persisted(
            session.workout_id(),
            session.started_at(),
            ended_at,
            compute_session_volume(session),
            saturating_u32(session.total_sets()),
            saturating_u32(completed),
            saturating_u32(exercises.len()),
            compute_workout_progress(&exercises),
        )
    }

    #[must_use]
    pub fn workout_id(&self) -> WorkoutId {
        self.workout_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.ended_at - self.started_at
    }

    #[must_use]
    pub fn total_volume(&self) -> f64 {
        self.total_volume
    }

    #[must_use]
    pub fn total_sets(&self) -> u32 {
        self.total_sets
    }

    #[must_use]
    pub fn completed_exercises(&self) -> u32 {
        self.completed_exercises
    }

    #[must_use]
    pub fn exercise_count(&self) -> u32 {
        self.exercise_count
    }

    #[must_use]
    pub fn progress(&self) -> u8 {
        self.progress
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::exercise::{ExerciseDraft, Reps};
    use crate::model::ids::OwnerId;
    use crate::model::workout::WorkoutDraft;
    use crate::time::fixed_now;

    fn workout() -> Workout {
        let draft = WorkoutDraft::new("Full Body")
            .with_exercise(ExerciseDraft::new("Squat", 3, Reps::Count(5)))
            .with_exercise(ExerciseDraft::new("Row", 3, Reps::Described("8-12".into())))
            .with_exercise(ExerciseDraft::new("Plank", 2, Reps::Described("hold".into())));
        Workout::create(WorkoutId::generate(), OwnerId::new("u1"), draft, fixed_now()).unwrap()
    }

    #[test]
    fn rejects_negative_and_non_finite_weights() {
        assert_eq!(SetEntry::completed(-1.0, 5), Err(SetError::InvalidWeight));
        assert_eq!(SetEntry::completed(f64::NAN, 5), Err(SetError::InvalidWeight));
        assert!(SetEntry::completed(0.0, 5).is_ok());
    }

    #[test]
    fn begin_starts_with_empty_sets() {
        let session = ActiveSession::begin(&workout(), fixed_now());
        assert_eq!(session.exercises().len(), 3);
        assert!(session.exercises().iter().all(|e| e.sets().is_empty()));
        assert_eq!(session.total_sets(), 0);
    }

    #[test]
    fn qualifying_sets_mark_exercises_complete() {
        let mut session = ActiveSession::begin(&workout(), fixed_now());
        session.record_set(0, SetEntry::completed(100.0, 4).unwrap()).unwrap();
        session.record_set(0, SetEntry::completed(100.0, 5).unwrap()).unwrap();
        session.record_set(1, SetEntry::completed(60.0, 7).unwrap()).unwrap();
        session.record_set(2, SetEntry::completed(0.0, 1).unwrap()).unwrap();

        let flags: Vec<bool> = session
            .completed_exercises()
            .iter()
            .map(Exercise::is_completed)
            .collect();
        assert_eq!(flags, vec![true, false, true]);
    }

    #[test]
    fn record_set_rejects_bad_index() {
        let mut session = ActiveSession::begin(&workout(), fixed_now());
        let err = session
            .record_set(3, SetEntry::completed(10.0, 10).unwrap())
            .unwrap_err();
        assert_eq!(err, SetError::ExerciseIndexOutOfRange { index: 3, len: 3 });
    }

    #[test]
    fn remove_set_undoes_a_recording() {
        let mut session = ActiveSession::begin(&workout(), fixed_now());
        session.record_set(0, SetEntry::completed(100.0, 5).unwrap()).unwrap();
        let removed = session.remove_set(0, 0).unwrap();
        assert_eq!(removed.reps(), 5);
        assert!(!session.exercises()[0].meets_target());
        assert_eq!(
            session.remove_set(0, 0).unwrap_err(),
            SetError::SetIndexOutOfRange { index: 0, len: 0 }
        );
    }

    #[test]
    fn summary_reflects_session() {
        let mut session = ActiveSession::begin(&workout(), fixed_now());
        session.record_set(0, SetEntry::completed(100.0, 5).unwrap()).unwrap();
        session.record_set(1, SetEntry::completed(50.0, 10).unwrap()).unwrap();
        let ended = fixed_now() + Duration::minutes(45);

        let summary = SessionSummary::from_session(&session, ended).unwrap();
        assert_eq!(summary.duration(), Duration::minutes(45));
        assert!((summary.total_volume() - 1000.0).abs() < f64::EPSILON);
        assert_eq!(summary.total_sets(), 2);
        assert_eq!(summary.completed_exercises(), 2);
        assert_eq!(summary.exercise_count(), 3);
        assert_eq!(summary.progress(), 67);
    }

    #[test]
    fn summary_rejects_inverted_time_range() {
        let session = ActiveSession::begin(&workout(), fixed_now());
        let err =
            SessionSummary::from_session(&session, fixed_now() - Duration::seconds(1)).unwrap_err();
        assert_eq!(err, SessionSummaryError::InvalidTimeRange);
    }
}
