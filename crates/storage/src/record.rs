use chrono::{DateTime, Utc};
use fitness_core::model::{
    Exercise, OwnerId, Reps, SessionSummary, SessionSummaryError, Workout, WorkoutError, WorkoutId,
};
use serde::{Deserialize, Serialize};

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Persisted exercise shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseRecord {
    pub name: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub equipment: String,
    pub sets: u32,
    pub reps: Reps,
    #[serde(default)]
    pub rest: u32,
    #[serde(default)]
    pub completed: bool,
}

/// Persisted workout shape, shared by the local cache and the remote store.
///
/// This mirrors the domain `Workout` so adapters can serialize/deserialize
/// without leaking storage concerns into the domain layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutRecord {
    pub id: WorkoutId,
    pub owner_id: OwnerId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub exercises: Vec<ExerciseRecord>,
    pub progress: u8,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
}

impl WorkoutRecord {
    #[must_use]
    pub fn from_workout(workout: &Workout) -> Self {
        Self {
            id: workout.id(),
            owner_id: workout.owner_id().clone(),
            name: workout.name().to_owned(),
            description: workout.description().to_owned(),
            created_at: workout.created_at(),
            exercises: workout
                .exercises()
                .iter()
                .map(|e| ExerciseRecord {
                    name: e.name().to_owned(),
                    target: e.target().to_owned(),
                    equipment: e.equipment().to_owned(),
                    sets: e.sets(),
                    reps: e.reps().clone(),
                    rest: e.rest_seconds(),
                    completed: e.is_completed(),
                })
                .collect(),
            progress: workout.progress(),
            completed_at: workout.completed_at(),
            revision: workout.revision(),
        }
    }

    /// Convert the record back into a domain `Workout`.
    ///
    /// # Errors
    ///
    /// Returns `WorkoutError` if any exercise is invalid or the derived fields
    /// disagree with the completion flags.
    pub fn into_workout(self) -> Result<Workout, WorkoutError> {
        let exercises = self
            .exercises
            .into_iter()
            .enumerate()
            .map(|(index, e)| {
                Exercise::from_persisted(
                    e.name,
                    e.target,
                    e.equipment,
                    e.sets,
                    e.reps,
                    e.rest,
                    e.completed,
                )
                .map_err(|source| WorkoutError::InvalidExercise { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Workout::from_persisted(
            self.id,
            self.owner_id,
            self.name,
            self.description,
            self.created_at,
            exercises,
            self.progress,
            self.completed_at,
            self.revision,
        )
    }

    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(ser)
    }

    /// # Errors
    ///
    /// Returns `StorageError::Serialization` for malformed JSON.
    pub fn from_json(raw: &str) -> Result<Self, StorageError> {
        serde_json::from_str(raw).map_err(ser)
    }
}

/// Decode a cached workout, treating any structural or invariant failure as corruption.
///
/// # Errors
///
/// Returns `StorageError::Serialization` describing why the record is unusable.
pub fn decode_workout(raw: &str) -> Result<Workout, StorageError> {
    WorkoutRecord::from_json(raw)?.into_workout().map_err(ser)
}

/// # Errors
///
/// Returns `StorageError::Serialization` if encoding fails.
pub fn encode_workout(workout: &Workout) -> Result<String, StorageError> {
    WorkoutRecord::from_workout(workout).to_json()
}

/// Persisted shape of one committed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummaryRecord {
    pub workout_id: WorkoutId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub total_volume: f64,
    pub total_sets: u32,
    pub completed_exercises: u32,
    pub exercise_count: u32,
    pub progress: u8,
}

impl SessionSummaryRecord {
    #[must_use]
    pub fn from_summary(summary: &SessionSummary) -> Self {
        Self {
            workout_id: summary.workout_id(),
            started_at: summary.started_at(),
            ended_at: summary.ended_at(),
            total_volume: summary.total_volume(),
            total_sets: summary.total_sets(),
            completed_exercises: summary.completed_exercises(),
            exercise_count: summary.exercise_count(),
            progress: summary.progress(),
        }
    }

    /// # Errors
    ///
    /// Returns `SessionSummaryError` if the stored values are inconsistent.
    pub fn into_summary(self) -> Result<SessionSummary, SessionSummaryError> {
        SessionSummary::from_persisted(
            self.workout_id,
            self.started_at,
            self.ended_at,
            self.total_volume,
            self.total_sets,
            self.completed_exercises,
            self.exercise_count,
            self.progress,
        )
    }
}

/// # Errors
///
/// Returns `StorageError::Serialization` for malformed history entries.
pub fn decode_history(raw: &str) -> Result<Vec<SessionSummary>, StorageError> {
    let records: Vec<SessionSummaryRecord> = serde_json::from_str(raw).map_err(ser)?;
    records
        .into_iter()
        .map(|r| r.into_summary().map_err(ser))
        .collect()
}

/// # Errors
///
/// Returns `StorageError::Serialization` if encoding fails.
pub fn encode_history(history: &[SessionSummary]) -> Result<String, StorageError> {
    let records: Vec<_> = history.iter().map(SessionSummaryRecord::from_summary).collect();
    serde_json::to_string(&records).map_err(ser)
}
