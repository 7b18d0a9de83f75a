//! Shared error types for the services crate.

use thiserror::Error;

use fitness_core::model::{SessionSummaryError, SetError, WorkoutError, WorkoutId};
use storage::remote::RemoteError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

use crate::sessions::SessionPhase;

/// Errors emitted by `WorkoutRepository`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RepositoryError {
    #[error(transparent)]
    Validation(#[from] WorkoutError),
    #[error("workout {0} not found")]
    NotFound(WorkoutId),
    #[error("exercise {index} not found in workout {workout_id} ({len} exercises)")]
    ExerciseNotFound {
        workout_id: WorkoutId,
        index: usize,
        len: usize,
    },
    #[error("workout {workout_id} belongs to another user")]
    Permission { workout_id: WorkoutId },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RepositoryError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RepositoryError::NotFound(_) | RepositoryError::ExerciseNotFound { .. }
        )
    }
}

/// Errors emitted by the session state machine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("a session is already active for workout {active}")]
    Conflict { active: WorkoutId },
    #[error("operation requires an active session (current phase: {phase:?})")]
    InvalidState { phase: SessionPhase },
    #[error("workout {0} not found")]
    NotFound(WorkoutId),
    #[error(transparent)]
    Validation(#[from] SetError),
    #[error(transparent)]
    Summary(#[from] SessionSummaryError),
    #[error("committing session for workout {workout_id} failed: {source}")]
    CommitFailed {
        workout_id: WorkoutId,
        #[source]
        source: RepositoryError,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Asynchronous sync failure, raised after the local change already landed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SyncError {
    #[error("remote {operation} of workout {workout_id} was rejected: {source}")]
    Rejected {
        workout_id: WorkoutId,
        operation: &'static str,
        #[source]
        source: RemoteError,
    },
}

/// Errors emitted while pulling remote state into the cache.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RefreshError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FitnessServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("invalid remote url {url}: {reason}")]
    InvalidRemoteUrl { url: String, reason: String },
}
