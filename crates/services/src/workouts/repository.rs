use std::sync::{Arc, Weak};

use fitness_core::model::{
    Exercise, OwnerId, SessionSummary, Workout, WorkoutDraft, WorkoutError, WorkoutId, WorkoutPatch,
};
use storage::keys::{WORKOUT_PREFIX, history_key, workout_key};
use storage::record::{
    WorkoutRecord, decode_history, decode_workout, encode_history, encode_workout,
};
use storage::repository::LocalCacheStore;
use tracing::{debug, info, warn};

use crate::Clock;
use crate::error::{RefreshError, RepositoryError};
use crate::events::{WorkoutEvents, WorkoutObserver};
use crate::locks::WorkoutLocks;
use crate::sync::{PendingOp, RefreshReport, SyncCoordinator};

/// The only entry point for reading and mutating workouts.
///
/// Every mutation lands in the local cache and is queued for the remote store
/// before the call returns, under the workout's lock so a concurrent refresh
/// sees it as pending. Remote failures never surface here.
#[derive(Clone)]
pub struct WorkoutRepository {
    clock: Clock,
    cache: Arc<dyn LocalCacheStore>,
    sync: Arc<SyncCoordinator>,
    locks: Arc<WorkoutLocks>,
    events: Arc<WorkoutEvents>,
}

impl WorkoutRepository {
    pub(crate) fn new(
        clock: Clock,
        cache: Arc<dyn LocalCacheStore>,
        sync: Arc<SyncCoordinator>,
        locks: Arc<WorkoutLocks>,
        events: Arc<WorkoutEvents>,
    ) -> Self {
        Self {
            clock,
            cache,
            sync,
            locks,
            events,
        }
    }

    /// Cached workouts for `owner`, oldest first.
    ///
    /// Never waits on the network. When called inside a Tokio runtime a
    /// background refresh from the remote store is started as well.
    /// Corrupted records are dropped from the cache and skipped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Storage` if the cache cannot be read.
    pub async fn list(&self, owner: &OwnerId) -> Result<Vec<Workout>, RepositoryError> {
        let mut workouts = Vec::new();
        for key in self.cache.list_keys(WORKOUT_PREFIX).await? {
            let Some(raw) = self.cache.get(&key).await? else {
                continue;
            };
            match decode_workout(&raw) {
                Ok(workout) if workout.owner_id() == owner => workouts.push(workout),
                Ok(_) => {}
                Err(err) => {
                    warn!(%key, %err, "discarding corrupted workout record");
                    if let Err(err) = self.cache.delete(&key).await {
                        warn!(%key, %err, "could not purge corrupted workout record");
                    }
                }
            }
        }
        workouts.sort_by_key(Workout::created_at);

        self.refresh_in_background(owner);
        Ok(workouts)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown id and
    /// `RepositoryError::Storage` if the record cannot be read or decoded.
    pub async fn get(&self, id: WorkoutId) -> Result<Workout, RepositoryError> {
        self.load(id).await
    }

    /// Validate a draft, store it with a fresh id and queue the remote create.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Validation` for an empty name or a malformed
    /// exercise and `RepositoryError::Storage` if the cache write fails.
    pub async fn create(
        &self,
        owner: &OwnerId,
        draft: WorkoutDraft,
    ) -> Result<Workout, RepositoryError> {
        let workout = Workout::create(WorkoutId::generate(), owner.clone(), draft, self.clock.now())?;
        let id = workout.id();
        {
            let _guard = self.locks.acquire(id).await;
            self.store(&workout).await?;
            self.sync
                .enqueue(
                    id,
                    PendingOp::Create {
                        record: WorkoutRecord::from_workout(&workout),
                    },
                )
                .await;
        }
        info!(workout_id = %id, owner = %owner, "created workout");
        Ok(workout)
    }

    /// Merge `patch` onto the cached workout.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Permission` when `patch.owner_id` names a
    /// different owner, `RepositoryError::NotFound` for an unknown id,
    /// `RepositoryError::Validation` for a blank name and
    /// `RepositoryError::Storage` on cache failures.
    pub async fn update(
        &self,
        id: WorkoutId,
        patch: WorkoutPatch,
    ) -> Result<Workout, RepositoryError> {
        let workout = {
            let _guard = self.locks.acquire(id).await;
            let mut workout = self.load(id).await?;
            if let Some(owner) = &patch.owner_id {
                if owner != workout.owner_id() {
                    return Err(RepositoryError::Permission { workout_id: id });
                }
            }
            if patch.is_empty() {
                return Ok(workout);
            }
            workout.apply_patch(patch, self.clock.now())?;
            self.store(&workout).await?;
            self.enqueue_update(&workout).await;
            workout
        };

        debug!(workout_id = %id, progress = workout.progress(), "updated workout");
        Ok(workout)
    }

    /// Remove a workout and its session history, cancel any session running
    /// on it and queue the remote delete.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown id and
    /// `RepositoryError::Storage` on cache failures.
    pub async fn delete(&self, id: WorkoutId) -> Result<(), RepositoryError> {
        {
            let _guard = self.locks.acquire(id).await;
            let key = workout_key(id);
            let raw = self
                .cache
                .get(&key)
                .await?
                .ok_or(RepositoryError::NotFound(id))?;
            // A corrupted record can still be deleted; only the owner is needed.
            let owner = decode_workout(&raw)
                .map(|w| w.owner_id().clone())
                .or_else(|_| WorkoutRecord::from_json(&raw).map(|r| r.owner_id))?;
            // History first; if that fails the workout is untouched.
            self.cache.delete(&history_key(id)).await?;
            self.cache.delete(&key).await?;
            self.sync
                .enqueue(id, PendingOp::Delete { owner_id: owner })
                .await;
        }
        self.locks.forget(id);
        self.events.workout_deleted(id);
        info!(workout_id = %id, "deleted workout");
        Ok(())
    }

    /// Set one exercise's completion flag and re-derive progress.
    ///
    /// Setting a flag to the value it already has changes nothing and queues
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown workout,
    /// `RepositoryError::ExerciseNotFound` for an out-of-range index and
    /// `RepositoryError::Storage` on cache failures.
    pub async fn toggle_exercise_completion(
        &self,
        id: WorkoutId,
        exercise_index: usize,
        completed: bool,
    ) -> Result<Workout, RepositoryError> {
        let workout = {
            let _guard = self.locks.acquire(id).await;
            let mut workout = self.load(id).await?;
            let changed = workout
                .set_exercise_completed(exercise_index, completed, self.clock.now())
                .map_err(|err| match err {
                    WorkoutError::ExerciseIndexOutOfRange { index, len } => {
                        RepositoryError::ExerciseNotFound {
                            workout_id: id,
                            index,
                            len,
                        }
                    }
                    other => RepositoryError::Validation(other),
                })?;
            if !changed {
                return Ok(workout);
            }
            self.store(&workout).await?;
            self.enqueue_update(&workout).await;
            workout
        };

        debug!(
            workout_id = %id,
            exercise_index,
            completed,
            progress = workout.progress(),
            "toggled exercise"
        );
        Ok(workout)
    }

    /// Write a finished session's completion flags onto the current workout.
    ///
    /// Only the flags change. Edits made to the workout while the session ran
    /// are kept, see [`Workout::apply_completion`].
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the workout is gone and
    /// `RepositoryError::Storage` on cache failures.
    pub(crate) async fn commit_session(
        &self,
        id: WorkoutId,
        outcome: &[Exercise],
    ) -> Result<Workout, RepositoryError> {
        let _guard = self.locks.acquire(id).await;
        let mut workout = self.load(id).await?;
        let matched = workout.apply_completion(outcome, self.clock.now());
        if matched < outcome.len() || matched < workout.exercises().len() {
            debug!(workout_id = %id, matched, "workout changed during session");
        }
        self.store(&workout).await?;
        self.enqueue_update(&workout).await;
        Ok(workout)
    }

    /// Pull the owner's workouts from the remote store now.
    ///
    /// # Errors
    ///
    /// Returns `RefreshError` if the remote or the cache fails.
    pub async fn refresh(&self, owner: &OwnerId) -> Result<RefreshReport, RefreshError> {
        self.sync.refresh(owner).await
    }

    /// Summaries of every committed session for the workout, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Storage` if the history cannot be read or decoded.
    pub async fn session_history(
        &self,
        id: WorkoutId,
    ) -> Result<Vec<SessionSummary>, RepositoryError> {
        match self.cache.get(&history_key(id)).await? {
            Some(raw) => Ok(decode_history(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    pub(crate) async fn record_session(
        &self,
        summary: &SessionSummary,
    ) -> Result<(), RepositoryError> {
        let id = summary.workout_id();
        let _guard = self.locks.acquire(id).await;
        if self.cache.get(&workout_key(id)).await?.is_none() {
            return Err(RepositoryError::NotFound(id));
        }
        let mut history = self.session_history(id).await?;
        history.push(summary.clone());
        self.cache.set(&history_key(id), &encode_history(&history)?).await?;
        Ok(())
    }

    /// Register for deletion events. Dropping the observer unsubscribes it.
    pub fn subscribe(&self, observer: Weak<dyn WorkoutObserver>) {
        self.events.subscribe(observer);
    }

    #[must_use]
    pub fn sync(&self) -> &Arc<SyncCoordinator> {
        &self.sync
    }

    async fn load(&self, id: WorkoutId) -> Result<Workout, RepositoryError> {
        let raw = self
            .cache
            .get(&workout_key(id))
            .await?
            .ok_or(RepositoryError::NotFound(id))?;
        Ok(decode_workout(&raw)?)
    }

    async fn store(&self, workout: &Workout) -> Result<(), RepositoryError> {
        self.cache
            .set(&workout_key(workout.id()), &encode_workout(workout)?)
            .await?;
        Ok(())
    }

    async fn enqueue_update(&self, workout: &Workout) {
        self.sync
            .enqueue(
                workout.id(),
                PendingOp::Update {
                    record: WorkoutRecord::from_workout(workout),
                },
            )
            .await;
    }

    fn refresh_in_background(&self, owner: &OwnerId) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let sync = Arc::clone(&self.sync);
        let owner = owner.clone();
        handle.spawn(async move {
            if let Err(err) = sync.refresh(&owner).await {
                debug!(owner = %owner, %err, "background refresh failed");
            }
        });
    }
}
