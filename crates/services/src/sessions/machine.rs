use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::Duration;
use fitness_core::model::{ActiveSession, SessionSummary, SetEntry, Workout, WorkoutId};
use tracing::{info, warn};

use crate::Clock;
use crate::error::{RepositoryError, SessionError};
use crate::events::WorkoutObserver;
use crate::notify::{Notifier, Severity};
use crate::workouts::WorkoutRepository;

/// Observable lifecycle of the session slot.
///
/// A successful commit returns the slot to `Idle`. `Cancelled` marks a session
/// that ended without its results being written, and a new session may start
/// from it exactly as from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Active,
    /// `complete()` is writing results back to the workout.
    Committing,
    Cancelled,
}

enum Slot {
    Idle,
    /// `start()` is loading the workout.
    Starting(WorkoutId),
    Active(ActiveSession),
    Committing(WorkoutId),
    Cancelled,
}

impl Slot {
    fn phase(&self) -> SessionPhase {
        match self {
            Slot::Idle | Slot::Starting(_) => SessionPhase::Idle,
            Slot::Active(_) => SessionPhase::Active,
            Slot::Committing(_) => SessionPhase::Committing,
            Slot::Cancelled => SessionPhase::Cancelled,
        }
    }

    fn workout_id(&self) -> Option<WorkoutId> {
        match self {
            Slot::Starting(id) | Slot::Committing(id) => Some(*id),
            Slot::Active(session) => Some(session.workout_id()),
            Slot::Idle | Slot::Cancelled => None,
        }
    }
}

struct SessionState {
    slot: Slot,
    last_summary: Option<SessionSummary>,
}

/// Owns the single in-progress workout session.
///
/// Only one session exists at a time. The working copy lives here until
/// `complete()` writes its exercise flags back through the repository.
pub struct SessionMachine {
    clock: Clock,
    workouts: WorkoutRepository,
    notifier: Arc<dyn Notifier>,
    state: Mutex<SessionState>,
}

impl SessionMachine {
    /// Build the machine and subscribe it to workout deletions.
    #[must_use]
    pub fn new(clock: Clock, workouts: WorkoutRepository, notifier: Arc<dyn Notifier>) -> Arc<Self> {
        let machine = Arc::new(Self {
            clock,
            workouts,
            notifier,
            state: Mutex::new(SessionState {
                slot: Slot::Idle,
                last_summary: None,
            }),
        });
        let weak: Weak<Self> = Arc::downgrade(&machine);
        let observer: Weak<dyn WorkoutObserver> = weak;
        machine.workouts.subscribe(observer);
        machine
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.state().slot.phase()
    }

    /// Snapshot of the running session, if any.
    #[must_use]
    pub fn active(&self) -> Option<ActiveSession> {
        match &self.state().slot {
            Slot::Active(session) => Some(session.clone()),
            _ => None,
        }
    }

    /// Time since the running session started.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        match &self.state().slot {
            Slot::Active(session) => Some(session.elapsed(self.clock.now())),
            _ => None,
        }
    }

    /// Summary of the most recent successful commit.
    #[must_use]
    pub fn last_summary(&self) -> Option<SessionSummary> {
        self.state().last_summary.clone()
    }

    /// Begin a session on `workout_id` with an empty set list per exercise.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Conflict` while another session is running,
    /// `SessionError::NotFound` for an unknown workout and
    /// `SessionError::Repository` if the workout cannot be loaded.
    pub async fn start(&self, workout_id: WorkoutId) -> Result<ActiveSession, SessionError> {
        {
            let mut state = self.state();
            if let Some(active) = state.slot.workout_id() {
                return Err(SessionError::Conflict { active });
            }
            state.slot = Slot::Starting(workout_id);
        }

        let loaded = self.workouts.get(workout_id).await;

        let mut state = self.state();
        if !matches!(state.slot, Slot::Starting(id) if id == workout_id) {
            // Deleted while loading.
            return Err(SessionError::NotFound(workout_id));
        }
        let workout = match loaded {
            Ok(workout) => workout,
            Err(err) => {
                state.slot = Slot::Idle;
                return Err(match err {
                    RepositoryError::NotFound(id) => SessionError::NotFound(id),
                    other => SessionError::Repository(other),
                });
            }
        };

        let session = ActiveSession::begin(&workout, self.clock.now());
        state.slot = Slot::Active(session.clone());
        info!(%workout_id, exercises = workout.exercises().len(), "session started");
        Ok(session)
    }

    /// Append a completed set to one exercise of the running session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` without a running session and
    /// `SessionError::Validation` for a bad weight or exercise index.
    pub fn record_set(
        &self,
        exercise_index: usize,
        weight: f64,
        reps: u32,
    ) -> Result<(), SessionError> {
        let mut state = self.state();
        let session = active_mut(&mut state.slot)?;
        session.record_set(exercise_index, SetEntry::completed(weight, reps)?)?;
        Ok(())
    }

    /// Undo a recorded set.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` without a running session and
    /// `SessionError::Validation` for an out-of-range index.
    pub fn remove_set(
        &self,
        exercise_index: usize,
        set_index: usize,
    ) -> Result<SetEntry, SessionError> {
        let mut state = self.state();
        let session = active_mut(&mut state.slot)?;
        Ok(session.remove_set(exercise_index, set_index)?)
    }

    /// Discard the running session. The stored workout is untouched.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` without a running session.
    pub fn cancel(&self) -> Result<(), SessionError> {
        let mut state = self.state();
        let workout_id = active_mut(&mut state.slot)?.workout_id();
        state.slot = Slot::Idle;
        info!(%workout_id, "session cancelled");
        Ok(())
    }

    /// Write the session's exercise results back to the workout.
    ///
    /// An exercise counts as done when one of its sets reaches the prescribed
    /// rep target. Only completion flags are written, so edits made to the
    /// workout while the session ran survive. On success the summary is
    /// appended to the workout's history and the slot returns to `Idle`.
    /// If the write fails the session ends up `Cancelled` and the failure is
    /// both notified and returned.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` without a running session,
    /// `SessionError::Summary` if the clock reads earlier than the start and
    /// `SessionError::CommitFailed` if the workout update fails.
    pub async fn complete(&self) -> Result<SessionSummary, SessionError> {
        let (session, summary) = {
            let mut state = self.state();
            let session = active_mut(&mut state.slot)?;
            let now = self.clock.now();
            let summary = SessionSummary::from_session(session, now)?;
            let mut session = session.clone();
            session.finish(now);
            state.slot = Slot::Committing(session.workout_id());
            (session, summary)
        };
        let workout_id = session.workout_id();

        let committed = self
            .workouts
            .commit_session(workout_id, &session.completed_exercises())
            .await;

        let workout = match committed {
            Ok(workout) => workout,
            Err(source) => {
                self.state().slot = Slot::Cancelled;
                let err = SessionError::CommitFailed { workout_id, source };
                warn!(%err, "session commit failed");
                self.notifier.notify(&err.to_string(), Severity::Error);
                return Err(err);
            }
        };
        let summary = summary_for(&summary, &workout).unwrap_or(summary);

        if let Err(err) = self.workouts.record_session(&summary).await {
            warn!(%workout_id, %err, "could not store session summary");
        }

        let mut state = self.state();
        if matches!(state.slot, Slot::Committing(id) if id == workout_id) {
            state.slot = Slot::Idle;
        }
        state.last_summary = Some(summary.clone());
        info!(
            %workout_id,
            progress = summary.progress(),
            sets = summary.total_sets(),
            volume = summary.total_volume(),
            "session committed"
        );
        Ok(summary)
    }
}

/// Restate `summary` against the workout as stored after the commit.
fn summary_for(summary: &SessionSummary, workout: &Workout) -> Option<SessionSummary> {
    let exercises = workout.exercises();
    let completed = exercises.iter().filter(|e| e.is_completed()).count();
    SessionSummary::from_persisted(
        summary.workout_id(),
        summary.started_at(),
        summary.ended_at(),
        summary.total_volume(),
        summary.total_sets(),
        u32::try_from(completed).ok()?,
        u32::try_from(exercises.len()).ok()?,
        workout.progress(),
    )
    .ok()
}

fn active_mut(slot: &mut Slot) -> Result<&mut ActiveSession, SessionError> {
    match slot {
        Slot::Active(session) => Ok(session),
        other => Err(SessionError::InvalidState {
            phase: other.phase(),
        }),
    }
}

impl WorkoutObserver for SessionMachine {
    fn workout_deleted(&self, id: WorkoutId) {
        let mut state = self.state();
        if state.slot.workout_id() == Some(id) {
            state.slot = Slot::Cancelled;
            info!(workout_id = %id, "session cancelled, workout deleted");
        }
    }
}
