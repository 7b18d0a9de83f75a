use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fitness_core::model::{OwnerId, WorkoutId};
use thiserror::Error;

use crate::record::WorkoutRecord;

/// Failures reported by the remote authoritative store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RemoteError {
    #[error("remote store unreachable: {0}")]
    Unreachable(String),

    #[error("remote store timed out")]
    Timeout,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Whether the same request may succeed later without changes.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RemoteError::Unreachable(_) | RemoteError::Timeout)
    }
}

/// Network-backed document store keyed by owner and workout id.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch every workout the owner has on the remote.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` when the remote cannot be reached or refuses.
    async fn fetch_workouts(&self, owner: &OwnerId) -> Result<Vec<WorkoutRecord>, RemoteError>;

    /// Create or replace a workout. Returns the remote revision, if it assigns one.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` when the remote cannot be reached or refuses.
    async fn put_workout(&self, record: &WorkoutRecord) -> Result<Option<u64>, RemoteError>;

    /// Delete a workout. Deleting a missing workout succeeds.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` when the remote cannot be reached or refuses.
    async fn delete_workout(&self, owner: &OwnerId, id: WorkoutId) -> Result<(), RemoteError>;
}

/// A call observed by [`InMemoryRemoteStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Fetch(OwnerId),
    Put(WorkoutId),
    Delete(WorkoutId),
}

#[derive(Default)]
struct RemoteState {
    records: HashMap<WorkoutId, WorkoutRecord>,
    next_revision: u64,
    unreachable: bool,
    scripted_failures: VecDeque<RemoteError>,
    calls: Vec<RemoteCall>,
}

impl RemoteState {
    fn begin(&mut self, call: RemoteCall) -> Result<(), RemoteError> {
        self.calls.push(call);
        if self.unreachable {
            return Err(RemoteError::Unreachable("offline".into()));
        }
        match self.scripted_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn bump_revision(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }
}

/// In-memory remote for tests and offline prototyping.
///
/// Clones share state, so a test can keep a handle while services own another.
#[derive(Clone, Default)]
pub struct InMemoryRemoteStore {
    state: Arc<Mutex<RemoteState>>,
}

impl InMemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut RemoteState) -> T) -> Result<T, RemoteError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|e| RemoteError::Unreachable(e.to_string()))?;
        Ok(f(&mut guard))
    }

    /// Simulate losing or regaining the network.
    pub fn set_reachable(&self, reachable: bool) {
        let _ = self.with_state(|s| s.unreachable = !reachable);
    }

    /// Make the next call fail with `err` (after reachability is checked).
    pub fn fail_next(&self, err: RemoteError) {
        let _ = self.with_state(|s| s.scripted_failures.push_back(err));
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.with_state(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn clear_calls(&self) {
        let _ = self.with_state(|s| s.calls.clear());
    }

    #[must_use]
    pub fn record(&self, id: WorkoutId) -> Option<WorkoutRecord> {
        self.with_state(|s| s.records.get(&id).cloned()).ok().flatten()
    }

    /// Store a record directly, as another device would. Returns its revision.
    pub fn seed(&self, mut record: WorkoutRecord) -> u64 {
        self.with_state(|s| {
            let revision = s.bump_revision();
            record.revision = Some(revision);
            s.records.insert(record.id, record);
            revision
        })
        .unwrap_or_default()
    }

    /// Drop a record directly, as another device would.
    pub fn remove(&self, id: WorkoutId) {
        let _ = self.with_state(|s| s.records.remove(&id));
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn fetch_workouts(&self, owner: &OwnerId) -> Result<Vec<WorkoutRecord>, RemoteError> {
        self.with_state(|s| {
            s.begin(RemoteCall::Fetch(owner.clone()))?;
            let mut records: Vec<_> = s
                .records
                .values()
                .filter(|r| &r.owner_id == owner)
                .cloned()
                .collect();
            records.sort_by_key(|r| r.created_at);
            Ok(records)
        })?
    }

    async fn put_workout(&self, record: &WorkoutRecord) -> Result<Option<u64>, RemoteError> {
        self.with_state(|s| {
            s.begin(RemoteCall::Put(record.id))?;
            if let Some(existing) = s.records.get(&record.id) {
                if existing.owner_id != record.owner_id {
                    return Err(RemoteError::PermissionDenied(format!(
                        "workout {} belongs to another user",
                        record.id
                    )));
                }
            }
            let revision = s.bump_revision();
            let mut stored = record.clone();
            stored.revision = Some(revision);
            s.records.insert(record.id, stored);
            Ok(Some(revision))
        })?
    }

    async fn delete_workout(&self, owner: &OwnerId, id: WorkoutId) -> Result<(), RemoteError> {
        self.with_state(|s| {
            s.begin(RemoteCall::Delete(id))?;
            if let Some(existing) = s.records.get(&id) {
                if &existing.owner_id != owner {
                    return Err(RemoteError::PermissionDenied(format!(
                        "workout {id} belongs to another user"
                    )));
                }
            }
            s.records.remove(&id);
            Ok(())
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitness_core::model::{Workout, WorkoutDraft};
    use fitness_core::time::fixed_now;

    fn record(owner: &str) -> WorkoutRecord {
        let workout = Workout::create(
            WorkoutId::generate(),
            OwnerId::new(owner),
            WorkoutDraft::new("Cardio"),
            fixed_now(),
        )
        .unwrap();
        WorkoutRecord::from_workout(&workout)
    }

    #[tokio::test]
    async fn put_assigns_increasing_revisions() {
        let remote = InMemoryRemoteStore::new();
        let rec = record("u1");
        assert_eq!(remote.put_workout(&rec).await.unwrap(), Some(1));
        assert_eq!(remote.put_workout(&rec).await.unwrap(), Some(2));
        assert_eq!(remote.record(rec.id).unwrap().revision, Some(2));
    }

    #[tokio::test]
    async fn unreachable_remote_fails_recoverably_and_logs_attempts() {
        let remote = InMemoryRemoteStore::new();
        remote.set_reachable(false);
        let rec = record("u1");
        let err = remote.put_workout(&rec).await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(remote.calls(), vec![RemoteCall::Put(rec.id)]);
        assert!(remote.record(rec.id).is_none());
    }

    #[tokio::test]
    async fn foreign_owner_is_denied() {
        let remote = InMemoryRemoteStore::new();
        let mut rec = record("u1");
        remote.seed(rec.clone());
        rec.owner_id = OwnerId::new("intruder");
        let err = remote.put_workout(&rec).await.unwrap_err();
        assert!(matches!(err, RemoteError::PermissionDenied(_)));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn fetch_only_returns_the_owners_records() {
        let remote = InMemoryRemoteStore::new();
        remote.seed(record("u1"));
        remote.seed(record("u2"));
        let mine = remote.fetch_workouts(&OwnerId::new("u1")).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].owner_id, OwnerId::new("u1"));
    }
}
