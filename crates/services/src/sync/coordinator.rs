use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use fitness_core::model::{OwnerId, WorkoutId};
use storage::keys::{SYNC_QUEUE_KEY, WORKOUT_PREFIX, history_key, workout_id_from_key, workout_key};
use storage::record::{WorkoutRecord, decode_workout, encode_workout};
use storage::remote::{RemoteError, RemoteStore};
use storage::repository::{LocalCacheStore, StorageError};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backoff::{backoff_delay, with_jitter};
use super::queue::{Enqueued, PendingEntry, PendingOp, PendingQueue};
use crate::config::SyncConfig;
use crate::error::{RefreshError, SyncError};
use crate::events::WorkoutEvents;
use crate::locks::WorkoutLocks;
use crate::notify::{Notifier, Severity};

/// Snapshot of the sync queue for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub pending: usize,
    pub online: bool,
    pub retry_attempt: u32,
    pub last_error: Option<String>,
}

/// Outcome of one pass over the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub synced: usize,
    pub rejected: usize,
    /// Set when the pass stopped on a recoverable failure.
    pub retry_in: Option<Duration>,
}

/// Outcome of pulling an owner's workouts from the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub updated: Vec<WorkoutId>,
    pub removed: Vec<WorkoutId>,
    pub skipped: usize,
}

struct SyncState {
    queue: PendingQueue,
    online: bool,
    attempt: u32,
    last_error: Option<String>,
    /// Bumped whenever an id is queued or leaves the queue.
    generation: u64,
    /// Generation at which each id last changed queue state.
    touched: HashMap<WorkoutId, u64>,
}

impl SyncState {
    fn touch(&mut self, id: WorkoutId) {
        self.generation += 1;
        self.touched.insert(id, self.generation);
    }

    /// True if a local write for `id` is queued or was queued or sent after `since`.
    fn changed_since(&self, id: WorkoutId, since: u64) -> bool {
        self.queue.contains(id) || self.touched.get(&id).is_some_and(|g| *g > since)
    }
}

/// Reconciles the local cache with the remote store.
///
/// Owns the durable queue of pending remote writes. Remote failures never
/// undo a local change: recoverable ones are retried with backoff, the rest
/// are dropped and reported through the notifier.
pub struct SyncCoordinator {
    cache: Arc<dyn LocalCacheStore>,
    remote: Arc<dyn RemoteStore>,
    notifier: Arc<dyn Notifier>,
    config: SyncConfig,
    locks: Arc<WorkoutLocks>,
    events: Arc<WorkoutEvents>,
    state: AsyncMutex<SyncState>,
    draining: AsyncMutex<()>,
    wake: Notify,
}

impl SyncCoordinator {
    /// Restore the queue persisted in the cache. An unreadable queue starts empty.
    pub(crate) async fn load(
        cache: Arc<dyn LocalCacheStore>,
        remote: Arc<dyn RemoteStore>,
        notifier: Arc<dyn Notifier>,
        config: SyncConfig,
        locks: Arc<WorkoutLocks>,
        events: Arc<WorkoutEvents>,
    ) -> Self {
        let queue = match cache.get(SYNC_QUEUE_KEY).await {
            Ok(Some(raw)) => PendingQueue::from_json(&raw).unwrap_or_else(|err| {
                warn!(%err, "discarding unreadable sync queue");
                PendingQueue::new()
            }),
            Ok(None) => PendingQueue::new(),
            Err(err) => {
                warn!(%err, "could not read sync queue, starting empty");
                PendingQueue::new()
            }
        };
        if !queue.is_empty() {
            info!(pending = queue.len(), "restored sync queue");
        }

        Self {
            cache,
            remote,
            notifier,
            config,
            locks,
            events,
            state: AsyncMutex::new(SyncState {
                queue,
                online: true,
                attempt: 0,
                last_error: None,
                generation: 0,
                touched: HashMap::new(),
            }),
            draining: AsyncMutex::new(()),
            wake: Notify::new(),
        }
    }

    /// Queue a remote write, collapsing it with any pending one for the same workout.
    pub async fn enqueue(&self, workout_id: WorkoutId, op: PendingOp) {
        let op_name = op.name();
        {
            let mut state = self.state.lock().await;
            state.touch(workout_id);
            match state.queue.push(workout_id, op) {
                Enqueued::Appended => debug!(%workout_id, op = op_name, "queued remote write"),
                Enqueued::Collapsed { previous } => {
                    debug!(%workout_id, op = op_name, previous, "collapsed pending remote write");
                }
            }
            self.persist(&state.queue).await;
        }
        self.wake.notify_one();
    }

    #[must_use]
    pub async fn status(&self) -> SyncStatus {
        let state = self.state.lock().await;
        SyncStatus {
            pending: state.queue.len(),
            online: state.online,
            retry_attempt: state.attempt,
            last_error: state.last_error.clone(),
        }
    }

    #[must_use]
    pub async fn pending(&self) -> Vec<PendingEntry> {
        self.state.lock().await.queue.iter().cloned().collect()
    }

    #[must_use]
    pub async fn is_pending(&self, workout_id: WorkoutId) -> bool {
        self.state.lock().await.queue.contains(workout_id)
    }

    /// Record a connectivity change. Coming back online drains the queue immediately.
    pub async fn set_online(&self, online: bool) -> Option<DrainReport> {
        let came_online = {
            let mut state = self.state.lock().await;
            let came_online = !state.online && online;
            state.online = online;
            if came_online {
                state.attempt = 0;
            }
            came_online
        };
        if !came_online {
            if !online {
                info!("sync went offline");
            }
            return None;
        }

        info!("sync back online, draining queue");
        self.wake.notify_one();
        Some(self.drain().await)
    }

    /// Send queued writes in order until the queue is empty or a recoverable failure stops the pass.
    pub async fn drain(&self) -> DrainReport {
        let _draining = self.draining.lock().await;
        let mut report = DrainReport::default();

        loop {
            let entry = self.state.lock().await.queue.front().cloned();
            let Some(entry) = entry else { break };

            match self.send(&entry).await {
                Ok(revision) => {
                    self.finish(&entry, None).await;
                    if let Some(revision) = revision {
                        self.store_revision(entry.workout_id, revision).await;
                    }
                    debug!(workout_id = %entry.workout_id, op = entry.op.name(), "remote write landed");
                    report.synced += 1;
                }
                Err(err) if err.is_recoverable() => {
                    let delay = {
                        let mut state = self.state.lock().await;
                        state.attempt = state.attempt.saturating_add(1);
                        state.last_error = Some(err.to_string());
                        with_jitter(backoff_delay(&self.config, state.attempt), self.config.jitter)
                    };
                    warn!(
                        workout_id = %entry.workout_id,
                        op = entry.op.name(),
                        %err,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "remote write deferred"
                    );
                    report.retry_in = Some(delay);
                    break;
                }
                Err(err) => {
                    let failure = SyncError::Rejected {
                        workout_id: entry.workout_id,
                        operation: entry.op.name(),
                        source: err,
                    };
                    error!(%failure, "dropping rejected remote write");
                    self.finish(&entry, Some(failure.to_string())).await;
                    self.notifier.notify(&failure.to_string(), Severity::Error);
                    report.rejected += 1;
                }
            }
        }

        report
    }

    /// Run the background drain loop on the current runtime.
    ///
    /// The task lives until the handle is aborted.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run().await })
    }

    async fn run(&self) {
        loop {
            let report = self.drain().await;
            match report.retry_in {
                Some(delay) => {
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = self.wake.notified() => {}
                    }
                }
                None => self.wake.notified().await,
            }
        }
    }

    /// Pull the owner's workouts and apply them last-write-wins.
    ///
    /// The snapshot may be stale by the time it is applied, so any workout
    /// whose local write was queued or sent after the fetch started keeps the
    /// local copy, and a remote record older than the cached revision is
    /// ignored. Cached workouts that reached the remote before but are gone
    /// now were deleted elsewhere and are removed locally.
    ///
    /// # Errors
    ///
    /// Returns `RefreshError` if the remote fetch or a cache access fails.
    pub async fn refresh(&self, owner: &OwnerId) -> Result<RefreshReport, RefreshError> {
        let since = self.state.lock().await.generation;
        let records = self.remote.fetch_workouts(owner).await?;
        let mut report = RefreshReport::default();
        let mut seen = HashSet::new();

        for record in records {
            if &record.owner_id != owner {
                report.skipped += 1;
                continue;
            }
            let id = record.id;
            seen.insert(id);
            if self.apply_remote(record, since).await? {
                report.updated.push(id);
            }
        }

        for key in self.cache.list_keys(WORKOUT_PREFIX).await? {
            let Some(id) = workout_id_from_key(&key) else {
                continue;
            };
            if seen.contains(&id) {
                continue;
            }
            if self.remove_if_deleted_remotely(owner, id, since).await? {
                report.removed.push(id);
            }
        }

        info!(
            owner = %owner,
            updated = report.updated.len(),
            removed = report.removed.len(),
            skipped = report.skipped,
            "refreshed workouts from remote"
        );
        Ok(report)
    }

    async fn changed_since(&self, id: WorkoutId, since: u64) -> bool {
        self.state.lock().await.changed_since(id, since)
    }

    async fn apply_remote(&self, record: WorkoutRecord, since: u64) -> Result<bool, RefreshError> {
        let id = record.id;
        let workout = match record.into_workout() {
            Ok(workout) => workout,
            Err(err) => {
                warn!(workout_id = %id, %err, "ignoring invalid remote workout");
                return Ok(false);
            }
        };

        let _guard = self.locks.acquire(id).await;
        if self.changed_since(id, since).await {
            return Ok(false);
        }
        let key = workout_key(id);
        let current = self
            .cache
            .get(&key)
            .await?
            .and_then(|raw| decode_workout(&raw).ok());
        if let Some(current) = &current {
            if current == &workout || current.revision() > workout.revision() {
                return Ok(false);
            }
        }
        self.cache.set(&key, &encode_workout(&workout)?).await?;
        Ok(true)
    }

    async fn remove_if_deleted_remotely(
        &self,
        owner: &OwnerId,
        id: WorkoutId,
        since: u64,
    ) -> Result<bool, StorageError> {
        let removed = {
            let _guard = self.locks.acquire(id).await;
            if self.changed_since(id, since).await {
                return Ok(false);
            }
            let key = workout_key(id);
            let Some(raw) = self.cache.get(&key).await? else {
                return Ok(false);
            };
            let Ok(cached) = decode_workout(&raw) else {
                return Ok(false);
            };
            if cached.owner_id() != owner || cached.revision().is_none() {
                return Ok(false);
            }
            self.cache.delete(&key).await?;
            self.cache.delete(&history_key(id)).await?;
            true
        };

        if removed {
            info!(workout_id = %id, "workout deleted on another device");
            self.locks.forget(id);
            self.events.workout_deleted(id);
        }
        Ok(removed)
    }

    async fn send(&self, entry: &PendingEntry) -> Result<Option<u64>, RemoteError> {
        match &entry.op {
            PendingOp::Create { record } | PendingOp::Update { record } => {
                self.remote.put_workout(record).await
            }
            PendingOp::Delete { owner_id } => self
                .remote
                .delete_workout(owner_id, entry.workout_id)
                .await
                .map(|()| None),
        }
    }

    async fn finish(&self, entry: &PendingEntry, error: Option<String>) {
        let mut state = self.state.lock().await;
        state.touch(entry.workout_id);
        if !state.queue.remove(entry.workout_id, entry.seq) {
            debug!(workout_id = %entry.workout_id, "entry replaced while in flight, keeping newer write");
        }
        match error {
            Some(message) => state.last_error = Some(message),
            None => state.attempt = 0,
        }
        self.persist(&state.queue).await;
    }

    async fn store_revision(&self, id: WorkoutId, revision: u64) {
        let _guard = self.locks.acquire(id).await;
        let key = workout_key(id);
        let result: Result<(), StorageError> = async {
            let Some(raw) = self.cache.get(&key).await? else {
                return Ok(());
            };
            let mut workout = decode_workout(&raw)?;
            workout.set_revision(Some(revision));
            self.cache.set(&key, &encode_workout(&workout)?).await
        }
        .await;
        if let Err(err) = result {
            warn!(workout_id = %id, %err, "could not record remote revision");
        }
    }

    async fn persist(&self, queue: &PendingQueue) {
        let result = match queue.to_json() {
            Ok(raw) => self.cache.set(SYNC_QUEUE_KEY, &raw).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            // The in-memory queue still holds the entry; only restart durability is lost.
            warn!(%err, pending = queue.len(), "could not persist sync queue");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitness_core::model::{Workout, WorkoutDraft};
    use fitness_core::time::fixed_now;
    use storage::remote::{InMemoryRemoteStore, RemoteCall};
    use storage::repository::InMemoryCacheStore;

    use crate::notify::RecordingNotifier;

    struct Harness {
        cache: InMemoryCacheStore,
        remote: InMemoryRemoteStore,
        notifier: RecordingNotifier,
        sync: SyncCoordinator,
    }

    async fn harness() -> Harness {
        let cache = InMemoryCacheStore::new();
        let remote = InMemoryRemoteStore::new();
        let notifier = RecordingNotifier::new();
        let sync = SyncCoordinator::load(
            Arc::new(cache.clone()),
            Arc::new(remote.clone()),
            Arc::new(notifier.clone()),
            SyncConfig::default(),
            Arc::new(WorkoutLocks::new()),
            Arc::new(WorkoutEvents::new()),
        )
        .await;
        Harness {
            cache,
            remote,
            notifier,
            sync,
        }
    }

    async fn cached_workout(cache: &InMemoryCacheStore, owner: &str) -> Workout {
        let workout = Workout::create(
            WorkoutId::generate(),
            OwnerId::new(owner),
            WorkoutDraft::new("Legs"),
            fixed_now(),
        )
        .unwrap();
        cache
            .set(&workout_key(workout.id()), &encode_workout(&workout).unwrap())
            .await
            .unwrap();
        workout
    }

    fn create_op(workout: &Workout) -> PendingOp {
        PendingOp::Create {
            record: WorkoutRecord::from_workout(workout),
        }
    }

    #[tokio::test]
    async fn drain_pushes_and_writes_revision_back() {
        let h = harness().await;
        let workout = cached_workout(&h.cache, "u1").await;
        h.sync.enqueue(workout.id(), create_op(&workout)).await;

        let report = h.sync.drain().await;

        assert_eq!(report.synced, 1);
        assert_eq!(h.sync.status().await.pending, 0);
        let raw = h.cache.get(&workout_key(workout.id())).await.unwrap().unwrap();
        assert_eq!(decode_workout(&raw).unwrap().revision(), Some(1));
    }

    #[tokio::test]
    async fn recoverable_failure_keeps_entry_and_backs_off() {
        let h = harness().await;
        let workout = cached_workout(&h.cache, "u1").await;
        h.remote.set_reachable(false);
        h.sync.enqueue(workout.id(), create_op(&workout)).await;

        let first = h.sync.drain().await;
        let second = h.sync.drain().await;

        assert_eq!(first.retry_in, Some(Duration::from_secs(1)));
        assert_eq!(second.retry_in, Some(Duration::from_secs(2)));
        let status = h.sync.status().await;
        assert_eq!(status.pending, 1);
        assert_eq!(status.retry_attempt, 2);
        assert!(status.last_error.is_some());
        assert_eq!(h.notifier.count(Severity::Error), 0);
    }

    #[tokio::test]
    async fn rejected_write_is_dropped_and_reported() {
        let h = harness().await;
        let workout = cached_workout(&h.cache, "u1").await;
        h.remote
            .fail_next(RemoteError::PermissionDenied("denied".into()));
        h.sync.enqueue(workout.id(), create_op(&workout)).await;

        let report = h.sync.drain().await;

        assert_eq!(report.rejected, 1);
        assert_eq!(h.sync.status().await.pending, 0);
        assert_eq!(h.notifier.count(Severity::Error), 1);
        assert!(h.cache.get(&workout_key(workout.id())).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn coming_online_drains_immediately() {
        let h = harness().await;
        let workout = cached_workout(&h.cache, "u1").await;
        h.remote.set_reachable(false);
        assert!(h.sync.set_online(false).await.is_none());
        h.sync.enqueue(workout.id(), create_op(&workout)).await;
        let _ = h.sync.drain().await;

        h.remote.set_reachable(true);
        let report = h.sync.set_online(true).await.unwrap();

        assert_eq!(report.synced, 1);
        let status = h.sync.status().await;
        assert!(status.online);
        assert_eq!(status.retry_attempt, 0);
        assert!(h.remote.record(workout.id()).is_some());
    }

    #[tokio::test]
    async fn queue_survives_reload() {
        let h = harness().await;
        let workout = cached_workout(&h.cache, "u1").await;
        h.sync.enqueue(workout.id(), create_op(&workout)).await;

        let reloaded = SyncCoordinator::load(
            Arc::new(h.cache.clone()),
            Arc::new(h.remote.clone()),
            Arc::new(h.notifier.clone()),
            SyncConfig::default(),
            Arc::new(WorkoutLocks::new()),
            Arc::new(WorkoutEvents::new()),
        )
        .await;

        assert!(reloaded.is_pending(workout.id()).await);
        assert_eq!(reloaded.drain().await.synced, 1);
        assert_eq!(h.remote.calls(), vec![RemoteCall::Put(workout.id())]);
    }

    #[tokio::test]
    async fn refresh_keeps_pending_local_copy() {
        let h = harness().await;
        let workout = cached_workout(&h.cache, "u1").await;
        let mut remote_copy = WorkoutRecord::from_workout(&workout);
        remote_copy.name = "Renamed elsewhere".into();
        h.remote.seed(remote_copy);
        h.sync.enqueue(workout.id(), create_op(&workout)).await;

        let report = h.sync.refresh(&OwnerId::new("u1")).await.unwrap();

        assert!(report.updated.is_empty());
        let raw = h.cache.get(&workout_key(workout.id())).await.unwrap().unwrap();
        assert_eq!(decode_workout(&raw).unwrap().name(), "Legs");
    }

    #[tokio::test]
    async fn refresh_ignores_remote_record_older_than_cache() {
        let h = harness().await;
        let mut workout = cached_workout(&h.cache, "u1").await;
        workout.set_revision(Some(5));
        h.cache
            .set(&workout_key(workout.id()), &encode_workout(&workout).unwrap())
            .await
            .unwrap();
        let mut stale = WorkoutRecord::from_workout(&workout);
        stale.name = "Old name".into();
        assert_eq!(h.remote.seed(stale), 1);

        let report = h.sync.refresh(&OwnerId::new("u1")).await.unwrap();

        assert!(report.updated.is_empty());
        let raw = h.cache.get(&workout_key(workout.id())).await.unwrap().unwrap();
        assert_eq!(decode_workout(&raw).unwrap().revision(), Some(5));
    }
}
