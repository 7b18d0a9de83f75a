use std::sync::Arc;

use storage::remote::{InMemoryRemoteStore, RemoteStore};
use storage::repository::{InMemoryCacheStore, LocalCacheStore};
use storage::sqlite::SqliteCacheStore;
use tokio::task::JoinHandle;

use crate::Clock;
use crate::config::SyncConfig;
use crate::error::FitnessServicesError;
use crate::events::WorkoutEvents;
use crate::locks::WorkoutLocks;
use crate::notify::Notifier;
use crate::sessions::SessionMachine;
use crate::sync::SyncCoordinator;
use crate::workouts::WorkoutRepository;

/// Wires the cache, the remote, the sync queue, the repository and the
/// session machine together.
#[derive(Clone)]
pub struct FitnessServices {
    workouts: WorkoutRepository,
    sessions: Arc<SessionMachine>,
    sync: Arc<SyncCoordinator>,
}

impl FitnessServices {
    /// Build services over the given stores, restoring any persisted sync queue.
    pub async fn with_stores(
        cache: Arc<dyn LocalCacheStore>,
        remote: Arc<dyn RemoteStore>,
        notifier: Arc<dyn Notifier>,
        clock: Clock,
        config: SyncConfig,
    ) -> Self {
        let locks = Arc::new(WorkoutLocks::new());
        let events = Arc::new(WorkoutEvents::new());
        let sync = Arc::new(
            SyncCoordinator::load(
                Arc::clone(&cache),
                remote,
                Arc::clone(&notifier),
                config,
                Arc::clone(&locks),
                Arc::clone(&events),
            )
            .await,
        );
        let workouts = WorkoutRepository::new(clock.clone(), cache, Arc::clone(&sync), locks, events);
        let sessions = SessionMachine::new(clock, workouts.clone(), notifier);

        Self {
            workouts,
            sessions,
            sync,
        }
    }

    /// Build services with an in-memory cache and remote, for tests and prototyping.
    pub async fn in_memory(notifier: Arc<dyn Notifier>, clock: Clock) -> Self {
        Self::with_stores(
            Arc::new(InMemoryCacheStore::new()),
            Arc::new(InMemoryRemoteStore::new()),
            notifier,
            clock,
            SyncConfig::default(),
        )
        .await
    }

    /// Build services backed by a `SQLite` cache.
    ///
    /// # Errors
    ///
    /// Returns `FitnessServicesError::Sqlite` if the database cannot be opened or migrated.
    pub async fn new_sqlite(
        db_url: &str,
        remote: Arc<dyn RemoteStore>,
        notifier: Arc<dyn Notifier>,
        clock: Clock,
        config: SyncConfig,
    ) -> Result<Self, FitnessServicesError> {
        let cache = SqliteCacheStore::open(db_url).await?;
        Ok(Self::with_stores(Arc::new(cache), remote, notifier, clock, config).await)
    }

    #[must_use]
    pub fn workouts(&self) -> &WorkoutRepository {
        &self.workouts
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<SessionMachine> {
        Arc::clone(&self.sessions)
    }

    #[must_use]
    pub fn sync(&self) -> Arc<SyncCoordinator> {
        Arc::clone(&self.sync)
    }

    /// Start the background sync loop on the current runtime.
    #[must_use]
    pub fn spawn_sync(&self) -> JoinHandle<()> {
        self.sync.spawn()
    }
}
