#![forbid(unsafe_code)]

pub mod app_services;
pub mod config;
pub mod error;
mod events;
mod locks;
pub mod notify;
pub mod remote_http;
pub mod sessions;
pub mod sync;
pub mod workouts;

pub use fitness_core::Clock;

pub use app_services::FitnessServices;
pub use config::{RemoteConfig, SyncConfig};
pub use error::{
    FitnessServicesError, RefreshError, RepositoryError, SessionError, SyncError,
};
pub use events::WorkoutObserver;
pub use notify::{Notifier, RecordingNotifier, Severity, TracingNotifier};
pub use remote_http::HttpRemoteStore;
pub use sessions::{SessionMachine, SessionPhase};
pub use sync::{DrainReport, RefreshReport, SyncCoordinator, SyncStatus};
pub use workouts::WorkoutRepository;
