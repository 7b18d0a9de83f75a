mod backoff;
mod coordinator;
mod queue;

pub use backoff::{backoff_delay, with_jitter};
pub use coordinator::{DrainReport, RefreshReport, SyncCoordinator, SyncStatus};
pub use queue::{Enqueued, PendingEntry, PendingOp, PendingQueue};
