mod machine;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use machine::{SessionMachine, SessionPhase};
