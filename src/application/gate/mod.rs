//! Secret-key and credential gate in front of the authoring controls.

pub mod flow;
pub mod limiter;
pub mod storage;

pub use flow::{AuthGate, GateStep, GateView};
pub use limiter::{AttemptLimiter, FailureOutcome, LimitStatus, LimiterError, LimiterKeys, LockoutPolicy};
pub use storage::{ClientStorage, StorageError};
