//! Binds the lifetime of an asynchronous task to an external, one-shot
//! termination signal.
//!
//! When the signal fires before the task finishes, the task is cancelled
//! automatically and exactly once. When the task finishes first, the signal
//! registration is torn down so no callback is left dangling. The caller picks
//! one of two shapes:
//!
//! - [`Tether::launch_until`] is fire-and-forget: a signal win is a silent
//!   cancellation, and task failures go to the injected failure handler.
//! - [`Tether::await_until`] is value-returning: a signal win surfaces as
//!   [`TetherError::TerminatedBySignal`], and dropping the returned future
//!   (the caller's own cancellation) cascades downward to the task.
//!
//! ```no_run
//! use std::sync::Arc;
//! use task_tether::{ManualSignal, Tether, TokioExecutor};
//!
//! # async fn doc() {
//! let signal = ManualSignal::new();
//! let tether = Tether::new(Arc::new(TokioExecutor));
//!
//! // cancelled automatically when `signal.fire()` is called
//! let handle = tether.launch_until(&signal, async {
//!     // long-running work
//! });
//! # drop(handle);
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

pub mod awaiter;
pub mod bridge;
pub mod executor;
pub mod signal;
pub mod subscription;
pub mod task;
pub mod tether;

/// A failure captured from a task's work future.
///
/// The work future failing means it panicked; the payload is caught and
/// carried here instead of unwinding into an unrelated context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    message: String,
}

impl TaskFailure {
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "task panicked".to_string()
        };

        TaskFailure { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "task failed: {}", self.message)
    }
}

impl std::error::Error for TaskFailure {}

/// Error returned by the value-returning shape ([`Tether::await_until`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TetherError {
    /// The termination signal fired before the task produced a value.
    TerminatedBySignal,
    /// The task was cancelled through its handle before producing a value.
    Canceled,
    /// The task's work future failed.
    Failed(TaskFailure),
}

impl fmt::Display for TetherError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TetherError::TerminatedBySignal => write!(f, "terminated by signal"),
            TetherError::Canceled => write!(f, "task is canceled"),
            TetherError::Failed(failure) => failure.fmt(f),
        }
    }
}

impl std::error::Error for TetherError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TetherError::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Handler for failures that have no caller left to observe them: task
/// failures in the fire-and-forget shape and panics raised while tearing down
/// a subscription or running a completion callback.
///
/// The handler must not panic itself.
pub type FailureHandler = Arc<dyn Fn(&TaskFailure) + Send + Sync>;

pub(crate) fn default_failure_handler() -> FailureHandler {
    Arc::new(|failure: &TaskFailure| {
        tracing::error!(error = %failure, "unobserved task failure");
    })
}

pub use awaiter::{AwaitUntil, SignalFired};
pub use bridge::race;
#[cfg(feature = "tokio")]
pub use executor::TokioExecutor;
pub use executor::{ExecContext, Executor};
pub use signal::{ManualSignal, OneShotListener, SignalSource, SubscriptionGuard};
pub use subscription::Subscription;
pub use task::{start, Outcome, TaskHandle};
pub use tether::Tether;
