use futures::future::BoxFuture;

use super::{ExecContext, Executor};

/// Executor backed by the ambient Tokio runtime.
///
/// Tokio schedules all tasks on one pool, so both contexts map to
/// `tokio::spawn`. Available when the `"tokio"` feature is enabled.
///
/// # Panics
/// Spawning panics when called outside of a Tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioExecutor;

impl Executor for TokioExecutor {
    fn spawn(&self, _context: ExecContext, work: BoxFuture<'static, ()>) {
        tokio::spawn(work);
    }
}
