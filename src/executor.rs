use futures::future::BoxFuture;

#[cfg(feature = "tokio")]
pub mod tokio;
#[cfg(feature = "tokio")]
pub use self::tokio::*;

/// Target execution context for a spawned computation.
///
/// The crate is agnostic to how many contexts a host actually distinguishes;
/// an executor may map both variants to the same pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecContext {
    /// The context driving signal sources and bridge bookkeeping.
    Main,
    /// A worker context for the task's own computation.
    Background,
}

/// The executor capability consumed by this crate.
///
/// Injected explicitly instead of reaching for an ambient global scope; the
/// caller owns its lifecycle.
pub trait Executor: Send + Sync {
    /// Runs `work` to completion on the given context.
    fn spawn(&self, context: ExecContext, work: BoxFuture<'static, ()>);
}
