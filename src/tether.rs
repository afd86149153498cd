use std::future::Future;
use std::sync::Arc;

use crate::awaiter::{AwaitUntil, SignalFired};
use crate::bridge::race;
use crate::executor::{ExecContext, Executor};
use crate::signal::SignalSource;
use crate::subscription::Subscription;
use crate::task::{self, Outcome, TaskHandle};
use crate::{default_failure_handler, FailureHandler};

/// Entry point for binding tasks to termination signals.
///
/// Holds the injected executor and failure handler so call sites don't thread
/// them through every binding. Cloning is cheap and shares both.
#[derive(Clone)]
pub struct Tether {
    executor: Arc<dyn Executor>,
    failure_handler: FailureHandler,
}

impl Tether {
    /// Creates a tether with the default failure handler, which logs through
    /// `tracing`.
    pub fn new(executor: Arc<dyn Executor>) -> Tether {
        Tether {
            executor,
            failure_handler: default_failure_handler(),
        }
    }

    /// Replaces the failure handler. It receives task failures with no other
    /// observer and panics raised during subscription teardown.
    pub fn with_failure_handler(mut self, handler: FailureHandler) -> Tether {
        self.failure_handler = handler;
        self
    }

    /// The fire-and-forget shape: starts `work` on the main context and
    /// cancels it silently if `source` fires first.
    ///
    /// Nothing is ever thrown into the invoking context; failures of `work`
    /// are reported to the failure handler. The returned handle can still be
    /// cancelled or observed explicitly.
    pub fn launch_until<T, F>(&self, source: &dyn SignalSource, work: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.launch_until_on(ExecContext::Main, source, work)
    }

    /// Same as [`launch_until`], with an explicit execution context.
    ///
    /// [`launch_until`]: Tether::launch_until
    pub fn launch_until_on<T, F>(
        &self,
        context: ExecContext,
        source: &dyn SignalSource,
        work: F,
    ) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = task::start(&*self.executor, context, self.failure_handler.clone(), work);

        // no caller awaits this shape; failures route to the handler
        let handler = self.failure_handler.clone();
        handle.on_completion(move |outcome| {
            if let Outcome::Failed(failure) = outcome {
                handler(failure);
            }
        });

        let subscription = Subscription::bind(source, self.failure_handler.clone());
        race(&handle, &subscription);

        handle
    }

    /// The value-returning shape: starts `work` and resolves with its value,
    /// failing with [`TetherError::TerminatedBySignal`] if `source` fires
    /// first. Dropping the returned future cancels the task and disposes the
    /// registration.
    ///
    /// [`TetherError::TerminatedBySignal`]: crate::TetherError::TerminatedBySignal
    pub fn await_until<T, F>(&self, source: &dyn SignalSource, work: F) -> AwaitUntil<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = task::start(
            &*self.executor,
            ExecContext::Main,
            self.failure_handler.clone(),
            work,
        );

        self.await_task_until(source, handle)
    }

    /// Awaits an already-started task's value under a signal binding.
    pub fn await_task_until<T>(
        &self,
        source: &dyn SignalSource,
        task: TaskHandle<T>,
    ) -> AwaitUntil<T> {
        let subscription = Subscription::bind(source, self.failure_handler.clone());

        AwaitUntil::new(task, subscription)
    }

    /// The boolean convenience variant: suspends until `source` fires, with
    /// no wrapped task. Same disposal rules as [`await_until`] minus the
    /// cancellation cascade.
    ///
    /// [`await_until`]: Tether::await_until
    pub fn await_signal_only(&self, source: &dyn SignalSource) -> SignalFired {
        SignalFired::new(Subscription::bind(source, self.failure_handler.clone()))
    }
}
