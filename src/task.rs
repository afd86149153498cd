use futures::future::{self, Either, FutureExt};
use futures::pin_mut;
use futures_intrusive::channel::shared::{oneshot_channel, OneshotSender};
use parking_lot::Mutex;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use crate::executor::{ExecContext, Executor};
use crate::{FailureHandler, TaskFailure};

/// Terminal outcome of a started task. Each task reaches exactly one.
#[derive(Debug)]
pub enum Outcome<T> {
    Completed(T),
    Failed(TaskFailure),
    Canceled,
}

type CompletionCallback<T> = Box<dyn FnOnce(&Outcome<T>) + Send>;

enum TaskState<T> {
    Running {
        callbacks: Vec<CompletionCallback<T>>,
        join_waker: Option<Waker>,
    },
    // completion callbacks are being invoked outside the lock; callbacks
    // registered meanwhile land here and are drained before finalizing
    Notifying {
        callbacks: Vec<CompletionCallback<T>>,
        join_waker: Option<Waker>,
    },
    // the outcome is taken exactly once, by `JoinOutcome`
    Finished(Option<Outcome<T>>),
}

struct TaskInner<T> {
    state: Mutex<TaskState<T>>,
    cancel_requested: AtomicBool,
    cancel_tx: Mutex<Option<OneshotSender<()>>>,
    failure_handler: FailureHandler,
}

/// Handle to a running task.
///
/// Cloning the handle does not clone the task; all clones observe the same
/// single terminal outcome.
pub struct TaskHandle<T> {
    inner: Arc<TaskInner<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        TaskHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Starts `work` on the given executor and returns a handle to it.
///
/// The work future is raced against the handle's cancellation request; a
/// cancellation win drops the work in progress and the task finishes with
/// [`Outcome::Canceled`]. A panic from `work` is caught and becomes
/// [`Outcome::Failed`]; it never unwinds into an unrelated context.
pub fn start<T, F>(
    executor: &dyn Executor,
    context: ExecContext,
    failure_handler: FailureHandler,
    work: F,
) -> TaskHandle<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let (cancel_tx, cancel_rx) = oneshot_channel();
    let inner = Arc::new(TaskInner {
        state: Mutex::new(TaskState::Running {
            callbacks: Vec::new(),
            join_waker: None,
        }),
        cancel_requested: AtomicBool::new(false),
        cancel_tx: Mutex::new(Some(cancel_tx)),
        failure_handler,
    });

    let body = {
        let inner = Arc::clone(&inner);

        async move {
            let work = AssertUnwindSafe(work).catch_unwind();
            pin_mut!(work);
            let canceled = cancel_rx.receive();
            pin_mut!(canceled);

            let outcome = match future::select(canceled, work).await {
                Either::Left(..) => Outcome::Canceled,
                Either::Right((Ok(value), _)) => Outcome::Completed(value),
                Either::Right((Err(payload), _)) => {
                    Outcome::Failed(TaskFailure::from_panic(payload))
                }
            };

            finish(&inner, outcome);
        }
    };
    executor.spawn(context, body.boxed());

    TaskHandle { inner }
}

fn finish<T>(inner: &TaskInner<T>, outcome: Outcome<T>) {
    let callbacks = {
        let mut state = inner.state.lock();
        let (callbacks, join_waker) = match &mut *state {
            TaskState::Running {
                callbacks,
                join_waker,
            } => (std::mem::take(callbacks), join_waker.take()),
            _ => unreachable!("task finished twice"),
        };
        *state = TaskState::Notifying {
            callbacks: Vec::new(),
            join_waker,
        };
        callbacks
    };

    notify_and_finalize(inner, outcome, callbacks);
}

// Runs completion callbacks with the state lock released, so a callback is
// free to inspect or join the handle it belongs to. Loops until no callback
// registered itself during an unlocked window, then stores the outcome and
// wakes the joiner.
fn notify_and_finalize<T>(
    inner: &TaskInner<T>,
    outcome: Outcome<T>,
    mut pending: Vec<CompletionCallback<T>>,
) {
    loop {
        for callback in pending {
            invoke_callback(inner, callback, &outcome);
        }

        let mut state = inner.state.lock();
        match &mut *state {
            TaskState::Notifying {
                callbacks,
                join_waker,
            } => {
                if callbacks.is_empty() {
                    let waker = join_waker.take();
                    *state = TaskState::Finished(Some(outcome));
                    drop(state);

                    if let Some(waker) = waker {
                        waker.wake();
                    }
                    return;
                }
                pending = std::mem::take(callbacks);
            }
            _ => unreachable!("task notification interrupted"),
        }
    }
}

// a panicking callback must not take down the task body
fn invoke_callback<T>(
    inner: &TaskInner<T>,
    callback: CompletionCallback<T>,
    outcome: &Outcome<T>,
) {
    if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| callback(outcome))) {
        (inner.failure_handler)(&TaskFailure::from_panic(payload));
    }
}

impl<T> TaskHandle<T> {
    /// Requests cooperative cancellation of the task.
    ///
    /// Idempotent; requesting cancellation after the task reached a terminal
    /// state is a no-op.
    pub fn cancel(&self) {
        if self.inner.cancel_requested.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(tx) = self.inner.cancel_tx.lock().take() {
            // delivery fails only if the body already finished
            let _ = tx.send(());
        }
    }

    /// Whether cancellation has been requested (not whether the task has
    /// already stopped).
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel_requested.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        !matches!(*self.inner.state.lock(), TaskState::Running { .. })
    }

    /// Registers a callback invoked exactly once with the terminal outcome.
    ///
    /// If the task is already terminal, the callback runs synchronously on the
    /// calling context. Callbacks run with no internal lock held, so they may
    /// freely inspect, join, or re-register on the same handle.
    pub fn on_completion<F>(&self, callback: F)
    where
        F: FnOnce(&Outcome<T>) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        match &mut *state {
            TaskState::Running { callbacks, .. }
            | TaskState::Notifying { callbacks, .. } => callbacks.push(Box::new(callback)),
            TaskState::Finished(outcome) => match outcome.take() {
                Some(outcome) => {
                    *state = TaskState::Notifying {
                        callbacks: Vec::new(),
                        join_waker: None,
                    };
                    drop(state);
                    notify_and_finalize(&self.inner, outcome, vec![Box::new(callback)]);
                }
                // the outcome was already consumed by a joiner; nothing to report
                None => {}
            },
        }
    }

    /// A future resolving to the task's terminal outcome.
    ///
    /// The outcome is consumed by whichever join resolves it; a second join
    /// polled after that panics.
    pub fn join(&self) -> JoinOutcome<T> {
        JoinOutcome {
            handle: self.clone(),
        }
    }

    pub(crate) fn poll_outcome(&self, cx: &mut Context<'_>) -> Poll<Outcome<T>> {
        let mut state = self.inner.state.lock();
        match &mut *state {
            TaskState::Running { join_waker, .. }
            | TaskState::Notifying { join_waker, .. } => {
                *join_waker = Some(cx.waker().clone());
                Poll::Pending
            }
            TaskState::Finished(outcome) => match outcome.take() {
                Some(outcome) => Poll::Ready(outcome),
                None => panic!("task outcome already consumed"),
            },
        }
    }
}

/// Future for [`TaskHandle::join`].
#[must_use = "futures do nothing unless polled"]
pub struct JoinOutcome<T> {
    handle: TaskHandle<T>,
}

impl<T> Unpin for JoinOutcome<T> {}

impl<T> Future for JoinOutcome<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        self.handle.poll_outcome(cx)
    }
}
