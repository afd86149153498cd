use futures::future::{Fuse, FutureExt};
use pin_project::{pin_project, pinned_drop};

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::subscription::{FiredFuture, Subscription};
use crate::task::{Outcome, TaskHandle};
use crate::TetherError;

/// Future for [`Tether::await_until`].
///
/// Resolves with the first of: the task's value, the task's failure, or the
/// termination signal. A signal win also cancels the task (cascading
/// cancellation). Dropping this future before it resolves is the caller's own
/// cancellation: the task is cancelled and the subscription disposed before
/// the drop returns, so no registration is leaked on any exit path.
///
/// [`Tether::await_until`]: crate::Tether::await_until
#[must_use = "futures do nothing unless polled"]
#[pin_project(PinnedDrop)]
pub struct AwaitUntil<T> {
    task: TaskHandle<T>,
    subscription: Subscription,
    #[pin]
    fired: Fuse<FiredFuture>,
    done: bool,
}

impl<T> AwaitUntil<T> {
    pub(crate) fn new(task: TaskHandle<T>, subscription: Subscription) -> Self {
        let fired = subscription.fired().fuse();

        AwaitUntil {
            task,
            subscription,
            fired,
            done: false,
        }
    }
}

impl<T> Future for AwaitUntil<T> {
    type Output = Result<T, TetherError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let this = self.project();
        if *this.done {
            panic!("poll after completion");
        }

        if let Poll::Ready(Some(())) = this.fired.poll(cx) {
            *this.done = true;
            this.subscription.dispose();
            this.task.cancel();
            return Poll::Ready(Err(TetherError::TerminatedBySignal));
        }

        match this.task.poll_outcome(cx) {
            Poll::Ready(outcome) => {
                *this.done = true;
                this.subscription.dispose();

                Poll::Ready(match outcome {
                    Outcome::Completed(value) => Ok(value),
                    Outcome::Failed(failure) => Err(TetherError::Failed(failure)),
                    Outcome::Canceled => Err(TetherError::Canceled),
                })
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[pinned_drop]
impl<T> PinnedDrop for AwaitUntil<T> {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        if !*this.done {
            // the caller was cancelled first; cascade downward
            this.task.cancel();
            this.subscription.dispose();
        }
    }
}

/// Future for [`Tether::await_signal_only`].
///
/// Resolves the first (and only) time the signal fires; dropping it early
/// disposes the registration.
///
/// [`Tether::await_signal_only`]: crate::Tether::await_signal_only
#[must_use = "futures do nothing unless polled"]
#[pin_project(PinnedDrop)]
pub struct SignalFired {
    subscription: Subscription,
    #[pin]
    fired: Fuse<FiredFuture>,
    done: bool,
}

impl SignalFired {
    pub(crate) fn new(subscription: Subscription) -> Self {
        let fired = subscription.fired().fuse();

        SignalFired {
            subscription,
            fired,
            done: false,
        }
    }
}

impl Future for SignalFired {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let this = self.project();
        if *this.done {
            panic!("poll after completion");
        }

        match this.fired.poll(cx) {
            Poll::Ready(Some(())) => {
                *this.done = true;
                this.subscription.dispose();
                Poll::Ready(())
            }
            // a disposed binding can never fire
            Poll::Ready(None) | Poll::Pending => Poll::Pending,
        }
    }
}

#[pinned_drop]
impl PinnedDrop for SignalFired {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        if !*this.done {
            this.subscription.dispose();
        }
    }
}
