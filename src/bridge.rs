use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::subscription::Subscription;
use crate::task::{Outcome, TaskHandle};

/// Couples a task to a termination subscription.
///
/// The two arms race: if the task reaches its terminal state first, the
/// subscription is disposed; if the signal fires first, the task is
/// cancelled. A shared flag, mutated only by atomic test-and-set, guarantees
/// that exactly one arm performs its teardown branch; the loser is a pure
/// no-op even when both are already in flight. The bridge itself never fails;
/// teardown panics go to the failure handlers injected into `task` and
/// `subscription`.
pub fn race<T>(task: &TaskHandle<T>, subscription: &Subscription)
where
    T: Send + 'static,
{
    let resolved = Arc::new(AtomicBool::new(false));

    let completion_arm = {
        let resolved = Arc::clone(&resolved);
        let subscription = subscription.clone();
        move |_outcome: &Outcome<T>| {
            if !resolved.swap(true, Ordering::SeqCst) {
                subscription.dispose();
            }
        }
    };
    task.on_completion(completion_arm);

    let fire_arm = {
        let task = task.clone();
        move || {
            if !resolved.swap(true, Ordering::SeqCst) {
                task.cancel();
            }
        }
    };
    subscription.on_fire(fire_arm);
}
