use futures_intrusive::channel::shared::{
    oneshot_channel, ChannelReceiveFuture, OneshotReceiver, OneshotSender,
};
use parking_lot::Mutex;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::signal::{SignalSource, SubscriptionGuard};
use crate::{FailureHandler, TaskFailure};

type FireCallback = Box<dyn FnOnce() + Send>;

/// Future returned by [`Subscription::fired`].
pub type FiredFuture = ChannelReceiveFuture<parking_lot::RawMutex, ()>;

struct Slots {
    guard: Option<Box<dyn SubscriptionGuard>>,
    callback: Option<FireCallback>,
    fired_tx: Option<OneshotSender<()>>,
}

struct SubInner {
    slots: Mutex<Slots>,
    fired: AtomicBool,
    disposed: AtomicBool,
    fired_rx: OneshotReceiver<()>,
    failure_handler: FailureHandler,
}

/// A live registration against a [`SignalSource`].
///
/// Converts the source's push notification into both shapes the crate needs:
/// a callback ([`Subscription::on_fire`]) for the fire-and-forget race and a
/// future ([`Subscription::fired`]) for the awaiter. The notification is
/// delivered at most once per binding even if the source spuriously notifies
/// twice, and the registration retires itself after firing.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubInner>,
}

impl Subscription {
    /// Registers a one-shot listener against `source`.
    ///
    /// Panics raised by the host while disposing the registration are
    /// reported to `failure_handler` and swallowed.
    pub fn bind(source: &dyn SignalSource, failure_handler: FailureHandler) -> Subscription {
        let (fired_tx, fired_rx) = oneshot_channel();
        let inner = Arc::new(SubInner {
            slots: Mutex::new(Slots {
                guard: None,
                callback: None,
                fired_tx: Some(fired_tx),
            }),
            fired: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            fired_rx,
            failure_handler,
        });

        let listener = {
            let inner = Arc::clone(&inner);
            Box::new(move || notify_fired(&inner))
        };
        let guard = source.register_one_shot(listener);
        inner.slots.lock().guard = Some(guard);

        // the source may have fired re-entrantly during registration, before
        // the guard landed in its slot
        if inner.disposed.load(Ordering::SeqCst) {
            dispose_guard(&inner);
        }

        Subscription { inner }
    }

    /// Registers the action run when the signal fires. At most one callback
    /// per subscription; if the signal already fired, it runs synchronously on
    /// the calling context. Registering on a disposed subscription drops the
    /// callback immediately.
    pub fn on_fire<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slots = self.inner.slots.lock();
        if self.inner.fired.load(Ordering::SeqCst) {
            drop(slots);
            callback();
            return;
        }

        // a disposed binding can never fire; storing the callback would only
        // pin its captures for the subscription's lifetime
        if !self.inner.disposed.load(Ordering::SeqCst) {
            slots.callback = Some(Box::new(callback));
        }
    }

    /// A future resolving once the signal has fired.
    pub fn fired(&self) -> FiredFuture {
        self.inner.fired_rx.receive()
    }

    /// Tears down the registration.
    ///
    /// Idempotent, and safe to call from any point including re-entrantly
    /// from inside the fire callback.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            // release the race arm and the waiter; neither can run anymore
            let mut slots = self.inner.slots.lock();
            slots.callback = None;
            slots.fired_tx = None;
        }
        dispose_guard(&self.inner);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    pub fn has_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }
}

fn notify_fired(inner: &Arc<SubInner>) {
    if inner.fired.swap(true, Ordering::SeqCst) {
        // spurious extra notification from the source
        return;
    }

    let (tx, callback) = {
        let mut slots = inner.slots.lock();
        (slots.fired_tx.take(), slots.callback.take())
    };

    if let Some(tx) = tx {
        let _ = tx.send(());
    }
    if let Some(callback) = callback {
        if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(callback)) {
            (inner.failure_handler)(&TaskFailure::from_panic(payload));
        }
    }

    // single-shot; retire the registration unless the callback already did
    if !inner.disposed.swap(true, Ordering::SeqCst) {
        dispose_guard(inner);
    }
}

fn dispose_guard(inner: &SubInner) {
    let guard = inner.slots.lock().guard.take();
    if let Some(mut guard) = guard {
        if let Err(payload) =
            std::panic::catch_unwind(AssertUnwindSafe(|| guard.dispose()))
        {
            (inner.failure_handler)(&TaskFailure::from_panic(payload));
        }
    }
}
