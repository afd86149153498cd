use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Listener handed to a signal source.
///
/// A source is expected to call it at most once, but the adapter in
/// [`Subscription`] suppresses extra notifications from a sloppy source, so
/// the type is `FnMut` rather than `FnOnce`.
///
/// [`Subscription`]: crate::subscription::Subscription
pub type OneShotListener = Box<dyn FnMut() + Send>;

/// Host-side handle for a registered listener.
pub trait SubscriptionGuard: Send {
    /// Unregisters the listener. Must be idempotent; calling it zero or more
    /// times is allowed.
    fn dispose(&mut self);
}

/// The termination-signal capability consumed by this crate.
///
/// A source produces at most one notification per registration, after which
/// the registration is dead. The concrete origin of the notification (a UI
/// element detaching, a host-object lifecycle event) is the host's business.
pub trait SignalSource {
    fn register_one_shot(&self, listener: OneShotListener) -> Box<dyn SubscriptionGuard>;
}

/// An in-process signal source fired explicitly by the host.
///
/// Stands in for host notifications that arrive as plain callbacks, and
/// doubles as a test fixture.
#[derive(Clone, Default)]
pub struct ManualSignal {
    inner: Arc<Mutex<Listeners>>,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    registered: HashMap<u64, OneShotListener>,
}

impl ManualSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal, notifying every registered listener once and
    /// dropping the registrations.
    pub fn fire(&self) {
        let drained: Vec<(u64, OneShotListener)> = {
            let mut listeners = self.inner.lock();
            listeners.registered.drain().collect()
        };

        for (_, mut listener) in drained {
            listener();
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().registered.len()
    }
}

impl SignalSource for ManualSignal {
    fn register_one_shot(&self, listener: OneShotListener) -> Box<dyn SubscriptionGuard> {
        let id = {
            let mut listeners = self.inner.lock();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.registered.insert(id, listener);
            id
        };

        Box::new(ManualGuard {
            id,
            inner: Arc::clone(&self.inner),
        })
    }
}

struct ManualGuard {
    id: u64,
    inner: Arc<Mutex<Listeners>>,
}

impl SubscriptionGuard for ManualGuard {
    fn dispose(&mut self) {
        self.inner.lock().registered.remove(&self.id);
    }
}
