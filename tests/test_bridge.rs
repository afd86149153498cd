use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{sleep, timeout};

use task_tether::{
    race, start, ExecContext, FailureHandler, ManualSignal, OneShotListener, Outcome,
    SignalSource, Subscription, SubscriptionGuard, TaskFailure, Tether, TokioExecutor,
};

struct CountingSource {
    inner: ManualSignal,
    disposals: Arc<AtomicUsize>,
}

impl CountingSource {
    fn new() -> (Self, Arc<AtomicUsize>) {
        let disposals = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            inner: ManualSignal::new(),
            disposals: disposals.clone(),
        };

        (source, disposals)
    }
}

impl SignalSource for CountingSource {
    fn register_one_shot(&self, listener: OneShotListener) -> Box<dyn SubscriptionGuard> {
        Box::new(CountingGuard {
            inner: self.inner.register_one_shot(listener),
            disposals: self.disposals.clone(),
        })
    }
}

struct CountingGuard {
    inner: Box<dyn SubscriptionGuard>,
    disposals: Arc<AtomicUsize>,
}

impl SubscriptionGuard for CountingGuard {
    fn dispose(&mut self) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
        self.inner.dispose();
    }
}

fn recording_handler() -> (FailureHandler, Arc<Mutex<Vec<String>>>) {
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();
    let handler: FailureHandler = Arc::new(move |failure: &TaskFailure| {
        sink.lock().push(failure.message().to_string());
    });

    (handler, failures)
}

#[tokio::test]
async fn task_wins_disposes_subscription() {
    let (source, disposals) = CountingSource::new();
    let tether = Tether::new(Arc::new(TokioExecutor));

    let handle = tether.launch_until(&source, async {
        sleep(Duration::from_millis(10)).await;
        42
    });

    let outcome = timeout(Duration::from_secs(1), handle.join())
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Completed(42)));
    assert!(!handle.is_cancelled());
    assert_eq!(disposals.load(Ordering::SeqCst), 1);
    assert_eq!(source.inner.listener_count(), 0);

    // the binding is torn down; a late fire reaches nothing
    source.inner.fire();
    assert!(!handle.is_cancelled());
}

#[tokio::test]
async fn signal_wins_cancels_task() {
    let (source, disposals) = CountingSource::new();
    let tether = Tether::new(Arc::new(TokioExecutor));

    let handle = tether.launch_until(&source, async {
        sleep(Duration::from_secs(60)).await;
    });

    sleep(Duration::from_millis(10)).await;
    source.inner.fire();

    let outcome = timeout(Duration::from_secs(1), handle.join())
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Canceled));
    assert!(handle.is_cancelled());
    assert_eq!(disposals.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn second_dispose_and_cancel_are_noops() {
    let (source, disposals) = CountingSource::new();
    let (handler, failures) = recording_handler();

    let subscription = Subscription::bind(&source, handler.clone());
    subscription.dispose();
    subscription.dispose();
    assert!(subscription.is_disposed());
    assert_eq!(disposals.load(Ordering::SeqCst), 1);

    let handle = start(&TokioExecutor, ExecContext::Main, handler, async { 1 });
    handle.cancel();
    handle.cancel();
    assert!(handle.is_cancelled());

    let outcome = timeout(Duration::from_secs(1), handle.join())
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Canceled));
    assert!(failures.lock().is_empty());
}

#[tokio::test]
async fn on_fire_after_dispose_drops_the_callback() {
    let (source, disposals) = CountingSource::new();
    let (handler, _failures) = recording_handler();

    let subscription = Subscription::bind(&source, handler);
    subscription.dispose();

    let invoked = Arc::new(AtomicUsize::new(0));
    let token = Arc::new(());
    {
        let invoked = invoked.clone();
        let held = token.clone();
        subscription.on_fire(move || {
            let _ = &held;
            invoked.fetch_add(1, Ordering::SeqCst);
        });
    }

    // the callback and its captures were released immediately
    assert_eq!(Arc::strong_count(&token), 1);

    source.inner.fire();
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert_eq!(disposals.load(Ordering::SeqCst), 1);
}

struct PanickingSource {
    inner: ManualSignal,
}

impl SignalSource for PanickingSource {
    fn register_one_shot(&self, listener: OneShotListener) -> Box<dyn SubscriptionGuard> {
        Box::new(PanickingGuard {
            inner: self.inner.register_one_shot(listener),
        })
    }
}

struct PanickingGuard {
    inner: Box<dyn SubscriptionGuard>,
}

impl SubscriptionGuard for PanickingGuard {
    fn dispose(&mut self) {
        self.inner.dispose();
        panic!("host dispose failed");
    }
}

#[tokio::test]
async fn dispose_panic_reaches_failure_handler_only() {
    let (handler, failures) = recording_handler();
    let source = PanickingSource {
        inner: ManualSignal::new(),
    };
    let tether = Tether::new(Arc::new(TokioExecutor)).with_failure_handler(handler);

    let handle = tether.launch_until(&source, async { 7 });

    let outcome = timeout(Duration::from_secs(1), handle.join())
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Completed(7)));

    let failures = failures.lock();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("host dispose failed"));
}

#[derive(Default)]
struct SpuriousSource {
    listeners: Arc<Mutex<Vec<OneShotListener>>>,
    disposals: Arc<AtomicUsize>,
}

impl SpuriousSource {
    // a sloppy host notifying every listener twice
    fn fire_twice(&self) {
        let mut taken = std::mem::take(&mut *self.listeners.lock());
        for listener in taken.iter_mut() {
            listener();
            listener();
        }
    }
}

impl SignalSource for SpuriousSource {
    fn register_one_shot(&self, listener: OneShotListener) -> Box<dyn SubscriptionGuard> {
        self.listeners.lock().push(listener);
        Box::new(CountOnlyGuard {
            disposals: self.disposals.clone(),
        })
    }
}

struct CountOnlyGuard {
    disposals: Arc<AtomicUsize>,
}

impl SubscriptionGuard for CountOnlyGuard {
    fn dispose(&mut self) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn race_arms_resolve_exactly_once() {
    let (handler, failures) = recording_handler();
    let source = SpuriousSource::default();

    let handle = start(&TokioExecutor, ExecContext::Main, handler.clone(), async {
        sleep(Duration::from_secs(60)).await;
    });
    let subscription = Subscription::bind(&source, handler);
    race(&handle, &subscription);

    source.fire_twice();

    let outcome = timeout(Duration::from_secs(1), handle.join())
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Canceled));
    assert!(handle.is_cancelled());
    // retired once on fire; neither the second notification nor the task's
    // completion arm disposes again
    assert_eq!(source.disposals.load(Ordering::SeqCst), 1);
    assert!(failures.lock().is_empty());
}
