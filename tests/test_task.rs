use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{sleep, timeout};

use task_tether::{start, ExecContext, FailureHandler, Outcome, TaskFailure, TokioExecutor};

fn recording_handler() -> (FailureHandler, Arc<Mutex<Vec<String>>>) {
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();
    let handler: FailureHandler = Arc::new(move |failure: &TaskFailure| {
        sink.lock().push(failure.message().to_string());
    });

    (handler, failures)
}

#[tokio::test]
async fn completion_callback_may_inspect_the_handle() {
    let (handler, _failures) = recording_handler();
    let handle = start(&TokioExecutor, ExecContext::Main, handler, async {
        sleep(Duration::from_millis(10)).await;
        3
    });

    let observer = handle.clone();
    let seen_finished = Arc::new(AtomicUsize::new(0));
    let seen = seen_finished.clone();
    handle.on_completion(move |_outcome| {
        // reading the handle back must not block the task body
        if observer.is_finished() && !observer.is_cancelled() {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    });

    let outcome = timeout(Duration::from_secs(1), handle.join())
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Completed(3)));
    assert_eq!(seen_finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn late_completion_callback_runs_synchronously() {
    let (handler, _failures) = recording_handler();
    let handle = start(&TokioExecutor, ExecContext::Main, handler, async { 5 });

    timeout(Duration::from_secs(1), async {
        while !handle.is_finished() {
            sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let observed = seen.clone();
    handle.on_completion(move |outcome| {
        assert!(matches!(outcome, Outcome::Completed(5)));
        observed.fetch_add(1, Ordering::SeqCst);
    });

    // invoked on this context, before anything else ran
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn callback_panic_reaches_failure_handler() {
    let (handler, failures) = recording_handler();
    let handle = start(&TokioExecutor, ExecContext::Main, handler, async {
        sleep(Duration::from_millis(10)).await;
        9
    });

    handle.on_completion(|_outcome| panic!("callback blew up"));

    let outcome = timeout(Duration::from_secs(1), handle.join())
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Completed(9)));

    let failures = failures.lock();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("callback blew up"));
}

#[tokio::test]
async fn callback_may_register_another_callback() {
    let (handler, _failures) = recording_handler();
    let handle = start(&TokioExecutor, ExecContext::Main, handler, async {
        sleep(Duration::from_millis(10)).await;
    });

    let seen = Arc::new(AtomicUsize::new(0));
    let outer = handle.clone();
    let chained = seen.clone();
    handle.on_completion(move |_outcome| {
        let chained = chained.clone();
        outer.on_completion(move |_outcome| {
            chained.fetch_add(1, Ordering::SeqCst);
        });
    });

    let outcome = timeout(Duration::from_secs(1), handle.join())
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Completed(())));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}
