//! Integration tests for pollers on the host loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use trellis_core::prelude::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn interrupt_on_third_tick_ends_polling() {
    init_tracing();
    let app = Application::builder()
        .idle_wait(Duration::from_millis(5))
        .build();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let poller = Poller::new(&app, Duration::from_millis(100), move || {
        if counter.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
            return Err(Error::Interrupted);
        }
        Ok(())
    })
    .unwrap();

    poller.start().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let polled = poller.clone();
    app.host().wait_until(&|| !polled.is_polling()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Long enough for a fourth tick to have come due.
    let deadline = Instant::now() + Duration::from_millis(250);
    app.host().wait_until(&|| Instant::now() >= deadline).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(poller.base().is_running());
}

#[test]
fn application_stop_ends_polling() {
    let app = Application::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let poller = Poller::new(&app, Duration::from_millis(1), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();
    app.add_controller("poller", poller.clone()).unwrap();
    app.start().unwrap();

    let check = calls.clone();
    app.host()
        .wait_until(&|| check.load(Ordering::SeqCst) >= 2)
        .unwrap();
    app.stop().unwrap();
    assert!(!poller.is_polling());
    assert!(poller.base().is_stopped());
}
