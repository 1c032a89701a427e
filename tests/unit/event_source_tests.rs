use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lockdown_runtime::ipc::EventSource;

#[test]
fn publish_reaches_every_subscriber() {
    let source = EventSource::<usize>::new();
    let total = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let total = Arc::clone(&total);
        source.subscribe(move |value| {
            total.fetch_add(*value, Ordering::SeqCst);
        });
    }

    assert_eq!(source.publish(&5), 3);
    assert_eq!(total.load(Ordering::SeqCst), 15);
}

#[test]
fn unsubscribed_handler_is_not_called() {
    let source = EventSource::<()>::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    let id = source.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(source.unsubscribe(id));
    assert_eq!(source.publish(&()), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn unsubscribe_twice_reports_missing() {
    let source = EventSource::<()>::new();
    let id = source.subscribe(|_| {});

    assert!(source.unsubscribe(id));
    assert!(!source.unsubscribe(id));
    assert_eq!(source.subscriber_count(), 0);
}

#[test]
fn subscription_ids_are_unique() {
    let source = EventSource::<()>::new();
    let first = source.subscribe(|_| {});
    let second = source.subscribe(|_| {});
    assert_ne!(first, second);
    assert_eq!(source.subscriber_count(), 2);
}

#[test]
fn handlers_run_in_subscription_order() {
    let source = EventSource::<&'static str>::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for tag in ["a", "b", "c"] {
        let seen = Arc::clone(&seen);
        source.subscribe(move |_| seen.lock().unwrap().push(tag));
    }

    source.publish(&"event");
    assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
}

#[test]
fn handler_may_unsubscribe_itself_while_publishing() {
    let source = Arc::new(EventSource::<()>::new());
    let slot = Arc::new(Mutex::new(None));
    let calls = Arc::new(AtomicUsize::new(0));

    let inner_source = Arc::clone(&source);
    let inner_slot = Arc::clone(&slot);
    let counter = Arc::clone(&calls);
    let id = source.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(id) = inner_slot.lock().unwrap().take() {
            inner_source.unsubscribe(id);
        }
    });
    *slot.lock().unwrap() = Some(id);

    source.publish(&());
    source.publish(&());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
