// Event broker integration tests
// Delivery ordering, failure isolation, reentrancy and concurrent use.

use camreg_core::event_bus::{BrokerRegistry, Event, EventBroker, Priority};
use camreg_core::{thread_safe_vec, HandlerResult};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn test_publish_follows_priority_order() {
    let broker = EventBroker::new();
    let log = thread_safe_vec::<&'static str>();

    for (name, priority) in [
        ("LOW", Priority::Low),
        ("HIGH", Priority::High),
        ("NORMAL", Priority::Normal),
    ] {
        let log = Arc::clone(&log);
        broker.subscribe("registration.computed", priority, move |_| {
            log.lock().push(name);
            Ok(())
        });
    }

    broker.publish("registration.computed", json!({}));
    assert_eq!(*log.lock(), vec!["HIGH", "NORMAL", "LOW"]);
}

#[test]
fn test_every_priority_assignment_is_non_increasing() {
    let priorities = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Critical,
    ];

    // Every sequence of four priorities drawn from the four levels.
    for code in 0..256usize {
        let broker = EventBroker::new();
        let log = thread_safe_vec::<(Priority, usize)>();
        for slot in 0..4 {
            let priority = priorities[(code >> (slot * 2)) & 0b11];
            let log = Arc::clone(&log);
            broker.subscribe("tick", priority, move |_| {
                log.lock().push((priority, slot));
                Ok(())
            });
        }

        assert_eq!(broker.publish("tick", json!(null)), 4);
        let seen = log.lock().clone();
        for pair in seen.windows(2) {
            let (p0, s0) = pair[0];
            let (p1, s1) = pair[1];
            assert!(p0 > p1 || (p0 == p1 && s0 < s1), "code {code}: {seen:?}");
        }
    }
}

#[test]
fn test_raising_subscriber_does_not_block_next() {
    let broker = EventBroker::new();
    let counter = Arc::new(AtomicUsize::new(0));

    broker.subscribe("grbl.status", Priority::Normal, |_| -> HandlerResult {
        anyhow::bail!("parse failure")
    });
    let c = Arc::clone(&counter);
    broker.subscribe("grbl.status", Priority::Normal, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let delivered = broker.publish("grbl.status", json!({ "state": "Idle" }));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(delivered, 1);
}

#[test]
fn test_handler_can_publish_chain() {
    let broker = Arc::new(EventBroker::new());
    let log = thread_safe_vec::<String>();

    let b = Arc::clone(&broker);
    broker.subscribe("camera.marker_detected", Priority::Normal, move |event: &Event| {
        b.publish("registration.point_requested", event.payload.clone());
        Ok(())
    });
    let l = Arc::clone(&log);
    broker.subscribe("registration.point_requested", Priority::Normal, move |event: &Event| {
        l.lock().push(event.payload["marker"].to_string());
        Ok(())
    });

    broker.publish("camera.marker_detected", json!({ "marker": 4 }));
    assert_eq!(*log.lock(), vec!["4".to_string()]);
}

#[test]
fn test_concurrent_publish_and_subscribe() {
    let broker = Arc::new(EventBroker::new());
    let counter = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&counter);
    broker.subscribe("grbl.position", Priority::Normal, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let broker = Arc::clone(&broker);
            thread::spawn(move || {
                for i in 0..100 {
                    broker.publish("grbl.position", json!({ "worker": worker, "seq": i }));
                    if i % 10 == 0 {
                        let id = broker.subscribe("scratch", Priority::Low, |_| Ok(()));
                        broker.unsubscribe("scratch", id);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker thread");
    }

    assert_eq!(counter.load(Ordering::SeqCst), 400);
    assert_eq!(broker.subscriber_count("scratch"), 0);
}

#[test]
fn test_registry_brokers_are_isolated() {
    let registry = BrokerRegistry::new();
    let counter = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&counter);
    registry.get("camera").subscribe("frame", Priority::Normal, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    assert_eq!(registry.get("grbl").publish("frame", json!({})), 0);
    assert_eq!(registry.get("camera").publish("frame", json!({})), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_emit_macro_targets_default_broker() {
    let counter = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&counter);
    let id = camreg_core::on_event!("test.emit_macro", move |_: &Event| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    assert_eq!(camreg_core::emit!("test.emit_macro", json!({})), 1);
    assert!(camreg_core::get_default().unsubscribe("test.emit_macro", id));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
