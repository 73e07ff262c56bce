//! Unit tests for the one-shot watch registry
//!
//! - arm / replace / disarm state transitions
//! - exactly-once delivery and no implicit persistence
//! - re-arming from inside a callback
//! - per-path delivery order

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::test_utils::assert_silent;
use crate::test_utils::new_session;
use crate::test_utils::recv_within;
use crate::test_utils::TestStack;
use crate::ExpectedVersion;
use crate::NodePath;

fn path(p: &str) -> NodePath {
    NodePath::parse(p).unwrap()
}

#[tokio::test]
async fn test_arm_transitions_to_armed() {
    let stack = TestStack::connected().await;

    assert_eq!(stack.watches.watch_state("/a"), WatchState::Unarmed);
    stack.watches.arm("/a", |_: WatchedEvent| {}).unwrap();

    assert_eq!(stack.watches.watch_state("/a"), WatchState::Armed);
    assert_eq!(stack.watches.armed_count(), 1);
}

#[tokio::test]
async fn test_arm_replaces_unfired_watch() {
    let stack = TestStack::connected().await;
    let (tx, rx) = mpsc::channel();
    let tx_first = tx.clone();

    let first = stack
        .watches
        .arm("/a", move |_: WatchedEvent| {
            tx_first.send("first").unwrap();
        })
        .unwrap();
    let second = stack
        .watches
        .arm("/a", move |_: WatchedEvent| {
            tx.send("second").unwrap();
        })
        .unwrap();

    assert_ne!(first, second);
    assert_eq!(stack.watches.armed_count(), 1);
    assert!(stack.watches.fire(&path("/a"), WatchEventKind::NodeDataChanged, 1));

    assert_eq!(recv_within(&rx), "second");
    assert_silent(&rx);
}

#[tokio::test]
async fn test_fire_without_watch_is_noop() {
    let stack = TestStack::connected().await;

    assert!(!stack.watches.fire(&path("/a"), WatchEventKind::NodeDataChanged, 1));
    assert_eq!(stack.watches.fired_count(), 0);
}

#[tokio::test]
async fn test_fire_delivers_exactly_once_and_unarms() {
    let stack = TestStack::connected().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();
    let counter = calls.clone();
    stack
        .watches
        .arm("/a", move |event: WatchedEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            tx.send(event).unwrap();
        })
        .unwrap();

    assert!(stack.watches.fire(&path("/a"), WatchEventKind::NodeDataChanged, 4));
    assert_eq!(stack.watches.watch_state("/a"), WatchState::Unarmed);
    assert!(!stack.watches.fire(&path("/a"), WatchEventKind::NodeDataChanged, 5));

    let event = recv_within(&rx);
    assert_eq!(event.version, 4);
    assert_silent(&rx);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(stack.watches.fired_count(), 1);
}

#[tokio::test]
async fn test_disarm_prevents_delivery() {
    let stack = TestStack::connected().await;
    let (tx, rx) = mpsc::channel();
    stack
        .watches
        .arm("/a", move |event: WatchedEvent| {
            tx.send(event).unwrap();
        })
        .unwrap();

    assert!(stack.watches.disarm("/a"));
    assert!(!stack.watches.disarm("/a"));
    assert!(!stack.watches.fire(&path("/a"), WatchEventKind::NodeDataChanged, 1));
    assert_silent(&rx);
}

#[tokio::test]
async fn test_key_isolation() {
    let stack = TestStack::connected().await;
    let (tx, rx) = mpsc::channel();
    stack
        .watches
        .arm("/a", move |event: WatchedEvent| {
            tx.send(event).unwrap();
        })
        .unwrap();

    stack.watches.fire(&path("/b"), WatchEventKind::NodeDataChanged, 1);

    assert_silent(&rx);
    assert_eq!(stack.watches.watch_state("/a"), WatchState::Armed);
}

#[tokio::test]
async fn test_arm_requires_connected_session() {
    let session = new_session();
    let watches = WatchRegistry::new(session, crate::WatchConfig::default());

    let err = watches.arm("/a", |_: WatchedEvent| {}).unwrap_err();

    assert!(err.is_not_connected());
    assert_eq!(watches.armed_count(), 0);
}

#[tokio::test]
async fn test_arm_rejects_invalid_path() {
    let stack = TestStack::connected().await;

    assert!(stack.watches.arm("relative", |_: WatchedEvent| {}).is_err());
}

#[tokio::test]
async fn test_rearm_inside_callback_observes_next_write() {
    let stack = TestStack::connected().await;
    stack.store.create("/a", "v0").unwrap();
    let (tx, rx) = mpsc::channel();

    struct Rearming {
        watches: std::sync::Weak<WatchRegistry>,
        tx: mpsc::Sender<u64>,
        remaining: AtomicUsize,
    }
    impl Watcher for Rearming {
        fn process(
            &self,
            event: WatchedEvent,
        ) {
            self.tx.send(event.version).unwrap();
            if self.remaining.fetch_sub(1, Ordering::SeqCst) > 1 {
                if let Some(watches) = self.watches.upgrade() {
                    watches
                        .arm(
                            event.path.as_str(),
                            Rearming {
                                watches: self.watches.clone(),
                                tx: self.tx.clone(),
                                remaining: AtomicUsize::new(self.remaining.load(Ordering::SeqCst)),
                            },
                        )
                        .unwrap();
                }
            }
        }
    }

    stack
        .watches
        .arm(
            "/a",
            Rearming {
                watches: Arc::downgrade(&stack.watches),
                tx,
                remaining: AtomicUsize::new(3),
            },
        )
        .unwrap();

    for i in 1..=3u64 {
        stack.store.write("/a", format!("v{i}"), ExpectedVersion::Any).unwrap();
        assert_eq!(recv_within(&rx), i);
        // wait until the callback has re-armed before the next write
        wait_for_state(&stack.watches, "/a", if i < 3 { WatchState::Armed } else { WatchState::Unarmed });
    }

    stack.store.write("/a", "v4", ExpectedVersion::Any).unwrap();
    assert_silent(&rx);
}

#[tokio::test]
async fn test_delivery_preserves_write_order_per_path() {
    let stack = TestStack::connected().await;
    let (tx, rx) = mpsc::channel();

    for i in 0..50u64 {
        let tx = tx.clone();
        stack
            .watches
            .arm("/ordered", move |event: WatchedEvent| {
                tx.send((i, event.version)).unwrap();
            })
            .unwrap();
        assert!(stack.watches.fire(&path("/ordered"), WatchEventKind::NodeDataChanged, i));
    }

    for i in 0..50u64 {
        assert_eq!(recv_within(&rx), (i, i));
    }
}

#[tokio::test]
async fn test_panicking_callback_does_not_stop_dispatcher() {
    let stack = TestStack::connected().await;
    let (tx, rx) = mpsc::channel();

    stack
        .watches
        .arm("/boom", |_: WatchedEvent| panic!("callback failure"))
        .unwrap();
    stack
        .watches
        .arm("/ok", move |event: WatchedEvent| {
            tx.send(event.path).unwrap();
        })
        .unwrap();

    stack.watches.fire(&path("/boom"), WatchEventKind::NodeDataChanged, 1);
    stack.watches.fire(&path("/ok"), WatchEventKind::NodeDataChanged, 1);

    assert_eq!(recv_within(&rx).as_str(), "/ok");
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let stack = TestStack::connected().await;

    stack.watches.start().unwrap();
    assert!(stack.watches.is_running());
    stack.watches.stop();
    stack.watches.stop();
    assert!(!stack.watches.is_running());
}

#[tokio::test]
async fn test_fired_events_wait_for_dispatcher() {
    let session = new_session();
    session.connect().await.unwrap();
    let watches = WatchRegistry::new(session, crate::WatchConfig::default());
    let (tx, rx) = mpsc::channel();
    watches
        .arm("/a", move |event: WatchedEvent| {
            tx.send(event).unwrap();
        })
        .unwrap();

    watches.fire(&path("/a"), WatchEventKind::NodeDataChanged, 1);
    assert_eq!(watches.pending_deliveries(), 1);
    assert_silent(&rx);

    watches.start().unwrap();
    assert_eq!(recv_within(&rx).version, 1);
}

fn wait_for_state(
    watches: &WatchRegistry,
    path: &str,
    state: WatchState,
) {
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while watches.watch_state(path) != state {
        assert!(std::time::Instant::now() < deadline, "watch on {path} never became {state:?}");
        std::thread::sleep(Duration::from_millis(2));
    }
}
