use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::broadcast::error::TryRecvError;

use super::*;

fn url(path: &str) -> ResourceUrl {
    ResourceUrl::parse(&format!("file:///site/{path}")).unwrap()
}

fn root() -> ResourceUrl {
    ResourceUrl::parse("file:///site/").unwrap()
}

fn event(reason: &str) -> LiveEvent {
    LiveEvent::full(&url("a.js"), reason, &root())
}

fn reasons(payloads: &[Payload]) -> Vec<String> {
    payloads
        .iter()
        .map(|payload| {
            let value: serde_json::Value = serde_json::from_str(payload).unwrap();
            value["data"]["typeReason"].as_str().unwrap().to_string()
        })
        .collect()
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_late_subscriber_replays_history_in_order() {
    let registry = RoomRegistry::new(4, 8);
    let room = registry.get_or_create(&url("index.html")).unwrap();

    assert_eq!(room.publish(&event("one")), 0);
    room.publish(&event("two"));
    room.publish(&event("three"));

    let mut subscription = room.subscribe().unwrap();
    assert_eq!(reasons(&subscription.backlog), ["one", "two", "three"]);
    assert!(matches!(
        subscription.receiver.try_recv(),
        Err(TryRecvError::Empty)
    ));
}

#[test]
fn test_subscriber_sees_each_event_once() {
    let registry = RoomRegistry::new(4, 8);
    let room = registry.get_or_create(&url("index.html")).unwrap();
    room.publish(&event("before"));

    let mut first = room.subscribe().unwrap();
    let mut second = room.subscribe().unwrap();
    assert_eq!(room.subscribers(), 2);
    assert_eq!(room.publish(&event("after")), 2);
    room.publish(&event("later"));

    for subscription in [&mut first, &mut second] {
        assert_eq!(reasons(&subscription.backlog), ["before"]);
        let live = vec![
            subscription.receiver.try_recv().unwrap(),
            subscription.receiver.try_recv().unwrap(),
        ];
        assert_eq!(reasons(&live), ["after", "later"]);
    }
}

#[test]
fn test_history_is_bounded() {
    let registry = RoomRegistry::new(4, 2);
    let room = registry.get_or_create(&url("index.html")).unwrap();
    for reason in ["a", "b", "c"] {
        room.publish(&event(reason));
    }
    assert_eq!(reasons(&room.history()), ["b", "c"]);
}

#[test]
fn test_same_entry_same_room() {
    let registry = RoomRegistry::new(4, 2);
    let first = registry.get_or_create(&url("index.html")).unwrap();
    let second = registry.get_or_create(&url("index.html")).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_oldest_room_evicted() {
    let registry = RoomRegistry::new(2, 4);
    let a = registry.get_or_create(&url("a.html")).unwrap();
    let mut subscription = a.subscribe().unwrap();
    registry.get_or_create(&url("b.html")).unwrap();
    // revisiting does not refresh creation order
    registry.get_or_create(&url("a.html")).unwrap();
    registry.get_or_create(&url("c.html")).unwrap();

    let entries: Vec<_> = registry
        .rooms()
        .iter()
        .map(|room| room.entry().clone())
        .collect();
    assert_eq!(entries, [url("b.html"), url("c.html")]);
    assert!(a.is_released());
    assert!(a.history().is_empty());
    assert_eq!(a.publish(&event("lost")), 0);
    assert!(matches!(
        subscription.receiver.try_recv(),
        Err(TryRecvError::Closed)
    ));
}

#[test]
fn test_eviction_reports_entry() {
    let evicted: Arc<Mutex<Vec<ResourceUrl>>> = Arc::default();
    let sink = Arc::clone(&evicted);
    let registry =
        RoomRegistry::new(1, 4).with_eviction(move |entry| sink.lock().push(entry.clone()));

    registry.get_or_create(&url("a.html")).unwrap();
    registry.get_or_create(&url("a.html")).unwrap();
    assert!(evicted.lock().is_empty());

    registry.get_or_create(&url("b.html")).unwrap();
    assert_eq!(*evicted.lock(), [url("a.html")]);
}

#[test]
fn test_rooms_for_entries() {
    let registry = RoomRegistry::new(4, 4);
    for entry in ["a.html", "b.html", "c.html"] {
        registry.get_or_create(&url(entry));
    }
    let rooms = registry.rooms_for(&[url("c.html"), url("a.html"), url("x.html")]);
    let entries: Vec<_> = rooms.iter().map(|room| room.entry().clone()).collect();
    assert_eq!(entries, [url("a.html"), url("c.html")]);
}

#[test]
fn test_watch_shared_and_released() {
    let started = Arc::new(AtomicUsize::new(0));
    let dropped = Arc::new(AtomicBool::new(false));
    let registry = {
        let started = Arc::clone(&started);
        let dropped = Arc::clone(&dropped);
        RoomRegistry::new(2, 4).with_watch(move || {
            started.fetch_add(1, Ordering::SeqCst);
            Ok(WatchHandle::new(DropFlag(Arc::clone(&dropped))))
        })
    };
    assert!(!registry.is_watching());

    registry.get_or_create(&url("a.html"));
    registry.get_or_create(&url("b.html"));
    registry.get_or_create(&url("c.html"));
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert!(registry.is_watching());

    registry.shutdown();
    assert!(dropped.load(Ordering::SeqCst));
    assert!(!registry.is_watching());
    assert!(registry.is_empty());
    assert!(registry.get_or_create(&url("d.html")).is_none());
}

#[test]
fn test_watch_failure_still_opens_room() {
    let registry =
        RoomRegistry::new(2, 4).with_watch(|| Err(anyhow::anyhow!("inotify limit reached")));
    let room = registry.get_or_create(&url("a.html")).unwrap();
    assert!(!registry.is_watching());
    room.publish(&event("still works"));
    assert_eq!(room.history().len(), 1);
}
