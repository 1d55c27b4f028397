use std::path::PathBuf;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tempfile::TempDir;

use super::classifier::EventClassifier;
use super::debouncer::{Debouncer, Timing};
use super::types::ChangeKind;
use crate::actor::messages::FileChange;
use crate::utils::path::normalize_path;

fn make_event(paths: Vec<&str>, kind: notify::EventKind) -> notify::Event {
    notify::Event {
        kind,
        paths: paths.into_iter().map(PathBuf::from).collect(),
        attrs: Default::default(),
    }
}

fn modify_kind() -> notify::EventKind {
    notify::EventKind::Modify(notify::event::ModifyKind::Data(
        notify::event::DataChange::Any,
    ))
}

fn create_kind() -> notify::EventKind {
    notify::EventKind::Create(notify::event::CreateKind::File)
}

fn remove_kind() -> notify::EventKind {
    notify::EventKind::Remove(notify::event::RemoveKind::File)
}

fn debouncer() -> Debouncer {
    Debouncer::new(Timing::default())
}

fn project() -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let root = normalize_path(temp.path());
    (temp, root)
}

#[test]
fn test_debouncer_empty() {
    let mut debouncer = debouncer();
    assert!(!debouncer.is_ready());
    assert!(debouncer.take_if_ready().is_none());
}

#[test]
fn test_event_kinds() {
    let mut debouncer = debouncer();

    debouncer.add_event(&make_event(vec!["/tmp/a.js"], create_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/b.js"], modify_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/c.js"], remove_kind()));

    assert_eq!(debouncer.changes.len(), 3);
    assert_eq!(debouncer.changes[&PathBuf::from("/tmp/a.js")], ChangeKind::Created);
    assert_eq!(debouncer.changes[&PathBuf::from("/tmp/b.js")], ChangeKind::Modified);
    assert_eq!(debouncer.changes[&PathBuf::from("/tmp/c.js")], ChangeKind::Removed);
}

#[test]
fn test_metadata_change_ignored() {
    let mut debouncer = debouncer();
    let metadata = notify::EventKind::Modify(notify::event::ModifyKind::Metadata(
        notify::event::MetadataKind::WriteTime,
    ));
    debouncer.add_event(&make_event(vec!["/tmp/a.js"], metadata));
    assert!(debouncer.changes.is_empty());
    assert!(debouncer.last_event.is_none());
}

#[test]
fn test_temp_file_ignored() {
    let mut debouncer = debouncer();

    debouncer.add_event(&make_event(vec!["/tmp/real.js"], modify_kind()));
    let first_time = debouncer.last_event.unwrap();
    std::thread::sleep(Duration::from_millis(5));

    debouncer.add_event(&make_event(vec!["/tmp/.app.js.swp"], modify_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/app.js~"], modify_kind()));
    assert_eq!(debouncer.last_event.unwrap(), first_time);
    assert_eq!(debouncer.changes.len(), 1);
}

#[test]
fn test_first_event_wins() {
    let mut debouncer = debouncer();
    debouncer.add_event(&make_event(vec!["/tmp/a.js"], create_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/a.js"], modify_kind()));

    assert_eq!(debouncer.changes.len(), 1);
    assert_eq!(debouncer.changes[&PathBuf::from("/tmp/a.js")], ChangeKind::Created);
}

#[test]
fn test_remove_then_create_restores() {
    let mut debouncer = debouncer();
    debouncer.add_event(&make_event(vec!["/tmp/a.js"], remove_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/a.js"], create_kind()));
    assert_eq!(debouncer.changes[&PathBuf::from("/tmp/a.js")], ChangeKind::Created);
}

#[test]
fn test_modify_then_remove_upgrades() {
    let mut debouncer = debouncer();
    debouncer.add_event(&make_event(vec!["/tmp/a.js"], modify_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/a.js"], remove_kind()));
    assert_eq!(debouncer.changes[&PathBuf::from("/tmp/a.js")], ChangeKind::Removed);
}

#[test]
fn test_create_then_remove_discards() {
    let mut debouncer = debouncer();
    debouncer.add_event(&make_event(vec!["/tmp/a.js"], create_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/a.js"], remove_kind()));
    assert!(debouncer.changes.is_empty());

    // nothing left to deliver, the timer is reset
    assert!(debouncer.take_if_ready().is_none());
    assert!(debouncer.last_event.is_none());
}

#[test]
fn test_sleep_duration() {
    let timing = Timing {
        debounce: Duration::from_millis(200),
        cooldown: Duration::from_millis(600),
    };
    let mut debouncer = Debouncer::new(timing);
    assert!(debouncer.sleep_duration() >= Duration::from_secs(3600));

    debouncer.last_event = Some(std::time::Instant::now());
    let wait = debouncer.sleep_duration();
    assert!(wait <= Duration::from_millis(200));
    assert!(wait >= Duration::from_millis(150));

    debouncer.last_delivery = Some(std::time::Instant::now());
    let wait = debouncer.sleep_duration();
    assert!(wait <= Duration::from_millis(600));
    assert!(wait >= Duration::from_millis(550));
}

#[test]
fn test_ready_after_quiet_period() {
    let timing = Timing {
        debounce: Duration::from_millis(10),
        cooldown: Duration::ZERO,
    };
    let mut debouncer = Debouncer::new(timing);
    debouncer.add_event(&make_event(vec!["/tmp/a.js"], modify_kind()));
    assert!(debouncer.take_if_ready().is_none());

    std::thread::sleep(Duration::from_millis(20));
    let changes = debouncer.take_if_ready().unwrap();
    assert_eq!(changes.len(), 1);
    assert!(debouncer.changes.is_empty());
    assert!(debouncer.last_delivery.is_some());
}

#[test]
fn test_classify_relative_and_sorted() {
    let (_temp, root) = project();
    std::fs::create_dir_all(root.join("js")).unwrap();
    std::fs::write(root.join("js/b.js"), "b").unwrap();
    std::fs::write(root.join("a.css"), "a").unwrap();

    let mut raw = FxHashMap::default();
    raw.insert(root.join("js/b.js"), ChangeKind::Modified);
    raw.insert(root.join("a.css"), ChangeKind::Created);
    raw.insert(root.join("gone.html"), ChangeKind::Removed);

    let classifier = EventClassifier::new(root.clone(), Vec::new());
    assert_eq!(
        classifier.classify(raw),
        [
            FileChange::Added("a.css".to_string()),
            FileChange::Removed("gone.html".to_string()),
            FileChange::Updated("js/b.js".to_string()),
        ]
    );
}

#[test]
fn test_classify_corrects_by_existence() {
    let (_temp, root) = project();
    std::fs::write(root.join("saved.js"), "atomic save").unwrap();

    let mut raw = FxHashMap::default();
    raw.insert(root.join("saved.js"), ChangeKind::Removed);
    raw.insert(root.join("flash.js"), ChangeKind::Created);
    raw.insert(root.join("deleted.js"), ChangeKind::Modified);

    let classifier = EventClassifier::new(root.clone(), Vec::new());
    assert_eq!(
        classifier.classify(raw),
        [
            FileChange::Removed("deleted.js".to_string()),
            FileChange::Updated("saved.js".to_string()),
        ]
    );
}

#[test]
fn test_classify_skips_ignored_and_directories() {
    let (_temp, root) = project();
    std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(root.join("node_modules/pkg/index.js"), "").unwrap();
    std::fs::write(root.join("node_modules_notes.txt"), "").unwrap();

    let mut raw = FxHashMap::default();
    raw.insert(root.join("node_modules/pkg/index.js"), ChangeKind::Modified);
    raw.insert(root.join("node_modules_notes.txt"), ChangeKind::Modified);
    raw.insert(root.join("src"), ChangeKind::Created);
    raw.insert(PathBuf::from("/elsewhere/x.js"), ChangeKind::Removed);

    let classifier = EventClassifier::new(root.clone(), vec!["/node_modules/".to_string()]);
    assert_eq!(
        classifier.classify(raw),
        [FileChange::Updated("node_modules_notes.txt".to_string())]
    );
}
