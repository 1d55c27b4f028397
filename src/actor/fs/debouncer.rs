use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use super::types::ChangeKind;
use crate::utils::path::normalize_path;

/// Quiet period and minimum spacing between delivered batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Wait this long after the last event before delivering
    pub debounce: Duration,
    /// Wait this long after a delivery before the next one
    pub cooldown: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            cooldown: Duration::from_millis(300),
        }
    }
}

/// Collects raw notify events into one change per path.
///
/// Timing only, no knowledge of the project layout.
pub(super) struct Debouncer {
    timing: Timing,
    pub(super) changes: FxHashMap<PathBuf, ChangeKind>,
    pub(super) last_event: Option<Instant>,
    pub(super) last_delivery: Option<Instant>,
}

impl Debouncer {
    pub(super) fn new(timing: Timing) -> Self {
        Self {
            timing,
            changes: FxHashMap::default(),
            last_event: None,
            last_delivery: None,
        }
    }

    /// Record a notify event.
    ///
    /// Per path:
    /// - removed, then created/modified: restored, keep the new kind
    /// - modified, then removed: removed
    /// - created, then removed: never existed, drop it
    /// - anything else: first event wins
    pub(super) fn add_event(&mut self, event: &notify::Event) {
        use notify::EventKind;

        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Remove(_) => ChangeKind::Removed,
            // mtime/chmod noise
            EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => return,
            EventKind::Modify(_) => ChangeKind::Modified,
            _ => return,
        };

        crate::debug!("watch"; "raw notify: {:?} {:?}", event.kind, event.paths);

        for path in &event.paths {
            if is_temp_file(path) {
                continue;
            }
            let path = normalize_path(path);

            match self.changes.get(&path).copied() {
                None => {
                    crate::debug!("watch"; "event {}: {}", kind.label(), path.display());
                    self.changes.insert(path, kind);
                }
                Some(ChangeKind::Removed) if kind != ChangeKind::Removed => {
                    crate::debug!("watch"; "restored: {}", path.display());
                    self.changes.insert(path, kind);
                }
                Some(ChangeKind::Modified) if kind == ChangeKind::Removed => {
                    crate::debug!("watch"; "modified then removed: {}", path.display());
                    self.changes.insert(path, ChangeKind::Removed);
                }
                Some(ChangeKind::Created) if kind == ChangeKind::Removed => {
                    crate::debug!("watch"; "discard created+removed: {}", path.display());
                    self.changes.remove(&path);
                }
                Some(_) => continue,
            }
            self.last_event = Some(Instant::now());
        }
    }

    /// Take the collected changes once the quiet period and cooldown have passed.
    pub(super) fn take_if_ready(&mut self) -> Option<FxHashMap<PathBuf, ChangeKind>> {
        if self.changes.is_empty() {
            // everything seen so far cancelled out
            self.last_event = None;
            return None;
        }
        if !self.is_ready() {
            return None;
        }

        let changes = std::mem::take(&mut self.changes);
        self.last_event = None;
        self.last_delivery = Some(Instant::now());
        Some(changes)
    }

    pub(super) fn is_ready(&self) -> bool {
        let Some(last_event) = self.last_event else {
            return false;
        };
        if last_event.elapsed() < self.timing.debounce {
            return false;
        }
        if let Some(last_delivery) = self.last_delivery
            && last_delivery.elapsed() < self.timing.cooldown
        {
            return false;
        }
        !self.changes.is_empty()
    }

    /// Time until the next possible delivery.
    pub(super) fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(86400);
        };

        let debounce_remaining = self.timing.debounce.saturating_sub(last_event.elapsed());
        let cooldown_remaining = self
            .last_delivery
            .map_or(Duration::ZERO, |t| {
                self.timing.cooldown.saturating_sub(t.elapsed())
            });

        debounce_remaining
            .max(cooldown_remaining)
            .max(Duration::from_millis(1))
    }
}

/// Editor swap and backup files.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}
