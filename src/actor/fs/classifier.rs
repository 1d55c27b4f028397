use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use super::types::ChangeKind;
use crate::actor::messages::FileChange;

/// Turns debounced raw changes into root-relative file changes.
///
/// Pipeline: correct_by_existence → relativize (skip ignored, directories) → sort
pub(super) struct EventClassifier {
    root: PathBuf,
    ignore: Vec<String>,
}

impl EventClassifier {
    pub(super) fn new(root: PathBuf, ignore: Vec<String>) -> Self {
        let ignore = ignore
            .into_iter()
            .map(|prefix| prefix.trim_matches('/').to_string())
            .filter(|prefix| !prefix.is_empty())
            .collect();
        Self { root, ignore }
    }

    pub(super) fn classify(&self, raw: FxHashMap<PathBuf, ChangeKind>) -> Vec<FileChange> {
        let mut changes = raw;
        Self::correct_by_existence(&mut changes);

        let mut classified: Vec<FileChange> = changes
            .into_iter()
            .filter_map(|(path, kind)| {
                if kind != ChangeKind::Removed && path.is_dir() {
                    return None;
                }
                let relative = self.relative(&path)?;
                Some(match kind {
                    ChangeKind::Created => FileChange::Added(relative),
                    ChangeKind::Modified => FileChange::Updated(relative),
                    ChangeKind::Removed => FileChange::Removed(relative),
                })
            })
            .collect();
        classified.sort_by(|a, b| a.path().cmp(b.path()));
        classified
    }

    /// Reconcile event kinds with what is on disk now.
    ///
    /// Atomic saves report removed for a file that still exists; fast
    /// create/delete sequences report created for a file that is gone.
    fn correct_by_existence(changes: &mut FxHashMap<PathBuf, ChangeKind>) {
        changes.retain(|path, kind| {
            let exists = path.exists();
            match *kind {
                ChangeKind::Created if !exists => {
                    crate::debug!("watch"; "discard created (gone): {}", path.display());
                    return false;
                }
                ChangeKind::Modified if !exists => *kind = ChangeKind::Removed,
                ChangeKind::Removed if exists => *kind = ChangeKind::Modified,
                _ => {}
            }
            true
        });
    }

    /// `/`-separated path below the root, `None` if outside or ignored.
    fn relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let ignored = self.ignore.iter().any(|prefix| {
            relative == *prefix
                || relative
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        });
        if relative.is_empty() || ignored {
            crate::debug!("watch"; "skip: {}", path.display());
            return None;
        }
        Some(relative)
    }
}
