//! Messages between the watcher and the change handler.
//!
//! ```text
//! FsActor --Changes--> ReloadActor --LiveEvent--> rooms
//! ```

/// A watched file change.
///
/// Paths are relative to the project root, `/`-separated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Added(String),
    Updated(String),
    Removed(String),
}

impl FileChange {
    pub fn path(&self) -> &str {
        match self {
            Self::Added(path) | Self::Updated(path) | Self::Removed(path) => path,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Updated(_) => "updated",
            Self::Removed(_) => "removed",
        }
    }
}

/// Messages to the change handler
#[derive(Debug)]
pub enum ReloadMsg {
    /// One debounced batch, sorted by path
    Changes(Vec<FileChange>),
    Shutdown,
}
