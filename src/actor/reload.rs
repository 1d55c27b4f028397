//! Change handler.
//!
//! Turns watched file changes into live update events:
//!
//! ```text
//! updated  -> invalidate, re-cook, decide, publish to rooms of dependent entries
//! removed  -> invalidate, publish FULL ("removed")
//! added    -> as updated if the graph already knows the url, else ignored
//! ```
//!
//! A re-cook that produces identical content publishes nothing.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::messages::{FileChange, ReloadMsg};
use crate::core::ResourceUrl;
use crate::hot;
use crate::kitchen::Kitchen;
use crate::live::{LiveEvent, ReloadKind, RoomRegistry};
use crate::logger::{status_error, status_success, status_unchanged};
use crate::utils::plural::plural_count;

/// What handling one change amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// The graph does not use this file
    Ignored,
    /// Re-cooked to identical content
    Unchanged,
    /// `event` was published to `rooms` rooms
    Published { event: LiveEvent, rooms: usize },
    /// Re-cook failed; a full reload carrying the error was published
    Failed {
        event: LiveEvent,
        rooms: usize,
        report: String,
    },
}

pub struct ReloadActor {
    rx: mpsc::Receiver<ReloadMsg>,
    handler: ChangeHandler,
}

impl ReloadActor {
    pub fn new(rx: mpsc::Receiver<ReloadMsg>, kitchen: Arc<Kitchen>, rooms: Arc<RoomRegistry>) -> Self {
        Self {
            rx,
            handler: ChangeHandler { kitchen, rooms },
        }
    }

    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                ReloadMsg::Changes(changes) => {
                    for change in changes {
                        let handled = self.handler.handle(&change).await;
                        report(&change, &handled);
                    }
                }
                ReloadMsg::Shutdown => {
                    crate::debug!("reload"; "shutting down");
                    break;
                }
            }
        }
    }
}

/// Stateless core of the change handler.
pub struct ChangeHandler {
    kitchen: Arc<Kitchen>,
    rooms: Arc<RoomRegistry>,
}

impl ChangeHandler {
    pub fn new(kitchen: Arc<Kitchen>, rooms: Arc<RoomRegistry>) -> Self {
        Self { kitchen, rooms }
    }

    pub async fn handle(&self, change: &FileChange) -> Handled {
        let Some(url) = self.kitchen.root().join(change.path()) else {
            return Handled::Ignored;
        };
        if !self.kitchen.with_graph(|graph| graph.contains(url.as_str())) {
            crate::debug!("reload"; "not in graph: {}", change.path());
            return Handled::Ignored;
        }

        match change {
            FileChange::Added(_) | FileChange::Updated(_) => self.updated(&url).await,
            FileChange::Removed(_) => self.removed(&url),
        }
    }

    async fn updated(&self, url: &ResourceUrl) -> Handled {
        let previous = self.kitchen.with_graph(|graph| {
            let info = graph.get_mut(url.as_str())?;
            let hash = info.is_valid().then(|| info.content_hash().map(str::to_string));
            info.invalidate();
            hash.flatten()
        });

        let cooked = match self.kitchen.cook(url).await {
            Ok(cooked) => cooked,
            Err(e) => {
                let report = e.report();
                let event = LiveEvent::full(url, e.to_string(), self.kitchen.root());
                let rooms = self.publish(url, &event);
                return Handled::Failed {
                    event,
                    rooms,
                    report,
                };
            }
        };
        if previous.as_deref() == Some(cooked.content_hash.as_str()) {
            return Handled::Unchanged;
        }

        // no suspension between the decision and publishing it
        let (outcome, entries) = self.kitchen.with_graph(|graph| {
            (hot::decide(graph, url), graph.dependent_entries(url.as_str()))
        });
        let event = LiveEvent::from_outcome(url, &outcome, self.kitchen.root());
        let rooms = self.publish_to(&entries, &event);
        Handled::Published { event, rooms }
    }

    fn removed(&self, url: &ResourceUrl) -> Handled {
        self.kitchen.invalidate(url);
        let event = LiveEvent::full(url, "removed", self.kitchen.root());
        let rooms = self.publish(url, &event);
        Handled::Published { event, rooms }
    }

    fn publish(&self, url: &ResourceUrl, event: &LiveEvent) -> usize {
        let entries = self
            .kitchen
            .with_graph(|graph| graph.dependent_entries(url.as_str()));
        self.publish_to(&entries, event)
    }

    fn publish_to(&self, entries: &[ResourceUrl], event: &LiveEvent) -> usize {
        let rooms = self.rooms.rooms_for(entries);
        for room in &rooms {
            let reached = room.publish(event);
            crate::debug!("reload"; "{} -> {} subscriber(s)", room.entry(), reached);
        }
        rooms.len()
    }
}

fn report(change: &FileChange, handled: &Handled) {
    let path = change.path();
    match handled {
        Handled::Ignored => {}
        Handled::Unchanged => status_unchanged(&format!("unchanged: {path}")),
        Handled::Published { event, rooms } => {
            let kind = match event.kind() {
                ReloadKind::Hot => "hot update",
                ReloadKind::Full => "full reload",
            };
            status_success(&format!("{kind}: {path} ({})", plural_count(*rooms, "room")));
        }
        Handled::Failed { report, .. } => status_error(&format!("failed: {path}"), report),
    }
}
