//! One live update room per served entry document.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{LiveEvent, WatchHandle};
use crate::core::ResourceUrl;

/// Serialized event as sent on the wire.
pub type Payload = Arc<str>;

/// Events retained per room plus a fan-out channel for live subscribers.
///
/// Publishing and subscribing happen under the same lock, so a subscriber
/// sees every event exactly once: either in its backlog or on its receiver.
pub struct Room {
    entry: ResourceUrl,
    state: Mutex<RoomState>,
}

struct RoomState {
    history: VecDeque<Payload>,
    limit: usize,
    /// `None` once the room is released
    sender: Option<broadcast::Sender<Payload>>,
    watch: Option<Arc<WatchHandle>>,
}

/// Snapshot of a room at subscription time.
pub struct Subscription {
    /// Buffered events, oldest first
    pub backlog: Vec<Payload>,
    /// Events published after the snapshot
    pub receiver: broadcast::Receiver<Payload>,
}

impl Room {
    pub(super) fn new(entry: ResourceUrl, limit: usize, watch: Option<Arc<WatchHandle>>) -> Self {
        let (sender, _) = broadcast::channel(limit.max(16));
        Self {
            entry,
            state: Mutex::new(RoomState {
                history: VecDeque::with_capacity(limit),
                limit,
                sender: Some(sender),
                watch,
            }),
        }
    }

    pub fn entry(&self) -> &ResourceUrl {
        &self.entry
    }

    /// Record `event` and push it to current subscribers.
    ///
    /// Returns the number of subscribers reached.
    pub fn publish(&self, event: &LiveEvent) -> usize {
        let payload: Payload = Arc::from(event.to_json());
        let mut state = self.state.lock();
        let Some(sender) = state.sender.clone() else {
            crate::debug!("live"; "dropped event for released room {}", self.entry);
            return 0;
        };

        if state.limit > 0 {
            if state.history.len() == state.limit {
                state.history.pop_front();
            }
            state.history.push_back(Arc::clone(&payload));
        }
        sender.send(payload).unwrap_or(0)
    }

    /// Buffered history plus a receiver for what follows.
    ///
    /// `None` once the room is released.
    pub fn subscribe(&self) -> Option<Subscription> {
        let state = self.state.lock();
        let sender = state.sender.as_ref()?;
        Some(Subscription {
            backlog: state.history.iter().cloned().collect(),
            receiver: sender.subscribe(),
        })
    }

    pub fn history(&self) -> Vec<Payload> {
        self.state.lock().history.iter().cloned().collect()
    }

    pub fn subscribers(&self) -> usize {
        self.state
            .lock()
            .sender
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().sender.is_none()
    }

    /// Drop history, close subscriber channels and let go of the watch.
    pub(super) fn release(&self) {
        let mut state = self.state.lock();
        state.history.clear();
        state.sender = None;
        state.watch = None;
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Room")
            .field("entry", &self.entry)
            .field("history", &state.history.len())
            .field("released", &state.sender.is_none())
            .finish()
    }
}
