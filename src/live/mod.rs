//! Live update channel.
//!
//! ```text
//! change handler --LiveEvent--> Room (history + broadcast) --> subscribers
//!                                 ^
//!          RoomRegistry ----------+ one room per entry document
//! ```
//!
//! The registry holds at most `capacity` rooms and evicts the oldest one
//! past that, telling the eviction listener which entry went away. The first room starts the filesystem watch; every room holds
//! a share of it and the watch stops when the last room is gone.

mod event;
mod room;
pub mod server;

#[cfg(test)]
mod tests;

pub use event::{LiveEvent, Reload, ReloadKind};
pub use room::{Payload, Room, Subscription};

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use anyhow::Result;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::ResourceUrl;

/// Keeps a running watch alive until dropped.
pub struct WatchHandle {
    _inner: Box<dyn Send + Sync>,
}

impl WatchHandle {
    pub fn new(inner: impl Send + Sync + 'static) -> Self {
        Self {
            _inner: Box::new(inner),
        }
    }
}

type WatchStarter = Box<dyn Fn() -> Result<WatchHandle> + Send + Sync>;
type EvictListener = Box<dyn Fn(&ResourceUrl) + Send + Sync>;

/// Bounded set of rooms keyed by entry url.
pub struct RoomRegistry {
    capacity: usize,
    history: usize,
    rooms: Mutex<Rooms>,
    starter: Option<WatchStarter>,
    on_evict: Option<EvictListener>,
    watch: Mutex<Weak<WatchHandle>>,
}

#[derive(Default)]
struct Rooms {
    by_entry: FxHashMap<ResourceUrl, Arc<Room>>,
    /// Entries in creation order
    order: VecDeque<ResourceUrl>,
    closed: bool,
}

impl RoomRegistry {
    pub fn new(capacity: usize, history: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            history,
            rooms: Mutex::new(Rooms::default()),
            starter: None,
            on_evict: None,
            watch: Mutex::new(Weak::new()),
        }
    }

    /// Start `starter` when the first room is created.
    pub fn with_watch(
        mut self,
        starter: impl Fn() -> Result<WatchHandle> + Send + Sync + 'static,
    ) -> Self {
        self.starter = Some(Box::new(starter));
        self
    }

    /// Call `listener` with the entry of every evicted room.
    ///
    /// Runs after the registry lock is released.
    pub fn with_eviction(
        mut self,
        listener: impl Fn(&ResourceUrl) + Send + Sync + 'static,
    ) -> Self {
        self.on_evict = Some(Box::new(listener));
        self
    }

    /// Room for `entry`, created on first use.
    ///
    /// `None` after shutdown.
    pub fn get_or_create(&self, entry: &ResourceUrl) -> Option<Arc<Room>> {
        let (room, evicted) = self.open(entry)?;
        if let Some(listener) = &self.on_evict {
            for entry in &evicted {
                listener(entry);
            }
        }
        Some(room)
    }

    fn open(&self, entry: &ResourceUrl) -> Option<(Arc<Room>, Vec<ResourceUrl>)> {
        let mut rooms = self.rooms.lock();
        if rooms.closed {
            return None;
        }
        if let Some(room) = rooms.by_entry.get(entry) {
            return Some((Arc::clone(room), Vec::new()));
        }

        let room = Arc::new(Room::new(entry.clone(), self.history, self.shared_watch()));
        rooms.by_entry.insert(entry.clone(), Arc::clone(&room));
        rooms.order.push_back(entry.clone());
        crate::debug!("live"; "room opened: {} ({} total)", entry, rooms.order.len());

        let mut evicted = Vec::new();
        while rooms.order.len() > self.capacity {
            let Some(oldest) = rooms.order.pop_front() else {
                break;
            };
            if let Some(old) = rooms.by_entry.remove(&oldest) {
                old.release();
                crate::debug!("live"; "room evicted: {}", oldest);
                evicted.push(oldest);
            }
        }
        Some((room, evicted))
    }

    pub fn get(&self, entry: &ResourceUrl) -> Option<Arc<Room>> {
        self.rooms.lock().by_entry.get(entry).cloned()
    }

    /// All open rooms, oldest first.
    pub fn rooms(&self) -> Vec<Arc<Room>> {
        let rooms = self.rooms.lock();
        rooms
            .order
            .iter()
            .filter_map(|entry| rooms.by_entry.get(entry).cloned())
            .collect()
    }

    /// Open rooms whose entry is one of `entries`, oldest first.
    pub fn rooms_for(&self, entries: &[ResourceUrl]) -> Vec<Arc<Room>> {
        let wanted: FxHashSet<&ResourceUrl> = entries.iter().collect();
        self.rooms()
            .into_iter()
            .filter(|room| wanted.contains(room.entry()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the shared watch is running.
    pub fn is_watching(&self) -> bool {
        self.watch.lock().strong_count() > 0
    }

    /// Release every room. Later `get_or_create` calls return `None`.
    pub fn shutdown(&self) {
        let mut rooms = self.rooms.lock();
        rooms.closed = true;
        rooms.order.clear();
        for (_, room) in rooms.by_entry.drain() {
            room.release();
        }
        crate::debug!("live"; "all rooms released");
    }

    fn shared_watch(&self) -> Option<Arc<WatchHandle>> {
        let starter = self.starter.as_ref()?;
        let mut shared = self.watch.lock();
        if let Some(watch) = shared.upgrade() {
            return Some(watch);
        }
        match starter() {
            Ok(handle) => {
                let handle = Arc::new(handle);
                *shared = Arc::downgrade(&handle);
                crate::debug!("watch"; "started");
                Some(handle)
            }
            Err(e) => {
                crate::log!("watch"; "failed to start: {:#}", e);
                None
            }
        }
    }
}

impl std::fmt::Debug for RoomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomRegistry")
            .field("capacity", &self.capacity)
            .field("history", &self.history)
            .field("rooms", &self.len())
            .finish()
    }
}
