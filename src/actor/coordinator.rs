//! Actor Coordinator - wires up the live update actors.
//!
//! ```text
//! RoomRegistry --first room--> FsActor --ReloadMsg--> ReloadActor --LiveEvent--> rooms
//! ```
//!
//! The watcher is not started here: the registry starts it when the first
//! room opens and stops it when the last room is gone.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use crossbeam::channel::Receiver;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::fs::{FsActor, Timing};
use super::messages::ReloadMsg;
use super::reload::ReloadActor;
use crate::config::SimmerConfig;
use crate::kitchen::Kitchen;
use crate::live::{RoomRegistry, WatchHandle};

const CHANNEL_BUFFER: usize = 32;

/// Aborts the watcher task when the last room lets go of it.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        crate::debug!("watch"; "releasing watcher");
        self.0.abort();
    }
}

pub struct Coordinator {
    kitchen: Arc<Kitchen>,
    rooms: Arc<RoomRegistry>,
    reload_tx: mpsc::Sender<ReloadMsg>,
    actor: ReloadActor,
}

impl Coordinator {
    /// Build the room registry and the change handler.
    ///
    /// `handle` is the runtime the watcher gets spawned on; rooms are opened
    /// from server threads outside of it.
    pub fn new(config: &SimmerConfig, kitchen: Arc<Kitchen>, handle: Handle) -> Self {
        let (reload_tx, reload_rx) = mpsc::channel::<ReloadMsg>(CHANNEL_BUFFER);

        let released = Arc::clone(&kitchen);
        let mut rooms = RoomRegistry::new(config.reload.rooms, config.reload.history)
            .with_eviction(move |entry| {
                released.release_entry(entry);
            });
        if config.serve.watch {
            rooms = rooms.with_watch(watch_starter(
                config.root().to_path_buf(),
                config.build.ignore.clone(),
                config.reload.timing(),
                reload_tx.clone(),
                handle,
            ));
        }
        let rooms = Arc::new(rooms);
        let actor = ReloadActor::new(reload_rx, Arc::clone(&kitchen), Arc::clone(&rooms));

        Self {
            kitchen,
            rooms,
            reload_tx,
            actor,
        }
    }

    pub fn rooms(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.rooms)
    }

    /// Run until `shutdown_rx` fires, then abort cooks and release every room.
    pub async fn run(self, shutdown_rx: Receiver<()>) {
        let Self {
            kitchen,
            rooms,
            reload_tx,
            actor,
        } = self;

        crate::debug!("actor"; "start");
        let actor_handle = tokio::spawn(actor.run());

        loop {
            if shutdown_rx.try_recv().is_ok() {
                crate::debug!("actor"; "shutdown signal received");
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        kitchen.shutdown();
        rooms.shutdown();
        let _ = reload_tx.send(ReloadMsg::Shutdown).await;
        let _ = tokio::time::timeout(Duration::from_millis(500), actor_handle).await;
        crate::debug!("actor"; "stopped");
    }
}

fn watch_starter(
    root: PathBuf,
    ignore: Vec<String>,
    timing: Timing,
    reload_tx: mpsc::Sender<ReloadMsg>,
    handle: Handle,
) -> impl Fn() -> Result<WatchHandle> + Send + Sync + 'static {
    move || {
        let actor = FsActor::new(root.clone(), ignore.clone(), timing, reload_tx.clone())
            .map_err(|e| anyhow!("watcher failed: {}", e))?;
        let task = handle.spawn(actor.run());
        Ok(WatchHandle::new(AbortOnDrop(task.abort_handle())))
    }
}
