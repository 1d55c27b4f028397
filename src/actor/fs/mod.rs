//! FileSystem Actor
//!
//! Watches the project root and sends debounced, root-relative changes to
//! the change handler. The watcher is attached before `run`, so nothing that
//! happens in between is lost.
//!
//! ```text
//! Watcher → Debouncer (pure timing) → EventClassifier (root-relative) → ReloadMsg
//! ```

use std::path::PathBuf;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::messages::ReloadMsg;

// Raw changes -> root-relative file changes.
mod classifier;
// Pure timing and deduplication.
mod debouncer;
// Shared fs event types.
mod types;

#[cfg(test)]
mod tests;

pub use debouncer::Timing;

use classifier::EventClassifier;
use debouncer::Debouncer;

/// FileSystem Actor - watches for file changes
pub struct FsActor {
    /// Channel to receive notify events (sync -> async bridge)
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// Watcher handle (must be kept alive)
    watcher: RecommendedWatcher,
    classifier: EventClassifier,
    reload_tx: mpsc::Sender<ReloadMsg>,
    debouncer: Debouncer,
}

impl FsActor {
    /// Start watching `root` recursively. Events buffer until `run`.
    pub fn new(
        root: PathBuf,
        ignore: Vec<String>,
        timing: Timing,
        reload_tx: mpsc::Sender<ReloadMsg>,
    ) -> notify::Result<Self> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        crate::debug!("watch"; "watching {}", root.display());

        Ok(Self {
            notify_rx,
            watcher,
            classifier: EventClassifier::new(root, ignore),
            reload_tx,
            debouncer: Debouncer::new(timing),
        })
    }

    /// Run the actor event loop until the change handler goes away.
    pub async fn run(self) {
        let Self {
            notify_rx,
            watcher,
            classifier,
            reload_tx,
            mut debouncer,
        } = self;

        let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(64);

        // notify has no async API; the thread ends when the watcher is dropped
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        loop {
            tokio::select! {
                biased;
                Some(event) = async_rx.recv() => debouncer.add_event(&event),
                _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                    if deliver(&mut debouncer, &classifier, &reload_tx).await.is_err() {
                        break;
                    }
                }
            }
        }

        drop(watcher);
        crate::debug!("watch"; "stopped");
    }
}

/// Send one batch of changes if the debouncer is ready.
///
/// Returns `Err(())` if the change handler shut down.
async fn deliver(
    debouncer: &mut Debouncer,
    classifier: &EventClassifier,
    reload_tx: &mpsc::Sender<ReloadMsg>,
) -> Result<(), ()> {
    let Some(raw) = debouncer.take_if_ready() else {
        return Ok(());
    };

    let changes = classifier.classify(raw);
    if changes.is_empty() {
        return Ok(());
    }

    crate::debug_do! {
        for change in &changes {
            crate::debug!("watch"; "{}: {}", change.label(), change.path());
        }
    }

    reload_tx
        .send(ReloadMsg::Changes(changes))
        .await
        .map_err(|_| ())
}
