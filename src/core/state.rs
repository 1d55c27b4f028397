//! Shutdown state for serve mode.
//!
//! One `Shutdown` per process context. The Ctrl+C handler flips the flag,
//! unblocks the HTTP server and notifies every registered listener.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tiny_http::Server;

/// Process-scoped shutdown signal.
#[derive(Default)]
pub struct Shutdown {
    requested: AtomicBool,
    server: Mutex<Option<Arc<Server>>>,
    listeners: Mutex<Vec<Sender<()>>>,
}

impl Shutdown {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Install the Ctrl+C handler. Call once at program start.
    ///
    /// - Before a server is registered: exit immediately
    /// - After: graceful shutdown (unblock server, notify listeners)
    pub fn install_handler(self: &Arc<Self>) -> anyhow::Result<()> {
        let this = Arc::clone(self);
        ctrlc::set_handler(move || {
            if this.server.lock().is_none() {
                std::process::exit(0);
            }
            crate::log!("serve"; "shutting down...");
            this.trigger();
        })
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
    }

    /// Register the HTTP server so shutdown can unblock its request loop.
    pub fn register_server(&self, server: Arc<Server>) {
        *self.server.lock() = Some(server);
    }

    /// Subscribe to the shutdown notification.
    pub fn subscribe(&self) -> Receiver<()> {
        let (tx, rx) = channel::bounded(1);
        if self.is_requested() {
            let _ = tx.send(());
        } else {
            self.listeners.lock().push(tx);
        }
        rx
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        if self.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        for tx in self.listeners.lock().drain(..) {
            let _ = tx.try_send(());
        }
        if let Some(server) = self.server.lock().as_ref() {
            server.unblock();
        }
    }

    /// Check if shutdown has been requested.
    ///
    /// Uses Relaxed ordering: worst case is handling a few more requests.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }
}
