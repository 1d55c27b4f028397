//! `[reload]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [reload]
//! history = 32        # Events replayed to a subscriber that joins late
//! rooms = 16          # Open rooms before the oldest is evicted
//! debounce_ms = 100   # Quiet period before a batch of changes is handled
//! cooldown_ms = 300   # Minimum spacing between two batches
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::actor::fs::Timing;
use crate::config::ConfigDiagnostics;

/// Live update settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Events retained per room.
    pub history: usize,

    /// Room registry capacity.
    pub rooms: usize,

    pub debounce_ms: u64,

    pub cooldown_ms: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            history: 32,
            rooms: 16,
            debounce_ms: 100,
            cooldown_ms: 300,
        }
    }
}

impl ReloadConfig {
    pub fn timing(&self) -> Timing {
        Timing {
            debounce: Duration::from_millis(self.debounce_ms),
            cooldown: Duration::from_millis(self.cooldown_ms),
        }
    }

    pub(crate) fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.history == 0 {
            diag.error_with_hint(
                "reload.history",
                "must be at least 1",
                "late subscribers replay this many events",
            );
        }
        if self.rooms == 0 {
            diag.error("reload.rooms", "must be at least 1");
        }
    }
}
