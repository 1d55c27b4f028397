//! `[serve]` section configuration.
//!
//! Contains development server settings.
//!
//! # Example
//!
//! ```toml
//! [serve]
//! interface = "127.0.0.1"     # Network interface (127.0.0.1 = localhost only)
//! port = 5280                 # HTTP port number
//! ws_port = 35730             # Live update WebSocket port
//! watch = true                # Push live updates on file changes
//! ```
//!
//! Use `interface = "0.0.0.0"` to make the server accessible from LAN.
//! Both ports are starting points: if taken, the next free port is used.

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;

/// Development server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    pub interface: IpAddr,

    /// HTTP port number.
    pub port: u16,

    /// Live update WebSocket port.
    pub ws_port: u16,

    /// Enable file watcher for live updates.
    pub watch: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 5280,
            ws_port: 35730,
            watch: true,
        }
    }
}

impl ServeConfig {
    pub(crate) fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.port == 0 {
            diag.error("serve.port", "port must be between 1 and 65535");
        }
        if self.ws_port == 0 {
            diag.error("serve.ws_port", "port must be between 1 and 65535");
        }
        if self.port == self.ws_port {
            diag.error_with_hint(
                "serve.ws_port",
                "must differ from serve.port",
                format!("try ws_port = {}", ServeConfig::default().ws_port),
            );
        }
    }
}
