//! Server lifecycle management.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Result;
use tiny_http::Server;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::log;

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

/// Bind to the specified interface and port, with automatic port retry.
pub fn bind_with_retry(interface: IpAddr, base_port: u16) -> Result<(Server, SocketAddr)> {
    let mut last_error = None;
    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                let addr = server.server_addr().to_ip().unwrap_or(addr);
                return Ok((server, addr));
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(anyhow::anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        MAX_PORT_RETRIES,
        base_port,
        base_port.saturating_add(MAX_PORT_RETRIES - 1),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

/// Wait for the actor system to wind down (max 2 seconds).
pub fn wait_for_shutdown(runtime: &Runtime, actors: JoinHandle<()>) {
    runtime.block_on(async {
        if tokio::time::timeout(Duration::from_secs(2), actors).await.is_err() {
            crate::debug!("serve"; "actors did not stop in time");
        }
    });
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn test_bind_with_retry_skips_taken_port() {
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let (_first, addr) = bind_with_retry(localhost, 0).unwrap();
        let (_second, next) = bind_with_retry(localhost, addr.port()).unwrap();
        assert_ne!(addr.port(), next.port());
    }
}
