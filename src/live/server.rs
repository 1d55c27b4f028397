//! WebSocket listener for live update subscribers.
//!
//! A subscriber picks its room with the request query (`/?entry=/index.html`),
//! receives the room's buffered history, then every new event. One thread per
//! subscriber; the thread ends when the room is released or the socket fails.

use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::sync::broadcast::error::RecvError;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::protocol::Message;

use super::{Payload, RoomRegistry};
use crate::core::{ResourceUrl, Shutdown};

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;

/// Bind the listener and spawn the acceptor thread. Returns the bound port.
pub fn start(
    interface: IpAddr,
    base_port: u16,
    rooms: Arc<RoomRegistry>,
    root: ResourceUrl,
    shutdown: Arc<Shutdown>,
) -> Result<u16> {
    let (listener, port) = try_bind_port(interface, base_port, MAX_PORT_RETRIES)?;
    listener.set_nonblocking(true)?;

    std::thread::spawn(move || {
        while !shutdown.is_requested() {
            match listener.accept() {
                Ok((stream, addr)) => {
                    crate::debug!("live"; "subscriber connected: {}", addr);
                    let _ = stream.set_nonblocking(false);
                    let rooms = Arc::clone(&rooms);
                    let root = root.clone();
                    std::thread::spawn(move || {
                        if let Err(e) = serve_subscriber(stream, &rooms, &root) {
                            crate::debug!("live"; "subscriber {}: {:#}", addr, e);
                        }
                    });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    crate::log!("live"; "accept error: {}", e);
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }
        crate::debug!("live"; "listener stopped");
    });

    Ok(port)
}

fn serve_subscriber(stream: TcpStream, rooms: &RoomRegistry, root: &ResourceUrl) -> Result<()> {
    let mut entry = None;
    let mut ws = tungstenite::accept_hdr(stream, |request: &Request, response: Response| {
        entry = request
            .uri()
            .query()
            .and_then(entry_param)
            .and_then(|path| ResourceUrl::from_server_path(root, &path));
        match entry {
            Some(_) => Ok(response),
            None => Err(reject("missing or invalid `entry` query")),
        }
    })
    .map_err(|e| anyhow!("handshake failed: {e}"))?;

    let entry = entry.context("no entry")?;
    let Some(subscription) = rooms.get_or_create(&entry).and_then(|room| room.subscribe())
    else {
        let _ = ws.close(None);
        return Ok(());
    };
    crate::debug!("live"; "replaying {} events for {}", subscription.backlog.len(), entry);

    for payload in subscription.backlog {
        send(&mut ws, payload)?;
    }

    let mut receiver = subscription.receiver;
    loop {
        match receiver.blocking_recv() {
            Ok(payload) => send(&mut ws, payload)?,
            Err(RecvError::Lagged(missed)) => {
                crate::debug!("live"; "subscriber of {} missed {} events", entry, missed);
            }
            Err(RecvError::Closed) => break,
        }
    }
    let _ = ws.close(None);
    let _ = ws.flush();
    Ok(())
}

fn send(ws: &mut tungstenite::WebSocket<TcpStream>, payload: Payload) -> Result<()> {
    ws.send(Message::Text(payload.as_ref().into()))
        .context("subscriber went away")
}

/// Value of the `entry` query parameter.
fn entry_param(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "entry")
        .map(|(_, value)| value.into_owned())
        .filter(|value| value.starts_with('/'))
}

fn reject(reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
}

/// Try binding to port, retry with incremented port if in use
pub(crate) fn try_bind_port(
    interface: IpAddr,
    base_port: u16,
    max_retries: u16,
) -> Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind(SocketAddr::new(interface, port)) {
            Ok(listener) => {
                let actual_port = listener.local_addr()?.port();
                return Ok((listener, actual_port));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow!(
        "failed to bind WebSocket server after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}
