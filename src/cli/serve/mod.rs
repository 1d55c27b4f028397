//! Development server with live updates.
//!
//! ```text
//! browser ──GET──► tiny_http ──► Kitchen::cook ──► cooked content (+ live tag for markup)
//!         ──WS───► live::server ──► room of the document ◄── ReloadActor ◄── FsActor
//! ```
//!
//! Markup documents served to the browser become pinned entry points with a
//! live update room of their own.

mod content;
mod lifecycle;
mod response;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use tiny_http::{Request, Server};
use tokio::runtime::{Handle, Runtime};

use crate::actor::Coordinator;
use crate::config::SimmerConfig;
use crate::core::{BuildMode, ResourceUrl, Shutdown};
use crate::kitchen::{Kitchen, builtin};
use crate::live::{self, RoomRegistry};
use crate::log;
use crate::utils::mime::ResourceClass;

/// Everything a serve session shares.
pub struct Context {
    pub config: Arc<SimmerConfig>,
    pub kitchen: Arc<Kitchen>,
    pub rooms: Arc<RoomRegistry>,
    pub shutdown: Arc<Shutdown>,
}

/// Run the dev server until Ctrl+C.
pub fn serve(config: SimmerConfig, shutdown: Arc<Shutdown>, runtime: &Runtime) -> Result<()> {
    let root = ResourceUrl::from_dir_path(config.root())
        .with_context(|| format!("invalid root: {}", config.root().display()))?;
    let kitchen = Kitchen::new(root.clone(), BuildMode::DEVELOPMENT, builtin::plugins(&root));
    let coordinator = Coordinator::new(&config, Arc::clone(&kitchen), runtime.handle().clone());

    let ctx = Arc::new(Context {
        config: Arc::new(config),
        rooms: coordinator.rooms(),
        kitchen,
        shutdown,
    });

    let serve = &ctx.config.serve;
    let (server, addr) = lifecycle::bind_with_retry(serve.interface, serve.port)?;
    let server = Arc::new(server);
    ctx.shutdown.register_server(Arc::clone(&server));

    let ws_port = live::server::start(
        serve.interface,
        serve.ws_port,
        Arc::clone(&ctx.rooms),
        root,
        Arc::clone(&ctx.shutdown),
    )?;

    log!("serve"; "http://{}", addr);
    log!("live"; "ws://{}:{}", addr.ip(), ws_port);
    if !serve.watch {
        log!("serve"; "watching disabled, pages will not update live");
    }

    let actors = runtime.spawn(coordinator.run(ctx.shutdown.subscribe()));
    run_request_loop(&server, &ctx, ws_port, runtime.handle());

    ctx.shutdown.trigger();
    lifecycle::wait_for_shutdown(runtime, actors);
    Ok(())
}

fn run_request_loop(server: &Server, ctx: &Arc<Context>, ws_port: u16, handle: &Handle) {
    for request in server.incoming_requests() {
        let ctx = Arc::clone(ctx);
        let runtime = handle.clone();
        // cooking blocks on the runtime; keep it off the accept loop
        handle.spawn_blocking(move || {
            if let Err(e) = handle_request(request, &ctx, ws_port, &runtime) {
                log!("serve"; "request error: {e}");
            }
        });
    }
}

/// Handle a single HTTP request
fn handle_request(request: Request, ctx: &Context, ws_port: u16, handle: &Handle) -> Result<()> {
    if ctx.shutdown.is_requested() {
        return response::respond_unavailable(request);
    }

    let Some(url) = ResourceUrl::from_server_path(ctx.kitchen.root(), request.url()) else {
        return response::respond_not_found(request);
    };

    let cooked = match handle.block_on(ctx.kitchen.cook(&url)) {
        Ok(cooked) => cooked,
        Err(e) if e.is_not_found() => {
            crate::debug!("serve"; "404 {}", request.url());
            return response::respond_not_found(request);
        }
        Err(e) => {
            crate::logger::status_error(&format!("failed: {}", request.url()), &e.report());
            return response::respond_cook_error(request, &e);
        }
    };

    if ResourceClass::of(&cooked.content_type) != ResourceClass::Markup {
        return response::respond_cooked(
            request,
            &cooked.content_type,
            cooked.content.as_bytes().to_vec(),
        );
    }

    ctx.kitchen.register_entry(&url);
    if ctx.rooms.get_or_create(&url).is_none() {
        return response::respond_unavailable(request);
    }

    let host = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Host"))
        .map(|h| h.value.as_str());
    let tag = content::live_tag(content::request_host(host), ws_port, &cooked.generated_url);
    let body = content::inject_live_tag(cooked.content.as_bytes(), &tag);
    response::respond_cooked(request, &cooked.content_type, body)
}

#[cfg(test)]
mod tests;
