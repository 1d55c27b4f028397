use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use super::*;
use crate::kitchen::{BoxFuture, Draft, Plugin, Transformed};

/// Fails every transform of content containing `@@broken`.
struct Broken;

impl Plugin for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn transform_content<'a>(
        &'a self,
        draft: &'a Draft,
    ) -> BoxFuture<'a, Result<Option<Transformed>>> {
        let result = match draft.content.as_text() {
            Some(text) if text.contains("@@broken") => Err(anyhow!("unexpected token")),
            _ => Ok(None),
        };
        Box::pin(std::future::ready(result))
    }
}

struct Site {
    _dir: TempDir,
    ctx: Arc<Context>,
    addr: SocketAddr,
}

fn site() -> Site {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("index.html"),
        "<html><body>\n<script type=\"module\" src=\"/app.js\"></script>\n</body></html>",
    )
    .unwrap();
    std::fs::write(dir.path().join("app.js"), "import.meta.hot.accept();").unwrap();
    std::fs::write(dir.path().join("bad.css"), "@@broken").unwrap();

    let config = SimmerConfig::rooted_at(dir.path());
    let root = ResourceUrl::from_dir_path(config.root()).unwrap();
    let kitchen = Kitchen::new(
        root.clone(),
        BuildMode::DEVELOPMENT,
        builtin::plugins(&root).with(Broken),
    );
    let ctx = Arc::new(Context {
        config: Arc::new(config),
        kitchen,
        rooms: Arc::new(RoomRegistry::new(4, 8)),
        shutdown: Shutdown::new(),
    });

    let (server, addr) = lifecycle::bind_with_retry(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).unwrap();
    let server = Arc::new(server);
    ctx.shutdown.register_server(Arc::clone(&server));
    let handle = Handle::current();
    let loop_ctx = Arc::clone(&ctx);
    std::thread::spawn(move || run_request_loop(&server, &loop_ctx, 35730, &handle));

    Site {
        _dir: dir,
        ctx,
        addr,
    }
}

/// Raw HTTP/1.0 GET: (status, full response text).
fn get(addr: SocketAddr, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).unwrap();
    write!(stream, "GET {path} HTTP/1.0\r\nHost: localhost:{}\r\n\r\n", addr.port()).unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    let status = response.split(' ').nth(1).unwrap().parse().unwrap();
    (status, response)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_document_gets_room_and_live_tag() {
    let site = site();
    let (status, response) = get(site.addr, "/");

    assert_eq!(status, 200);
    assert!(response.contains("text/html"));
    assert!(response.contains(
        r#"<meta name="simmer-live" content="ws://localhost:35730/?entry=%2Findex.html"></body>"#
    ));

    let index = site.ctx.kitchen.root().join("index.html").unwrap();
    assert!(site.ctx.rooms.get(&index).is_some());
    assert!(
        site.ctx
            .kitchen
            .with_graph(|graph| graph.get(index.as_str()).unwrap().is_pinned())
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_script_served_without_room() {
    let site = site();
    let (status, response) = get(site.addr, "/app.js");

    assert_eq!(status, 200);
    assert!(response.contains("text/javascript"));
    assert!(response.ends_with("import.meta.hot.accept();"));
    assert!(site.ctx.rooms.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_file_is_404() {
    let site = site();
    assert_eq!(get(site.addr, "/nope.js").0, 404);
    assert_eq!(get(site.addr, "/../etc/passwd").0, 404);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cook_failure_is_500_with_trace() {
    let site = site();
    let (status, response) = get(site.addr, "/bad.css");

    assert_eq!(status, 500);
    assert!(response.contains("TRANSFORM_ERROR"));
    assert!(response.contains("unexpected token"));
    assert!(response.contains("broken"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_error_page_escapes_report() {
    let url = ResourceUrl::parse("file:///site/a.js").unwrap();
    let error = crate::kitchen::CookError::hook(
        &url,
        "transformContent",
        "x",
        &anyhow!("<script>alert(1)</script>"),
    );
    let page = response::error_page(&error);
    assert!(page.contains("&lt;script&gt;"));
    assert!(!page.contains("<script>"));
}
