//! HTTP response handlers.

use anyhow::{Result, anyhow};
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::kitchen::CookError;
use crate::utils::mime::types::{HTML, PLAIN};

/// Respond with cooked content.
pub fn respond_cooked(request: Request, content_type: &str, body: Vec<u8>) -> Result<()> {
    if is_head_request(&request) {
        return send_head(request, 200, content_type);
    }
    send_body(request, 200, content_type, body)
}

/// Respond with 404.
pub fn respond_not_found(request: Request) -> Result<()> {
    if is_head_request(&request) {
        return send_head(request, 404, PLAIN);
    }
    send_body(request, 404, PLAIN, b"404 Not Found".to_vec())
}

/// Respond with 503 Service Unavailable (server shutting down).
pub fn respond_unavailable(request: Request) -> Result<()> {
    send_body(request, 503, PLAIN, b"503 Service Unavailable".to_vec())
}

/// Respond with a cook failure (500): the error and its reference trace.
pub fn respond_cook_error(request: Request, error: &CookError) -> Result<()> {
    send_body(request, 500, HTML, error_page(error).into_bytes())
}

pub(super) fn error_page(error: &CookError) -> String {
    let report = error.report();
    let msg = crate::utils::html::escape(&report);
    format!(
        "<!DOCTYPE html>\n<html><body><h1>{}</h1><pre>{msg}</pre></body></html>",
        error.kind
    )
}

fn is_head_request(request: &Request) -> bool {
    request.method() == &Method::Head
}

fn send_head(request: Request, status: u16, content_type: &str) -> Result<()> {
    let response = Response::empty(StatusCode(status))
        .with_header(make_header("Content-Type", content_type)?)
        .with_header(make_header("Cache-Control", "no-cache")?);
    request.respond(response)?;
    Ok(())
}

fn send_body(request: Request, status: u16, content_type: &str, body: Vec<u8>) -> Result<()> {
    let response = Response::from_data(body)
        .with_status_code(StatusCode(status))
        .with_header(make_header("Content-Type", content_type)?)
        .with_header(make_header("Cache-Control", "no-cache")?);
    request.respond(response)?;
    Ok(())
}

fn make_header(key: &str, value: &str) -> Result<Header> {
    Header::from_bytes(key, value).map_err(|()| anyhow!("invalid header {key}: {value}"))
}
