//! Live update hook injected into served documents.
//!
//! The browser runtime is not part of this server; documents only learn
//! where their room lives:
//!
//! ```html
//! <meta name="simmer-live" content="ws://localhost:35730/?entry=%2Findex.html">
//! ```

/// Tag pointing a document at the live update room of `entry_path`.
pub fn live_tag(host: &str, ws_port: u16, entry_path: &str) -> String {
    let entry: String = url::form_urlencoded::byte_serialize(entry_path.as_bytes()).collect();
    format!(r#"<meta name="simmer-live" content="ws://{host}:{ws_port}/?entry={entry}">"#)
}

/// Host name the browser used to reach us, without the port.
pub fn request_host(host_header: Option<&str>) -> &str {
    let host = host_header.map(str::trim).filter(|h| !h.is_empty());
    match host {
        // [::1]:5280
        Some(h) if h.starts_with('[') => h.split_inclusive(']').next().unwrap_or(h),
        Some(h) => h.split(':').next().unwrap_or(h),
        None => "localhost",
    }
}

/// Inject `tag` before the last `</body>` tag, or append it.
pub fn inject_live_tag(content: &[u8], tag: &str) -> Vec<u8> {
    const PATTERN: &[u8] = b"</body>";

    let tag = tag.as_bytes();
    let mut result = Vec::with_capacity(content.len() + tag.len());
    match content
        .windows(PATTERN.len())
        .rposition(|w| w.eq_ignore_ascii_case(PATTERN))
    {
        Some(pos) => {
            result.extend_from_slice(&content[..pos]);
            result.extend_from_slice(tag);
            result.extend_from_slice(&content[pos..]);
        }
        // browsers accept trailing markup
        None => {
            result.extend_from_slice(content);
            result.extend_from_slice(tag);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_tag_encodes_entry() {
        assert_eq!(
            live_tag("localhost", 35730, "/docs/a b.html"),
            r#"<meta name="simmer-live" content="ws://localhost:35730/?entry=%2Fdocs%2Fa+b.html">"#
        );
    }

    #[test]
    fn test_request_host() {
        assert_eq!(request_host(Some("127.0.0.1:5280")), "127.0.0.1");
        assert_eq!(request_host(Some("example.test")), "example.test");
        assert_eq!(request_host(Some("[::1]:5280")), "[::1]");
        assert_eq!(request_host(None), "localhost");
    }

    #[test]
    fn test_inject_before_last_body_end() {
        let html = b"<body><p>x</p></BODY>";
        assert_eq!(inject_live_tag(html, "<m>"), b"<body><p>x</p><m></BODY>");
        assert_eq!(inject_live_tag(b"<p>x</p>", "<m>"), b"<p>x</p><m>");
    }
}
