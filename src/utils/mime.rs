//! MIME type detection and resource classes.

use crate::core::ResourceUrl;

/// Common MIME type constants.
pub mod types {
    // Text
    pub const HTML: &str = "text/html; charset=utf-8";
    pub const PLAIN: &str = "text/plain; charset=utf-8";
    pub const CSS: &str = "text/css; charset=utf-8";
    pub const JAVASCRIPT: &str = "text/javascript; charset=utf-8";
    pub const JSON: &str = "application/json";
    pub const XML: &str = "application/xml";
    pub const MARKDOWN: &str = "text/markdown; charset=utf-8";

    // Binary
    pub const OCTET_STREAM: &str = "application/octet-stream";
    pub const WASM: &str = "application/wasm";

    // Images
    pub const PNG: &str = "image/png";
    pub const JPEG: &str = "image/jpeg";
    pub const GIF: &str = "image/gif";
    pub const WEBP: &str = "image/webp";
    pub const AVIF: &str = "image/avif";
    pub const SVG: &str = "image/svg+xml";
    pub const ICO: &str = "image/x-icon";

    // Media
    pub const MP3: &str = "audio/mpeg";
    pub const MP4: &str = "video/mp4";
    pub const WEBM: &str = "video/webm";

    // Fonts
    pub const WOFF: &str = "font/woff";
    pub const WOFF2: &str = "font/woff2";
    pub const TTF: &str = "font/ttf";
    pub const OTF: &str = "font/otf";
}

/// Guess MIME type from a url's extension.
pub fn for_url(url: &ResourceUrl) -> &'static str {
    from_extension(url.extension().as_deref())
}

/// Guess MIME type from file extension string.
pub fn from_extension(ext: Option<&str>) -> &'static str {
    match ext {
        // Web / Text
        Some("html" | "htm") => types::HTML,
        Some("css") => types::CSS,
        Some("js" | "mjs" | "cjs") => types::JAVASCRIPT,
        Some("json" | "map") => types::JSON,
        Some("xml") => types::XML,
        Some("txt") => types::PLAIN,
        Some("md") => types::MARKDOWN,

        // Images
        Some("svg") => types::SVG,
        Some("png") => types::PNG,
        Some("jpg" | "jpeg") => types::JPEG,
        Some("gif") => types::GIF,
        Some("webp") => types::WEBP,
        Some("avif") => types::AVIF,
        Some("ico") => types::ICO,

        // Media
        Some("mp3") => types::MP3,
        Some("mp4" | "m4v") => types::MP4,
        Some("webm") => types::WEBM,

        // Fonts
        Some("woff") => types::WOFF,
        Some("woff2") => types::WOFF2,
        Some("ttf") => types::TTF,
        Some("otf") => types::OTF,

        Some("wasm") => types::WASM,
        _ => types::OCTET_STREAM,
    }
}

/// MIME type without parameters: `text/css; charset=utf-8` -> `text/css`.
pub fn essence(mime: &str) -> &str {
    mime.split(';').next().unwrap_or(mime).trim()
}

/// Check if the MIME type represents text content.
pub fn is_text(mime: &str) -> bool {
    let essence = essence(mime);
    essence.starts_with("text/") || essence == types::JSON || essence == types::XML
}

/// What a resource is, as far as reference scanning and hot updates care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    Markup,
    Script,
    Stylesheet,
    Json,
    Other,
}

impl ResourceClass {
    pub fn of(mime: &str) -> Self {
        match essence(mime) {
            "text/html" => Self::Markup,
            "text/javascript" | "application/javascript" => Self::Script,
            "text/css" => Self::Stylesheet,
            "application/json" => Self::Json,
            _ => Self::Other,
        }
    }

    /// Extension used for inline urls of this class.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Markup => "html",
            Self::Script => "js",
            Self::Stylesheet => "css",
            Self::Json => "json",
            Self::Other => "bin",
        }
    }
}
