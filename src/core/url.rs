//! Resource URL type for graph keys.
//!
//! - Internal representation: canonical absolute URL string (as serialized by `url`)
//! - Browser boundary: request paths are mapped onto the project root

use std::borrow::Borrow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Canonical absolute resource identifier.
///
/// Invariants:
/// - Always parseable by `url::Url` and already in its serialized form
/// - `.`/`..` segments are resolved, percent-encoding is normalized
/// - Cheap to clone (shared `Arc<str>`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceUrl(Arc<str>);

impl ResourceUrl {
    /// Parse and canonicalize an absolute URL.
    pub fn parse(input: &str) -> Result<Self, url::ParseError> {
        let parsed = url::Url::parse(input.trim())?;
        Ok(Self::from_url(&parsed))
    }

    /// Create from an absolute filesystem path (`file://` URL).
    pub fn from_file_path(path: &Path) -> Option<Self> {
        url::Url::from_file_path(path)
            .ok()
            .map(|url| Self::from_url(&url))
    }

    /// Create a directory URL (always ends with `/`), used as resolution base.
    pub fn from_dir_path(path: &Path) -> Option<Self> {
        url::Url::from_directory_path(path)
            .ok()
            .map(|url| Self::from_url(&url))
    }

    fn from_url(url: &url::Url) -> Self {
        Self(Arc::from(url.as_str()))
    }

    /// Resolve a specifier against this URL (relative, root-relative or absolute).
    pub fn join(&self, specifier: &str) -> Option<Self> {
        let base = url::Url::parse(&self.0).ok()?;
        base.join(specifier).ok().map(|url| Self::from_url(&url))
    }

    /// URL of a piece of content embedded in this one.
    ///
    /// `file:///site/index.html` + (3, 5, "js") -> `file:///site/index.html@L3C5.js`
    pub fn inline(&self, line: u32, column: u32, extension: &str) -> Self {
        let base = self.without_query_fragment();
        Self(Arc::from(format!("{base}@L{line}C{column}.{extension}")))
    }

    /// Get the URL as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// URL scheme (`file`, `https`, ...).
    pub fn scheme(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        self.scheme() == "file"
    }

    /// Check if this URL designates inline content (`...@L<line>C<col>.<ext>`).
    pub fn is_inline(&self) -> bool {
        self.last_segment()
            .rsplit_once("@L")
            .is_some_and(|(_, position)| position.contains('C'))
    }

    /// URL without `?query` and `#fragment`.
    pub fn without_query_fragment(&self) -> &str {
        let end = self.0.find(['?', '#']).unwrap_or(self.0.len());
        &self.0[..end]
    }

    /// Last path segment, query and fragment excluded.
    pub fn last_segment(&self) -> &str {
        let path = self.without_query_fragment();
        path.rsplit('/').next().unwrap_or(path)
    }

    /// Lowercased extension of the last path segment, if any.
    pub fn extension(&self) -> Option<String> {
        let segment = self.last_segment();
        let (stem, ext) = segment.rsplit_once('.')?;
        (!stem.is_empty() && !ext.is_empty()).then(|| ext.to_ascii_lowercase())
    }

    /// Convert a `file://` URL back to a filesystem path.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        let url = url::Url::parse(self.without_query_fragment()).ok()?;
        url.to_file_path().ok()
    }

    /// Check if this URL lives under `root` (a directory URL).
    #[inline]
    pub fn is_within(&self, root: &ResourceUrl) -> bool {
        self.0.starts_with(root.as_str())
    }

    /// Request path of this URL relative to `root`.
    ///
    /// `file:///site/js/app.js` under `file:///site/` -> `/js/app.js`
    pub fn to_server_path(&self, root: &ResourceUrl) -> Option<String> {
        let relative = self.0.strip_prefix(root.as_str())?;
        Some(format!("/{relative}"))
    }

    /// Map a browser request path onto `root`.
    ///
    /// Decodes percent-encoding, strips query string and rejects `..` segments.
    /// Directory paths map to their `index.html`.
    pub fn from_server_path(root: &ResourceUrl, request_path: &str) -> Option<Self> {
        use percent_encoding::percent_decode_str;

        let path = request_path.split(['?', '#']).next().unwrap_or(request_path);
        let decoded = percent_decode_str(path).decode_utf8().ok()?;
        let relative = decoded.trim_start_matches('/');

        if relative.split('/').any(|segment| segment == "..") {
            return None;
        }

        let url = if relative.is_empty() || relative.ends_with('/') {
            root.join(&format!("{relative}index.html"))?
        } else {
            root.join(relative)?
        };
        url.is_within(root).then_some(url)
    }
}

impl std::fmt::Display for ResourceUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ResourceUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ResourceUrl {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ResourceUrl {
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for ResourceUrl {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl Serialize for ResourceUrl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ResourceUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
