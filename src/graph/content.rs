//! Cooked content and sourcemap chains.

use std::sync::Arc;

use serde_json::Value;

/// Resource content: text for markup, scripts, stylesheets and JSON; bytes for the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(Arc<str>),
    Binary(Arc<[u8]>),
}

impl Content {
    /// Build content from raw bytes, keeping text when it is valid UTF-8.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(Arc::from(text)),
            Err(e) => Self::Binary(Arc::from(e.into_bytes())),
        }
    }

    pub fn text(text: impl Into<Arc<str>>) -> Self {
        Self::Text(text.into())
    }

    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Content fingerprint (blake3, hex) for freshness checks.
    pub fn hash(&self) -> String {
        hex::encode(blake3::hash(self.as_bytes()).as_bytes())
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(Arc::from(text))
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(Arc::from(text))
    }
}

/// One transform step's sourcemap.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcemapLayer {
    /// Plugin that produced the map
    pub plugin: Arc<str>,
    /// Raw sourcemap (v3 JSON), opaque here
    pub map: Value,
}

/// Sourcemaps of every transform applied to a url, oldest first.
///
/// A chain is only kept while every content change came with a map:
/// composing the layers in order maps final content back to the original.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourcemapChain {
    layers: Vec<SourcemapLayer>,
}

impl SourcemapChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain starting with the map produced while fetching.
    pub fn starting_with(plugin: &str, map: Value) -> Self {
        let mut chain = Self::new();
        chain.push(plugin, map);
        chain
    }

    pub fn push(&mut self, plugin: &str, map: Value) {
        self.layers.push(SourcemapLayer {
            plugin: Arc::from(plugin),
            map,
        });
    }

    pub fn layers(&self) -> &[SourcemapLayer] {
        &self.layers
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Map emitted by the most recent transform.
    pub fn last(&self) -> Option<&SourcemapLayer> {
        self.layers.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_detects_text() {
        assert!(Content::from_bytes(b"hello".to_vec()).as_text().is_some());
        assert!(Content::from_bytes(vec![0xff, 0xfe, 0x00]).as_text().is_none());
    }

    #[test]
    fn test_hash_is_stable() {
        let a = Content::from("body { color: red }");
        let b = Content::from_bytes(b"body { color: red }".to_vec());
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), Content::from("body{}").hash());
        assert_eq!(a.hash().len(), 64);
    }

    #[test]
    fn test_chain_keeps_order() {
        let mut chain = SourcemapChain::starting_with("fetch", serde_json::json!({"v": 1}));
        chain.push("minify", serde_json::json!({"v": 2}));

        let plugins: Vec<_> = chain.layers().iter().map(|l| l.plugin.as_ref()).collect();
        assert_eq!(plugins, ["fetch", "minify"]);
        assert_eq!(chain.last().unwrap().map["v"], 2);
    }
}
