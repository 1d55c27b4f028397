//! Plugin hooks.
//!
//! Each hook kind has its own composition rule:
//!
//! | hook                 | composition                     |
//! |----------------------|---------------------------------|
//! | `resolve_reference`  | first `Some` in order wins      |
//! | `redirect_reference` | folded in order                 |
//! | `fetch_content`      | first `Some` in order wins      |
//! | `transform_content`  | folded in order                 |
//! | `collect_hot_policy` | merged                          |

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use serde_json::{Map, Value};

use crate::core::{BuildMode, ResourceUrl};
use crate::graph::{Content, HotPolicy, Position, Reference, ReferenceFlags, ReferenceKind};
use crate::utils::mime::ResourceClass;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ============================================================================
// Hook payloads
// ============================================================================

/// A reference as found in content, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct FoundReference {
    pub specifier: String,
    pub kind: ReferenceKind,
    pub position: Option<Position>,
    pub flags: ReferenceFlags,
    /// Content type the owner expects
    pub content_type: Option<String>,
    /// Embedded content, for `inline` references
    pub inline_content: Option<Content>,
}

impl FoundReference {
    pub fn new(specifier: impl Into<String>, kind: ReferenceKind) -> Self {
        Self {
            specifier: specifier.into(),
            kind,
            position: None,
            flags: ReferenceFlags::default(),
            content_type: None,
            inline_content: None,
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn lazy(mut self) -> Self {
        self.flags.lazy = true;
        self
    }

    /// Content embedded in the owner; resolved to `<owner>@L<line>C<col>.<ext>`.
    pub fn inline(content: impl Into<Content>, extension: &str, content_type: &str) -> Self {
        let mut found = Self::new(extension, ReferenceKind::InlineContent);
        found.flags.inline = true;
        found.content_type = Some(content_type.to_string());
        found.inline_content = Some(content.into());
        found
    }
}

/// Outcome of `redirect_reference`.
#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    pub url: ResourceUrl,
    pub content_type: Option<String>,
}

/// What a fetch hook gets to see.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: ResourceUrl,
    pub root: ResourceUrl,
    pub mode: BuildMode,
    /// Content seeded by the owner of an inline url
    pub seeded: Option<Content>,
    /// Content type the referencing side expects
    pub content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub content: Content,
    /// Detected from the url extension when absent
    pub content_type: Option<String>,
    /// Where the content was actually read from, when different from the url
    pub original_url: Option<ResourceUrl>,
    pub sourcemap: Option<Value>,
    pub data: Map<String, Value>,
    pub references: Vec<FoundReference>,
}

impl Fetched {
    pub fn new(content: impl Into<Content>) -> Self {
        Self {
            content: content.into(),
            content_type: None,
            original_url: None,
            sourcemap: None,
            data: Map::new(),
            references: Vec::new(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Output of one transform step.
///
/// `content: None` leaves the content untouched (a pure analysis pass).
#[derive(Debug, Clone, Default)]
pub struct Transformed {
    pub content: Option<Content>,
    pub sourcemap: Option<Value>,
    pub references: Vec<FoundReference>,
}

impl Transformed {
    pub fn content(content: impl Into<Content>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn references(references: Vec<FoundReference>) -> Self {
        Self {
            references,
            ..Self::default()
        }
    }

    pub fn with_sourcemap(mut self, map: Value) -> Self {
        self.sourcemap = Some(map);
        self
    }
}

/// In-progress state of a cook, handed to transform and hot-policy hooks.
#[derive(Debug, Clone)]
pub struct Draft {
    pub url: ResourceUrl,
    pub mode: BuildMode,
    pub content_type: String,
    pub original_content: Content,
    pub content: Content,
    pub data: Map<String, Value>,
    /// Resolved references (filled before `collect_hot_policy`)
    pub references: Vec<Reference>,
}

impl Draft {
    /// Resolved url of a reference by its specifier.
    pub fn referenced(&self, specifier: &str) -> Option<&ResourceUrl> {
        self.references
            .iter()
            .find(|reference| reference.specifier == specifier)
            .map(|reference| &reference.url)
    }

    pub fn class(&self) -> ResourceClass {
        ResourceClass::of(&self.content_type)
    }
}

// ============================================================================
// Plugin
// ============================================================================

/// A set of hooks. Every hook is optional; defaults decline.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn resolve_reference(
        &self,
        _owner: &ResourceUrl,
        _specifier: &str,
        _kind: ReferenceKind,
    ) -> Result<Option<ResourceUrl>> {
        Ok(None)
    }

    fn redirect_reference(&self, _reference: &Reference) -> Result<Option<Redirect>> {
        Ok(None)
    }

    fn fetch_content<'a>(
        &'a self,
        _request: &'a FetchRequest,
    ) -> BoxFuture<'a, Result<Option<Fetched>>> {
        Box::pin(std::future::ready(Ok(None)))
    }

    fn transform_content<'a>(
        &'a self,
        _draft: &'a Draft,
    ) -> BoxFuture<'a, Result<Option<Transformed>>> {
        Box::pin(std::future::ready(Ok(None)))
    }

    fn collect_hot_policy(&self, _draft: &Draft) -> Result<Option<HotPolicy>> {
        Ok(None)
    }
}

/// Ordered plugin list.
#[derive(Clone, Default)]
pub struct PluginSet {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    pub fn push(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|plugin| plugin.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for PluginSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
