//! Url graph nodes.

use rustc_hash::FxHashSet;
use serde_json::{Map, Value};

use super::content::{Content, SourcemapChain};
use super::reference::Reference;
use crate::core::ResourceUrl;

/// Hot-update policy a resource declares about itself.
///
/// Recomputed on every cook; a node's policy is only meaningful while it is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HotPolicy {
    /// A change here always needs a full reload
    pub declines_hot_update: bool,
    /// This resource can be replaced in place
    pub accepts_self: bool,
    /// Dependencies whose replacement this resource handles
    pub accepts_dependencies: FxHashSet<ResourceUrl>,
}

impl HotPolicy {
    pub fn self_accepting() -> Self {
        Self {
            accepts_self: true,
            ..Self::default()
        }
    }

    pub fn declining() -> Self {
        Self {
            declines_hot_update: true,
            ..Self::default()
        }
    }

    pub fn accepting(dependencies: impl IntoIterator<Item = ResourceUrl>) -> Self {
        Self {
            accepts_dependencies: dependencies.into_iter().collect(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn accepts_dependency(&self, url: &ResourceUrl) -> bool {
        self.accepts_dependencies.contains(url)
    }

    /// Combine two policies: flags are OR-ed, accepted dependencies unioned.
    pub fn merge(&mut self, other: HotPolicy) {
        self.declines_hot_update |= other.declines_hot_update;
        self.accepts_self |= other.accepts_self;
        self.accepts_dependencies.extend(other.accepts_dependencies);
    }
}

/// Everything one cook run produces for a url, stored as a unit.
#[derive(Debug, Clone)]
pub struct CookedContent {
    pub content_type: String,
    pub original_content: Content,
    pub content: Content,
    pub original_url: ResourceUrl,
    pub generated_url: String,
    pub sourcemap: Option<SourcemapChain>,
    pub data: Map<String, Value>,
}

/// A node of the url graph.
///
/// `content`, `generated_url` and `hot` only change through a cook
/// (see [`UrlInfo::store_cook`]); validity is tracked per epoch so a cook that
/// raced with an invalidation never marks stale output as valid.
#[derive(Debug, Clone)]
pub struct UrlInfo {
    url: ResourceUrl,
    content_type: Option<String>,
    original_content: Option<Content>,
    content: Option<Content>,
    content_hash: Option<String>,
    original_url: Option<ResourceUrl>,
    generated_url: Option<String>,
    sourcemap: Option<SourcemapChain>,
    pub(super) references: Vec<Reference>,
    pub(super) dependencies: FxHashSet<ResourceUrl>,
    pub(super) dependents: FxHashSet<ResourceUrl>,
    hot: HotPolicy,
    data: Map<String, Value>,
    valid: bool,
    pub(super) pinned: bool,
    epoch: u64,
    cook_count: u64,
}

impl UrlInfo {
    pub(super) fn new(url: ResourceUrl) -> Self {
        Self {
            url,
            content_type: None,
            original_content: None,
            content: None,
            content_hash: None,
            original_url: None,
            generated_url: None,
            sourcemap: None,
            references: Vec::new(),
            dependencies: FxHashSet::default(),
            dependents: FxHashSet::default(),
            hot: HotPolicy::default(),
            data: Map::new(),
            valid: false,
            pinned: false,
            epoch: 0,
            cook_count: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    #[inline]
    pub fn url(&self) -> &ResourceUrl {
        &self.url
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Content as first read, before any transform.
    pub fn original_content(&self) -> Option<&Content> {
        self.original_content.as_ref()
    }

    /// Content after the latest cook.
    pub fn content(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    pub fn content_hash(&self) -> Option<&str> {
        self.content_hash.as_deref()
    }

    /// Url the content was actually read from (may differ after redirects).
    pub fn original_url(&self) -> Option<&ResourceUrl> {
        self.original_url.as_ref()
    }

    /// Output-facing identifier (request path for files under the root).
    pub fn generated_url(&self) -> Option<&str> {
        self.generated_url.as_deref()
    }

    pub fn sourcemap(&self) -> Option<&SourcemapChain> {
        self.sourcemap.as_ref()
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn dependencies(&self) -> &FxHashSet<ResourceUrl> {
        &self.dependencies
    }

    pub fn dependents(&self) -> &FxHashSet<ResourceUrl> {
        &self.dependents
    }

    pub fn hot(&self) -> &HotPolicy {
        &self.hot
    }

    /// Plugin-owned data bag.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Entry points are pinned and never pruned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Bumped on every invalidation.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of cooks stored so far.
    #[inline]
    pub fn cook_count(&self) -> u64 {
        self.cook_count
    }

    /// Sorted dependents, for deterministic traversals.
    pub fn sorted_dependents(&self) -> Vec<ResourceUrl> {
        let mut dependents: Vec<_> = self.dependents.iter().cloned().collect();
        dependents.sort();
        dependents
    }

    // -------------------------------------------------------------------------
    // Mutation (kitchen only)
    // -------------------------------------------------------------------------

    /// Mark the node stale: content and policy must be recomputed before use.
    pub fn invalidate(&mut self) {
        self.valid = false;
        self.epoch += 1;
    }

    /// Store the output of a cook run, returning the new content hash.
    pub fn store_cook(&mut self, cooked: CookedContent) -> String {
        let hash = cooked.content.hash();
        self.content_hash = Some(hash.clone());
        self.content_type = Some(cooked.content_type);
        self.original_content = Some(cooked.original_content);
        self.content = Some(cooked.content);
        self.original_url = Some(cooked.original_url);
        self.generated_url = Some(cooked.generated_url);
        self.sourcemap = cooked.sourcemap;
        self.data.extend(cooked.data);
        self.cook_count += 1;
        hash
    }

    pub fn store_hot_policy(&mut self, hot: HotPolicy) {
        self.hot = hot;
    }

    /// Mark valid if no invalidation happened since `epoch` was read.
    ///
    /// Returns whether the node is now valid.
    pub fn mark_valid(&mut self, epoch: u64) -> bool {
        self.valid = self.epoch == epoch;
        self.valid
    }

    /// Seed content embedded by the owner; it becomes this node's source.
    ///
    /// Invalidates the node when the embedded content changed.
    pub fn seed_inline(&mut self, content: Content, content_type: Option<String>) {
        if self.original_content.as_ref() == Some(&content) {
            return;
        }
        self.original_content = Some(content);
        if content_type.is_some() {
            self.content_type = content_type;
        }
        self.invalidate();
    }
}
