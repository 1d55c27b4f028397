//! Url dependency graph.
//!
//! Arena of [`UrlInfo`] nodes keyed by [`ResourceUrl`], with explicit
//! dependency / dependent sets instead of object pointers.
//!
//! # Invariants
//! - `B ∈ dependents(A) ⇔ A ∈ dependencies(B)`
//! - Every url in a node's dependency set has a node
//! - Self-references are excluded from dependency sets
//! - Pinned nodes (entry points) are never pruned

mod content;
mod info;
mod reference;


use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::ResourceUrl;

pub use content::{Content, SourcemapChain, SourcemapLayer};
pub use info::{CookedContent, HotPolicy, UrlInfo};
pub use reference::{Position, Reference, ReferenceFlags, ReferenceKind};

/// Callback receiving every batch of pruned urls.
pub type PruneListener = Box<dyn FnMut(&[ResourceUrl]) + Send>;

#[derive(Default)]
pub struct UrlGraph {
    nodes: FxHashMap<ResourceUrl, UrlInfo>,
    prune_listeners: Vec<PruneListener>,
}

impl std::fmt::Debug for UrlGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlGraph")
            .field("nodes", &self.nodes.len())
            .field("prune_listeners", &self.prune_listeners.len())
            .finish()
    }
}

impl UrlGraph {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn get(&self, url: &str) -> Option<&UrlInfo> {
        self.nodes.get(url)
    }

    #[inline]
    pub fn get_mut(&mut self, url: &str) -> Option<&mut UrlInfo> {
        self.nodes.get_mut(url)
    }

    #[inline]
    pub fn contains(&self, url: &str) -> bool {
        self.nodes.contains_key(url)
    }

    pub fn is_valid(&self, url: &str) -> bool {
        self.get(url).is_some_and(UrlInfo::is_valid)
    }

    /// All nodes, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &UrlInfo> {
        self.nodes.values()
    }

    /// Existing node for `url`, or a fresh empty one.
    pub fn get_or_create(&mut self, url: &ResourceUrl) -> &mut UrlInfo {
        self.nodes
            .entry(url.clone())
            .or_insert_with(|| UrlInfo::new(url.clone()))
    }

    /// Register `url` as an entry point: created if needed and pinned.
    pub fn register_entry(&mut self, url: &ResourceUrl) -> &mut UrlInfo {
        let info = self.get_or_create(url);
        info.pinned = true;
        info
    }

    /// Drop the entry-point status of `url`.
    ///
    /// An entry nothing else depends on is removed, together with whatever
    /// only it kept alive. Returns the pruned urls.
    pub fn release_entry(&mut self, url: &ResourceUrl) -> Vec<ResourceUrl> {
        let Some(info) = self.nodes.get_mut(url) else {
            return Vec::new();
        };
        info.pinned = false;
        if !info.dependents.is_empty() {
            return Vec::new();
        }

        let Some(info) = self.nodes.remove(url) else {
            return Vec::new();
        };
        let mut dependencies: Vec<_> = info.dependencies.into_iter().collect();
        dependencies.sort();

        let mut pruned = vec![url.clone()];
        pruned.extend(self.prune_edges(url, dependencies));
        self.notify_pruned(&pruned);
        pruned
    }

    /// Subscribe to prune notifications (one call per pruning pass).
    pub fn on_prune(&mut self, listener: impl FnMut(&[ResourceUrl]) + Send + 'static) {
        self.prune_listeners.push(Box::new(listener));
    }

    /// Mark `url` stale. Returns false if there is no such node.
    pub fn invalidate(&mut self, url: &str) -> bool {
        match self.nodes.get_mut(url) {
            Some(info) => {
                info.invalidate();
                true
            }
            None => false,
        }
    }

    // -------------------------------------------------------------------------
    // Edges
    // -------------------------------------------------------------------------

    /// Replace the outgoing references of `owner`.
    ///
    /// New targets get a node and a back-edge before anything is removed, so a
    /// target that merely moved between references is never pruned. Targets no
    /// longer referenced go through [`Self::prune_dependencies`].
    ///
    /// Returns the pruned urls.
    pub fn update_references(
        &mut self,
        owner: &ResourceUrl,
        references: Vec<Reference>,
    ) -> Vec<ResourceUrl> {
        let new_deps: FxHashSet<ResourceUrl> = references
            .iter()
            .map(|reference| reference.url.clone())
            .filter(|url| url != owner)
            .collect();

        let info = self.get_or_create(owner);
        let old_deps = std::mem::take(&mut info.dependencies);
        info.references = references;
        info.dependencies = new_deps.clone();

        for added in new_deps.difference(&old_deps) {
            self.get_or_create(added).dependents.insert(owner.clone());
        }

        let mut removed: Vec<_> = old_deps.difference(&new_deps).cloned().collect();
        removed.sort();
        self.prune_dependencies(owner, removed)
    }

    /// Drop the edges `owner -> url` for every url in `urls`, pruning targets
    /// left without dependents, transitively.
    ///
    /// A target that still has dependents is pruned too when none of them is
    /// rooted (a cycle kept alive only by itself). Already-pruned targets are
    /// skipped. Listeners are notified once with every removed url.
    pub fn prune_dependencies(
        &mut self,
        owner: &ResourceUrl,
        urls: impl IntoIterator<Item = ResourceUrl>,
    ) -> Vec<ResourceUrl> {
        let pruned = self.prune_edges(owner, urls);
        self.notify_pruned(&pruned);
        pruned
    }

    fn prune_edges(
        &mut self,
        owner: &ResourceUrl,
        urls: impl IntoIterator<Item = ResourceUrl>,
    ) -> Vec<ResourceUrl> {
        let mut queue: VecDeque<(ResourceUrl, ResourceUrl)> =
            urls.into_iter().map(|url| (owner.clone(), url)).collect();
        let mut pruned = Vec::new();

        while let Some((from, target)) = queue.pop_front() {
            if let Some(info) = self.nodes.get_mut(&from) {
                info.dependencies.remove(&target);
            }
            let Some(node) = self.nodes.get_mut(&target) else {
                continue;
            };
            node.dependents.remove(&from);
            if node.pinned {
                continue;
            }

            let doomed = if node.dependents.is_empty() {
                vec![target]
            } else {
                match self.unrooted_component(&target) {
                    Some(component) => component,
                    None => continue,
                }
            };

            let doomed_set: FxHashSet<_> = doomed.iter().cloned().collect();
            for url in doomed {
                let Some(info) = self.nodes.remove(&url) else {
                    continue;
                };
                let mut dependencies: Vec<_> = info
                    .dependencies
                    .into_iter()
                    .filter(|dep| !doomed_set.contains(dep))
                    .collect();
                dependencies.sort();
                queue.extend(dependencies.into_iter().map(|dep| (url.clone(), dep)));
                pruned.push(url);
            }
        }

        pruned
    }

    fn notify_pruned(&mut self, pruned: &[ResourceUrl]) {
        if pruned.is_empty() {
            return;
        }
        for listener in &mut self.prune_listeners {
            listener(pruned);
        }
    }

    /// Upward closure of `start` over dependents, if nothing in it is rooted.
    ///
    /// A node is rooted when it is pinned or has no dependents at all.
    fn unrooted_component(&self, start: &ResourceUrl) -> Option<Vec<ResourceUrl>> {
        let mut visited: FxHashSet<&ResourceUrl> = FxHashSet::default();
        let mut stack = vec![start];

        while let Some(url) = stack.pop() {
            if !visited.insert(url) {
                continue;
            }
            let info = self.nodes.get(url)?;
            if info.pinned || info.dependents.is_empty() {
                return None;
            }
            stack.extend(info.dependents.iter());
        }

        let mut component: Vec<_> = visited.into_iter().cloned().collect();
        component.sort();
        Some(component)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Depth-first walk over dependents of `url` (not `url` itself), returning
    /// the first node matching `predicate`.
    pub fn find_dependent(
        &self,
        url: &str,
        mut predicate: impl FnMut(&UrlInfo) -> bool,
    ) -> Option<&UrlInfo> {
        let start = self.nodes.get(url)?;
        let mut visited: FxHashSet<ResourceUrl> = FxHashSet::default();
        visited.insert(start.url().clone());
        let mut stack: Vec<ResourceUrl> = start.sorted_dependents().into_iter().rev().collect();

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(info) = self.nodes.get(&current) else {
                continue;
            };
            if predicate(info) {
                return Some(info);
            }
            stack.extend(info.sorted_dependents().into_iter().rev());
        }
        None
    }

    /// Entry points depending (transitively) on `url`, including `url` itself.
    pub fn dependent_entries(&self, url: &str) -> Vec<ResourceUrl> {
        let mut entries = Vec::new();
        if let Some(info) = self.get(url)
            && info.is_pinned()
        {
            entries.push(info.url().clone());
        }
        let mut walk = |info: &UrlInfo| {
            if info.is_pinned() {
                entries.push(info.url().clone());
            }
            false
        };
        self.find_dependent(url, &mut walk);
        entries.sort();
        entries
    }

    /// Valid nodes, sorted by url: what a build emits.
    pub fn outputs(&self) -> Vec<&UrlInfo> {
        let mut outputs: Vec<_> = self.nodes.values().filter(|info| info.is_valid()).collect();
        outputs.sort_by(|a, b| a.url().cmp(b.url()));
        outputs
    }

    /// Panic if the edge sets disagree anywhere.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for (url, info) in &self.nodes {
            assert!(!info.dependencies.contains(url), "{url} depends on itself");
            for dep in &info.dependencies {
                let target = self
                    .nodes
                    .get(dep)
                    .unwrap_or_else(|| panic!("{url} -> {dep}: missing node"));
                assert!(
                    target.dependents.contains(url),
                    "{url} -> {dep}: missing back-edge"
                );
            }
            for dependent in &info.dependents {
                let owner = self
                    .nodes
                    .get(dependent)
                    .unwrap_or_else(|| panic!("{dependent} -> {url}: missing owner"));
                assert!(
                    owner.dependencies.contains(url),
                    "{dependent} -> {url}: dangling back-edge"
                );
            }
        }
    }
}
