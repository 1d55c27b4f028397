//! Plugin pipeline ("kitchen").
//!
//! Turns a url into cooked content and keeps the url graph in sync:
//!
//! ```text
//! fetch ──► transform* ──► resolve/redirect references ──► hot policy ──► commit
//!                                                                           │
//!                                       cook non-lazy dependencies ◄────────┘
//! ```
//!
//! # Single flight
//!
//! At most one pipeline run per url is in progress. Late callers attach to the
//! running flight and observe its exact result. A flight covers only the url's
//! own pipeline; dependencies are cooked afterwards, outside of it, so cyclic
//! references never wait on themselves.
//!
//! The graph lock is never held across an `.await`.

pub mod builtin;
mod error;
mod plugin;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinSet};

use crate::core::{BuildMode, ResourceUrl};
use crate::graph::{
    Content, CookedContent, HotPolicy, Position, Reference, SourcemapChain, UrlGraph, UrlInfo,
};

pub use error::{CookError, ErrorKind, LoadCode, TraceFrame};
pub use plugin::{
    BoxFuture, Draft, FetchRequest, Fetched, FoundReference, Plugin, PluginSet, Redirect,
    Transformed,
};

pub type CookResult = Result<Cooked, CookError>;

/// Snapshot of a cooked url, cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct Cooked {
    pub url: ResourceUrl,
    pub content_type: String,
    pub content: Content,
    pub generated_url: String,
    pub content_hash: String,
}

impl Cooked {
    /// Snapshot of a node's latest cook, if it has one.
    pub fn from_info(info: &UrlInfo) -> Option<Self> {
        Some(Self {
            url: info.url().clone(),
            content_type: info.content_type()?.to_string(),
            content: info.content()?.clone(),
            generated_url: info.generated_url()?.to_string(),
            content_hash: info.content_hash()?.to_string(),
        })
    }
}

/// An in-progress pipeline run.
struct Flight {
    result: watch::Receiver<Option<CookResult>>,
    abort: AbortHandle,
    /// Node epoch when the flight started
    epoch: u64,
}

/// Content embedded by an owner, handed to the inline child on commit.
struct Seed {
    url: ResourceUrl,
    content: Content,
    content_type: Option<String>,
}

pub struct Kitchen {
    root: ResourceUrl,
    mode: BuildMode,
    plugins: PluginSet,
    graph: Arc<Mutex<UrlGraph>>,
    flights: DashMap<ResourceUrl, Flight>,
    closed: AtomicBool,
    runs: AtomicUsize,
}

// =============================================================================
// Public API
// =============================================================================

impl Kitchen {
    pub fn new(root: ResourceUrl, mode: BuildMode, plugins: PluginSet) -> Arc<Self> {
        let mut graph = UrlGraph::new();
        graph.on_prune(|pruned| {
            crate::debug!("graph"; "pruned {} url(s)", pruned.len());
            crate::debug_do! {
                for url in pruned {
                    crate::debug!("graph"; "  - {}", url);
                }
            }
        });

        Arc::new(Self {
            root,
            mode,
            plugins,
            graph: Arc::new(Mutex::new(graph)),
            flights: DashMap::new(),
            closed: AtomicBool::new(false),
            runs: AtomicUsize::new(0),
        })
    }

    #[inline]
    pub fn root(&self) -> &ResourceUrl {
        &self.root
    }

    #[inline]
    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    pub fn plugins(&self) -> &PluginSet {
        &self.plugins
    }

    /// Run `f` with the graph locked. Must not block.
    pub fn with_graph<R>(&self, f: impl FnOnce(&mut UrlGraph) -> R) -> R {
        f(&mut self.graph.lock())
    }

    /// Pin `url` as an entry point.
    pub fn register_entry(&self, url: &ResourceUrl) {
        self.graph.lock().register_entry(url);
    }

    /// Stop treating `url` as an entry point, pruning what only it used.
    pub fn release_entry(&self, url: &ResourceUrl) -> Vec<ResourceUrl> {
        self.graph.lock().release_entry(url)
    }

    /// Mark `url` stale. Returns false if the graph does not know it.
    pub fn invalidate(&self, url: &ResourceUrl) -> bool {
        self.graph.lock().invalidate(url.as_str())
    }

    /// Number of pipeline runs so far.
    pub fn pipeline_runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    /// Cook `url`, then its non-lazy dependencies (lazy ones too when the mode
    /// says so). The first failure anywhere in the tree is returned, with the
    /// reference chain that led to it.
    pub async fn cook(self: &Arc<Self>, url: &ResourceUrl) -> CookResult {
        Arc::clone(self).cook_tree(url.clone(), Vec::new()).await
    }

    /// Cook only `url` itself (single-flight), leaving dependencies alone.
    ///
    /// A flight that started before the node's latest invalidation is not
    /// joined: the caller waits for it to land, then starts a fresh one.
    pub async fn cook_one(self: &Arc<Self>, url: &ResourceUrl) -> CookResult {
        let mut result = loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(CookError::aborted(url));
            }
            let epoch = self.current_epoch(url);
            match self.flights.entry(url.clone()) {
                Entry::Occupied(mut flight) => {
                    if flight.get().epoch == epoch {
                        crate::debug!("kitchen"; "join {}", url);
                        break flight.get().result.clone();
                    }
                    // started before the latest invalidation
                    if flight.get().result.borrow().is_some() {
                        flight.insert(self.start_flight(url, epoch));
                        break flight.get().result.clone();
                    }
                    let mut previous = flight.get().result.clone();
                    drop(flight);
                    crate::debug!("kitchen"; "outdated flight for {}, waiting", url);
                    let _ = previous.wait_for(Option::is_some).await;
                }
                Entry::Vacant(slot) => {
                    if let Some(cooked) = self.cached(url) {
                        return Ok(cooked);
                    }
                    let flight = self.start_flight(url, epoch);
                    break slot.insert(flight).result.clone();
                }
            }
        };

        let outcome = result
            .wait_for(Option::is_some)
            .await
            .map(|value| (*value).clone());
        match outcome {
            Ok(Some(result)) => result,
            _ => Err(CookError::aborted(url)),
        }
    }

    /// Abort every in-flight cook and refuse new ones.
    ///
    /// Waiters of aborted flights observe ABORTED.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let aborted = self.flights.len();
        self.flights.retain(|_, flight| {
            flight.abort.abort();
            false
        });
        if aborted > 0 {
            crate::debug!("kitchen"; "aborted {} in-flight cook(s)", aborted);
        }
    }
}

// =============================================================================
// Dependency walk
// =============================================================================

impl Kitchen {
    fn cook_tree(
        self: Arc<Self>,
        url: ResourceUrl,
        trail: Vec<ResourceUrl>,
    ) -> BoxFuture<'static, CookResult> {
        Box::pin(async move {
            let cooked = self.cook_one(&url).await?;

            let children = self.pending_dependencies(&url, &trail);
            if children.is_empty() {
                return Ok(cooked);
            }

            let mut trail = trail;
            trail.push(url.clone());

            let mut tasks = JoinSet::new();
            for (child, frame) in children {
                let kitchen = Arc::clone(&self);
                let trail = trail.clone();
                tasks.spawn(async move {
                    kitchen
                        .cook_tree(child, trail)
                        .await
                        .map_err(|e| e.traced_through(frame))
                });
            }

            // Dropping the set on early return detaches the remaining waiters;
            // their flights keep running.
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => return Err(e),
                    Err(_) => return Err(CookError::aborted(&url)),
                }
            }
            Ok(cooked)
        })
    }

    /// References of `url` that still need a cook.
    fn pending_dependencies(
        &self,
        url: &ResourceUrl,
        trail: &[ResourceUrl],
    ) -> Vec<(ResourceUrl, TraceFrame)> {
        let graph = self.graph.lock();
        let Some(info) = graph.get(url.as_str()) else {
            return Vec::new();
        };

        let mut seen = FxHashSet::default();
        info.references()
            .iter()
            .filter(|r| !r.flags.lazy || self.mode.cook_lazy)
            .filter(|r| &r.url != url && !trail.contains(&r.url))
            .filter(|r| !graph.is_valid(r.url.as_str()))
            .filter(|r| seen.insert(r.url.clone()))
            .map(|r| {
                let frame = TraceFrame {
                    owner: url.clone(),
                    specifier: r.specifier.clone(),
                    position: r.position,
                };
                (r.url.clone(), frame)
            })
            .collect()
    }

    /// Spawn the pipeline run for `url`. The flight removes itself when done.
    fn start_flight(self: &Arc<Self>, url: &ResourceUrl, epoch: u64) -> Flight {
        let (tx, rx) = watch::channel(None);
        let own = rx.clone();
        let kitchen = Arc::clone(self);
        let target = url.clone();
        let task = tokio::spawn(async move {
            let result = kitchen.run_pipeline(&target).await;
            tx.send_replace(Some(result));
            kitchen
                .flights
                .remove_if(&target, |_, flight| flight.result.same_channel(&own));
        });
        Flight {
            result: rx,
            abort: task.abort_handle(),
            epoch,
        }
    }

    fn current_epoch(&self, url: &ResourceUrl) -> u64 {
        self.graph
            .lock()
            .get(url.as_str())
            .map_or(0, UrlInfo::epoch)
    }

    fn cached(&self, url: &ResourceUrl) -> Option<Cooked> {
        let graph = self.graph.lock();
        graph
            .get(url.as_str())
            .filter(|info| info.is_valid())
            .and_then(Cooked::from_info)
    }
}

// =============================================================================
// Pipeline
// =============================================================================

impl Kitchen {
    async fn run_pipeline(&self, url: &ResourceUrl) -> CookResult {
        crate::debug!("kitchen"; "cook {}", url);
        self.runs.fetch_add(1, Ordering::SeqCst);

        let (request, epoch) = {
            let mut graph = self.graph.lock();
            let info = graph.get_or_create(url);
            let request = FetchRequest {
                url: url.clone(),
                root: self.root.clone(),
                mode: self.mode,
                seeded: url
                    .is_inline()
                    .then(|| info.original_content().cloned())
                    .flatten(),
                content_type: info.content_type().map(str::to_string),
            };
            (request, info.epoch())
        };

        let (fetcher, fetched) = self.fetch(&request).await?;
        let content_type = fetched
            .content_type
            .or(request.content_type)
            .unwrap_or_else(|| crate::utils::mime::for_url(url).to_string());

        let mut sourcemap = Some(match fetched.sourcemap {
            Some(map) => SourcemapChain::starting_with(&fetcher, map),
            None => SourcemapChain::new(),
        });
        let mut found = fetched.references;
        let mut draft = Draft {
            url: url.clone(),
            mode: self.mode,
            content_type,
            original_content: fetched.content.clone(),
            content: fetched.content,
            data: fetched.data,
            references: Vec::new(),
        };

        self.transform(&mut draft, &mut sourcemap, &mut found).await?;
        let (references, seeds) = self.resolve_references(url, found)?;
        draft.references = references;
        let hot = self.collect_hot_policy(&draft)?;

        let generated_url = url
            .to_server_path(&self.root)
            .unwrap_or_else(|| url.to_string());
        let original_url = fetched.original_url.unwrap_or_else(|| url.clone());

        let mut graph = self.graph.lock();
        graph.update_references(url, draft.references);
        for seed in seeds {
            graph
                .get_or_create(&seed.url)
                .seed_inline(seed.content, seed.content_type);
        }

        let info = graph.get_or_create(url);
        let content_hash = info.store_cook(CookedContent {
            content_type: draft.content_type.clone(),
            original_content: draft.original_content,
            content: draft.content.clone(),
            original_url,
            generated_url: generated_url.clone(),
            sourcemap: sourcemap.filter(|chain| !chain.is_empty()),
            data: draft.data,
        });
        info.store_hot_policy(hot);
        if !info.mark_valid(epoch) {
            crate::debug!("kitchen"; "{} changed while cooking, left stale", url);
        }

        Ok(Cooked {
            url: url.clone(),
            content_type: draft.content_type,
            content: draft.content,
            generated_url,
            content_hash,
        })
    }

    /// First plugin returning content wins.
    async fn fetch(&self, request: &FetchRequest) -> Result<(String, Fetched), CookError> {
        for plugin in self.plugins.iter() {
            match plugin.fetch_content(request).await {
                Ok(Some(fetched)) => return Ok((plugin.name().to_string(), fetched)),
                Ok(None) => {}
                Err(e) => return Err(CookError::load(&request.url, plugin.name(), &e)),
            }
        }
        Err(CookError::not_found(&request.url))
    }

    /// Fold every transform over the draft.
    ///
    /// The sourcemap chain survives only while every content change brings a map.
    async fn transform(
        &self,
        draft: &mut Draft,
        sourcemap: &mut Option<SourcemapChain>,
        found: &mut Vec<FoundReference>,
    ) -> Result<(), CookError> {
        for plugin in self.plugins.iter() {
            let step = plugin.transform_content(draft).await.map_err(|e| {
                CookError::hook(&draft.url, "transformContent", plugin.name(), &e)
            })?;
            let Some(step) = step else {
                continue;
            };

            found.extend(step.references);
            if let Some(content) = step.content
                && content != draft.content
            {
                match step.sourcemap {
                    Some(map) => {
                        if let Some(chain) = sourcemap.as_mut() {
                            chain.push(plugin.name(), map);
                        }
                    }
                    None => *sourcemap = None,
                }
                draft.content = content;
            }
        }
        Ok(())
    }

    fn resolve_references(
        &self,
        owner: &ResourceUrl,
        found: Vec<FoundReference>,
    ) -> Result<(Vec<Reference>, Vec<Seed>), CookError> {
        let mut references = Vec::with_capacity(found.len());
        let mut seeds = Vec::new();

        for found in found {
            let url = if found.flags.inline {
                // Inline specifiers carry the extension of the embedded content
                let position = found.position.unwrap_or(Position::new(0, 0));
                owner.inline(position.line, position.column, &found.specifier)
            } else {
                match self.resolve(owner, &found)? {
                    Some(url) => url,
                    None => {
                        let frame = TraceFrame {
                            owner: owner.clone(),
                            specifier: found.specifier,
                            position: found.position,
                        };
                        return Err(CookError::resolve(owner, frame));
                    }
                }
            };

            let mut reference = Reference {
                owner: owner.clone(),
                specifier: found.specifier,
                url,
                kind: found.kind,
                position: found.position,
                expected_content_type: found.content_type,
                flags: found.flags,
            };
            self.redirect(&mut reference)?;

            if let Some(content) = found.inline_content {
                seeds.push(Seed {
                    url: reference.url.clone(),
                    content,
                    content_type: reference.expected_content_type.clone(),
                });
            }
            references.push(reference);
        }
        Ok((references, seeds))
    }

    /// First plugin mapping the specifier wins.
    fn resolve(
        &self,
        owner: &ResourceUrl,
        found: &FoundReference,
    ) -> Result<Option<ResourceUrl>, CookError> {
        for plugin in self.plugins.iter() {
            let resolved = plugin
                .resolve_reference(owner, &found.specifier, found.kind)
                .map_err(|e| CookError::hook(owner, "resolveReference", plugin.name(), &e))?;
            if resolved.is_some() {
                return Ok(resolved);
            }
        }
        Ok(None)
    }

    fn redirect(&self, reference: &mut Reference) -> Result<(), CookError> {
        for plugin in self.plugins.iter() {
            let redirect = plugin.redirect_reference(reference).map_err(|e| {
                CookError::hook(&reference.owner, "redirectReference", plugin.name(), &e)
            })?;
            if let Some(redirect) = redirect {
                reference.url = redirect.url;
                if redirect.content_type.is_some() {
                    reference.expected_content_type = redirect.content_type;
                }
            }
        }
        Ok(())
    }

    /// Every plugin's policy, merged.
    fn collect_hot_policy(&self, draft: &Draft) -> Result<HotPolicy, CookError> {
        let mut policy = HotPolicy::default();
        for plugin in self.plugins.iter() {
            let collected = plugin.collect_hot_policy(draft).map_err(|e| {
                CookError::hook(&draft.url, "collectHotPolicy", plugin.name(), &e)
            })?;
            if let Some(collected) = collected {
                policy.merge(collected);
            }
        }
        Ok(policy)
    }
}
