//! Hot update decisions.
//!
//! Given a changed url, search the graph for the frontier of nodes that can
//! take the change in place. The search fails closed: anything it cannot
//! prove safe becomes a full reload.
//!
//! ```text
//! visit(U):
//!   declines            -> FULL
//!   accepts self        -> replace(U)
//!   no dependents       -> FULL
//!   every dependent D accepts U
//!                       -> replace(U), visit(D) for each D,
//!                          at least one D reaching a boundary
//!   otherwise           -> FULL
//! ```
//!
//! Coming back to a node still being visited closes a cycle. That edge adds
//! nothing; the node needs a boundary through some other dependent.
//!
//! Dependents are walked in sorted order, so the same graph and url always
//! produce the same outcome. The walk never suspends.


use std::fmt;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::core::ResourceUrl;
use crate::graph::{UrlGraph, UrlInfo};
use crate::utils::mime::ResourceClass;

// =============================================================================
// Outcome
// =============================================================================

/// Replace one resource in the live client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
    #[serde(rename = "type")]
    pub class: ResourceClass,
    /// Resource to replace
    #[serde(skip)]
    pub url: ResourceUrl,
    /// Client-facing path of `url`
    pub boundary: String,
    /// Resource whose accept handler runs for this replacement
    #[serde(skip)]
    pub accepted_by: ResourceUrl,
    pub accepted_by_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    FullReload(FullReason),
    HotAccepted(Vec<Instruction>),
}

impl Outcome {
    #[inline]
    pub fn is_full(&self) -> bool {
        matches!(self, Self::FullReload(_))
    }

    pub fn instructions(&self) -> &[Instruction] {
        match self {
            Self::FullReload(_) => &[],
            Self::HotAccepted(instructions) => instructions,
        }
    }
}

/// Why a change could not be hot-applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FullReason {
    /// The node asked for full reloads
    Declined(ResourceUrl),
    /// Nothing above the node could take the change
    NoBoundary(ResourceUrl),
    /// A dependent does not accept its changed dependency
    NotAccepted {
        url: ResourceUrl,
        dependent: ResourceUrl,
    },
    /// The walk hit an entry point without an accept boundary
    EntryPoint(ResourceUrl),
    /// The walk came back to a node still being resolved
    Cycle(ResourceUrl),
    /// A node on the walk has not been re-cooked since it was invalidated
    Stale(ResourceUrl),
    Unknown(ResourceUrl),
    /// Decided outside of the graph walk (removal, cook failure, ...)
    Other(String),
}

impl FullReason {
    /// Node that declined, for the `declinedBy` wire field.
    pub fn declined_by(&self) -> Option<&ResourceUrl> {
        match self {
            Self::Declined(url) => Some(url),
            _ => None,
        }
    }
}

impl fmt::Display for FullReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declined(url) => write!(f, "{url} declines hot update"),
            Self::NoBoundary(url) => write!(f, "no accept boundary above {url}"),
            Self::NotAccepted { url, dependent } => {
                write!(f, "{dependent} does not accept {url}")
            }
            Self::EntryPoint(url) => write!(f, "reached entry point {url}"),
            Self::Cycle(url) => write!(f, "circular dependency through {url}"),
            Self::Stale(url) => write!(f, "{url} is not up to date"),
            Self::Unknown(url) => write!(f, "{url} is not in the graph"),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}

// =============================================================================
// Walk
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    /// On the walk stack at this depth
    InProgress(usize),
    /// Covered only through the stack node at this depth
    Pending(usize),
    Accepted,
}

/// How a visited node is covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cover {
    Boundary,
    /// Through a cycle back to the stack node at this depth
    Through(usize),
}

struct Walk<'g> {
    graph: &'g UrlGraph,
    visits: FxHashMap<&'g ResourceUrl, Visit>,
    instructions: Vec<Instruction>,
    depth: usize,
}

/// Decide how the live client should take a change of `url`.
pub fn decide(graph: &UrlGraph, url: &ResourceUrl) -> Outcome {
    let mut walk = Walk {
        graph,
        visits: FxHashMap::default(),
        instructions: Vec::new(),
        depth: 0,
    };
    match walk.visit(url) {
        Ok(Cover::Boundary) => Outcome::HotAccepted(walk.instructions),
        Ok(Cover::Through(_)) => Outcome::FullReload(FullReason::Cycle(url.clone())),
        Err(reason) => Outcome::FullReload(reason),
    }
}

impl<'g> Walk<'g> {
    fn node(&self, url: &ResourceUrl) -> Result<&'g UrlInfo, FullReason> {
        let graph = self.graph;
        let info = graph
            .get(url.as_str())
            .ok_or_else(|| FullReason::Unknown(url.clone()))?;
        if !info.is_valid() {
            return Err(FullReason::Stale(info.url().clone()));
        }
        Ok(info)
    }

    /// Resolve `url` against its dependents.
    ///
    /// A dependent still on the walk stack closes a cycle. It counts as
    /// covered if that stack node ends up covered, so the result carries the
    /// shallowest such depth. A node whose cycles all lead back to itself or
    /// below has no boundary.
    fn visit(&mut self, url: &ResourceUrl) -> Result<Cover, FullReason> {
        let info = self.node(url)?;
        let url = info.url();
        match self.visits.get(url) {
            Some(Visit::InProgress(depth) | Visit::Pending(depth)) => {
                return Ok(Cover::Through(*depth));
            }
            Some(Visit::Accepted) => return Ok(Cover::Boundary),
            None => {}
        }

        let hot = info.hot();
        if hot.declines_hot_update {
            return Err(FullReason::Declined(url.clone()));
        }
        if hot.accepts_self {
            self.replace(info, info);
            self.visits.insert(url, Visit::Accepted);
            return Ok(Cover::Boundary);
        }
        if info.is_pinned() {
            return Err(FullReason::EntryPoint(url.clone()));
        }

        let dependents = info.sorted_dependents();
        if dependents.is_empty() {
            return Err(FullReason::NoBoundary(url.clone()));
        }

        let mut boundaries = Vec::with_capacity(dependents.len());
        for dependent in &dependents {
            let dependent = self.node(dependent)?;
            if !dependent.hot().accepts_dependency(url) {
                return Err(FullReason::NotAccepted {
                    url: url.clone(),
                    dependent: dependent.url().clone(),
                });
            }
            boundaries.push(dependent);
        }

        let depth = self.depth;
        self.visits.insert(url, Visit::InProgress(depth));
        let slot = self.instructions.len();
        self.replace(info, boundaries[0]);

        self.depth += 1;
        let mut covered_by = None;
        let mut through = usize::MAX;
        for dependent in boundaries {
            match self.visit(dependent.url()) {
                Ok(Cover::Boundary) => {
                    covered_by.get_or_insert(dependent);
                }
                Ok(Cover::Through(ancestor)) => through = through.min(ancestor),
                Err(reason) => {
                    self.depth -= 1;
                    return Err(reason);
                }
            }
        }
        self.depth -= 1;

        if let Some(boundary) = covered_by {
            let instruction = &mut self.instructions[slot];
            instruction.accepted_by = boundary.url().clone();
            instruction.accepted_by_path = client_path(boundary);
            self.visits.insert(url, Visit::Accepted);
            return Ok(Cover::Boundary);
        }
        if through >= depth {
            return Err(FullReason::Cycle(url.clone()));
        }
        self.visits.insert(url, Visit::Pending(through));
        Ok(Cover::Through(through))
    }

    fn replace(&mut self, info: &UrlInfo, accepted_by: &UrlInfo) {
        self.instructions.push(Instruction {
            class: ResourceClass::of(info.content_type().unwrap_or_default()),
            url: info.url().clone(),
            boundary: client_path(info),
            accepted_by: accepted_by.url().clone(),
            accepted_by_path: client_path(accepted_by),
        });
    }
}

fn client_path(info: &UrlInfo) -> String {
    info.generated_url()
        .map_or_else(|| info.url().to_string(), str::to_string)
}
