//! Live update wire protocol.
//!
//! One event per hot update decision, pushed to every subscriber of a room:
//!
//! ```json
//! {"type":"reload","data":{"cause":"/js/app.js","type":"hot","typeReason":"accepted by /js/app.js",
//!   "hotInstructions":[{"type":"script","boundary":"/js/app.js","acceptedByPath":"/js/app.js"}]}}
//! {"type":"reload","data":{"cause":"/index.html","type":"full","typeReason":"...","declinedBy":"/index.html"}}
//! ```

use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::core::ResourceUrl;
use crate::hot::{FullReason, Instruction, Outcome};

/// Event sent over the live update channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum LiveEvent {
    Reload(Reload),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadKind {
    Full,
    Hot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reload {
    /// Client path of the change that produced this event
    pub cause: String,
    #[serde(rename = "type")]
    pub kind: ReloadKind,
    pub type_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declined_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hot_instructions: Option<Vec<Instruction>>,
}

impl LiveEvent {
    /// Serialize a hot update decision.
    ///
    /// Urls under `root` are shown as request paths.
    pub fn from_outcome(cause: &ResourceUrl, outcome: &Outcome, root: &ResourceUrl) -> Self {
        let cause = client_path(cause, root);
        let reload = match outcome {
            Outcome::FullReload(reason) => Reload {
                cause,
                kind: ReloadKind::Full,
                type_reason: reason.to_string(),
                declined_by: reason.declined_by().map(|url| client_path(url, root)),
                hot_instructions: None,
            },
            Outcome::HotAccepted(instructions) => Reload {
                cause,
                kind: ReloadKind::Hot,
                type_reason: accepted_reason(instructions),
                declined_by: None,
                hot_instructions: Some(instructions.clone()),
            },
        };
        Self::Reload(reload)
    }

    /// Full reload decided outside of the hot update walk.
    pub fn full(cause: &ResourceUrl, reason: impl Into<String>, root: &ResourceUrl) -> Self {
        Self::from_outcome(cause, &Outcome::FullReload(FullReason::Other(reason.into())), root)
    }

    pub fn kind(&self) -> ReloadKind {
        match self {
            Self::Reload(reload) => reload.kind,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"reload"}"#.to_string())
    }
}

fn accepted_reason(instructions: &[Instruction]) -> String {
    let mut boundaries: Vec<&str> = instructions
        .iter()
        .map(|i| i.accepted_by_path.as_str())
        .collect();
    let mut seen = FxHashSet::default();
    boundaries.retain(|path| seen.insert(*path));
    format!("accepted by {}", boundaries.join(", "))
}

fn client_path(url: &ResourceUrl, root: &ResourceUrl) -> String {
    url.to_server_path(root)
        .unwrap_or_else(|| url.as_str().to_string())
}
