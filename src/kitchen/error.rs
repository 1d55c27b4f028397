//! Cook errors.

use std::fmt;

use thiserror::Error;

use crate::core::ResourceUrl;
use crate::graph::Position;

// ============================================================================
// Kinds
// ============================================================================

/// Load failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadCode {
    NotFound,
    NotAllowed,
    Other,
}

impl LoadCode {
    /// Classify a fetch failure by its root cause.
    pub fn classify(error: &anyhow::Error) -> Self {
        let io = error
            .chain()
            .find_map(|cause| cause.downcast_ref::<std::io::Error>());
        match io.map(std::io::Error::kind) {
            Some(std::io::ErrorKind::NotFound) => Self::NotFound,
            Some(std::io::ErrorKind::PermissionDenied) => Self::NotAllowed,
            _ => Self::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::NotAllowed => "NOT_ALLOWED",
            Self::Other => "OTHER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No plugin mapped a specifier to a url
    Resolve,
    Load(LoadCode),
    /// A hook raised
    Transform,
    /// The cook was cancelled (shutdown)
    Aborted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve => f.write_str("RESOLVE_ERROR"),
            Self::Load(code) => write!(f, "LOAD_ERROR ({})", code.as_str()),
            Self::Transform => f.write_str("TRANSFORM_ERROR"),
            Self::Aborted => f.write_str("ABORTED"),
        }
    }
}

// ============================================================================
// Trace
// ============================================================================

/// One step of a reference chain: `owner` mentions `specifier`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub owner: ResourceUrl,
    pub specifier: String,
    pub position: Option<Position>,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" in {}", self.specifier, self.owner)?;
        if let Some(position) = self.position {
            write!(f, ":{position}")?;
        }
        Ok(())
    }
}

// ============================================================================
// CookError
// ============================================================================

/// Failure of a cook, shared as-is by every waiter of a single-flight group.
#[derive(Debug, Clone, Error)]
#[error("{kind} {url}: {message}")]
pub struct CookError {
    pub kind: ErrorKind,
    /// Url being cooked when the failure happened
    pub url: ResourceUrl,
    /// Hook that failed (`resolveReference`, `fetchContent`, ...)
    pub hook: &'static str,
    pub plugin: Option<String>,
    pub message: String,
    /// Reference chain, innermost first, toward an entry point
    pub trace: Vec<TraceFrame>,
}

impl CookError {
    fn new(kind: ErrorKind, url: &ResourceUrl, hook: &'static str, message: String) -> Self {
        Self {
            kind,
            url: url.clone(),
            hook,
            plugin: None,
            message,
            trace: Vec::new(),
        }
    }

    pub fn resolve(owner: &ResourceUrl, frame: TraceFrame) -> Self {
        let message = format!("cannot resolve \"{}\"", frame.specifier);
        let mut error = Self::new(ErrorKind::Resolve, owner, "resolveReference", message);
        error.trace.push(frame);
        error
    }

    /// No plugin produced content.
    pub fn not_found(url: &ResourceUrl) -> Self {
        Self::new(
            ErrorKind::Load(LoadCode::NotFound),
            url,
            "fetchContent",
            "no plugin provided content".to_string(),
        )
    }

    pub fn load(url: &ResourceUrl, plugin: &str, error: &anyhow::Error) -> Self {
        let code = LoadCode::classify(error);
        Self::new(ErrorKind::Load(code), url, "fetchContent", format!("{error:#}"))
            .with_plugin(plugin)
    }

    pub fn hook(url: &ResourceUrl, hook: &'static str, plugin: &str, error: &anyhow::Error) -> Self {
        Self::new(ErrorKind::Transform, url, hook, format!("{error:#}")).with_plugin(plugin)
    }

    pub fn aborted(url: &ResourceUrl) -> Self {
        Self::new(ErrorKind::Aborted, url, "cook", "cook aborted".to_string())
    }

    fn with_plugin(mut self, plugin: &str) -> Self {
        self.plugin = Some(plugin.to_string());
        self
    }

    /// Append the reference through which the failing url was reached.
    pub fn traced_through(mut self, frame: TraceFrame) -> Self {
        self.trace.push(frame);
        self
    }

    /// Maps to a client error at the server boundary.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Resolve | ErrorKind::Load(LoadCode::NotFound)
        )
    }

    /// Multi-line report: headline, active plugin/hook, then the trace.
    pub fn report(&self) -> String {
        use std::fmt::Write;

        let mut out = self.to_string();
        match &self.plugin {
            Some(plugin) => write!(out, "\n  in {}.{}", plugin, self.hook).ok(),
            None => write!(out, "\n  in {}", self.hook).ok(),
        };
        for frame in &self.trace {
            write!(out, "\n  referenced by {frame}").ok();
        }
        out
    }
}
