//! `[build]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [build]
//! root = "site"                          # Source directory (relative to simmer.toml)
//! entries = ["index.html", "about.html"] # Entry documents, relative to root
//! ignore = ["node_modules", ".git"]      # Path prefixes the watcher skips
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;

/// Build settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Source directory. Absolute after loading.
    pub root: PathBuf,

    /// Entry documents, relative to `root`.
    pub entries: Vec<String>,

    /// Root-relative path prefixes ignored by the watcher.
    pub ignore: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            entries: vec!["index.html".to_string()],
            ignore: ["node_modules", ".git", "target"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl BuildConfig {
    pub(crate) fn validate(&self, diag: &mut ConfigDiagnostics) {
        if !self.root.is_dir() {
            diag.error_with_hint(
                "build.root",
                format!("directory not found: {}", self.root.display()),
                "paths are relative to the directory holding simmer.toml",
            );
        }
        if self.entries.is_empty() {
            diag.error("build.entries", "at least one entry document is required");
        }
        for entry in &self.entries {
            if entry.trim().is_empty() {
                diag.error("build.entries", "entry paths must not be empty");
            } else if entry.split(['/', '\\']).any(|segment| segment == "..") {
                diag.error("build.entries", format!("`{entry}` points outside of root"));
            }
        }
    }
}
