//! Project configuration from `simmer.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/   # [build], [serve], [reload]
//! ├── error.rs   # ConfigError, ConfigDiagnostics
//! ├── util.rs    # find_config_file
//! └── mod.rs     # SimmerConfig (this file)
//! ```
//!
//! Loading order: file (or defaults) → path normalization → CLI overrides →
//! validation. Validation reports every problem at once.

mod error;
pub mod section;
mod util;

pub use error::{ConfigDiagnostic, ConfigDiagnostics, ConfigError};
pub use section::{BuildConfig, ReloadConfig, ServeConfig};

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::cli::{Cli, Commands};
use crate::log;
use crate::utils::path::normalize_path;
use util::find_config_file;

/// Default config file name, searched upward from the working directory.
pub const CONFIG_FILE: &str = "simmer.toml";

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing simmer.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimmerConfig {
    /// Absolute path to the config file; empty when running on defaults
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub serve: ServeConfig,

    #[serde(default)]
    pub reload: ReloadConfig,
}

impl SimmerConfig {
    /// Load configuration for `cli`.
    ///
    /// Without `-C`, a missing `simmer.toml` means defaults rooted at the
    /// working directory. An explicit `-C` path must exist.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;

        let found = match &cli.config {
            Some(path) => {
                let path = cwd.join(path);
                if !path.is_file() {
                    bail!("config file '{}' not found", path.display());
                }
                Some(path)
            }
            None => find_config_file(&cwd, Path::new(CONFIG_FILE)),
        };

        let mut config = match &found {
            Some(path) => Self::from_path(path)?,
            None => {
                crate::debug!("config"; "no {} found, using defaults", CONFIG_FILE);
                Self::default()
            }
        };

        let base = found
            .as_deref()
            .and_then(Path::parent)
            .map_or_else(|| cwd.clone(), Path::to_path_buf);
        config.config_path = found.map(|p| normalize_path(&p)).unwrap_or_default();
        config.normalize_paths(&base);
        config.apply_command_options(cli);
        config.validate()?;
        Ok(config)
    }

    /// Defaults with the source root at `root`.
    pub fn rooted_at(root: &Path) -> Self {
        let mut config = Self::default();
        config.normalize_paths(root);
        config
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    /// Absolute source root.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.build.root
    }

    // ========================================================================
    // cli configuration updates
    // ========================================================================

    fn apply_command_options(&mut self, cli: &Cli) {
        crate::logger::set_verbose(cli.verbose);

        match &cli.command {
            Commands::Build => {}
            Commands::Serve {
                interface,
                port,
                watch,
            } => {
                Self::update_option(&mut self.serve.interface, interface.as_ref());
                Self::update_option(&mut self.serve.port, port.as_ref());
                Self::update_option(&mut self.serve.watch, watch.as_ref());
            }
        }
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Resolve `build.root` against the directory holding the config file.
    fn normalize_paths(&mut self, base: &Path) {
        self.build.root = normalize_path(&base.join(&self.build.root));
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Check every section, reporting all problems together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut diag = ConfigDiagnostics::new();
        self.build.validate(&mut diag);
        self.serve.validate(&mut diag);
        self.reload.validate(&mut diag);
        diag.into_result()
    }
}

/// Parse a config snippet, panicking on error.
#[cfg(test)]
pub(crate) fn test_parse_config(content: &str) -> SimmerConfig {
    SimmerConfig::from_str(content).unwrap()
}
