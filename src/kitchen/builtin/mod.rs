//! Built-in plugins, registered in this order:
//!
//! - `inline` - content embedded in an owner document
//! - `file` - relative specifiers and `file://` urls under the root
//! - `scan` - reference extraction for markup, scripts and stylesheets
//! - `hot` - hot-update policy from `import.meta.hot` calls

mod file;
mod hot;
mod inline;
mod scan;

pub use file::FilePlugin;
pub use hot::HotPlugin;
pub use inline::InlinePlugin;
pub use scan::ScanPlugin;

use super::PluginSet;
use crate::core::ResourceUrl;

/// The default plugin set for a project rooted at `root`.
pub fn plugins(root: &ResourceUrl) -> PluginSet {
    PluginSet::new()
        .with(InlinePlugin)
        .with(FilePlugin::new(root.clone()))
        .with(ScanPlugin)
        .with(HotPlugin)
}

/// Whether a specifier points outside the project (remote, data, anchors).
///
/// Such references are left to the browser and never enter the graph.
pub(crate) fn is_external(specifier: &str) -> bool {
    let specifier = specifier.trim();
    if specifier.is_empty() || specifier.starts_with('#') || specifier.starts_with("//") {
        return true;
    }
    match specifier.split_once(':') {
        Some((scheme, _)) => {
            scheme != "file"
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}
