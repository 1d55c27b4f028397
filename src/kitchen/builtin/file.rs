use anyhow::{Context, Result};

use crate::core::ResourceUrl;
use crate::graph::{Content, ReferenceKind};
use crate::kitchen::{BoxFuture, FetchRequest, Fetched, Plugin};

/// Resolves path specifiers and reads `file://` urls below the root.
pub struct FilePlugin {
    root: ResourceUrl,
}

impl FilePlugin {
    pub fn new(root: ResourceUrl) -> Self {
        Self { root }
    }
}

impl Plugin for FilePlugin {
    fn name(&self) -> &str {
        "file"
    }

    /// `./x` and `../x` resolve against the owner, `/x` against the root.
    /// Bare specifiers are left alone.
    fn resolve_reference(
        &self,
        owner: &ResourceUrl,
        specifier: &str,
        _kind: ReferenceKind,
    ) -> Result<Option<ResourceUrl>> {
        let specifier = specifier.trim();
        let resolved = if specifier.starts_with("./") || specifier.starts_with("../") {
            owner.join(specifier)
        } else if let Some(absolute) = specifier.strip_prefix('/') {
            self.root.join(absolute)
        } else if specifier.starts_with("file:") {
            ResourceUrl::parse(specifier).ok()
        } else {
            None
        };
        Ok(resolved)
    }

    fn fetch_content<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> BoxFuture<'a, Result<Option<Fetched>>> {
        Box::pin(async move {
            let url = &request.url;
            if !url.is_file() || url.is_inline() {
                return Ok(None);
            }
            if !url.is_within(&request.root) {
                return Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
                    .with_context(|| format!("{url} is outside of {}", request.root));
            }
            let Some(path) = url.to_file_path() else {
                return Ok(None);
            };

            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(Some(Fetched::new(Content::from_bytes(bytes))))
        })
    }
}
