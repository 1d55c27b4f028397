use anyhow::Result;

use crate::kitchen::{BoxFuture, FetchRequest, Fetched, Plugin};

/// Serves inline urls from the content their owner seeded.
pub struct InlinePlugin;

impl Plugin for InlinePlugin {
    fn name(&self) -> &str {
        "inline"
    }

    fn fetch_content<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> BoxFuture<'a, Result<Option<Fetched>>> {
        let fetched = request
            .url
            .is_inline()
            .then(|| request.seeded.clone())
            .flatten()
            .map(|content| Fetched {
                content_type: request.content_type.clone(),
                ..Fetched::new(content)
            });
        Box::pin(std::future::ready(Ok(fetched)))
    }
}
