//! One-shot build.
//!
//! Pins every configured entry, cooks it together with everything it
//! references (lazy references included), then lists what came out:
//!
//! ```text
//! [build] entries(2/2)
//! [build] /index.html        text/html; charset=utf-8        412 B
//! [build] /js/app.js         text/javascript; charset=utf-8  1.2 KiB
//! [build] 2 outputs, 1.6 KiB
//! ```
//!
//! The first cook failure aborts the build with its reference trace.

use anyhow::{Context, Result, anyhow};
use tokio::runtime::Runtime;
use tokio::task::JoinSet;

use crate::config::SimmerConfig;
use crate::core::{BuildMode, ResourceUrl};
use crate::kitchen::{Cooked, Kitchen, builtin};
use crate::log;
use crate::logger::ProgressLine;
use crate::utils::plural::plural_count;

/// One emitted resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub generated_url: String,
    pub content_type: String,
    pub size: usize,
}

/// Cook every entry of `config`. Returns the outputs sorted by url.
pub fn build_site(config: &SimmerConfig, runtime: &Runtime, quiet: bool) -> Result<Vec<Output>> {
    let root = ResourceUrl::from_dir_path(config.root())
        .with_context(|| format!("invalid root: {}", config.root().display()))?;
    let kitchen = Kitchen::new(root.clone(), BuildMode::PRODUCTION, builtin::plugins(&root));

    let entries = config
        .build
        .entries
        .iter()
        .map(|entry| {
            root.join(entry.trim_start_matches('/'))
                .ok_or_else(|| anyhow!("invalid entry `{entry}`"))
        })
        .collect::<Result<Vec<_>>>()?;
    for entry in &entries {
        kitchen.register_entry(entry);
    }

    let progress = (!quiet).then(|| ProgressLine::new(&[("entries", entries.len())]));
    runtime.block_on(cook_entries(&kitchen, &entries, progress.as_ref()))?;
    if let Some(progress) = progress {
        progress.finish();
    }

    let outputs = collect_outputs(&kitchen);
    if !quiet {
        print_outputs(&outputs);
    }
    Ok(outputs)
}

async fn cook_entries(
    kitchen: &std::sync::Arc<Kitchen>,
    entries: &[ResourceUrl],
    progress: Option<&ProgressLine>,
) -> Result<()> {
    let mut cooks = JoinSet::new();
    for entry in entries {
        let kitchen = std::sync::Arc::clone(kitchen);
        let entry = entry.clone();
        cooks.spawn(async move { kitchen.cook(&entry).await });
    }

    while let Some(joined) = cooks.join_next().await {
        // dropping the set aborts the remaining cooks
        joined
            .context("cook task failed")?
            .map_err(|e| anyhow!("build failed\n{}", e.report()))?;
        if let Some(progress) = progress {
            progress.inc("entries");
        }
    }
    Ok(())
}

fn collect_outputs(kitchen: &Kitchen) -> Vec<Output> {
    kitchen.with_graph(|graph| {
        graph
            .outputs()
            .into_iter()
            .filter_map(Cooked::from_info)
            .map(|cooked| Output {
                size: cooked.content.len(),
                generated_url: cooked.generated_url,
                content_type: cooked.content_type,
            })
            .collect()
    })
}

fn print_outputs(outputs: &[Output]) {
    let url_width = outputs.iter().map(|o| o.generated_url.len()).max().unwrap_or(0);
    let type_width = outputs.iter().map(|o| o.content_type.len()).max().unwrap_or(0);
    for output in outputs {
        log!(
            "build";
            "{:url_width$}  {:type_width$}  {}",
            output.generated_url,
            output.content_type,
            format_size(output.size)
        );
    }
    let total = outputs.iter().map(|o| o.size).sum();
    log!("build"; "{}, {}", plural_count(outputs.len(), "output"), format_size(total));
}

fn format_size(bytes: usize) -> String {
    #[allow(clippy::cast_precision_loss)]
    let value = bytes as f64;
    match bytes {
        0..1024 => format!("{bytes} B"),
        1024..1_048_576 => format!("{:.1} KiB", value / 1024.0),
        _ => format!("{:.1} MiB", value / 1_048_576.0),
    }
}
