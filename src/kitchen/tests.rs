use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use rustc_hash::FxHashMap;
use serde_json::json;
use tokio::sync::Notify;

use super::*;
use crate::graph::{HotPolicy, ReferenceKind};
use crate::utils::mime::types;

fn root() -> ResourceUrl {
    ResourceUrl::parse("file:///site/").unwrap()
}

fn url(path: &str) -> ResourceUrl {
    root().join(path).unwrap()
}

// ============================================================================
// Test plugins
// ============================================================================

/// Serves fixed sources; `=> a.js, b.js` lines declare references.
#[derive(Default)]
struct Sources {
    files: FxHashMap<String, String>,
}

impl Sources {
    fn with(mut self, path: &str, content: &str) -> Self {
        self.files.insert(url(path).to_string(), content.to_string());
        self
    }
}

impl Plugin for Sources {
    fn name(&self) -> &str {
        "sources"
    }

    fn resolve_reference(
        &self,
        owner: &ResourceUrl,
        specifier: &str,
        _kind: ReferenceKind,
    ) -> Result<Option<ResourceUrl>> {
        Ok(specifier
            .starts_with("./")
            .then(|| owner.join(specifier))
            .flatten())
    }

    fn fetch_content<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> BoxFuture<'a, Result<Option<Fetched>>> {
        let fetched = self.files.get(request.url.as_str()).map(|text| {
            let mut fetched = Fetched::new(text.as_str()).with_content_type(types::PLAIN);
            fetched.references = text
                .lines()
                .filter_map(|line| line.strip_prefix("=> "))
                .flat_map(|targets| targets.split(", "))
                .map(|target| {
                    let found = FoundReference::new(target.trim_end_matches('?'), ReferenceKind::ModuleImport);
                    if target.ends_with('?') { found.lazy() } else { found }
                })
                .collect();
            fetched
        });
        Box::pin(std::future::ready(Ok(fetched)))
    }
}

/// Counts fetches and holds each one until released.
#[derive(Default)]
struct Gated {
    fetches: AtomicUsize,
    gate: Notify,
    fail: bool,
}

impl Plugin for Gated {
    fn name(&self) -> &str {
        "gated"
    }

    fn fetch_content<'a>(
        &'a self,
        _request: &'a FetchRequest,
    ) -> BoxFuture<'a, Result<Option<Fetched>>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            if self.fail {
                return Err(anyhow!("disk on fire"));
            }
            Ok(Some(Fetched::new("gated")))
        })
    }
}

/// Transform with an optional sourcemap.
struct Rewrite {
    name: &'static str,
    apply: fn(&str) -> String,
    with_map: bool,
}

impl Plugin for Rewrite {
    fn name(&self) -> &str {
        self.name
    }

    fn transform_content<'a>(
        &'a self,
        draft: &'a Draft,
    ) -> BoxFuture<'a, Result<Option<Transformed>>> {
        let transformed = draft.content.as_text().map(|text| {
            let step = Transformed::content((self.apply)(text));
            if self.with_map {
                step.with_sourcemap(json!({ "version": 3, "names": [self.name] }))
            } else {
                step
            }
        });
        Box::pin(std::future::ready(Ok(transformed)))
    }
}

struct Broken;

impl Plugin for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn transform_content<'a>(
        &'a self,
        _draft: &'a Draft,
    ) -> BoxFuture<'a, Result<Option<Transformed>>> {
        Box::pin(std::future::ready(Err(anyhow!("unexpected token"))))
    }
}

struct Policy(HotPolicy);

impl Plugin for Policy {
    fn name(&self) -> &str {
        "policy"
    }

    fn collect_hot_policy(&self, _draft: &Draft) -> Result<Option<HotPolicy>> {
        Ok(Some(self.0.clone()))
    }
}

/// Tags every `a.js` reference with `?v=1`.
struct Version;

impl Plugin for Version {
    fn name(&self) -> &str {
        "version"
    }

    fn redirect_reference(&self, reference: &Reference) -> Result<Option<Redirect>> {
        Ok((reference.url.last_segment() == "a.js").then(|| Redirect {
            url: ResourceUrl::parse(&format!("{}?v=1", reference.url)).unwrap(),
            content_type: Some(types::JAVASCRIPT.to_string()),
        }))
    }
}

fn kitchen(plugins: PluginSet) -> Arc<Kitchen> {
    Kitchen::new(root(), BuildMode::DEVELOPMENT, plugins)
}

async fn wait_for_fetches(gated: &Gated, count: usize) {
    while gated.fetches.load(Ordering::SeqCst) < count {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Single flight
// ============================================================================

#[tokio::test]
async fn test_concurrent_cooks_share_one_run() {
    let gated = Arc::new(Gated::default());
    let mut plugins = PluginSet::new();
    plugins.push(gated.clone());
    let kitchen = kitchen(plugins);
    let target = url("a.txt");

    let waiters: Vec<_> = (0..5)
        .map(|_| {
            let kitchen = Arc::clone(&kitchen);
            let target = target.clone();
            tokio::spawn(async move { kitchen.cook(&target).await })
        })
        .collect();

    wait_for_fetches(&gated, 1).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(kitchen.in_flight(), 1);
    gated.gate.notify_one();

    let mut results = Vec::new();
    for waiter in waiters {
        results.push(waiter.await.unwrap().unwrap());
    }
    assert_eq!(gated.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(kitchen.pipeline_runs(), 1);
    assert!(results.iter().all(|cooked| cooked == &results[0]));
    assert_eq!(results[0].content.as_text(), Some("gated"));
    assert_eq!(kitchen.in_flight(), 0);
}

#[tokio::test]
async fn test_failure_shared_by_all_waiters() {
    let gated = Arc::new(Gated {
        fail: true,
        ..Gated::default()
    });
    let mut plugins = PluginSet::new();
    plugins.push(gated.clone());
    let kitchen = kitchen(plugins);
    let target = url("a.txt");

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let kitchen = Arc::clone(&kitchen);
            let target = target.clone();
            tokio::spawn(async move { kitchen.cook(&target).await })
        })
        .collect();
    wait_for_fetches(&gated, 1).await;
    gated.gate.notify_one();

    let mut errors = Vec::new();
    for waiter in waiters {
        errors.push(waiter.await.unwrap().unwrap_err());
    }
    assert_eq!(gated.fetches.load(Ordering::SeqCst), 1);
    for error in &errors {
        assert_eq!(error.kind, ErrorKind::Load(LoadCode::Other));
        assert_eq!(error.plugin.as_deref(), Some("gated"));
        assert_eq!(error.to_string(), errors[0].to_string());
    }
    assert!(!kitchen.with_graph(|graph| graph.is_valid(target.as_str())));
}

#[tokio::test]
async fn test_valid_url_is_not_recooked() {
    let kitchen = kitchen(PluginSet::new().with(Sources::default().with("a.txt", "a")));
    let target = url("a.txt");

    kitchen.cook(&target).await.unwrap();
    kitchen.cook(&target).await.unwrap();
    assert_eq!(kitchen.pipeline_runs(), 1);

    kitchen.invalidate(&target);
    kitchen.cook(&target).await.unwrap();
    assert_eq!(kitchen.pipeline_runs(), 2);
}

#[tokio::test]
async fn test_invalidation_during_cook_leaves_node_stale() {
    let gated = Arc::new(Gated::default());
    let mut plugins = PluginSet::new();
    plugins.push(gated.clone());
    let kitchen = kitchen(plugins);
    let target = url("a.txt");

    let waiter = {
        let kitchen = Arc::clone(&kitchen);
        let target = target.clone();
        tokio::spawn(async move { kitchen.cook(&target).await })
    };
    wait_for_fetches(&gated, 1).await;
    assert!(kitchen.invalidate(&target));
    gated.gate.notify_one();

    waiter.await.unwrap().unwrap();
    kitchen.with_graph(|graph| {
        let info = graph.get(target.as_str()).unwrap();
        assert!(!info.is_valid());
        assert_eq!(info.cook_count(), 1);
    });
}

#[tokio::test]
async fn test_cook_after_invalidation_does_not_join_outdated_flight() {
    let gated = Arc::new(Gated::default());
    let mut plugins = PluginSet::new();
    plugins.push(gated.clone());
    let kitchen = kitchen(plugins);
    let target = url("a.txt");

    let spawn_cook = || {
        let kitchen = Arc::clone(&kitchen);
        let target = target.clone();
        tokio::spawn(async move { kitchen.cook(&target).await })
    };

    let first = spawn_cook();
    wait_for_fetches(&gated, 1).await;
    assert!(kitchen.invalidate(&target));
    let second = spawn_cook();
    tokio::task::yield_now().await;

    gated.gate.notify_one();
    first.await.unwrap().unwrap();
    wait_for_fetches(&gated, 2).await;
    gated.gate.notify_one();
    second.await.unwrap().unwrap();

    assert_eq!(kitchen.pipeline_runs(), 2);
    kitchen.with_graph(|graph| {
        let info = graph.get(target.as_str()).unwrap();
        assert!(info.is_valid());
        assert_eq!(info.cook_count(), 2);
    });
}

#[tokio::test]
async fn test_shutdown_aborts_in_flight() {
    let gated = Arc::new(Gated::default());
    let mut plugins = PluginSet::new();
    plugins.push(gated.clone());
    let kitchen = kitchen(plugins);
    let target = url("a.txt");

    let waiter = {
        let kitchen = Arc::clone(&kitchen);
        let target = target.clone();
        tokio::spawn(async move { kitchen.cook(&target).await })
    };
    wait_for_fetches(&gated, 1).await;
    kitchen.shutdown();

    let error = waiter.await.unwrap().unwrap_err();
    assert_eq!(error.kind, ErrorKind::Aborted);
    assert_eq!(kitchen.in_flight(), 0);

    let again = kitchen.cook(&target).await.unwrap_err();
    assert_eq!(again.kind, ErrorKind::Aborted);
}

// ============================================================================
// Pipeline
// ============================================================================

#[tokio::test]
async fn test_nothing_fetched_is_not_found() {
    let kitchen = kitchen(PluginSet::new());
    let error = kitchen.cook(&url("missing.js")).await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::Load(LoadCode::NotFound));
    assert!(error.is_not_found());
}

#[tokio::test]
async fn test_transforms_fold_with_sourcemaps() {
    let plugins = PluginSet::new()
        .with(Sources::default().with("a.txt", "abc"))
        .with(Rewrite {
            name: "upper",
            apply: |text| text.to_uppercase(),
            with_map: true,
        })
        .with(Rewrite {
            name: "bang",
            apply: |text| format!("{text}!"),
            with_map: true,
        });
    let kitchen = kitchen(plugins);
    let target = url("a.txt");

    let cooked = kitchen.cook(&target).await.unwrap();
    assert_eq!(cooked.content.as_text(), Some("ABC!"));

    kitchen.with_graph(|graph| {
        let info = graph.get(target.as_str()).unwrap();
        assert_eq!(info.original_content().and_then(Content::as_text), Some("abc"));
        let chain = info.sourcemap().unwrap();
        let layers: Vec<_> = chain.layers().iter().map(|l| &*l.plugin).collect();
        assert_eq!(layers, ["upper", "bang"]);
    });
}

#[tokio::test]
async fn test_transform_without_map_drops_chain() {
    let plugins = PluginSet::new()
        .with(Sources::default().with("a.txt", "abc"))
        .with(Rewrite {
            name: "upper",
            apply: |text| text.to_uppercase(),
            with_map: true,
        })
        .with(Rewrite {
            name: "bang",
            apply: |text| format!("{text}!"),
            with_map: false,
        });
    let kitchen = kitchen(plugins);
    let target = url("a.txt");

    kitchen.cook(&target).await.unwrap();
    kitchen.with_graph(|graph| assert!(graph.get(target.as_str()).unwrap().sourcemap().is_none()));
}

#[tokio::test]
async fn test_transform_error_names_plugin() {
    let plugins = PluginSet::new()
        .with(Sources::default().with("a.txt", "abc"))
        .with(Broken);
    let kitchen = kitchen(plugins);

    let error = kitchen.cook(&url("a.txt")).await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::Transform);
    assert_eq!(error.plugin.as_deref(), Some("broken"));
    assert_eq!(error.hook, "transformContent");
}

#[tokio::test]
async fn test_dependencies_cooked_lazy_deferred() {
    let sources = Sources::default()
        .with("index.txt", "=> ./a.txt, ./lazy.txt?")
        .with("a.txt", "=> ./b.txt, ./index.txt")
        .with("b.txt", "b")
        .with("lazy.txt", "lazy");
    let kitchen = kitchen(PluginSet::new().with(sources));
    let index = url("index.txt");
    kitchen.register_entry(&index);

    kitchen.cook(&index).await.unwrap();
    kitchen.with_graph(|graph| {
        graph.assert_consistent();
        assert!(graph.is_valid(url("a.txt").as_str()));
        assert!(graph.is_valid(url("b.txt").as_str()));
        assert!(graph.contains(url("lazy.txt").as_str()));
        assert!(!graph.is_valid(url("lazy.txt").as_str()));
    });
    assert_eq!(kitchen.pipeline_runs(), 3);
}

#[tokio::test]
async fn test_production_cooks_lazy() {
    let sources = Sources::default()
        .with("index.txt", "=> ./lazy.txt?")
        .with("lazy.txt", "lazy");
    let kitchen = Kitchen::new(root(), BuildMode::PRODUCTION, PluginSet::new().with(sources));

    kitchen.cook(&url("index.txt")).await.unwrap();
    assert!(kitchen.with_graph(|graph| graph.is_valid(url("lazy.txt").as_str())));
}

#[tokio::test]
async fn test_unresolved_reference_carries_trace() {
    let sources = Sources::default()
        .with("index.txt", "=> ./a.txt")
        .with("a.txt", "=> lodash");
    let kitchen = kitchen(PluginSet::new().with(sources));

    let error = kitchen.cook(&url("index.txt")).await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::Resolve);
    assert_eq!(error.url, url("a.txt"));
    let trace: Vec<_> = error
        .trace
        .iter()
        .map(|frame| (frame.owner.last_segment(), frame.specifier.as_str()))
        .collect();
    assert_eq!(trace, [("a.txt", "lodash"), ("index.txt", "./a.txt")]);
}

#[tokio::test]
async fn test_redirect_rewrites_target() {
    let sources = Sources::default().with("index.txt", "=> ./a.js");
    let kitchen = kitchen(PluginSet::new().with(sources).with(Version));

    // a.js?v=1 has no source
    let error = kitchen.cook(&url("index.txt")).await.unwrap_err();
    assert_eq!(error.url.as_str(), "file:///site/a.js?v=1");

    kitchen.with_graph(|graph| {
        let index = graph.get(url("index.txt").as_str()).unwrap();
        let reference = &index.references()[0];
        assert_eq!(reference.specifier, "./a.js");
        assert_eq!(reference.expected_content_type.as_deref(), Some(types::JAVASCRIPT));
        assert!(graph.contains("file:///site/a.js?v=1"));
        assert!(!graph.contains(url("a.js").as_str()));
    });
}

#[tokio::test]
async fn test_hot_policies_merged() {
    let plugins = PluginSet::new()
        .with(Sources::default().with("a.txt", "a"))
        .with(Policy(HotPolicy::accepting([url("b.txt")])))
        .with(Policy(HotPolicy::self_accepting()));
    let kitchen = kitchen(plugins);
    let target = url("a.txt");

    kitchen.cook(&target).await.unwrap();
    kitchen.with_graph(|graph| {
        let hot = graph.get(target.as_str()).unwrap().hot();
        assert!(hot.accepts_self);
        assert!(hot.accepts_dependency(&url("b.txt")));
    });
}

#[tokio::test]
async fn test_removed_reference_prunes_on_recook() {
    let dir = tempfile::tempdir().unwrap();
    let root = ResourceUrl::from_dir_path(dir.path()).unwrap();
    std::fs::write(dir.path().join("main.js"), "import './a.js';").unwrap();
    std::fs::write(dir.path().join("a.js"), "import './b.js';").unwrap();
    std::fs::write(dir.path().join("b.js"), "export {};").unwrap();
    let kitchen = Kitchen::new(root.clone(), BuildMode::DEVELOPMENT, builtin::plugins(&root));
    let main = root.join("main.js").unwrap();
    kitchen.register_entry(&main);

    kitchen.cook(&main).await.unwrap();
    assert_eq!(kitchen.with_graph(|graph| graph.len()), 3);

    std::fs::write(dir.path().join("main.js"), "export {};").unwrap();
    kitchen.invalidate(&main);
    kitchen.cook(&main).await.unwrap();
    kitchen.with_graph(|graph| {
        assert_eq!(graph.len(), 1);
        graph.assert_consistent();
    });
}

// ============================================================================
// Built-in plugins end to end
// ============================================================================

#[tokio::test]
async fn test_builtin_site() {
    let dir = tempfile::tempdir().unwrap();
    let root = ResourceUrl::from_dir_path(dir.path()).unwrap();
    std::fs::write(
        dir.path().join("index.html"),
        "<link rel=\"stylesheet\" href=\"/style.css\">\n<script type=\"module\">\nimport './main.js';\nimport.meta.hot.accept();\n</script>",
    )
    .unwrap();
    std::fs::write(dir.path().join("style.css"), "body { background: url(./bg.png) }").unwrap();
    std::fs::write(dir.path().join("bg.png"), [0x89, b'P', b'N', b'G', 0xff]).unwrap();
    std::fs::write(
        dir.path().join("main.js"),
        "import { x } from './dep.js';\nconst lazy = () => import('./lazy.js');",
    )
    .unwrap();
    std::fs::write(dir.path().join("dep.js"), "export const x = 1;").unwrap();

    let kitchen = Kitchen::new(root.clone(), BuildMode::DEVELOPMENT, builtin::plugins(&root));
    let index = root.join("index.html").unwrap();
    kitchen.register_entry(&index);

    let cooked = kitchen.cook(&index).await.unwrap();
    assert_eq!(cooked.generated_url, "/index.html");
    assert_eq!(cooked.content_type, types::HTML);

    let inline = index.inline(2, 23, "js");
    kitchen.with_graph(|graph| {
        graph.assert_consistent();
        for path in ["style.css", "bg.png", "main.js", "dep.js"] {
            assert!(graph.is_valid(root.join(path).unwrap().as_str()), "{path}");
        }
        assert!(!graph.is_valid(root.join("lazy.js").unwrap().as_str()));

        let script = graph.get(inline.as_str()).unwrap();
        assert!(script.is_valid());
        assert!(script.hot().accepts_self);
        assert_eq!(script.content_type(), Some(types::JAVASCRIPT));
        assert!(script.dependencies().contains(&root.join("main.js").unwrap()));

        let png = graph.get(root.join("bg.png").unwrap().as_str()).unwrap();
        assert_eq!(png.content_type(), Some(types::PNG));
        assert!(matches!(png.content(), Some(Content::Binary(_))));

        assert!(graph.get(index.as_str()).unwrap().hot().declines_hot_update);
    });
}
