//! Hot-update policy from `import.meta.hot` calls.
//!
//! - `import.meta.hot.accept()` / `accept(cb)`: self-accepting
//! - `import.meta.hot.accept("./a.js")` / `accept(["./a.js", ...])`: accepts those dependencies
//! - `import.meta.hot.decline()`: declines
//!
//! Stylesheets always self-accept; markup always declines.

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use crate::core::ResourceUrl;
use crate::graph::HotPolicy;
use crate::kitchen::{Draft, Plugin};
use crate::utils::mime::ResourceClass;

pub struct HotPlugin;

impl Plugin for HotPlugin {
    fn name(&self) -> &str {
        "hot"
    }

    fn collect_hot_policy(&self, draft: &Draft) -> Result<Option<HotPolicy>> {
        let policy = match draft.class() {
            ResourceClass::Markup => Some(HotPolicy::declining()),
            ResourceClass::Stylesheet => Some(HotPolicy::self_accepting()),
            ResourceClass::Script => draft
                .content
                .as_text()
                .map(|text| script_policy(text, draft)),
            ResourceClass::Json | ResourceClass::Other => None,
        };
        Ok(policy)
    }
}

static ACCEPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"import\.meta\.hot\.accept\s*\(\s*").unwrap());
static DECLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"import\.meta\.hot\.decline\s*\(").unwrap());
static STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"\n]*)"|'([^'\n]*)'"#).unwrap());

fn script_policy(text: &str, draft: &Draft) -> HotPolicy {
    let mut policy = HotPolicy {
        declines_hot_update: DECLINE.is_match(text),
        ..HotPolicy::default()
    };

    for call in ACCEPT.find_iter(text) {
        let args = &text[call.end()..];
        match accepted_specifiers(args) {
            Some(specifiers) => {
                let accepted = specifiers
                    .into_iter()
                    .filter_map(|specifier| accepted_url(draft, specifier));
                policy.accepts_dependencies.extend(accepted);
            }
            None => policy.accepts_self = true,
        }
    }
    policy
}

/// Specifiers of an `accept(...)` call, or `None` for a self-accept.
fn accepted_specifiers(args: &str) -> Option<Vec<&str>> {
    let literal = match args.chars().next()? {
        '[' => &args[..args.find(']')?],
        '"' | '\'' => {
            let quote = args.chars().next()?;
            let end = args[1..].find(quote)? + 2;
            &args[..end]
        }
        _ => return None,
    };
    let specifiers = STRING
        .captures_iter(literal)
        .filter_map(|caps| caps.get(1).or(caps.get(2)))
        .map(|m| m.as_str())
        .collect();
    Some(specifiers)
}

/// Accepted dependencies name what the module imports: prefer the resolved
/// reference, fall back to plain url resolution.
fn accepted_url(draft: &Draft, specifier: &str) -> Option<ResourceUrl> {
    if let Some(url) = draft.referenced(specifier) {
        return Some(url.clone());
    }
    let relative = specifier.starts_with("./") || specifier.starts_with("../");
    relative.then(|| draft.url.join(specifier)).flatten()
}
