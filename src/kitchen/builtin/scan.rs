//! Regex-based reference extraction.
//!
//! Good enough for hand-written front-end sources; it does not parse, so
//! references inside comments or string literals are picked up too.

use std::ops::Range;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use super::is_external;
use crate::graph::{Position, ReferenceKind};
use crate::kitchen::{BoxFuture, Draft, FoundReference, Plugin, Transformed};
use crate::utils::mime::{ResourceClass, types};

/// Finds references in markup, module scripts and stylesheets. Never rewrites.
pub struct ScanPlugin;

impl Plugin for ScanPlugin {
    fn name(&self) -> &str {
        "scan"
    }

    fn transform_content<'a>(
        &'a self,
        draft: &'a Draft,
    ) -> BoxFuture<'a, Result<Option<Transformed>>> {
        let found = match draft.content.as_text() {
            Some(text) => match draft.class() {
                ResourceClass::Markup => scan_markup(text),
                ResourceClass::Script => scan_script(text),
                ResourceClass::Stylesheet => scan_stylesheet(text),
                ResourceClass::Json | ResourceClass::Other => Vec::new(),
            },
            None => Vec::new(),
        };
        let transformed = (!found.is_empty()).then(|| Transformed::references(found));
        Box::pin(std::future::ready(Ok(transformed)))
    }
}

// ============================================================================
// Markup
// ============================================================================

static SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script\s*>").unwrap());
static STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b[^>]*>(.*?)</style\s*>").unwrap());
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<link\b([^>]*)>").unwrap());
static MEDIA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(?:img|source|audio|video|iframe|embed)\b([^>]*)>").unwrap()
});
static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(src|href|rel|type)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).unwrap()
});

/// Attribute value with its absolute byte offset.
struct Attr<'a> {
    name: String,
    value: &'a str,
    offset: usize,
}

fn attributes(text: &str, range: Range<usize>) -> Vec<Attr<'_>> {
    ATTR.captures_iter(&text[range.clone()])
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps.get(2).or(caps.get(3)).or(caps.get(4))?;
            Some(Attr {
                name,
                value: &text[range.start + value.start()..range.start + value.end()],
                offset: range.start + value.start(),
            })
        })
        .collect()
}

fn attr<'a, 'b>(attrs: &'b [Attr<'a>], name: &str) -> Option<&'b Attr<'a>> {
    attrs.iter().find(|attr| attr.name == name)
}

fn scan_markup(text: &str) -> Vec<FoundReference> {
    let mut found = Vec::new();
    let mut push = |specifier: &str,
                    offset: usize,
                    kind: ReferenceKind,
                    content_type: Option<&str>| {
        if is_external(specifier) {
            return;
        }
        let mut reference =
            FoundReference::new(specifier.trim(), kind).at(Position::of_offset(text, offset));
        reference.content_type = content_type.map(str::to_string);
        found.push(reference);
    };

    let mut inline = Vec::new();
    for caps in SCRIPT.captures_iter(text) {
        let (Some(tag), Some(body)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let attrs = attributes(text, tag.range());
        let is_script = attr(&attrs, "type").is_none_or(|ty| {
            let ty = ty.value.trim().to_ascii_lowercase();
            ty == "module" || ty.contains("javascript")
        });
        if !is_script {
            continue;
        }
        match attr(&attrs, "src") {
            Some(src) => push(
                src.value,
                src.offset,
                ReferenceKind::MarkupScript,
                Some(types::JAVASCRIPT),
            ),
            None if !body.as_str().trim().is_empty() => {
                inline.push((body.as_str(), body.start(), ResourceClass::Script))
            }
            None => {}
        }
    }

    for caps in STYLE.captures_iter(text) {
        if let Some(body) = caps.get(1)
            && !body.as_str().trim().is_empty()
        {
            inline.push((body.as_str(), body.start(), ResourceClass::Stylesheet));
        }
    }

    for caps in LINK.captures_iter(text) {
        let Some(tag) = caps.get(1) else { continue };
        let attrs = attributes(text, tag.range());
        let Some(href) = attr(&attrs, "href") else {
            continue;
        };
        let rel = attr(&attrs, "rel")
            .map(|rel| rel.value.to_ascii_lowercase())
            .unwrap_or_default();
        let rels: Vec<&str> = rel.split_whitespace().collect();
        if rels.iter().any(|r| {
            matches!(
                *r,
                "canonical" | "alternate" | "preconnect" | "dns-prefetch" | "author" | "license"
            )
        }) {
            continue;
        }
        if rels.contains(&"stylesheet") {
            push(href.value, href.offset, ReferenceKind::MarkupStylesheet, Some(types::CSS));
        } else if rels.contains(&"modulepreload") {
            push(href.value, href.offset, ReferenceKind::MarkupScript, Some(types::JAVASCRIPT));
        } else {
            push(href.value, href.offset, ReferenceKind::MarkupResource, None);
        }
    }

    for caps in MEDIA.captures_iter(text) {
        let Some(tag) = caps.get(1) else { continue };
        let attrs = attributes(text, tag.range());
        if let Some(src) = attr(&attrs, "src") {
            push(src.value, src.offset, ReferenceKind::MarkupResource, None);
        }
    }

    for (body, offset, class) in inline {
        let content_type = match class {
            ResourceClass::Stylesheet => types::CSS,
            _ => types::JAVASCRIPT,
        };
        found.push(
            FoundReference::inline(body, class.extension(), content_type)
                .at(Position::of_offset(text, offset)),
        );
    }

    found.sort_by_key(|reference| reference.position.map(|p| (p.line, p.column)));
    found
}

// ============================================================================
// Scripts
// ============================================================================

static STATIC_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:import|export)\s*(?:[\w*${}\s,]+?\s*from\s*)?["']([^"'\n]+)["']"#).unwrap()
});
static DYNAMIC_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bimport\s*\(\s*["']([^"'\n]+)["']\s*\)"#).unwrap()
});

fn scan_script(text: &str) -> Vec<FoundReference> {
    let mut found = Vec::new();
    for (regex, kind) in [
        (&*STATIC_IMPORT, ReferenceKind::ModuleImport),
        (&*DYNAMIC_IMPORT, ReferenceKind::DynamicImport),
    ] {
        for caps in regex.captures_iter(text) {
            let Some(specifier) = caps.get(1) else { continue };
            if is_external(specifier.as_str()) {
                continue;
            }
            let mut reference = FoundReference::new(specifier.as_str(), kind)
                .at(Position::of_offset(text, specifier.start()));
            if kind == ReferenceKind::DynamicImport {
                reference = reference.lazy();
            }
            found.push(reference);
        }
    }
    found.sort_by_key(|reference| reference.position.map(|p| (p.line, p.column)));
    found
}

// ============================================================================
// Stylesheets
// ============================================================================

static CSS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?["']?([^"')\s;]+)["']?\s*\)?[^;]*;?"#).unwrap()
});
static CSS_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"url\(\s*["']?([^"')]+?)["']?\s*\)"#).unwrap());

fn scan_stylesheet(text: &str) -> Vec<FoundReference> {
    let mut found = Vec::new();
    let mut imports: Vec<Range<usize>> = Vec::new();

    for caps in CSS_IMPORT.captures_iter(text) {
        let (Some(whole), Some(specifier)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        imports.push(whole.range());
        if is_external(specifier.as_str()) {
            continue;
        }
        let mut reference = FoundReference::new(specifier.as_str(), ReferenceKind::StylesheetImport)
            .at(Position::of_offset(text, specifier.start()));
        reference.content_type = Some(types::CSS.to_string());
        found.push(reference);
    }

    for caps in CSS_URL.captures_iter(text) {
        let Some(specifier) = caps.get(1) else { continue };
        if imports.iter().any(|range| range.contains(&specifier.start()))
            || is_external(specifier.as_str())
        {
            continue;
        }
        found.push(
            FoundReference::new(specifier.as_str().trim(), ReferenceKind::StylesheetUrl)
                .at(Position::of_offset(text, specifier.start())),
        );
    }

    found.sort_by_key(|reference| reference.position.map(|p| (p.line, p.column)));
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specifiers(found: &[FoundReference]) -> Vec<(&str, ReferenceKind)> {
        found
            .iter()
            .map(|r| (r.specifier.as_str(), r.kind))
            .collect()
    }

    #[test]
    fn test_markup_references() {
        let html = r#"<!doctype html>
<html>
<head>
  <link rel="stylesheet" href="./style.css">
  <link rel="icon" href="/favicon.png">
  <link rel="preconnect" href="https://fonts.example.com">
  <script type="module" src="./main.js"></script>
</head>
<body><img src='logo.svg'><script src="https://cdn.example.com/x.js"></script></body>
</html>"#;
        let found = scan_markup(html);
        assert_eq!(
            specifiers(&found),
            [
                ("./style.css", ReferenceKind::MarkupStylesheet),
                ("/favicon.png", ReferenceKind::MarkupResource),
                ("./main.js", ReferenceKind::MarkupScript),
                ("logo.svg", ReferenceKind::MarkupResource),
            ]
        );
        assert_eq!(found[0].position, Some(Position::new(4, 32)));
        assert_eq!(found[0].content_type.as_deref(), Some(types::CSS));
    }

    #[test]
    fn test_markup_inline_content() {
        let html = "<style>body { color: red }</style>\n<script>\n  import './a.js';\n</script>\n<script type=\"application/json\">{}</script>";
        let found = scan_markup(html);

        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|r| r.flags.inline));
        assert_eq!(found[0].specifier, "css");
        assert_eq!(found[0].position, Some(Position::new(1, 8)));
        assert_eq!(found[1].specifier, "js");
        assert_eq!(found[1].position, Some(Position::new(2, 9)));
        assert_eq!(
            found[1].inline_content.as_ref().and_then(|c| c.as_text()),
            Some("\n  import './a.js';\n")
        );
    }

    #[test]
    fn test_script_imports() {
        let js = r#"import { a } from "./a.js";
import './side-effect.js';
export * from "../lib/b.js";
import lodash from 'lodash';
const c = await import("./lazy.js");
export const name = "not-a-ref";
import.meta.hot.accept();"#;
        let found = scan_script(js);
        assert_eq!(
            specifiers(&found),
            [
                ("./a.js", ReferenceKind::ModuleImport),
                ("./side-effect.js", ReferenceKind::ModuleImport),
                ("../lib/b.js", ReferenceKind::ModuleImport),
                ("lodash", ReferenceKind::ModuleImport),
                ("./lazy.js", ReferenceKind::DynamicImport),
            ]
        );
        assert!(found[4].flags.lazy);
        assert!(!found[0].flags.lazy);
    }

    #[test]
    fn test_stylesheet_references() {
        let css = r#"@import "./base.css";
@import url('theme.css') screen;
body { background: url(./img/bg.png) }
.x { background: url("data:image/png;base64,AAAA") }"#;
        let found = scan_stylesheet(css);
        assert_eq!(
            specifiers(&found),
            [
                ("./base.css", ReferenceKind::StylesheetImport),
                ("theme.css", ReferenceKind::StylesheetImport),
                ("./img/bg.png", ReferenceKind::StylesheetUrl),
            ]
        );
    }
}
