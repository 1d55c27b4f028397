//! Edges of the url graph.

use serde::{Deserialize, Serialize};

use crate::core::ResourceUrl;

/// How one resource mentions another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Registered explicitly as a servable/buildable document
    EntryPoint,
    /// `<script src>` in markup
    MarkupScript,
    /// `<link rel=stylesheet href>` in markup
    MarkupStylesheet,
    /// Any other resource attribute in markup (`<img src>`, `<link href>`, ...)
    MarkupResource,
    /// Static `import` in a module script
    ModuleImport,
    /// `import()` in a module script
    DynamicImport,
    /// `@import` in a stylesheet
    StylesheetImport,
    /// `url(...)` in a stylesheet
    StylesheetUrl,
    /// Content embedded in its owner (`<script>` / `<style>` bodies)
    InlineContent,
}

impl ReferenceKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::EntryPoint => "entry point",
            Self::MarkupScript => "markup script",
            Self::MarkupStylesheet => "markup stylesheet",
            Self::MarkupResource => "markup resource",
            Self::ModuleImport => "import",
            Self::DynamicImport => "dynamic import",
            Self::StylesheetImport => "@import",
            Self::StylesheetUrl => "url()",
            Self::InlineContent => "inline content",
        }
    }
}

/// Source position of a reference (1-based), for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Position of a byte offset inside `text`.
    pub fn of_offset(text: &str, offset: usize) -> Self {
        let before = &text[..offset.min(text.len())];
        let line = before.matches('\n').count() + 1;
        let column = before.rfind('\n').map_or(before.len(), |nl| before.len() - nl - 1) + 1;
        Self::new(line as u32, column as u32)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Reference flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceFlags {
    pub entry_point: bool,
    /// Not written in the owner's content (e.g. injected by a plugin)
    pub implicit: bool,
    pub inline: bool,
    /// Cooked on demand instead of with its owner
    pub lazy: bool,
}

/// A resolved, directed mention of one url inside another's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub owner: ResourceUrl,
    /// Specifier as written in the owner
    pub specifier: String,
    /// Resolved (and possibly redirected) target
    pub url: ResourceUrl,
    pub kind: ReferenceKind,
    pub position: Option<Position>,
    /// Content type the owner expects (may be set by a redirect)
    pub expected_content_type: Option<String>,
    pub flags: ReferenceFlags,
}

impl Reference {
    /// Minimal reference, mostly for tests and entry registration.
    pub fn new(owner: ResourceUrl, url: ResourceUrl, kind: ReferenceKind) -> Self {
        Self {
            owner,
            specifier: url.as_str().to_string(),
            url,
            kind,
            position: None,
            expected_content_type: None,
            flags: ReferenceFlags::default(),
        }
    }

    /// Human readable location, e.g. `file:///site/index.html:3:5`.
    pub fn location(&self) -> String {
        match self.position {
            Some(position) => format!("{}:{}", self.owner, position),
            None => self.owner.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_of_offset() {
        let text = "line one\n  <script src=\"a.js\">";
        let offset = text.find("<script").unwrap();
        assert_eq!(Position::of_offset(text, offset), Position::new(2, 3));
        assert_eq!(Position::of_offset(text, 0), Position::new(1, 1));
    }

    #[test]
    fn test_location() {
        let owner = ResourceUrl::parse("file:///site/index.html").unwrap();
        let target = ResourceUrl::parse("file:///site/a.js").unwrap();
        let mut reference = Reference::new(owner, target, ReferenceKind::MarkupScript);
        assert_eq!(reference.location(), "file:///site/index.html");

        reference.position = Some(Position::new(3, 5));
        assert_eq!(reference.location(), "file:///site/index.html:3:5");
    }
}
