//! Core data model: source files, chunks and their raw references.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::indexer::languages::Language;

/// A file handed over by the discovery collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Forward-slash path relative to the codebase root.
    pub path: String,
    pub text: String,
    pub language: Option<Language>,
}

impl SourceFile {
    /// Build a source file, detecting its language from the path and content.
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        let path = path.into().replace('\\', "/");
        let text = text.into();
        let language = Language::detect(&path, &text);
        Self {
            path,
            text,
            language,
        }
    }

    pub fn with_language(
        path: impl Into<String>,
        text: impl Into<String>,
        language: Option<Language>,
    ) -> Self {
        Self {
            path: path.into().replace('\\', "/"),
            text: text.into(),
            language,
        }
    }
}

/// Stable chunk identity: `"{path}:{ordinal}"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn new(path: &str, ordinal: usize) -> Self {
        Self(format!("{path}:{ordinal}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChunkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ChunkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    ModuleHeader,
    Function,
    Class,
    LineBlock,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::ModuleHeader => "module_header",
            ChunkKind::Function => "function",
            ChunkKind::Class => "class",
            ChunkKind::LineBlock => "line_block",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "module_header" => Some(ChunkKind::ModuleHeader),
            "function" => Some(ChunkKind::Function),
            "class" => Some(ChunkKind::Class),
            "line_block" => Some(ChunkKind::LineBlock),
            _ => None,
        }
    }

    /// Whether a call site may resolve to a chunk of this kind.
    pub fn is_callable(&self) -> bool {
        matches!(self, ChunkKind::Function | ChunkKind::Class)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Calls,
    Imports,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Calls => "calls",
            RelationType::Imports => "imports",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "calls" => Some(RelationType::Calls),
            "imports" => Some(RelationType::Imports),
            _ => None,
        }
    }
}

/// A raw, unresolved name a chunk appears to call or import.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub name: String,
    pub kind: RelationType,
}

impl Reference {
    pub fn calls(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RelationType::Calls,
        }
    }

    pub fn imports(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RelationType::Imports,
        }
    }

    /// Last segment of a dotted (or `::`-scoped) name.
    pub fn unqualified(&self) -> &str {
        last_segment(&self.name)
    }
}

/// Byte range `[start_byte, end_byte)` with 1-based inclusive line numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub path: String,
    pub language: Option<Language>,
    pub ordinal: usize,
    pub kind: ChunkKind,
    /// Module path plus local name; empty for line blocks.
    pub qualified_name: String,
    pub span: Span,
    pub content: String,
    pub docstring: Option<String>,
    /// Names of definitions nested in this chunk (methods of a class).
    pub members: Vec<String>,
    /// Sorted, deduplicated raw references.
    pub references: Vec<Reference>,
}

impl Chunk {
    pub fn local_name(&self) -> &str {
        last_segment(&self.qualified_name)
    }

    /// Directory portion of the chunk's path (empty at the root).
    pub fn directory(&self) -> &str {
        directory_of(&self.path)
    }

    /// Sort key used for every deterministic tie-break.
    pub fn position_key(&self) -> (&str, usize) {
        (self.path.as_str(), self.span.start_byte)
    }
}

pub(crate) fn last_segment(name: &str) -> &str {
    name.rsplit(['.', ':']).find(|s| !s.is_empty()).unwrap_or(name)
}

pub(crate) fn directory_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Dotted module path derived from a file path.
///
/// `pkg/utils.py` → `pkg.utils`; package entry files (`__init__`, `mod`,
/// `index`) take the name of their directory.
pub fn module_path(path: &str) -> String {
    let (dir, file) = path.rsplit_once('/').unwrap_or(("", path));
    let stem = match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    };

    let mut segments: Vec<&str> = dir
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    let is_entry = matches!(stem, "__init__" | "mod" | "index");
    if !(is_entry && !segments.is_empty()) {
        segments.push(stem);
    }
    segments.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_path() {
        assert_eq!(module_path("foo.py"), "foo");
        assert_eq!(module_path("pkg/utils.py"), "pkg.utils");
        assert_eq!(module_path("pkg/__init__.py"), "pkg");
        assert_eq!(module_path("src/net/mod.rs"), "src.net");
        assert_eq!(module_path("./web/index.ts"), "web");
        assert_eq!(module_path("Makefile"), "Makefile");
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("pkg.utils.helper"), "helper");
        assert_eq!(last_segment("crate::db::open"), "open");
        assert_eq!(last_segment("helper"), "helper");
    }

    #[test]
    fn test_chunk_id_format() {
        let id = ChunkId::new("src/a.py", 2);
        assert_eq!(id.as_str(), "src/a.py:2");
        assert_eq!(ChunkId::from("src/a.py:2"), id);
    }

    #[test]
    fn test_directory_of() {
        assert_eq!(directory_of("a/b/c.py"), "a/b");
        assert_eq!(directory_of("c.py"), "");
    }
}
