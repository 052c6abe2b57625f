use super::languages::{Language, LanguageConfig};
use super::line_chunker::LineIndex;
use super::relations::RelationExtractor;
use crate::chunk::{Chunk, ChunkId, ChunkKind, SourceFile, module_path};
use crate::error::ExtractError;
use tree_sitter::{Node, Parser};

/// Why structured extraction could not produce chunks for a file.
#[derive(Debug)]
pub enum StructuredError {
    /// The source does not parse cleanly; the caller degrades to line mode.
    Malformed(String),
    /// Grammar or parser setup failed.
    Setup(ExtractError),
}

/// A top-level definition located in the syntax tree.
struct Definition {
    kind: ChunkKind,
    name: String,
    start: usize,
    end: usize,
    docstring: Option<String>,
    members: Vec<String>,
}

/// Syntax-aware chunker: one chunk per top-level function or class, with
/// the remaining text grouped into module-header chunks.
pub struct CodeParser {
    relations: RelationExtractor,
}

impl CodeParser {
    pub fn new() -> Result<Self, ExtractError> {
        Ok(Self {
            relations: RelationExtractor::new()?,
        })
    }

    pub fn parse_chunks(
        &self,
        file: &SourceFile,
        config: &LanguageConfig,
    ) -> Result<Vec<Chunk>, StructuredError> {
        if file.text.is_empty() {
            return Ok(Vec::new());
        }

        let mut parser = Parser::new();
        parser.set_language(&config.grammar).map_err(|e| {
            StructuredError::Setup(ExtractError::Grammar {
                language: config.language.name().to_string(),
                message: e.to_string(),
            })
        })?;

        let source = file.text.as_bytes();
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| StructuredError::Malformed("parser returned no tree".to_string()))?;
        let root = tree.root_node();
        if root.has_error() {
            let line = first_error_line(root).unwrap_or(1);
            return Err(StructuredError::Malformed(format!("syntax error near line {line}")));
        }

        let definitions = collect_definitions(root, &file.text, config);
        let module = module_path(&file.path);
        let lines = LineIndex::new(&file.text);

        let mut chunks = Vec::new();
        for (kind, start, end, def) in partition(&file.text, &definitions) {
            let (qualified_name, docstring, members) = match def {
                Some(d) => (
                    qualify(&module, &d.name),
                    d.docstring.clone(),
                    d.members.clone(),
                ),
                None => (
                    module.clone(),
                    header_docstring(root, &file.text, config, start, end),
                    Vec::new(),
                ),
            };

            let ordinal = chunks.len();
            chunks.push(Chunk {
                id: ChunkId::new(&file.path, ordinal),
                path: file.path.clone(),
                language: Some(config.language),
                ordinal,
                kind,
                qualified_name,
                span: lines.span(start, end),
                content: file.text[start..end].to_string(),
                docstring,
                members,
                references: self.relations.extract_references(
                    root,
                    source,
                    config,
                    &file.path,
                    start..end,
                ),
            });
        }

        Ok(chunks)
    }
}

fn qualify(module: &str, name: &str) -> String {
    if module.is_empty() {
        name.to_string()
    } else {
        format!("{module}.{name}")
    }
}

/// Split `[0, len)` into definition and module-header segments.
///
/// Blank gaps are absorbed by the preceding chunk (or, before the first
/// definition, by the definition itself); any other gap becomes a module
/// header. Segments are contiguous and ordered.
fn partition<'d>(
    text: &str,
    definitions: &'d [Definition],
) -> Vec<(ChunkKind, usize, usize, Option<&'d Definition>)> {
    let mut segments: Vec<(ChunkKind, usize, usize, Option<&Definition>)> = Vec::new();
    let mut cursor = 0;

    for def in definitions {
        let mut start = def.start;
        if cursor < def.start {
            if text[cursor..def.start].trim().is_empty() {
                match segments.last_mut() {
                    Some(last) => last.2 = def.start,
                    None => start = cursor,
                }
            } else {
                segments.push((ChunkKind::ModuleHeader, cursor, def.start, None));
            }
        }
        segments.push((def.kind, start, def.end, Some(def)));
        cursor = def.end;
    }

    if cursor < text.len() {
        let blank = text[cursor..].trim().is_empty();
        match segments.last_mut() {
            Some(last) if blank => last.2 = text.len(),
            _ => segments.push((ChunkKind::ModuleHeader, cursor, text.len(), None)),
        }
    }

    segments
}

fn collect_definitions(root: Node, text: &str, config: &LanguageConfig) -> Vec<Definition> {
    let source = text.as_bytes();
    let mut definitions = Vec::new();
    let mut leading: Vec<Node> = Vec::new();

    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        if config.is_leading(child.kind()) {
            let attached = leading
                .last()
                .is_some_and(|prev| is_adjacent(text, prev.end_byte(), child.start_byte()));
            if !attached {
                leading.clear();
            }
            leading.push(child);
            continue;
        }

        let inner = match config.wrapped_field(child.kind()) {
            Some(field) => child.child_by_field_name(field).unwrap_or(child),
            None => child,
        };
        let found = config
            .definition_kind(inner.kind())
            .zip(definition_name(inner, source));

        if let Some((kind, name)) = found {
            let attached = leading
                .last()
                .is_some_and(|prev| is_adjacent(text, prev.end_byte(), child.start_byte()));
            let comments = if attached {
                std::mem::take(&mut leading)
            } else {
                Vec::new()
            };
            let start = comments.first().map_or(child.start_byte(), |n| n.start_byte());

            let docstring = body_docstring(inner, source, config.language)
                .or_else(|| comment_text(&comments, source));

            definitions.push(Definition {
                kind,
                name,
                start,
                end: child.end_byte(),
                docstring,
                members: member_names(inner, source, config),
            });
        }
        leading.clear();
    }

    definitions
}

/// Two nodes are adjacent when only whitespace without a blank line
/// separates them.
fn is_adjacent(text: &str, end: usize, start: usize) -> bool {
    let gap = &text[end..start];
    gap.trim().is_empty() && gap.matches('\n').count() <= 1
}

fn definition_name(node: Node, source: &[u8]) -> Option<String> {
    match node.kind() {
        "impl_item" => {
            let ty = node.child_by_field_name("type")?.utf8_text(source).ok()?;
            Some(ty.split('<').next().unwrap_or(ty).trim().to_string())
        }
        "type_declaration" => {
            let mut cursor = node.walk();
            let spec = node
                .named_children(&mut cursor)
                .find(|n| matches!(n.kind(), "type_spec" | "type_alias"))?;
            let name = spec.child_by_field_name("name")?.utf8_text(source).ok()?;
            Some(name.to_string())
        }
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            let declarator = node.named_children(&mut cursor).find(|n| {
                n.kind() == "variable_declarator"
                    && n.child_by_field_name("value").is_some_and(|v| {
                        matches!(
                            v.kind(),
                            "arrow_function" | "function_expression" | "function" | "generator_function"
                        )
                    })
            })?;
            let name = declarator.child_by_field_name("name")?.utf8_text(source).ok()?;
            Some(name.to_string())
        }
        _ => {
            let name = node.child_by_field_name("name")?.utf8_text(source).ok()?;
            Some(name.to_string())
        }
    }
}

fn member_names(node: Node, source: &[u8], config: &LanguageConfig) -> Vec<String> {
    let Some(body) = node.child_by_field_name("body") else {
        return Vec::new();
    };

    let mut names = Vec::new();
    let mut cursor = body.walk();
    for child in body.named_children(&mut cursor) {
        let inner = match config.wrapped_field(child.kind()) {
            Some(field) => child.child_by_field_name(field).unwrap_or(child),
            None => child,
        };
        if !config.members.contains(&inner.kind()) {
            continue;
        }
        if let Some(name) = inner
            .child_by_field_name("name")
            .and_then(|n| n.utf8_text(source).ok())
        {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// Python docstring: a string literal as the first statement of the body.
fn body_docstring(node: Node, source: &[u8], language: Language) -> Option<String> {
    if language != Language::Python {
        return None;
    }
    let body = node.child_by_field_name("body")?;
    first_string_statement(body, source)
}

fn first_string_statement(block: Node, source: &[u8]) -> Option<String> {
    let mut cursor = block.walk();
    let first = block
        .named_children(&mut cursor)
        .find(|n| n.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let literal = first.named_child(0)?;
    if literal.kind() != "string" {
        return None;
    }
    let raw = literal.utf8_text(source).ok()?;
    let text = raw
        .trim_start_matches(['r', 'u', 'b', 'R', 'U', 'B'])
        .trim_matches(['"', '\''])
        .trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn comment_text(comments: &[Node], source: &[u8]) -> Option<String> {
    let lines: Vec<String> = comments
        .iter()
        .filter(|n| n.kind().contains("comment"))
        .filter_map(|n| n.utf8_text(source).ok())
        .flat_map(|text| text.lines().map(clean_comment_line).collect::<Vec<_>>())
        .filter(|line| !line.is_empty())
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn clean_comment_line(line: &str) -> String {
    let line = line.trim();
    let stripped = ["///", "//!", "//", "/**", "/*", "*/", "#", "*"]
        .iter()
        .find_map(|marker| line.strip_prefix(marker))
        .unwrap_or(line);
    stripped.trim_end_matches("*/").trim().to_string()
}

/// Docstring of a module-header segment: the Python module docstring or the
/// comment block opening the segment.
fn header_docstring(
    root: Node,
    text: &str,
    config: &LanguageConfig,
    start: usize,
    end: usize,
) -> Option<String> {
    let source = text.as_bytes();
    let mut cursor = root.walk();
    let children: Vec<Node> = root
        .named_children(&mut cursor)
        .filter(|n| n.start_byte() >= start && n.end_byte() <= end)
        .collect();

    if config.language == Language::Python && start == 0 {
        if let Some(doc) = first_string_statement(root, source) {
            return Some(doc);
        }
    }

    let mut block: Vec<Node> = Vec::new();
    for node in children {
        if !node.kind().contains("comment") {
            break;
        }
        if let Some(prev) = block.last() {
            if !is_adjacent(text, prev.end_byte(), node.start_byte()) {
                break;
            }
        }
        block.push(node);
    }
    comment_text(&block, source)
}

fn first_error_line(node: Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error())
        .find_map(first_error_line)
}
