use super::languages::{Language, LanguageConfig};
use crate::chunk::{Reference, RelationType, directory_of, module_path};
use crate::error::ExtractError;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::ops::Range;
use std::sync::LazyLock;
use tree_sitter::{Node, Query, QueryCursor, StreamingIterator};

static CALL_SITE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\b(def|fn|func|function|class|struct)\s+)?\b([A-Za-z_][A-Za-z0-9_]*)\s*\(")
        .expect("call-site pattern is valid")
});

const KEYWORDS: &[&str] = &[
    "if", "elif", "else", "for", "while", "switch", "match", "return", "catch", "with", "and",
    "or", "not", "in", "is", "await", "yield", "assert", "del", "lambda", "sizeof", "typeof",
    "new", "print", "println", "len",
];

/// Compiled call/import queries for every registered language.
pub struct RelationExtractor {
    call_queries: HashMap<Language, Query>,
    import_queries: HashMap<Language, Query>,
}

impl RelationExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        let mut call_queries = HashMap::new();
        let mut import_queries = HashMap::new();

        for config in LanguageConfig::get_all() {
            let compile = |source: &str| {
                Query::new(&config.grammar, source).map_err(|e| ExtractError::Query {
                    language: config.language.name().to_string(),
                    message: e.to_string(),
                })
            };
            if !config.call_query.is_empty() {
                call_queries.insert(config.language, compile(config.call_query)?);
            }
            if !config.import_query.is_empty() {
                import_queries.insert(config.language, compile(config.import_query)?);
            }
        }

        Ok(Self {
            call_queries,
            import_queries,
        })
    }

    /// Scan `range` of an already parsed file for call sites and imports.
    ///
    /// Only captures lying entirely inside `range` are kept, so adjacent
    /// chunks never share references.
    pub fn extract_references(
        &self,
        root: Node,
        source: &[u8],
        config: &LanguageConfig,
        path: &str,
        range: Range<usize>,
    ) -> Vec<Reference> {
        let mut refs = BTreeSet::new();

        if let Some(query) = self.call_queries.get(&config.language) {
            for_each_capture(query, root, source, range.clone(), |captures| {
                for (_, text) in captures {
                    let name = text.trim().replace("::", ".");
                    if name.is_empty() || config.is_builtin(&name) {
                        continue;
                    }
                    refs.insert(Reference::calls(name));
                }
            });
        }

        if let Some(query) = self.import_queries.get(&config.language) {
            for_each_capture(query, root, source, range, |captures| {
                let module = captures.iter().find(|(n, _)| *n == "module");
                let member = captures.iter().find(|(n, _)| *n == "member");
                if let (Some((_, module)), Some((_, member))) = (module, member) {
                    let module = normalize_import(module, config.language, path);
                    if !module.is_empty() {
                        refs.insert(Reference::imports(format!("{module}.{}", member.trim())));
                        refs.insert(Reference::imports(module));
                    }
                    return;
                }
                for (_, text) in captures.iter().filter(|(n, _)| *n == "import") {
                    let name = normalize_import(text, config.language, path);
                    if !name.is_empty() {
                        refs.insert(Reference::imports(name));
                    }
                }
            });
        }

        refs.into_iter().collect()
    }
}

/// Run `query` over `range` and hand each match's in-range captures, as
/// `(capture name, text)` pairs, to `f`.
fn for_each_capture<'q>(
    query: &'q Query,
    root: Node,
    source: &[u8],
    range: Range<usize>,
    mut f: impl FnMut(Vec<(&'q str, String)>),
) {
    let mut cursor = QueryCursor::new();
    cursor.set_byte_range(range.clone());
    let names = query.capture_names();

    let mut matches = cursor.matches(query, root, source);
    while let Some(m) = matches.next() {
        let captures: Vec<(&str, String)> = m
            .captures
            .iter()
            .filter(|cap| {
                cap.node.start_byte() >= range.start && cap.node.end_byte() <= range.end
            })
            .filter_map(|cap| {
                let text = cap.node.utf8_text(source).ok()?;
                Some((names[cap.index as usize], text.to_string()))
            })
            .collect();
        if !captures.is_empty() {
            f(captures);
        }
    }
}

/// Turn a raw import target into a dotted name comparable with qualified
/// chunk names.
fn normalize_import(raw: &str, language: Language, path: &str) -> String {
    let clean = raw.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`');

    match language {
        Language::Rust => clean.trim_end_matches("::*").replace("::", "."),
        Language::JavaScript | Language::TypeScript | Language::Tsx
            if clean.starts_with("./") || clean.starts_with("../") =>
        {
            let joined = join_relative(directory_of(path), clean);
            module_path(&joined)
        }
        Language::Go => clean.replace('/', "."),
        _ => clean.to_string(),
    }
}

fn join_relative(dir: &str, relative: &str) -> String {
    let mut parts: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Best-effort call-site scan for text without a syntax tree.
pub fn scan_call_sites(text: &str) -> Vec<Reference> {
    let mut refs = BTreeSet::new();
    for caps in CALL_SITE.captures_iter(text) {
        if caps.get(1).is_some() {
            continue;
        }
        let Some(name) = caps.get(2).map(|m| m.as_str()) else {
            continue;
        };
        if KEYWORDS.contains(&name) {
            continue;
        }
        refs.insert(Reference {
            name: name.to_string(),
            kind: RelationType::Calls,
        });
    }
    refs.into_iter().collect()
}
