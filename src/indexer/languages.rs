use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::chunk::ChunkKind;

/// Languages with a registered structured extraction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Rust,
    Go,
    JavaScript,
    TypeScript,
    Tsx,
}

/// Lower-case file extension to language.
static EXTENSIONS: &[(&str, Language)] = &[
    ("py", Language::Python),
    ("pyi", Language::Python),
    ("rs", Language::Rust),
    ("go", Language::Go),
    ("js", Language::JavaScript),
    ("jsx", Language::JavaScript),
    ("mjs", Language::JavaScript),
    ("cjs", Language::JavaScript),
    ("ts", Language::TypeScript),
    ("mts", Language::TypeScript),
    ("cts", Language::TypeScript),
    ("tsx", Language::Tsx),
];

static SHEBANG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#!\s*(?:/usr/bin/env\s+)?(?:\S*/)?(python[0-9.]*|node|deno|ts-node)\b")
        .expect("shebang pattern is valid")
});

impl Language {
    pub fn name(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "python" => Some(Language::Python),
            "rust" => Some(Language::Rust),
            "go" => Some(Language::Go),
            "javascript" => Some(Language::JavaScript),
            "typescript" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        EXTENSIONS
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|&(_, lang)| lang)
    }

    /// Detect by extension first, then by sniffing a shebang line.
    pub fn detect(path: &str, text: &str) -> Option<Self> {
        let file = path.rsplit('/').next().unwrap_or(path);
        if let Some((_, ext)) = file.rsplit_once('.') {
            if let Some(lang) = Self::from_extension(&ext.to_ascii_lowercase()) {
                return Some(lang);
            }
        }

        let first_line = text.lines().next()?;
        let caps = SHEBANG.captures(first_line)?;
        match caps.get(1)?.as_str() {
            "node" => Some(Language::JavaScript),
            "deno" | "ts-node" => Some(Language::TypeScript),
            _ => Some(Language::Python),
        }
    }
}

/// Static description of how to chunk one language.
pub struct LanguageConfig {
    pub language: Language,
    pub grammar: tree_sitter::Language,
    /// Top-level node kinds that become definition chunks.
    pub definitions: &'static [(&'static str, ChunkKind)],
    /// Node kinds wrapping a definition, with the field holding it.
    pub wrappers: &'static [(&'static str, &'static str)],
    /// Sibling kinds that attach to the following definition.
    pub leading: &'static [&'static str],
    /// Node kinds inside a class body recorded as members.
    pub members: &'static [&'static str],
    pub call_query: &'static str,
    pub import_query: &'static str,
    /// Call targets never worth resolving.
    pub builtins: &'static [&'static str],
}

impl LanguageConfig {
    pub fn get_all() -> Vec<LanguageConfig> {
        vec![
            python_config(),
            rust_config(),
            go_config(),
            javascript_config(),
            typescript_config(Language::TypeScript),
            typescript_config(Language::Tsx),
        ]
    }

    pub fn get(language: Language) -> Option<LanguageConfig> {
        Self::get_all().into_iter().find(|c| c.language == language)
    }

    pub fn definition_kind(&self, node_kind: &str) -> Option<ChunkKind> {
        self.definitions
            .iter()
            .find(|(k, _)| *k == node_kind)
            .map(|(_, kind)| *kind)
    }

    pub fn wrapped_field(&self, node_kind: &str) -> Option<&'static str> {
        self.wrappers
            .iter()
            .find(|(k, _)| *k == node_kind)
            .map(|(_, field)| *field)
    }

    pub fn is_leading(&self, node_kind: &str) -> bool {
        self.leading.contains(&node_kind)
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.contains(&name)
    }
}

fn python_config() -> LanguageConfig {
    LanguageConfig {
        language: Language::Python,
        grammar: tree_sitter_python::LANGUAGE.into(),
        definitions: &[
            ("function_definition", ChunkKind::Function),
            ("class_definition", ChunkKind::Class),
        ],
        wrappers: &[("decorated_definition", "definition")],
        leading: &["comment"],
        members: &["function_definition"],
        call_query: r#"
(call
  function: (identifier) @call)
(call
  function: (attribute
    attribute: (identifier) @call))
"#,
        import_query: r#"
(import_statement
  name: (dotted_name) @import)
(import_statement
  name: (aliased_import
    name: (dotted_name) @import))
(import_from_statement
  module_name: (dotted_name) @import)
(import_from_statement
  module_name: (dotted_name) @module
  name: (dotted_name) @member)
(import_from_statement
  module_name: (dotted_name) @module
  name: (aliased_import
    name: (dotted_name) @member))
"#,
        builtins: &[
            "print", "len", "range", "str", "int", "float", "bool", "list", "dict", "set",
            "tuple", "isinstance", "issubclass", "super", "open", "enumerate", "zip", "map",
            "filter", "sorted", "reversed", "type", "getattr", "setattr", "hasattr", "repr",
            "min", "max", "sum", "any", "all", "iter", "next", "format", "append", "extend",
        ],
    }
}

fn rust_config() -> LanguageConfig {
    LanguageConfig {
        language: Language::Rust,
        grammar: tree_sitter_rust::LANGUAGE.into(),
        definitions: &[
            ("function_item", ChunkKind::Function),
            ("impl_item", ChunkKind::Class),
            ("struct_item", ChunkKind::Class),
            ("enum_item", ChunkKind::Class),
            ("trait_item", ChunkKind::Class),
        ],
        wrappers: &[],
        leading: &["line_comment", "block_comment", "attribute_item"],
        members: &["function_item", "function_signature_item"],
        call_query: r#"
(call_expression
  function: (identifier) @call)
(call_expression
  function: (field_expression
    field: (field_identifier) @call))
(call_expression
  function: (scoped_identifier
    name: (identifier) @call))
"#,
        import_query: r#"
(use_declaration
  argument: (scoped_identifier) @import)
(use_declaration
  argument: (identifier) @import)
(use_declaration
  argument: (use_wildcard) @import)
"#,
        builtins: &["Some", "Ok", "Err", "Box", "drop", "new", "clone", "into", "unwrap"],
    }
}

fn go_config() -> LanguageConfig {
    LanguageConfig {
        language: Language::Go,
        grammar: tree_sitter_go::LANGUAGE.into(),
        definitions: &[
            ("function_declaration", ChunkKind::Function),
            ("method_declaration", ChunkKind::Function),
            ("type_declaration", ChunkKind::Class),
        ],
        wrappers: &[],
        leading: &["comment"],
        members: &["method_elem"],
        call_query: r#"
(call_expression
  function: (identifier) @call)
(call_expression
  function: (selector_expression
    field: (field_identifier) @call))
"#,
        import_query: r#"
(import_spec
  path: (interpreted_string_literal) @import)
"#,
        builtins: &[
            "len", "make", "append", "delete", "print", "println", "panic", "recover", "cap",
            "copy", "new", "close",
        ],
    }
}

fn javascript_config() -> LanguageConfig {
    LanguageConfig {
        language: Language::JavaScript,
        grammar: tree_sitter_javascript::LANGUAGE.into(),
        definitions: &[
            ("function_declaration", ChunkKind::Function),
            ("generator_function_declaration", ChunkKind::Function),
            ("lexical_declaration", ChunkKind::Function),
            ("class_declaration", ChunkKind::Class),
        ],
        wrappers: &[("export_statement", "declaration")],
        leading: &["comment"],
        members: &["method_definition"],
        call_query: r#"
(call_expression
  function: (identifier) @call)
(call_expression
  function: (member_expression
    property: (property_identifier) @call))
(new_expression
  constructor: (identifier) @call)
"#,
        import_query: r#"
(import_statement
  source: (string) @import)
"#,
        builtins: &["require", "log", "push", "map", "forEach", "filter", "then", "catch"],
    }
}

fn typescript_config(language: Language) -> LanguageConfig {
    let grammar = if language == Language::Tsx {
        tree_sitter_typescript::LANGUAGE_TSX.into()
    } else {
        tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
    };
    LanguageConfig {
        language,
        grammar,
        definitions: &[
            ("function_declaration", ChunkKind::Function),
            ("generator_function_declaration", ChunkKind::Function),
            ("lexical_declaration", ChunkKind::Function),
            ("class_declaration", ChunkKind::Class),
            ("abstract_class_declaration", ChunkKind::Class),
            ("interface_declaration", ChunkKind::Class),
            ("enum_declaration", ChunkKind::Class),
        ],
        wrappers: &[("export_statement", "declaration")],
        leading: &["comment"],
        members: &["method_definition", "method_signature", "abstract_method_signature"],
        call_query: r#"
(call_expression
  function: (identifier) @call)
(call_expression
  function: (member_expression
    property: (property_identifier) @call))
(new_expression
  constructor: (identifier) @call)
"#,
        import_query: r#"
(import_statement
  source: (string) @import)
"#,
        builtins: &["require", "log", "push", "map", "forEach", "filter", "then", "catch"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(Language::detect("a/b.py", ""), Some(Language::Python));
        assert_eq!(Language::detect("main.rs", ""), Some(Language::Rust));
        assert_eq!(Language::detect("app.TSX", ""), Some(Language::Tsx));
        assert_eq!(Language::detect("notes.md", "# hi"), None);
        assert_eq!(Language::from_extension("mjs"), Some(Language::JavaScript));
        assert_eq!(Language::from_extension("cts"), Some(Language::TypeScript));
    }

    #[test]
    fn test_every_extension_has_a_config() {
        let registered: Vec<Language> = LanguageConfig::get_all()
            .into_iter()
            .map(|c| c.language)
            .collect();
        assert!(EXTENSIONS.iter().all(|(_, lang)| registered.contains(lang)));
    }

    #[test]
    fn test_detect_by_shebang() {
        assert_eq!(
            Language::detect("bin/tool", "#!/usr/bin/env python3\nprint(1)\n"),
            Some(Language::Python)
        );
        assert_eq!(
            Language::detect("bin/run", "#!/usr/local/bin/node\n"),
            Some(Language::JavaScript)
        );
        assert_eq!(Language::detect("bin/sh", "#!/bin/bash\n"), None);
    }

    #[test]
    fn test_every_language_has_a_config() {
        for lang in [
            Language::Python,
            Language::Rust,
            Language::Go,
            Language::JavaScript,
            Language::TypeScript,
            Language::Tsx,
        ] {
            let config = LanguageConfig::get(lang).expect("config registered");
            assert_eq!(Language::parse(lang.name()), Some(lang));
            assert!(!config.definitions.is_empty());
        }
    }
}
