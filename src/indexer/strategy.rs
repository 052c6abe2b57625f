//! Capability-tagged extraction strategy table.
//!
//! Every language with a grammar registers a structured strategy; anything
//! else, and any structured failure, falls through to line windows.
use super::code_parser::{CodeParser, StructuredError};
use super::languages::{Language, LanguageConfig};
use super::line_chunker::chunk_by_lines;
use crate::chunk::{Chunk, SourceFile};
use crate::config::{ChunkingStrategy, IngestConfig};
use crate::error::{ExtractError, Warning};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Chunks of one file plus whatever went wrong on the way.
#[derive(Debug, Default)]
pub struct Extraction {
    pub chunks: Vec<Chunk>,
    pub warnings: Vec<Warning>,
}

pub struct StrategyTable {
    parser: CodeParser,
    languages: HashMap<Language, LanguageConfig>,
}

impl StrategyTable {
    pub fn new() -> Result<Self, ExtractError> {
        let languages = LanguageConfig::get_all()
            .into_iter()
            .map(|c| (c.language, c))
            .collect();
        Ok(Self {
            parser: CodeParser::new()?,
            languages,
        })
    }

    pub fn extract(
        &self,
        file: &SourceFile,
        config: &IngestConfig,
    ) -> Result<Extraction, ExtractError> {
        let mut warnings = Vec::new();

        let structured = match config.chunking_strategy {
            ChunkingStrategy::Line => None,
            strategy => {
                let lang = file.language.and_then(|l| self.languages.get(&l));
                if lang.is_none() && strategy == ChunkingStrategy::Structured {
                    debug!(path = %file.path, "no structured parser for file");
                    warnings.push(Warning::UnsupportedLanguage {
                        path: file.path.clone(),
                    });
                }
                lang
            }
        };

        if let Some(lang) = structured {
            match self.parser.parse_chunks(file, lang) {
                Ok(chunks) => return Ok(Extraction { chunks, warnings }),
                Err(StructuredError::Malformed(message)) => {
                    warn!(path = %file.path, %message, "structured chunking failed, falling back to line-based chunking");
                    warnings.push(Warning::ParseError {
                        path: file.path.clone(),
                        message,
                    });
                }
                Err(StructuredError::Setup(e)) => return Err(e),
            }
        }

        let chunks = self.extract_lines(file, config)?;
        Ok(Extraction { chunks, warnings })
    }

    pub fn extract_lines(
        &self,
        file: &SourceFile,
        config: &IngestConfig,
    ) -> Result<Vec<Chunk>, ExtractError> {
        chunk_by_lines(file, config.line_window_size, config.line_overlap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkKind;

    fn config(strategy: ChunkingStrategy) -> IngestConfig {
        IngestConfig {
            chunking_strategy: strategy,
            line_window_size: 3,
            line_overlap: 1,
            ..IngestConfig::default()
        }
    }

    #[test]
    fn test_auto_uses_structured_for_python() {
        let table = StrategyTable::new().unwrap();
        let file = SourceFile::new("a.py", "def f():\n    return 1\n");
        let out = table.extract(&file, &config(ChunkingStrategy::Auto)).unwrap();
        assert!(out.warnings.is_empty());
        assert_eq!(out.chunks[0].kind, ChunkKind::Function);
    }

    #[test]
    fn test_line_strategy_ignores_grammar() {
        let table = StrategyTable::new().unwrap();
        let file = SourceFile::new("a.py", "def f():\n    return 1\n");
        let out = table.extract(&file, &config(ChunkingStrategy::Line)).unwrap();
        assert!(out.chunks.iter().all(|c| c.kind == ChunkKind::LineBlock));
    }

    #[test]
    fn test_parse_error_degrades_to_lines() {
        let table = StrategyTable::new().unwrap();
        let file = SourceFile::new("bad.py", "def broken(:\n  pass\n");
        let out = table.extract(&file, &config(ChunkingStrategy::Auto)).unwrap();
        assert_eq!(out.warnings.len(), 1);
        assert!(matches!(out.warnings[0], Warning::ParseError { .. }));
        assert!(out.chunks.iter().all(|c| c.kind == ChunkKind::LineBlock));
    }

    #[test]
    fn test_unsupported_language_warns_only_in_structured_mode() {
        let table = StrategyTable::new().unwrap();
        let file = SourceFile::new("README.md", "# Title\n\nbody\n");

        let auto = table.extract(&file, &config(ChunkingStrategy::Auto)).unwrap();
        assert!(auto.warnings.is_empty());

        let structured = table
            .extract(&file, &config(ChunkingStrategy::Structured))
            .unwrap();
        assert!(matches!(
            structured.warnings[..],
            [Warning::UnsupportedLanguage { .. }]
        ));
        assert_eq!(structured.chunks, auto.chunks);
    }
}
