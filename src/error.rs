/// Error and warning taxonomy shared by the ingestion and query paths.
///
/// Hard failures are [`IndexError`] values. Everything recoverable is a
/// [`Warning`] that is aggregated and handed back to the caller.
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::chunk::ChunkId;

/// Errors raised while setting up or running an extraction strategy for a
/// single file. These never escape the ingestor; they become
/// [`Warning::FileFailed`].
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("grammar load failed for {language}: {message}")]
    Grammar { language: String, message: String },

    #[error("query compile failed for {language}: {message}")]
    Query { language: String, message: String },

    #[error("invalid line window: size {window}, overlap {overlap}")]
    InvalidWindow { window: usize, overlap: usize },

    #[error("extraction panicked: {0}")]
    Panicked(String),
}

/// Errors returned by the index lifecycle and query operations.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("index not ready: no generation has been published yet")]
    IndexNotReady,

    #[error("chunk not found: {0}")]
    NotFound(ChunkId),

    #[error("ingestion aborted: {0}")]
    IngestionAborted(String),

    #[error("an ingestion is already in progress")]
    IngestionInProgress,

    #[error("ingestion cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("extractor setup failed: {0}")]
    Setup(#[from] ExtractError),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Non-fatal diagnostics collected during ingestion and expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Warning {
    /// Structured parsing failed; the file was chunked in line mode instead.
    ParseError { path: String, message: String },

    /// Structured mode was requested for a language without a grammar.
    UnsupportedLanguage { path: String },

    /// Extraction failed outright for a file.
    FileFailed { path: String, message: String },

    /// The same path appeared more than once in a file set.
    DuplicateFile { path: String },

    /// A raw reference matched no definition.
    UnresolvedReference { chunk_id: ChunkId, name: String },

    /// An expansion seed is not part of the live generation.
    MissingChunk { chunk_id: ChunkId },
}

impl Warning {
    /// Short machine-friendly name of the warning kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Warning::ParseError { .. } => "parse_error",
            Warning::UnsupportedLanguage { .. } => "unsupported_language",
            Warning::FileFailed { .. } => "file_failed",
            Warning::DuplicateFile { .. } => "duplicate_file",
            Warning::UnresolvedReference { .. } => "unresolved_reference",
            Warning::MissingChunk { .. } => "missing_chunk",
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::ParseError { path, message } => {
                write!(f, "{path}: parse error, fell back to line mode ({message})")
            }
            Warning::UnsupportedLanguage { path } => {
                write!(f, "{path}: no structured parser, fell back to line mode")
            }
            Warning::FileFailed { path, message } => write!(f, "{path}: {message}"),
            Warning::DuplicateFile { path } => write!(f, "{path}: duplicate path skipped"),
            Warning::UnresolvedReference { chunk_id, name } => {
                write!(f, "{chunk_id}: unresolved reference `{name}`")
            }
            Warning::MissingChunk { chunk_id } => {
                write!(f, "{chunk_id}: seed not in the live generation")
            }
        }
    }
}
