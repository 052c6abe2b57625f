//! Source files to chunks: language table, strategies and the file-set ingestor.
pub mod code_parser;
pub mod core;
pub mod languages;
pub mod line_chunker;
pub mod relations;
pub mod strategy;
