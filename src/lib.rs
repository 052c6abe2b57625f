//! # codegraph-rag — codebase indexing and context expansion
//!
//! Turns source files into addressable chunks, resolves who calls and
//! imports whom across files, and expands retrieved chunks into a
//! deduplicated context bundle for downstream generation.
//!
//! ## Architecture
//!
//! - **[`indexer`]** — language table, structured (Tree-sitter) and line chunking, file-set ingestion
//! - **[`graph`]** — definition index, reference resolution, budgeted expansion
//! - **[`generation`]** — immutable snapshot of one ingestion
//! - **[`manager`]** — ingestion state machine with atomic generation swap
//! - **[`db`]** — SQLite persistence of generations
//! - **[`discovery`]** — directory walk feeding the ingestor
//! - **[`mcp`]** — MCP server exposing ingest, lookup, expand and status (stdio transport via rmcp)
//! - **[`config`]** — JSON configuration with defaults and validation

pub mod chunk;
pub mod config;
pub mod db;
pub mod discovery;
pub mod error;
pub mod generation;
pub mod graph;
pub mod indexer;
pub mod manager;
pub mod mcp;
