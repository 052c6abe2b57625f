/// MCP tool handlers.
///
/// 1. ingest_codebase  – discover and index a directory as a new generation
/// 2. index_status     – lifecycle state and live generation stats
/// 3. lookup_chunk     – fetch one chunk by id
/// 4. expand_context   – budgeted cross-reference expansion from seed chunks
/// 5. cancel_ingestion – cancel the running ingestion
/// 6. export_chunks    – embedding records for an external vector store
use crate::chunk::ChunkId;
use crate::config::{ChunkingStrategy, IngestConfig};
use crate::discovery;
use crate::error::{IndexError, Warning};
use crate::graph::expander::Direction;
use crate::mcp::server::McpContext;
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Warnings listed in full in a tool response; the rest are only counted.
const MAX_LISTED_WARNINGS: usize = 50;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct IngestParams {
    /// Directory to index (default: discovery.root from config)
    directory: Option<String>,
    /// Chunking strategy: structured | line | auto (default from config)
    chunking_strategy: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
struct ChunkIdParam {
    /// Chunk id, formatted as "path:ordinal"
    chunk_id: String,
}

#[derive(Deserialize, JsonSchema)]
struct ExpandParams {
    /// Seed chunk ids in retrieval rank order
    seeds: Vec<String>,
    /// Max additional chunks beyond the seeds (default from config)
    max_chunks: Option<usize>,
    /// Max hop distance from the seeds (default from config)
    max_hops: Option<usize>,
    /// Direction: outgoing | incoming | both (default: outgoing)
    direction: Option<String>,
    /// Include chunk content in the response (default: true)
    include_content: Option<bool>,
}

#[derive(Deserialize, JsonSchema)]
struct ExportParams {
    /// Only export chunks whose path starts with this prefix
    path_prefix: Option<String>,
}

// ── Response helpers ─────────────────────────────────────────────────

fn json_result(value: serde_json::Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&value).unwrap_or_default(),
    )]))
}

fn error_result(msg: &str) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.to_string())]))
}

fn index_error(e: IndexError) -> Result<CallToolResult, McpError> {
    match e {
        IndexError::Storage(e) => Err(McpError::internal_error(
            format!("storage failed: {e}"),
            None,
        )),
        other => error_result(&other.to_string()),
    }
}

fn warnings_json(warnings: &[Warning]) -> serde_json::Value {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for w in warnings {
        *counts.entry(w.kind()).or_default() += 1;
    }
    serde_json::json!({
        "total": warnings.len(),
        "by_kind": counts,
        "items": &warnings[..warnings.len().min(MAX_LISTED_WARNINGS)],
    })
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

#[tool_router]
impl AppTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    // ── Tool 1: ingest_codebase ─────────────────────────────────────

    #[tool(
        description = "Index a codebase directory: chunk every source file (Tree-sitter for Python, Rust, Go, JavaScript, TypeScript; line windows otherwise) and resolve cross-file calls and imports. Replaces the live index atomically when done."
    )]
    async fn ingest_codebase(
        &self,
        params: Parameters<IngestParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let root = PathBuf::from(
            p.directory
                .unwrap_or_else(|| self.ctx.config.discovery.root.clone()),
        );

        let mut config: IngestConfig = self.ctx.config.ingest.clone();
        if let Some(strategy) = &p.chunking_strategy {
            config.chunking_strategy =
                match serde_json::from_value::<ChunkingStrategy>(serde_json::json!(strategy)) {
                    Ok(s) => s,
                    Err(_) => {
                        return error_result(&format!(
                            "unknown chunking_strategy: {strategy} (expected structured | line | auto)"
                        ));
                    }
                };
        }

        let discovery_config = self.ctx.config.discovery.clone();
        let discover_root = root.clone();
        let files = tokio::task::spawn_blocking(move || {
            discovery::discover(&discover_root, &discovery_config)
        })
        .await
        .map_err(|e| McpError::internal_error(format!("discovery task failed: {e}"), None))?;
        let files = match files {
            Ok(files) => files,
            Err(e) => return error_result(&format!("discovery failed: {e:#}")),
        };

        let report = match self.ctx.manager.ingest(files, config).await {
            Ok(report) => report,
            Err(e) => return index_error(e),
        };

        json_result(serde_json::json!({
            "success": true,
            "directory": root.to_string_lossy(),
            "generation_id": report.generation_id,
            "files_indexed": report.files_indexed,
            "files_failed": report.files_failed,
            "stats": report.stats,
            "warnings": warnings_json(&report.warnings),
        }))
    }

    // ── Tool 2: index_status ────────────────────────────────────────

    #[tool(description = "Report the index state (not_ingested | ingesting | ready), live generation stats and persisted generations")]
    async fn index_status(&self) -> Result<CallToolResult, McpError> {
        let status = self.ctx.manager.status();
        let generation = self.ctx.manager.current();
        let persisted = match self.ctx.manager.persisted().await {
            Ok(persisted) => persisted,
            Err(e) => return index_error(e),
        };

        json_result(serde_json::json!({
            "status": status,
            "generation_id": generation.as_ref().map(|g| g.id),
            "created_at": generation.as_ref().map(|g| g.created_at.to_rfc3339()),
            "stats": generation.as_ref().map(|g| g.stats()),
            "persisted": persisted,
        }))
    }

    // ── Tool 3: lookup_chunk ────────────────────────────────────────

    #[tool(description = "Fetch a chunk by id with its kind, qualified name, span, docstring and content")]
    async fn lookup_chunk(
        &self,
        params: Parameters<ChunkIdParam>,
    ) -> Result<CallToolResult, McpError> {
        let id = params.0.chunk_id;
        if id.is_empty() {
            return error_result("chunk_id is required");
        }

        match self.ctx.manager.lookup(&ChunkId::from(id)) {
            Ok(chunk) => json_result(serde_json::json!({ "chunk": chunk })),
            Err(e) => index_error(e),
        }
    }

    // ── Tool 4: expand_context ──────────────────────────────────────

    #[tool(
        description = "Expand retrieved seed chunks with the chunks they call or import (or that call them), hop by hop, under a chunk budget. Seeds come first, in the given order."
    )]
    async fn expand_context(
        &self,
        params: Parameters<ExpandParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.seeds.is_empty() {
            return error_result("seeds is required");
        }

        let direction = match p.direction.as_deref() {
            None => Direction::Outgoing,
            Some(d) => match Direction::parse(d) {
                Some(d) => d,
                None => return error_result(&format!("unknown direction: {d}")),
            },
        };
        let max_chunks = p.max_chunks.unwrap_or(self.ctx.config.expand.max_chunks);
        let max_hops = p.max_hops.unwrap_or(self.ctx.config.expand.max_hops);
        let seeds: Vec<ChunkId> = p.seeds.into_iter().map(ChunkId::from).collect();

        let Some(generation) = self.ctx.manager.current() else {
            return index_error(IndexError::IndexNotReady);
        };
        let bundle = crate::graph::expander::expand_with(
            &generation,
            &seeds,
            max_chunks,
            max_hops,
            direction,
        );

        let include_content = p.include_content.unwrap_or(true);
        let entries: Vec<serde_json::Value> = bundle
            .entries
            .iter()
            .filter_map(|e| generation.get(&e.chunk_id).map(|c| (e, c)))
            .map(|(e, c)| {
                let mut obj = serde_json::json!({
                    "chunk_id": e.chunk_id,
                    "hop": e.hop,
                    "reached_by": e.reached_by,
                    "kind": c.kind,
                    "qualified_name": c.qualified_name,
                    "path": c.path,
                    "start_line": c.span.start_line,
                    "end_line": c.span.end_line,
                });
                if include_content {
                    obj["content"] = serde_json::json!(c.content);
                }
                obj
            })
            .collect();

        json_result(serde_json::json!({
            "generation_id": bundle.generation_id,
            "direction": direction,
            "entries": entries,
            "count": entries.len(),
            "warnings": bundle.warnings,
        }))
    }

    // ── Tool 5: cancel_ingestion ────────────────────────────────────

    #[tool(description = "Cancel the ingestion in progress; the previous index keeps serving")]
    async fn cancel_ingestion(&self) -> Result<CallToolResult, McpError> {
        let cancelled = self.ctx.manager.cancel();
        json_result(serde_json::json!({
            "cancelled": cancelled,
            "status": self.ctx.manager.status(),
        }))
    }

    // ── Tool 6: export_chunks ───────────────────────────────────────

    #[tool(description = "Export embedding records (id, text, qualified name, kind, path) of the live index")]
    async fn export_chunks(
        &self,
        params: Parameters<ExportParams>,
    ) -> Result<CallToolResult, McpError> {
        let Some(generation) = self.ctx.manager.current() else {
            return index_error(IndexError::IndexNotReady);
        };
        let prefix = params.0.path_prefix.unwrap_or_default();

        let records: Vec<serde_json::Value> = generation
            .embedding_records()
            .into_iter()
            .filter(|r| r.path.starts_with(&prefix))
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "text": r.embedding_text(),
                    "qualified_name": r.qualified_name,
                    "kind": r.kind,
                    "path": r.path,
                    "language": r.language,
                })
            })
            .collect();

        json_result(serde_json::json!({
            "generation_id": generation.id,
            "records": records,
            "count": records.len(),
        }))
    }
}
