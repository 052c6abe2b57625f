use crate::chunk::{Chunk, SourceFile};
use crate::config::IngestConfig;
use crate::error::{ExtractError, IndexError, Warning};
use crate::indexer::strategy::StrategyTable;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Raw, not yet indexed output of one ingestion pass.
#[derive(Debug, Default)]
pub struct IngestOutput {
    /// Chunks of every file, ordered by path then start position.
    pub chunks: Vec<Chunk>,
    pub warnings: Vec<Warning>,
    pub files_indexed: usize,
    pub files_failed: usize,
}

struct FileResult {
    chunks: Vec<Chunk>,
    warnings: Vec<Warning>,
    failed: bool,
}

pub struct Ingestor<'a> {
    pub strategies: &'a StrategyTable,
}

impl<'a> Ingestor<'a> {
    pub fn new(strategies: &'a StrategyTable) -> Self {
        Self { strategies }
    }

    /// Chunk every file of `files` on a pool of `max_parallel_files` threads.
    ///
    /// Per-file problems become warnings; only cancellation or a pool that
    /// cannot be started fail the call.
    pub fn ingest(
        &self,
        files: &[SourceFile],
        config: &IngestConfig,
        cancel: &CancellationToken,
    ) -> Result<IngestOutput, IndexError> {
        info!(files = files.len(), "Starting ingestion of file set");

        let mut output = IngestOutput::default();

        // Path order makes the output independent of the input order.
        let mut unique: BTreeMap<&str, &SourceFile> = BTreeMap::new();
        for file in files {
            if unique.contains_key(file.path.as_str()) {
                warn!(path = %file.path, "duplicate path in file set, skipping");
                output.warnings.push(Warning::DuplicateFile {
                    path: file.path.clone(),
                });
                continue;
            }
            unique.insert(file.path.as_str(), file);
        }
        let ordered: Vec<&SourceFile> = unique.into_values().collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_parallel_files.max(1))
            .thread_name(|i| format!("ingest-{i}"))
            .build()
            .map_err(|e| IndexError::IngestionAborted(format!("worker pool: {e}")))?;

        let results: Vec<Option<FileResult>> = pool.install(|| {
            ordered
                .par_iter()
                .map(|file| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some(self.ingest_file(file, config))
                })
                .collect()
        });

        if cancel.is_cancelled() {
            info!("Ingestion cancelled");
            return Err(IndexError::Cancelled);
        }

        for result in results.into_iter().flatten() {
            if result.failed {
                output.files_failed += 1;
            }
            if !result.chunks.is_empty() {
                output.files_indexed += 1;
            }
            output.chunks.extend(result.chunks);
            output.warnings.extend(result.warnings);
        }

        info!(
            files_processed = output.files_indexed,
            files_failed = output.files_failed,
            total_chunks = output.chunks.len(),
            "Ingestion complete"
        );

        Ok(output)
    }

    fn ingest_file(&self, file: &SourceFile, config: &IngestConfig) -> FileResult {
        match guarded(|| self.strategies.extract(file, config)) {
            Ok(extraction) => {
                debug!(path = %file.path, chunks = extraction.chunks.len(), "Chunked file");
                FileResult {
                    chunks: extraction.chunks,
                    warnings: extraction.warnings,
                    failed: false,
                }
            }
            Err(e) => {
                warn!(path = %file.path, error = %e, "Failed to chunk file");
                let mut warnings = vec![Warning::FileFailed {
                    path: file.path.clone(),
                    message: e.to_string(),
                }];

                let chunks = match guarded(|| self.strategies.extract_lines(file, config)) {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        warnings.push(Warning::FileFailed {
                            path: file.path.clone(),
                            message: format!("line fallback failed: {e}"),
                        });
                        Vec::new()
                    }
                };

                FileResult {
                    chunks,
                    warnings,
                    failed: true,
                }
            }
        }
    }
}

/// Run an extraction step, turning a panic into an error for this file only.
fn guarded<T>(f: impl FnOnce() -> Result<T, ExtractError>) -> Result<T, ExtractError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ExtractError::Panicked(message))
        }
    }
}
