//! Index lifecycle: ingestion state machine and atomic generation swap.
use crate::chunk::{Chunk, ChunkId, SourceFile};
use crate::config::IngestConfig;
use crate::db::Db;
use crate::db::models::GenerationSummary;
use crate::error::{IndexError, Warning};
use crate::generation::{Generation, GenerationStats};
use crate::graph::expander::{ContextBundle, Direction, expand_with};
use crate::indexer::core::Ingestor;
use crate::indexer::strategy::StrategyTable;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::Mutex as TokioMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    NotIngested,
    Ingesting,
    Ready,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::NotIngested => "not_ingested",
            IndexStatus::Ingesting => "ingesting",
            IndexStatus::Ready => "ready",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub generation_id: u64,
    pub files_indexed: usize,
    pub files_failed: usize,
    pub stats: GenerationStats,
    pub warnings: Vec<Warning>,
}

/// Owns the live generation and serialises ingestions.
///
/// Readers take an `Arc<Generation>` at the start of a call and keep it
/// for the whole call, so a concurrent publish never mixes generations.
pub struct IndexManager {
    strategies: Arc<StrategyTable>,
    live: Arc<RwLock<Option<Arc<Generation>>>>,
    active: Arc<Mutex<Option<CancellationToken>>>,
    next_id: AtomicU64,
    store: Option<Arc<TokioMutex<Db>>>,
}

/// Clears the in-progress slot when the worker finishes, however it ends.
struct ActiveGuard {
    slot: Arc<Mutex<Option<CancellationToken>>>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl IndexManager {
    pub fn new() -> Result<Self, IndexError> {
        Ok(Self {
            strategies: Arc::new(StrategyTable::new()?),
            live: Arc::new(RwLock::new(None)),
            active: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
            store: None,
        })
    }

    /// Persist every built generation to `db` before it is published.
    pub fn with_store(mut self, db: Arc<TokioMutex<Db>>) -> Self {
        self.store = Some(db);
        self
    }

    pub fn status(&self) -> IndexStatus {
        if self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
        {
            IndexStatus::Ingesting
        } else if self.current().is_some() {
            IndexStatus::Ready
        } else {
            IndexStatus::NotIngested
        }
    }

    /// Handle on the live generation, if one has been published.
    pub fn current(&self) -> Option<Arc<Generation>> {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn ready(&self) -> Result<Arc<Generation>, IndexError> {
        self.current().ok_or(IndexError::IndexNotReady)
    }

    /// Load the newest persisted generation and publish it.
    pub async fn restore(&self) -> Result<Option<u64>, IndexError> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let loaded = store.lock().await.load_latest_generation()?;
        let Some(generation) = loaded else {
            info!("No persisted generation to restore");
            return Ok(None);
        };

        let id = generation.id;
        self.next_id.fetch_max(id + 1, Ordering::SeqCst);
        publish(&self.live, generation);
        info!(generation = id, "Restored persisted generation");
        Ok(Some(id))
    }

    /// Generations held by the store; empty without one.
    pub async fn persisted(&self) -> Result<Vec<GenerationSummary>, IndexError> {
        match &self.store {
            Some(store) => Ok(store.lock().await.list_generations()?),
            None => Ok(Vec::new()),
        }
    }

    /// Build a new generation from `files` and publish it.
    ///
    /// The previous generation keeps serving reads until the new one is
    /// complete. On any error it stays live. Once the new generation is
    /// persisted it is published, and a later `cancel` has no effect.
    /// Dropping the returned future cancels the worker.
    pub async fn ingest(
        &self,
        files: Vec<SourceFile>,
        config: IngestConfig,
    ) -> Result<IngestReport, IndexError> {
        config.validate()?;
        if files.is_empty() {
            return Err(IndexError::IngestionAborted("file set is empty".to_string()));
        }

        let cancel = self.begin()?;
        let guard = ActiveGuard {
            slot: Arc::clone(&self.active),
        };
        let cancel_on_drop = cancel.clone().drop_guard();

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let worker = Worker {
            strategies: Arc::clone(&self.strategies),
            live: Arc::clone(&self.live),
            store: self.store.clone(),
            cancel,
        };

        info!(generation = id, files = files.len(), "Ingestion started");
        let result = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            worker.run(id, &files, &config)
        })
        .await;
        cancel_on_drop.disarm();

        let report = result
            .map_err(|e| IndexError::IngestionAborted(format!("ingestion worker failed: {e}")))?
            .inspect_err(|e| {
                warn!(generation = id, error = %e, "Ingestion failed, keeping previous generation");
            })?;

        info!(
            generation = id,
            chunks = report.stats.chunks,
            edges = report.stats.edges,
            warnings = report.warnings.len(),
            "Published generation"
        );
        Ok(report)
    }

    /// Cancel the in-progress ingestion. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        match self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(token) => {
                info!("Cancelling ingestion");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, id: &ChunkId) -> Result<Chunk, IndexError> {
        self.ready()?.lookup(id).cloned()
    }

    pub fn expand(
        &self,
        seeds: &[ChunkId],
        max_chunks: usize,
        max_hops: usize,
    ) -> Result<ContextBundle, IndexError> {
        self.expand_with(seeds, max_chunks, max_hops, Direction::Outgoing)
    }

    pub fn expand_with(
        &self,
        seeds: &[ChunkId],
        max_chunks: usize,
        max_hops: usize,
        direction: Direction,
    ) -> Result<ContextBundle, IndexError> {
        let generation = self.ready()?;
        Ok(expand_with(
            &generation,
            seeds,
            max_chunks,
            max_hops,
            direction,
        ))
    }

    fn begin(&self) -> Result<CancellationToken, IndexError> {
        let mut slot = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(IndexError::IngestionInProgress);
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        Ok(token)
    }
}

fn publish(live: &RwLock<Option<Arc<Generation>>>, generation: Generation) {
    let generation = Arc::new(generation);
    *live.write().unwrap_or_else(PoisonError::into_inner) = Some(generation);
}

/// Everything one ingestion needs on its blocking thread.
struct Worker {
    strategies: Arc<StrategyTable>,
    live: Arc<RwLock<Option<Arc<Generation>>>>,
    store: Option<Arc<TokioMutex<Db>>>,
    cancel: CancellationToken,
}

impl Worker {
    fn run(
        self,
        id: u64,
        files: &[SourceFile],
        config: &IngestConfig,
    ) -> Result<IngestReport, IndexError> {
        let output = Ingestor::new(&self.strategies).ingest(files, config, &self.cancel)?;
        if output.chunks.is_empty() && output.files_failed > 0 {
            return Err(IndexError::IngestionAborted(format!(
                "all {} files failed",
                output.files_failed
            )));
        }

        let generation = Generation::build(id, output.chunks, output.warnings);
        let report = IngestReport {
            generation_id: id,
            files_indexed: output.files_indexed,
            files_failed: output.files_failed,
            stats: generation.stats(),
            warnings: generation.warnings().to_vec(),
        };

        // Commit point: the store lock orders persist and publish across
        // ingestions, and a cancel seen here leaves the store untouched.
        let mut db = self.store.as_deref().map(TokioMutex::blocking_lock);
        if self.cancel.is_cancelled() {
            info!(generation = id, "Ingestion cancelled before commit");
            return Err(IndexError::Cancelled);
        }
        if let Some(db) = db.as_mut() {
            db.save_generation(&generation)?;
            debug!(generation = id, "Persisted generation");
        }
        publish(&self.live, generation);
        Ok(report)
    }
}
