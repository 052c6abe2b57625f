//! Immutable snapshot of one completed ingestion.
use crate::chunk::{Chunk, ChunkId, ChunkKind};
use crate::error::{IndexError, Warning};
use crate::graph::definitions::DefinitionIndex;
use crate::graph::resolver::{RelationshipIndex, resolve};
use crate::indexer::languages::Language;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Chunks, definitions and edges that were built together.
///
/// Nothing in a generation changes after construction; a new ingestion
/// builds a new one.
#[derive(Debug)]
pub struct Generation {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    chunks: Vec<Chunk>,
    by_id: HashMap<ChunkId, usize>,
    definitions: DefinitionIndex,
    relations: RelationshipIndex,
    warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub files: usize,
    pub chunks: usize,
    pub definitions: usize,
    pub edges: usize,
    pub unresolved: usize,
}

/// What an embedding collaborator needs to index one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: ChunkId,
    pub content: String,
    pub qualified_name: String,
    pub kind: ChunkKind,
    pub path: String,
    pub language: Option<Language>,
}

impl EmbeddingRecord {
    pub fn embedding_text(&self) -> String {
        let language = self.language.map_or("text", |l| l.name());
        let name = if self.qualified_name.is_empty() {
            self.path.as_str()
        } else {
            self.qualified_name.as_str()
        };
        format!("{} {}: {}", language, name, self.content)
    }
}

impl Generation {
    /// Run both resolution passes over `chunks` and freeze the result.
    pub fn build(id: u64, mut chunks: Vec<Chunk>, mut warnings: Vec<Warning>) -> Self {
        chunks.sort_by(|a, b| a.position_key().cmp(&b.position_key()));
        let definitions = DefinitionIndex::build(&chunks);
        let relations = resolve(&chunks, &definitions);
        warnings.extend(relations.unresolved().iter().cloned());
        Self::from_parts(id, Utc::now(), chunks, definitions, relations, warnings)
    }

    /// Assemble a generation from already resolved parts.
    pub fn from_parts(
        id: u64,
        created_at: DateTime<Utc>,
        chunks: Vec<Chunk>,
        definitions: DefinitionIndex,
        relations: RelationshipIndex,
        warnings: Vec<Warning>,
    ) -> Self {
        let by_id = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        Self {
            id,
            created_at,
            chunks,
            by_id,
            definitions,
            relations,
            warnings,
        }
    }

    pub fn get(&self, id: &ChunkId) -> Option<&Chunk> {
        self.by_id.get(id).map(|&i| &self.chunks[i])
    }

    pub fn lookup(&self, id: &ChunkId) -> Result<&Chunk, IndexError> {
        self.get(id).ok_or_else(|| IndexError::NotFound(id.clone()))
    }

    pub fn contains(&self, id: &ChunkId) -> bool {
        self.by_id.contains_key(id)
    }

    /// All chunks in (path, start) order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn definitions(&self) -> &DefinitionIndex {
        &self.definitions
    }

    pub fn relations(&self) -> &RelationshipIndex {
        &self.relations
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn stats(&self) -> GenerationStats {
        let files: BTreeSet<&str> = self.chunks.iter().map(|c| c.path.as_str()).collect();
        GenerationStats {
            files: files.len(),
            chunks: self.chunks.len(),
            definitions: self.definitions.len(),
            edges: self.relations.edges().len(),
            unresolved: self.relations.unresolved().len(),
        }
    }

    pub fn embedding_records(&self) -> Vec<EmbeddingRecord> {
        self.chunks
            .iter()
            .map(|c| EmbeddingRecord {
                id: c.id.clone(),
                content: c.content.clone(),
                qualified_name: c.qualified_name.clone(),
                kind: c.kind,
                path: c.path.clone(),
                language: c.language,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SourceFile;
    use crate::config::IngestConfig;
    use crate::indexer::strategy::StrategyTable;

    fn generation() -> Generation {
        let table = StrategyTable::new().unwrap();
        let file = SourceFile::new(
            "foo.py",
            "def helper():\n    return 1\n\ndef bar():\n    helper()\n    unknown_fn()\n",
        );
        let chunks = table
            .extract(&file, &IngestConfig::default())
            .unwrap()
            .chunks;
        Generation::build(1, chunks, Vec::new())
    }

    #[test]
    fn test_build_resolves_and_collects_warnings() {
        let generation = generation();
        let stats = generation.stats();
        assert_eq!(stats.files, 1);
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.edges, 1);
        assert_eq!(stats.unresolved, 1);
        assert_eq!(generation.warnings().len(), 1);
    }

    #[test]
    fn test_lookup() {
        let generation = generation();
        let id = ChunkId::from("foo.py:1");
        assert_eq!(generation.lookup(&id).unwrap().local_name(), "bar");
        assert!(matches!(
            generation.lookup(&ChunkId::from("foo.py:9")),
            Err(IndexError::NotFound(_))
        ));
    }

    #[test]
    fn test_embedding_records() {
        let generation = generation();
        let records = generation.embedding_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id.as_str(), "foo.py:0");
        assert!(
            records[0]
                .embedding_text()
                .starts_with("python foo.helper: def helper()")
        );
    }
}
