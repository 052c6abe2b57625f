use super::relations::{insert_definitions, insert_relations};
use super::{Db, conversion_error, models::GenerationSummary};
use crate::chunk::{Chunk, ChunkId, ChunkKind, Reference, RelationType, Span};
use crate::error::Warning;
use crate::generation::Generation;
use crate::graph::definitions::DefinitionIndex;
use crate::graph::resolver::RelationshipIndex;
use crate::indexer::languages::Language;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result, Row, params};
use std::collections::HashMap;
use tracing::info;

fn map_chunk(row: &Row<'_>) -> Result<Chunk> {
    let kind: String = row.get(3)?;
    let language: Option<String> = row.get(4)?;
    let members: String = row.get(12)?;
    Ok(Chunk {
        id: ChunkId::from(row.get::<_, String>(0)?),
        path: row.get(1)?,
        ordinal: row.get::<_, i64>(2)? as usize,
        kind: ChunkKind::parse(&kind)
            .ok_or_else(|| conversion_error(3, format!("unknown chunk kind: {kind}")))?,
        language: language.as_deref().and_then(Language::parse),
        qualified_name: row.get(5)?,
        span: Span {
            start_byte: row.get::<_, i64>(6)? as usize,
            end_byte: row.get::<_, i64>(7)? as usize,
            start_line: row.get::<_, i64>(8)? as usize,
            end_line: row.get::<_, i64>(9)? as usize,
        },
        content: row.get(10)?,
        docstring: row.get(11)?,
        members: serde_json::from_str(&members).map_err(|e| conversion_error(12, e))?,
        references: Vec::new(),
    })
}

impl Db {
    /// Persist a complete generation in one transaction, then drop every
    /// older generation.
    pub fn save_generation(&mut self, generation: &Generation) -> Result<()> {
        let id = generation.id as i64;
        let warnings = serde_json::to_string(generation.warnings())
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

        let tx = self.conn.transaction()?;

        // Re-saving an id replaces it wholesale.
        tx.execute("DELETE FROM generations WHERE id = ?", params![id])?;
        tx.execute(
            "INSERT INTO generations (id, created_at, warnings) VALUES (?, ?, ?)",
            params![id, generation.created_at, warnings],
        )?;

        {
            let mut chunk_stmt = tx.prepare(
                r#"
                INSERT INTO chunks (generation_id, chunk_id, path, ordinal, kind, language,
                    qualified_name, start_byte, end_byte, start_line, end_line,
                    content, docstring, members)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;
            let mut ref_stmt = tx.prepare(
                r#"
                INSERT INTO chunk_references (generation_id, chunk_id, position, name, kind)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )?;

            for chunk in generation.chunks() {
                let members = serde_json::to_string(&chunk.members)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                chunk_stmt.execute(params![
                    id,
                    chunk.id.as_str(),
                    chunk.path,
                    chunk.ordinal as i64,
                    chunk.kind.as_str(),
                    chunk.language.map(|l| l.name()),
                    chunk.qualified_name,
                    chunk.span.start_byte as i64,
                    chunk.span.end_byte as i64,
                    chunk.span.start_line as i64,
                    chunk.span.end_line as i64,
                    chunk.content,
                    chunk.docstring,
                    members,
                ])?;

                for (position, reference) in chunk.references.iter().enumerate() {
                    ref_stmt.execute(params![
                        id,
                        chunk.id.as_str(),
                        position as i64,
                        reference.name,
                        reference.kind.as_str(),
                    ])?;
                }
            }
        }

        insert_definitions(&tx, id, generation.definitions())?;
        insert_relations(&tx, id, generation.relations().edges())?;

        tx.execute("DELETE FROM generations WHERE id <> ?", params![id])?;
        tx.commit()?;

        info!(
            generation = generation.id,
            chunks = generation.chunks().len(),
            "Persisted generation"
        );
        Ok(())
    }

    pub fn latest_generation_id(&self) -> Result<Option<u64>> {
        self.conn
            .query_row("SELECT MAX(id) FROM generations", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .map(|id| id.map(|id| id as u64))
    }

    /// Persisted generations, newest first.
    pub fn list_generations(&self) -> Result<Vec<GenerationSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT g.id, g.created_at,
                (SELECT count(*) FROM chunks c WHERE c.generation_id = g.id),
                (SELECT count(*) FROM relations r WHERE r.generation_id = g.id)
            FROM generations g
            ORDER BY g.id DESC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(GenerationSummary {
                id: row.get::<_, i64>(0)? as u64,
                created_at: row.get(1)?,
                chunk_count: row.get::<_, i64>(2)? as usize,
                relation_count: row.get::<_, i64>(3)? as usize,
            })
        })?;
        rows.collect()
    }

    pub fn load_latest_generation(&self) -> Result<Option<Generation>> {
        match self.latest_generation_id()? {
            Some(id) => self.load_generation(id),
            None => Ok(None),
        }
    }

    /// Rebuild a generation exactly as it was saved.
    pub fn load_generation(&self, generation_id: u64) -> Result<Option<Generation>> {
        let id = generation_id as i64;
        let header: Option<(DateTime<Utc>, String)> = self
            .conn
            .query_row(
                "SELECT created_at, warnings FROM generations WHERE id = ?",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((created_at, warnings)) = header else {
            return Ok(None);
        };
        let warnings: Vec<Warning> =
            serde_json::from_str(&warnings).map_err(|e| conversion_error(1, e))?;

        let mut references = self.load_references(generation_id)?;
        let mut stmt = self.conn.prepare(
            r#"
            SELECT chunk_id, path, ordinal, kind, language, qualified_name,
                start_byte, end_byte, start_line, end_line, content, docstring, members
            FROM chunks WHERE generation_id = ?
            ORDER BY path, start_byte
            "#,
        )?;
        let mut chunks = stmt
            .query_map(params![id], map_chunk)?
            .collect::<Result<Vec<Chunk>>>()?;
        for chunk in &mut chunks {
            chunk.references = references.remove(&chunk.id).unwrap_or_default();
        }

        let definitions =
            DefinitionIndex::from_entries(self.load_definitions(generation_id)?, &chunks);
        let unresolved = warnings
            .iter()
            .filter(|w| matches!(w, Warning::UnresolvedReference { .. }))
            .cloned()
            .collect();
        let relations =
            RelationshipIndex::from_edges(self.load_relations(generation_id)?, unresolved);

        Ok(Some(Generation::from_parts(
            generation_id,
            created_at,
            chunks,
            definitions,
            relations,
            warnings,
        )))
    }

    fn load_references(&self, generation_id: u64) -> Result<HashMap<ChunkId, Vec<Reference>>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT chunk_id, name, kind FROM chunk_references
            WHERE generation_id = ?
            ORDER BY chunk_id, position
            "#,
        )?;
        let rows = stmt.query_map(params![generation_id as i64], |row| {
            let kind: String = row.get(2)?;
            let kind = RelationType::parse(&kind)
                .ok_or_else(|| conversion_error(2, format!("unknown reference kind: {kind}")))?;
            Ok((
                ChunkId::from(row.get::<_, String>(0)?),
                Reference {
                    name: row.get(1)?,
                    kind,
                },
            ))
        })?;

        let mut references: HashMap<ChunkId, Vec<Reference>> = HashMap::new();
        for row in rows {
            let (chunk_id, reference) = row?;
            references.entry(chunk_id).or_default().push(reference);
        }
        Ok(references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SourceFile;
    use crate::config::IngestConfig;
    use crate::indexer::strategy::StrategyTable;

    fn generation(id: u64) -> Generation {
        let table = StrategyTable::new().unwrap();
        let files = [
            SourceFile::new(
                "pkg/foo.py",
                "import os\n\nclass Box:\n    \"\"\"Holds things.\"\"\"\n    def open(self):\n        helper()\n\ndef helper():\n    unknown_fn()\n",
            ),
            SourceFile::new("notes.txt", "helper()\n"),
        ];
        let chunks = files
            .iter()
            .flat_map(|f| table.extract(f, &IngestConfig::default()).unwrap().chunks)
            .collect();
        Generation::build(id, chunks, Vec::new())
    }

    #[test]
    fn test_save_and_load_generation() {
        let mut db = Db::open_in_memory().unwrap();
        let original = generation(3);
        db.save_generation(&original).unwrap();

        let loaded = db.load_latest_generation().unwrap().unwrap();
        assert_eq!(loaded.id, 3);
        assert_eq!(loaded.created_at, original.created_at);
        assert_eq!(loaded.chunks(), original.chunks());
        assert_eq!(loaded.definitions(), original.definitions());
        assert_eq!(loaded.relations().edges(), original.relations().edges());
        assert_eq!(loaded.warnings(), original.warnings());
        assert_eq!(loaded.stats(), original.stats());
    }

    #[test]
    fn test_empty_database_has_no_generation() {
        let db = Db::open_in_memory().unwrap();
        assert!(db.load_latest_generation().unwrap().is_none());
        assert!(db.latest_generation_id().unwrap().is_none());
    }

    #[test]
    fn test_newer_generation_replaces_older() {
        let mut db = Db::open_in_memory().unwrap();
        db.save_generation(&generation(1)).unwrap();
        db.save_generation(&generation(2)).unwrap();

        let summaries = db.list_generations().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, 2);
        assert_eq!(summaries[0].chunk_count, generation(2).chunks().len());
        assert!(db.load_generation(1).unwrap().is_none());
    }
}
