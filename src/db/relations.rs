use super::{Db, conversion_error};
use crate::chunk::{ChunkId, RelationType};
use crate::graph::definitions::DefinitionIndex;
use crate::graph::resolver::Edge;
use rusqlite::{Connection, Result, Row, params};

fn map_edge(row: &Row<'_>) -> Result<Edge> {
    let kind: String = row.get(2)?;
    Ok(Edge {
        source: ChunkId::from(row.get::<_, String>(0)?),
        target: ChunkId::from(row.get::<_, String>(1)?),
        kind: RelationType::parse(&kind)
            .ok_or_else(|| conversion_error(2, format!("unknown relation type: {kind}")))?,
    })
}

/// Insert every edge of a generation.
pub(super) fn insert_relations(conn: &Connection, generation_id: i64, edges: &[Edge]) -> Result<()> {
    let mut stmt = conn.prepare(
        r#"
        INSERT INTO relations (generation_id, source_chunk_id, target_chunk_id, relation_type)
        VALUES (?, ?, ?, ?)
        "#,
    )?;
    for edge in edges {
        stmt.execute(params![
            generation_id,
            edge.source.as_str(),
            edge.target.as_str(),
            edge.kind.as_str(),
        ])?;
    }
    Ok(())
}

/// Insert the definition index as `(name, chunk_id)` pairs in list order.
pub(super) fn insert_definitions(
    conn: &Connection,
    generation_id: i64,
    definitions: &DefinitionIndex,
) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO definitions (generation_id, name, position, chunk_id) VALUES (?, ?, ?, ?)",
    )?;
    for (position, (name, id)) in definitions.entries().enumerate() {
        stmt.execute(params![generation_id, name, position as i64, id.as_str()])?;
    }
    Ok(())
}

impl Db {
    /// Edges of a generation, in stored order.
    pub fn load_relations(&self, generation_id: u64) -> Result<Vec<Edge>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT source_chunk_id, target_chunk_id, relation_type
            FROM relations WHERE generation_id = ?
            ORDER BY rowid
            "#,
        )?;
        let rows = stmt.query_map(params![generation_id as i64], map_edge)?;
        rows.collect()
    }

    /// `(qualified_name, chunk_id)` pairs in the order they were saved.
    pub fn load_definitions(&self, generation_id: u64) -> Result<Vec<(String, ChunkId)>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, chunk_id FROM definitions WHERE generation_id = ? ORDER BY position",
        )?;
        let rows = stmt.query_map(params![generation_id as i64], |row| {
            Ok((row.get(0)?, ChunkId::from(row.get::<_, String>(1)?)))
        })?;
        rows.collect()
    }
}
