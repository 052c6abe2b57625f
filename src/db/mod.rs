//! SQLite persistence of built generations.
use rusqlite::{Connection, Result};
use std::path::Path;
use tracing::info;

pub mod generations;
pub mod models;
pub mod relations;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS generations (
    id INTEGER PRIMARY KEY,
    created_at DATETIME NOT NULL,
    warnings TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    generation_id INTEGER NOT NULL,
    chunk_id TEXT NOT NULL,
    path TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    kind TEXT NOT NULL,
    language TEXT,
    qualified_name TEXT NOT NULL,
    start_byte INTEGER NOT NULL,
    end_byte INTEGER NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    content TEXT NOT NULL,
    docstring TEXT,
    members TEXT NOT NULL,
    PRIMARY KEY (generation_id, chunk_id),
    FOREIGN KEY (generation_id) REFERENCES generations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(generation_id, path);

CREATE TABLE IF NOT EXISTS chunk_references (
    generation_id INTEGER NOT NULL,
    chunk_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    FOREIGN KEY (generation_id) REFERENCES generations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_refs_chunk ON chunk_references(generation_id, chunk_id);

CREATE TABLE IF NOT EXISTS definitions (
    generation_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    position INTEGER NOT NULL,
    chunk_id TEXT NOT NULL,
    FOREIGN KEY (generation_id) REFERENCES generations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_definitions_name ON definitions(generation_id, name);

CREATE TABLE IF NOT EXISTS relations (
    generation_id INTEGER NOT NULL,
    source_chunk_id TEXT NOT NULL,
    target_chunk_id TEXT NOT NULL,
    relation_type TEXT NOT NULL,
    FOREIGN KEY (generation_id) REFERENCES generations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_rel_source ON relations(generation_id, source_chunk_id);
CREATE INDEX IF NOT EXISTS idx_rel_target ON relations(generation_id, target_chunk_id);
"#;

/// A SQLite connection with the generation schema applied.
pub struct Db {
    pub(crate) conn: Connection,
}

impl Db {
    /// Open a database connection at the given path and initialize the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Initializing database: {}", path.display());

        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory database connection (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }
}

/// Wrap a non-SQL decoding problem in column `idx` as a rusqlite error.
pub(crate) fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_init() {
        let db = Db::open_in_memory().expect("Failed to open in-memory DB");

        let tables: usize = db
            .conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN ('generations', 'chunks', 'chunk_references', 'definitions', 'relations');",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(tables, 5);
    }

    #[test]
    fn test_open_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        drop(Db::open(&path).unwrap());
        assert!(Db::open(&path).is_ok());
    }
}
