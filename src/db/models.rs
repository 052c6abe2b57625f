use chrono::{DateTime, Utc};
use serde::Serialize;

/// One row of the `generations` table with its sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationSummary {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub chunk_count: usize,
    pub relation_count: usize,
}
