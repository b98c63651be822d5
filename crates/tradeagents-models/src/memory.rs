use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A past situation returned by similarity retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryMatch {
    pub situation: String,
    pub recommendation: String,
    /// Cosine similarity in [0.0, 1.0]; higher is closer.
    pub similarity_score: f64,
}

/// Metadata stored alongside a remembered situation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryMetadata {
    pub recommendation: String,
    pub instrument_id: Option<String>,
    pub as_of_date: Option<NaiveDate>,
}

impl MemoryMetadata {
    pub fn new(recommendation: impl Into<String>) -> Self {
        Self {
            recommendation: recommendation.into(),
            instrument_id: None,
            as_of_date: None,
        }
    }
}

/// A stored memory row, as persisted in the `memories` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryRow {
    pub id: i64,
    pub collection: String,
    pub situation: String,
    pub recommendation: String,
    pub instrument_id: Option<String>,
    pub as_of_date: Option<String>,
    pub created_at: String,
}

/// Table layout for persisted memories.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS memories (
///     id              INTEGER PRIMARY KEY AUTOINCREMENT,
///     collection      TEXT NOT NULL,
///     situation       TEXT NOT NULL,
///     recommendation  TEXT NOT NULL,
///     instrument_id   TEXT,
///     as_of_date      TEXT,
///     created_at      TEXT NOT NULL
/// );
/// ```
pub const MEMORY_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS memories (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    collection      TEXT NOT NULL,
    situation       TEXT NOT NULL,
    recommendation  TEXT NOT NULL,
    instrument_id   TEXT,
    as_of_date      TEXT,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_memories_collection ON memories(collection);
";
