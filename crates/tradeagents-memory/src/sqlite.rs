use chrono::Utc;
use rusqlite::Connection;
use tradeagents_models::memory::{MemoryMetadata, MemoryRow, MEMORY_TABLE_DDL};

use crate::error::MemoryError;

/// SQLite-backed persistence for remembered situations.
pub struct MemoryDb {
    conn: Connection,
}

impl MemoryDb {
    /// Open (or create) the memory database at `path`.
    pub fn open(path: &str) -> Result<Self, MemoryError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(MEMORY_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database. Useful for testing.
    pub fn open_in_memory() -> Result<Self, MemoryError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(MEMORY_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Insert a situation into a collection. Returns the new row id.
    pub fn insert(
        &self,
        collection: &str,
        situation: &str,
        metadata: &MemoryMetadata,
    ) -> Result<i64, MemoryError> {
        self.conn.execute(
            "INSERT INTO memories \
             (collection, situation, recommendation, instrument_id, as_of_date, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                collection,
                situation,
                metadata.recommendation,
                metadata.instrument_id,
                metadata.as_of_date.map(|d| d.to_string()),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All rows of a collection, oldest first.
    pub fn rows(&self, collection: &str) -> Result<Vec<MemoryRow>, MemoryError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, collection, situation, recommendation, instrument_id, as_of_date, created_at \
             FROM memories WHERE collection = ?1 ORDER BY id",
        )?;

        let rows = stmt
            .query_map(rusqlite::params![collection], |row| {
                Ok(MemoryRow {
                    id: row.get(0)?,
                    collection: row.get(1)?,
                    situation: row.get(2)?,
                    recommendation: row.get(3)?,
                    instrument_id: row.get(4)?,
                    as_of_date: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn count(&self, collection: &str) -> Result<u64, MemoryError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE collection = ?1",
            rusqlite::params![collection],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
