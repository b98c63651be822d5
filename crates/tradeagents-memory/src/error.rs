use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Memory not available: {0}")]
    Unavailable(String),
}
