pub mod error;
pub mod similarity;
pub mod sqlite;
pub mod store;
pub mod vectors;

pub use error::MemoryError;
pub use similarity::TermVector;
pub use sqlite::MemoryDb;
pub use store::{MemoryMatches, MemoryStore, SqliteMemoryStore};
