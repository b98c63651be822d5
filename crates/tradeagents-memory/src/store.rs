use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use tradeagents_models::memory::{MemoryMatch, MemoryMetadata};

use crate::error::MemoryError;
use crate::similarity::TermVector;
use crate::sqlite::MemoryDb;
use crate::vectors::VectorCache;

/// Similarity-ranked store of past situations and what was recommended.
///
/// Consumers treat both operations as best-effort.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The `k` most similar remembered situations, best match first.
    async fn retrieve(&self, situation: &str, k: usize) -> Result<MemoryMatches, MemoryError>;

    /// Remember a situation together with its recommendation.
    async fn add(&self, situation: &str, metadata: MemoryMetadata) -> Result<(), MemoryError>;
}

/// Result of one retrieval. Finite and consumed once; call `retrieve`
/// again for a fresh sequence.
#[derive(Debug)]
pub struct MemoryMatches {
    inner: std::vec::IntoIter<MemoryMatch>,
}

impl MemoryMatches {
    pub fn new(matches: Vec<MemoryMatch>) -> Self {
        Self {
            inner: matches.into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Iterator for MemoryMatches {
    type Item = MemoryMatch;

    fn next(&mut self) -> Option<MemoryMatch> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for MemoryMatches {}

/// Memory store over SQLite with a moka cache of term vectors.
///
/// SQLite access is synchronized via `Mutex` since `rusqlite::Connection` is not `Sync`.
pub struct SqliteMemoryStore {
    db: Mutex<MemoryDb>,
    collection: String,
    vectors: VectorCache,
}

impl SqliteMemoryStore {
    pub fn new(db: MemoryDb, collection: &str, cache_capacity: u64, cache_ttl: Duration) -> Self {
        Self {
            db: Mutex::new(db),
            collection: collection.to_string(),
            vectors: VectorCache::new(cache_capacity, cache_ttl),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn len(&self) -> Result<u64, MemoryError> {
        let db = self.lock()?;
        db.count(&self.collection)
    }

    pub fn is_empty(&self) -> Result<bool, MemoryError> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryDb>, MemoryError> {
        self.db
            .lock()
            .map_err(|e| MemoryError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn retrieve(&self, situation: &str, k: usize) -> Result<MemoryMatches, MemoryError> {
        if k == 0 {
            return Ok(MemoryMatches::empty());
        }

        let rows = {
            let db = self.lock()?;
            db.rows(&self.collection)?
        };

        let query = TermVector::from_text(situation);
        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let vector = self.vectors.get_or_compute(row.id, &row.situation).await;
            scored.push((query.cosine(&vector), row));
        }

        // Best score first; older rows win ties.
        scored.sort_by(|(a, ra), (b, rb)| b.total_cmp(a).then(ra.id.cmp(&rb.id)));

        let matches: Vec<MemoryMatch> = scored
            .into_iter()
            .take(k)
            .map(|(score, row)| MemoryMatch {
                situation: row.situation,
                recommendation: row.recommendation,
                similarity_score: score,
            })
            .collect();

        debug!(
            collection = %self.collection,
            requested = k,
            returned = matches.len(),
            "Memory retrieval"
        );
        Ok(MemoryMatches::new(matches))
    }

    async fn add(&self, situation: &str, metadata: MemoryMetadata) -> Result<(), MemoryError> {
        let id = {
            let db = self.lock()?;
            db.insert(&self.collection, situation, &metadata)?
        };
        self.vectors.get_or_compute(id, situation).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteMemoryStore {
        let db = MemoryDb::open_in_memory().unwrap();
        SqliteMemoryStore::new(db, "trader_memory", 100, Duration::from_secs(60))
    }

    async fn seeded() -> SqliteMemoryStore {
        let store = store();
        store
            .add(
                "High inflation with rising interest rates and declining consumer spending",
                MemoryMetadata::new("Consider defensive sectors"),
            )
            .await
            .unwrap();
        store
            .add(
                "Tech sector showing high volatility with institutional selling pressure",
                MemoryMetadata::new("Reduce exposure to high-growth tech"),
            )
            .await
            .unwrap();
        store
            .add(
                "Strong dollar affecting emerging markets with increasing forex volatility",
                MemoryMetadata::new("Hedge currency exposure"),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn retrieve_ranks_by_similarity() {
        let store = seeded().await;
        let matches: Vec<MemoryMatch> = store
            .retrieve("Tech stocks under institutional selling with high volatility", 2)
            .await
            .unwrap()
            .collect();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].recommendation, "Reduce exposure to high-growth tech");
        assert!(matches[0].similarity_score >= matches[1].similarity_score);
    }

    #[tokio::test]
    async fn retrieve_caps_at_available_rows() {
        let store = seeded().await;
        let matches = store.retrieve("anything", 10).await.unwrap();
        assert_eq!(matches.len(), 3);
    }

    #[tokio::test]
    async fn retrieve_zero_is_empty() {
        let store = seeded().await;
        assert_eq!(store.retrieve("inflation", 0).await.unwrap().count(), 0);
    }

    #[tokio::test]
    async fn retrieve_from_empty_store() {
        let store = store();
        assert!(store.is_empty().unwrap());
        assert_eq!(store.retrieve("inflation", 2).await.unwrap().count(), 0);
    }

    #[tokio::test]
    async fn each_retrieve_is_a_fresh_sequence() {
        let store = seeded().await;
        let mut first = store.retrieve("inflation rates", 1).await.unwrap();
        assert!(first.next().is_some());
        assert!(first.next().is_none());

        let second: Vec<_> = store.retrieve("inflation rates", 1).await.unwrap().collect();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].recommendation, "Consider defensive sectors");
    }

    #[tokio::test]
    async fn add_warms_vector_cache() {
        let store = store();
        store
            .add("rates rising", MemoryMetadata::new("hold"))
            .await
            .unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.vectors.contains(1).await);
    }
}
