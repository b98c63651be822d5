use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::similarity::TermVector;

/// Hot cache of term vectors keyed by memory row id, backed by moka.
///
/// Rows are immutable once written, so a cached vector never goes stale;
/// the TTL only bounds memory use.
pub struct VectorCache {
    inner: Cache<i64, Arc<TermVector>>,
}

impl VectorCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Cached vector for `id`, computing it from `situation` on a miss.
    pub async fn get_or_compute(&self, id: i64, situation: &str) -> Arc<TermVector> {
        if let Some(vector) = self.inner.get(&id).await {
            return vector;
        }
        let vector = Arc::new(TermVector::from_text(situation));
        self.inner.insert(id, Arc::clone(&vector)).await;
        vector
    }

    pub async fn contains(&self, id: i64) -> bool {
        self.inner.get(&id).await.is_some()
    }
}
