use super::session::{PreparedId, Session, StoreError};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

///
/// PreparedCache
///
/// Query text → prepared handle. Concurrent first uses of the same text
/// share one in-flight prepare; a failed prepare leaves the slot empty so
/// the next caller retries.
///

#[derive(Debug, Default)]
pub struct PreparedCache {
    entries: DashMap<String, Arc<OnceCell<PreparedId>>>,
}

impl PreparedCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_prepare(
        &self,
        session: &dyn Session,
        query: &str,
    ) -> Result<PreparedId, StoreError> {
        // clone the cell out so no shard lock is held across the await
        let cell = self
            .entries
            .entry(query.to_string())
            .or_default()
            .value()
            .clone();

        cell.get_or_try_init(|| async {
            tracing::debug!(query, "prepare cache miss");
            session.prepare(query).await
        })
        .await
        .cloned()
    }

    #[must_use]
    pub fn contains(&self, query: &str) -> bool {
        self.entries
            .get(query)
            .is_some_and(|cell| cell.initialized())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value().initialized()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
