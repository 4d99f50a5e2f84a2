use crate::models::Search;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Short-lived cache of recently finalized searches, keyed by id.
///
/// Entries hold the full record including responses; readers that do not ask
/// for responses get a light copy.
#[derive(Clone)]
pub struct SearchCache {
    cache: Cache<Uuid, Arc<Search>>,
}

impl SearchCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn put(&self, search: Search) {
        self.cache.insert(search.id, Arc::new(search)).await;
    }

    pub async fn try_get(&self, id: &Uuid, include_responses: bool) -> Option<Search> {
        self.cache.get(id).await.map(|search| {
            if include_responses {
                search.as_ref().clone()
            } else {
                search.without_responses()
            }
        })
    }

    /// Shared handle to the cached record, responses included
    pub async fn get_shared(&self, id: &Uuid) -> Option<Arc<Search>> {
        self.cache.get(id).await
    }

    pub async fn evict(&self, id: &Uuid) {
        self.cache.invalidate(id).await;
    }
}
