use crate::error::{AppError, Result};
use crate::models::{Response, Search};
use crate::state::{SearchCache, SearchFilter, SearchStore};
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Search persistence with a hot cache in front of id lookups
#[derive(Clone)]
pub struct SearchRepository {
    store: Arc<dyn SearchStore>,
    cache: SearchCache,
}

impl SearchRepository {
    pub fn new(store: Arc<dyn SearchStore>, cache: SearchCache) -> Self {
        Self { store, cache }
    }

    pub async fn add(&self, search: &Search) -> Result<()> {
        self.store.add(search).await
    }

    pub async fn update(&self, search: &Search) -> Result<()> {
        self.store.update(search).await
    }

    /// Keep a finalized search hot for the common read-right-after pattern
    pub async fn cache(&self, search: Search) {
        self.cache.put(search).await;
    }

    /// Find the first search matching `filter`.
    ///
    /// An id-only filter is answered from the cache when possible. An empty
    /// filter is rejected.
    pub async fn find(&self, filter: &SearchFilter, include_responses: bool) -> Result<Option<Search>> {
        if filter.is_empty() {
            return Err(AppError::Validation(
                "A search predicate is required".to_string(),
            ));
        }

        if let (true, Some(id)) = (filter.is_id_only(), filter.id) {
            if let Some(search) = self.cache.try_get(&id, include_responses).await {
                tracing::debug!(search_id = %id, "Search served from cache");
                return Ok(Some(search));
            }
            return self.store.get(&id, include_responses).await;
        }

        let first = self.store.list(filter).await?.into_iter().next();
        match first {
            Some(search) if include_responses => self.store.get(&search.id, true).await,
            other => Ok(other),
        }
    }

    /// All searches matching `filter`, without responses
    pub async fn list(&self, filter: &SearchFilter) -> Result<Vec<Search>> {
        self.store.list(filter).await
    }

    pub async fn count(&self, filter: &SearchFilter) -> Result<u64> {
        self.store.count(filter).await
    }

    /// A page of responses; `None` if the search is unknown
    pub async fn responses(&self, id: &Uuid, skip: usize, take: usize) -> Result<Option<Vec<Response>>> {
        if let Some(search) = self.cache.get_shared(id).await {
            return Ok(Some(
                search.responses.iter().skip(skip).take(take).cloned().collect(),
            ));
        }

        self.store.responses(id, skip, take).await
    }

    /// Delete a search and evict it from the cache
    pub async fn delete(&self, id: &Uuid) -> Result<Option<Search>> {
        let removed = self.store.delete(id).await?;
        self.cache.evict(id).await;
        Ok(removed)
    }

    /// Delete every search that ended more than `age_minutes` ago.
    ///
    /// Searches that have not ended are never selected. Returns the removed
    /// records.
    pub async fn prune_older_than(&self, age_minutes: u64) -> Result<Vec<Search>> {
        let cutoff = i64::try_from(age_minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .and_then(|age| Utc::now().checked_sub_signed(age));

        // Nothing can be older than an unrepresentable age
        let Some(cutoff) = cutoff else {
            return Ok(Vec::new());
        };

        let expired = self.store.list(&SearchFilter::ended_before(cutoff)).await?;
        let mut pruned = Vec::with_capacity(expired.len());

        for search in expired {
            if let Some(removed) = self.delete(&search.id).await? {
                pruned.push(removed);
            }
        }

        tracing::debug!(count = pruned.len(), age_minutes, "Pruned searches");
        Ok(pruned)
    }
}
