use crate::error::{AppError, Result};
use crate::models::{Response, Search};
use crate::state::{SearchFilter, SearchStore};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// In-memory search store (for development and testing)
#[derive(Clone, Default)]
pub struct InMemoryStore {
    searches: Arc<DashMap<Uuid, Search>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SearchStore for InMemoryStore {
    async fn add(&self, search: &Search) -> Result<()> {
        match self.searches.entry(search.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "Search {} already exists",
                search.id
            ))),
            Entry::Vacant(entry) => {
                entry.insert(search.clone());
                tracing::debug!(search_id = %search.id, "Search saved");
                Ok(())
            }
        }
    }

    async fn update(&self, search: &Search) -> Result<()> {
        match self.searches.get_mut(&search.id) {
            Some(mut stored) => {
                let responses = if search.responses.is_empty() {
                    std::mem::take(&mut stored.responses)
                } else {
                    search.responses.clone()
                };
                *stored = Search {
                    responses,
                    ..search.without_responses()
                };
                tracing::debug!(search_id = %search.id, state = ?search.state, "Search updated");
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Search {} not found", search.id))),
        }
    }

    async fn delete(&self, id: &Uuid) -> Result<Option<Search>> {
        let removed = self
            .searches
            .remove(id)
            .map(|(_, search)| search.without_responses());

        if removed.is_some() {
            tracing::debug!(search_id = %id, "Search deleted");
        }
        Ok(removed)
    }

    async fn get(&self, id: &Uuid, include_responses: bool) -> Result<Option<Search>> {
        Ok(self.searches.get(id).map(|entry| {
            if include_responses {
                entry.clone()
            } else {
                entry.without_responses()
            }
        }))
    }

    async fn list(&self, filter: &SearchFilter) -> Result<Vec<Search>> {
        let mut searches: Vec<Search> = self
            .searches
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().without_responses())
            .collect();

        // Newest first
        searches.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        Ok(searches)
    }

    async fn responses(
        &self,
        id: &Uuid,
        skip: usize,
        take: usize,
    ) -> Result<Option<Vec<Response>>> {
        Ok(self.searches.get(id).map(|entry| {
            entry
                .responses
                .iter()
                .skip(skip)
                .take(take)
                .cloned()
                .collect()
        }))
    }

    async fn count(&self, filter: &SearchFilter) -> Result<u64> {
        let count = self
            .searches
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .count();

        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchStates;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn search(text: &str) -> Search {
        Search::new(Uuid::new_v4(), text.to_string(), 1, BTreeSet::new())
    }

    fn response(username: &str) -> Response {
        Response {
            username: username.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_add_and_get_search() {
        let store = InMemoryStore::new();
        let search = search("artist .mp3");

        store.add(&search).await.unwrap();

        let retrieved = store.get(&search.id, false).await.unwrap();
        assert_eq!(retrieved.unwrap().search_text, "artist .mp3");
    }

    #[tokio::test]
    async fn test_add_duplicate_conflicts() {
        let store = InMemoryStore::new();
        let search = search("x");

        store.add(&search).await.unwrap();
        let err = store.add(&search).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.update(&search("x")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_live_update_keeps_final_responses() {
        let store = InMemoryStore::new();
        let mut search = search("x");
        store.add(&search).await.unwrap();

        search.responses = vec![response("a"), response("b")];
        search.complete(SearchStates::empty(), Utc::now());
        store.update(&search).await.unwrap();

        store.update(&search.without_responses()).await.unwrap();

        let stored = store.get(&search.id, true).await.unwrap().unwrap();
        assert_eq!(stored.responses.len(), 2);
    }

    #[tokio::test]
    async fn test_list_omits_responses() {
        let store = InMemoryStore::new();
        let mut search = search("x");
        search.responses = vec![response("a")];
        store.add(&search).await.unwrap();

        let listed = store.list(&SearchFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].responses.is_empty());
    }

    #[tokio::test]
    async fn test_responses_paging() {
        let store = InMemoryStore::new();
        let mut search = search("x");
        search.responses = (0..5).map(|i| response(&format!("user{}", i))).collect();
        store.add(&search).await.unwrap();

        let page = store.responses(&search.id, 2, 2).await.unwrap().unwrap();
        let names: Vec<_> = page.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(names, vec!["user2", "user3"]);

        assert!(store.responses(&Uuid::new_v4(), 0, 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryStore::new();
        let search = search("x");
        store.add(&search).await.unwrap();

        assert!(store.delete(&search.id).await.unwrap().is_some());
        assert!(store.delete(&search.id).await.unwrap().is_none());
        assert_eq!(store.count(&SearchFilter::default()).await.unwrap(), 0);
    }
}
