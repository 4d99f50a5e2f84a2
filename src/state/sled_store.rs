use crate::error::{AppError, Result};
use crate::models::{Response, Search};
use crate::state::{SearchFilter, SearchStore};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sled::Db;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Persistent search store using Sled embedded database.
///
/// Search metadata and responses live in separate trees so that listing
/// never has to decode response payloads.
#[derive(Clone)]
pub struct SledStore {
    db: Arc<Db>,
    searches_tree: sled::Tree,
    responses_tree: sled::Tree,
}

impl SledStore {
    /// Create a new Sled store at the specified path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            AppError::Database(format!("Failed to open Sled database: {}", e))
        })?;

        let searches_tree = db.open_tree("searches").map_err(|e| {
            AppError::Database(format!("Failed to open searches tree: {}", e))
        })?;

        let responses_tree = db.open_tree("responses").map_err(|e| {
            AppError::Database(format!("Failed to open responses tree: {}", e))
        })?;

        tracing::info!("Initialized Sled store at {:?}", path.as_ref());

        Ok(Self {
            db: Arc::new(db),
            searches_tree,
            responses_tree,
        })
    }

    fn encode<T: Serialize>(value: &T, what: &str) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| {
            AppError::Serialization(format!("Failed to serialize {}: {}", what, e))
        })
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| {
            AppError::Serialization(format!("Failed to deserialize {}: {}", what, e))
        })
    }

    fn key(id: &Uuid) -> [u8; 16] {
        *id.as_bytes()
    }

    fn load_responses(&self, id: &Uuid) -> Result<Vec<Response>> {
        match self.responses_tree.get(Self::key(id)) {
            Ok(Some(bytes)) => Self::decode(&bytes, "responses"),
            Ok(None) => Ok(Vec::new()),
            Err(e) => Err(AppError::Database(format!("Failed to read responses: {}", e))),
        }
    }

    fn store_responses(&self, search: &Search) -> Result<()> {
        if search.responses.is_empty() {
            return Ok(());
        }

        let value = Self::encode(&search.responses, "responses")?;
        self.responses_tree
            .insert(Self::key(&search.id), value)
            .map_err(|e| AppError::Database(format!("Failed to save responses: {}", e)))?;
        Ok(())
    }

    fn scan(&self, filter: &SearchFilter) -> Result<Vec<Search>> {
        let mut searches = Vec::new();

        for result in self.searches_tree.iter() {
            let (_, value) = result.map_err(|e| {
                AppError::Database(format!("Failed to iterate searches: {}", e))
            })?;

            let search: Search = Self::decode(&value, "search")?;
            if filter.matches(&search) {
                searches.push(search);
            }
        }

        Ok(searches)
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await.map_err(|e| {
            AppError::Database(format!("Failed to flush database: {}", e))
        })?;
        Ok(())
    }
}

#[async_trait]
impl SearchStore for SledStore {
    async fn add(&self, search: &Search) -> Result<()> {
        let value = Self::encode(&search.without_responses(), "search")?;

        self.searches_tree
            .compare_and_swap(Self::key(&search.id), None as Option<&[u8]>, Some(value))
            .map_err(|e| AppError::Database(format!("Failed to save search: {}", e)))?
            .map_err(|_| AppError::Conflict(format!("Search {} already exists", search.id)))?;

        self.store_responses(search)?;
        self.flush().await?;

        tracing::debug!(search_id = %search.id, "Search saved to Sled");
        Ok(())
    }

    async fn update(&self, search: &Search) -> Result<()> {
        let key = Self::key(&search.id);

        if !self.searches_tree.contains_key(key).map_err(|e| {
            AppError::Database(format!("Failed to check search existence: {}", e))
        })? {
            return Err(AppError::NotFound(format!("Search {} not found", search.id)));
        }

        let value = Self::encode(&search.without_responses(), "search")?;
        self.searches_tree
            .insert(key, value)
            .map_err(|e| AppError::Database(format!("Failed to update search: {}", e)))?;

        self.store_responses(search)?;
        self.flush().await?;

        tracing::debug!(search_id = %search.id, state = ?search.state, "Search updated in Sled");
        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> Result<Option<Search>> {
        let key = Self::key(id);

        let removed = self
            .searches_tree
            .remove(key)
            .map_err(|e| AppError::Database(format!("Failed to delete search: {}", e)))?;

        self.responses_tree
            .remove(key)
            .map_err(|e| AppError::Database(format!("Failed to delete responses: {}", e)))?;

        let removed = match removed {
            Some(bytes) => Some(Self::decode::<Search>(&bytes, "search")?),
            None => None,
        };

        if removed.is_some() {
            self.flush().await?;
            tracing::debug!(search_id = %id, "Search deleted from Sled");
        }

        Ok(removed)
    }

    async fn get(&self, id: &Uuid, include_responses: bool) -> Result<Option<Search>> {
        let bytes = match self.searches_tree.get(Self::key(id)) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(None),
            Err(e) => {
                return Err(AppError::Database(format!("Failed to get search: {}", e)));
            }
        };

        let mut search: Search = Self::decode(&bytes, "search")?;
        if include_responses {
            search.responses = self.load_responses(id)?;
        }

        Ok(Some(search))
    }

    async fn list(&self, filter: &SearchFilter) -> Result<Vec<Search>> {
        let mut searches = self.scan(filter)?;

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
        let exists = self.searches_tree.contains_key(Self::key(id)).map_err(|e| {
            AppError::Database(format!("Failed to check search existence: {}", e))
        })?;

        if !exists {
            return Ok(None);
        }

        Ok(Some(
            self.load_responses(id)?
                .into_iter()
                .skip(skip)
                .take(take)
                .collect(),
        ))
    }

    async fn count(&self, filter: &SearchFilter) -> Result<u64> {
        Ok(self.scan(filter)?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchStates;
    use chrono::Utc;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn create_test_store() -> (SledStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SledStore::new(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    fn finished_search(responses: usize) -> Search {
        let mut file_types = BTreeSet::new();
        file_types.insert("audio".to_string());

        let mut search = Search::new(Uuid::new_v4(), "artist .mp3".to_string(), 42, file_types);
        search.responses = (0..responses)
            .map(|i| Response {
                username: format!("user{}", i),
                user_group: Some("default".to_string()),
                ..Default::default()
            })
            .collect();
        search.set_counts(responses, responses * 2, 0);
        search.complete(SearchStates::TIMED_OUT, Utc::now());
        search
    }

    #[tokio::test]
    async fn test_add_and_get_search() {
        let (store, _dir) = create_test_store();
        let search = finished_search(3);

        store.add(&search).await.unwrap();

        let light = store.get(&search.id, false).await.unwrap().unwrap();
        assert!(light.responses.is_empty());
        assert_eq!(light.state, SearchStates::COMPLETED | SearchStates::TIMED_OUT);
        assert!(light.file_types.contains("audio"));

        let full = store.get(&search.id, true).await.unwrap().unwrap();
        assert_eq!(full.responses.len(), 3);
    }

    #[tokio::test]
    async fn test_add_duplicate_conflicts() {
        let (store, _dir) = create_test_store();
        let search = finished_search(0);

        store.add(&search).await.unwrap();
        assert!(matches!(
            store.add(&search).await.unwrap_err(),
            AppError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_update_without_responses_keeps_them() {
        let (store, _dir) = create_test_store();
        let search = finished_search(2);
        store.add(&search).await.unwrap();

        store.update(&search.without_responses()).await.unwrap();

        let page = store.responses(&search.id, 0, 10).await.unwrap().unwrap();
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_removes_responses() {
        let (store, _dir) = create_test_store();
        let search = finished_search(2);
        store.add(&search).await.unwrap();

        let removed = store.delete(&search.id).await.unwrap().unwrap();
        assert_eq!(removed.id, search.id);
        assert!(store.responses(&search.id, 0, 10).await.unwrap().is_none());
        assert!(store.delete(&search.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persistence_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let search = finished_search(1);

        {
            let store = SledStore::new(temp_dir.path()).unwrap();
            store.add(&search).await.unwrap();
        }

        let store = SledStore::new(temp_dir.path()).unwrap();
        let reopened = store.get(&search.id, true).await.unwrap().unwrap();
        assert_eq!(reopened.responses[0].username, "user0");
        assert_eq!(reopened.ended_at, search.ended_at);
    }

    #[tokio::test]
    async fn test_count_with_filter() {
        let (store, _dir) = create_test_store();
        store.add(&finished_search(0)).await.unwrap();
        store
            .add(&Search::new(Uuid::new_v4(), "live".to_string(), 1, BTreeSet::new()))
            .await
            .unwrap();

        let active = SearchFilter {
            active_only: true,
            ..Default::default()
        };
        assert_eq!(store.count(&active).await.unwrap(), 1);
        assert_eq!(store.count(&SearchFilter::default()).await.unwrap(), 2);
    }
}
