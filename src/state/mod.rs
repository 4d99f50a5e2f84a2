pub mod cache;
pub mod factory;
pub mod repository;
pub mod sled_store;
pub mod store;

pub use cache::*;
pub use factory::{create_in_memory_store, create_store};
pub use repository::SearchRepository;
pub use sled_store::SledStore;
pub use store::*;

use crate::error::Result;
use crate::models::{Response, Search, SearchStates};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Trait for search storage operations
#[async_trait]
pub trait SearchStore: Send + Sync {
    /// Persist a new search. Fails with `Conflict` if the id is taken.
    async fn add(&self, search: &Search) -> Result<()>;

    /// Replace a stored search. Responses are only written when present.
    async fn update(&self, search: &Search) -> Result<()>;

    /// Remove a search and its responses, returning the removed record
    async fn delete(&self, id: &Uuid) -> Result<Option<Search>>;

    /// Get a search by id
    async fn get(&self, id: &Uuid, include_responses: bool) -> Result<Option<Search>>;

    /// List searches matching `filter`, newest first, without responses
    async fn list(&self, filter: &SearchFilter) -> Result<Vec<Search>>;

    /// Page through the responses of a search; `None` if the search is unknown
    async fn responses(&self, id: &Uuid, skip: usize, take: usize)
        -> Result<Option<Vec<Response>>>;

    /// Count searches matching `filter`
    async fn count(&self, filter: &SearchFilter) -> Result<u64>;
}

/// Predicate over stored searches. Every set field must match.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub id: Option<Uuid>,
    /// Matches when the search state shares any flag with this mask
    pub states: Option<SearchStates>,
    /// Case-insensitive substring of the query text
    pub search_text: Option<String>,
    /// Only searches that ended strictly before this instant
    pub ended_before: Option<DateTime<Utc>>,
    pub active_only: bool,
}

impl SearchFilter {
    pub fn by_id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn ended_before(cutoff: DateTime<Utc>) -> Self {
        Self {
            ended_before: Some(cutoff),
            ..Default::default()
        }
    }

    /// True when no predicate is set
    pub fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.states.is_none()
            && self.search_text.is_none()
            && self.ended_before.is_none()
            && !self.active_only
    }

    /// True when the filter selects by id and nothing else
    pub fn is_id_only(&self) -> bool {
        self.id.is_some()
            && Self {
                id: None,
                ..self.clone()
            }
            .is_empty()
    }

    pub fn matches(&self, search: &Search) -> bool {
        let id_match = self.id.map_or(true, |id| search.id == id);

        let state_match = self.states.map_or(true, |mask| search.state.intersects(mask));

        let text_match = self.search_text.as_ref().map_or(true, |text| {
            search
                .search_text
                .to_lowercase()
                .contains(&text.to_lowercase())
        });

        // Searches without an end time never match an age predicate
        let ended_match = self.ended_before.map_or(true, |cutoff| {
            search.ended_at.map_or(false, |ended| ended < cutoff)
        });

        let active_match = !self.active_only || search.is_active();

        id_match && state_match && text_match && ended_match && active_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn search(text: &str) -> Search {
        Search::new(Uuid::new_v4(), text.to_string(), 1, BTreeSet::new())
    }

    #[test]
    fn test_empty_filter() {
        assert!(SearchFilter::default().is_empty());
        assert!(!SearchFilter::by_id(Uuid::new_v4()).is_empty());
        assert!(SearchFilter::by_id(Uuid::new_v4()).is_id_only());
        assert!(!SearchFilter {
            id: Some(Uuid::new_v4()),
            active_only: true,
            ..Default::default()
        }
        .is_id_only());
    }

    #[test]
    fn test_ended_before_skips_in_flight() {
        let cutoff = Utc::now() + chrono::Duration::minutes(1);
        let active = search("a");
        let mut ended = search("b");
        ended.complete(SearchStates::empty(), Utc::now());

        let filter = SearchFilter::ended_before(cutoff);
        assert!(!filter.matches(&active));
        assert!(filter.matches(&ended));
    }

    #[test]
    fn test_text_and_state_match() {
        let mut s = search("Some Artist .flac");
        s.complete(SearchStates::CANCELLED, Utc::now());

        let filter = SearchFilter {
            search_text: Some("artist".to_string()),
            states: Some(SearchStates::CANCELLED | SearchStates::ERRORED),
            ..Default::default()
        };
        assert!(filter.matches(&s));

        let filter = SearchFilter {
            states: Some(SearchStates::ERRORED),
            ..Default::default()
        };
        assert!(!filter.matches(&s));
    }
}
