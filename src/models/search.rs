use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::Response;

bitflags::bitflags! {
    /// Lifecycle phase of a search plus the reasons it ended.
    ///
    /// Exactly one of `REQUESTED`, `IN_PROGRESS` or `COMPLETED` is set at any
    /// time. The remaining flags only ever accompany `COMPLETED`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SearchStates: u16 {
        /// Assigned but not yet dispatched.
        const REQUESTED = 1 << 0;
        /// Dispatched; responses may arrive.
        const IN_PROGRESS = 1 << 1;
        /// Terminal.
        const COMPLETED = 1 << 2;
        /// The network-side search timeout elapsed.
        const TIMED_OUT = 1 << 3;
        /// The response limit was reached.
        const RESPONSE_LIMIT_REACHED = 1 << 4;
        /// The file limit was reached.
        const FILE_LIMIT_REACHED = 1 << 5;
        /// Dispatch or completion faulted.
        const ERRORED = 1 << 6;
        /// Cancellation was requested and honored.
        const CANCELLED = 1 << 7;
    }
}

impl SearchStates {
    /// Flags that may only be carried alongside `COMPLETED`.
    pub const TERMINAL_REASONS: Self = Self::TIMED_OUT
        .union(Self::RESPONSE_LIMIT_REACHED)
        .union(Self::FILE_LIMIT_REACHED)
        .union(Self::ERRORED)
        .union(Self::CANCELLED);

    pub fn is_completed(&self) -> bool {
        self.contains(Self::COMPLETED)
    }
}

/// The authoritative record of one search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Search {
    /// Caller-assigned identifier, stable for the lifetime of the record
    pub id: Uuid,

    /// Raw query text
    pub search_text: String,

    /// Network correlation token
    pub token: u32,

    pub state: SearchStates,

    pub started_at: DateTime<Utc>,

    /// Set exactly when `state` contains `COMPLETED`
    pub ended_at: Option<DateTime<Utc>>,

    pub response_count: usize,

    pub file_count: usize,

    pub locked_file_count: usize,

    /// Coarse category tags derived from the query text
    pub file_types: BTreeSet<String>,

    /// Populated once, at finalization
    #[serde(default)]
    pub responses: Vec<Response>,
}

impl Search {
    /// Create a search in the `REQUESTED` state
    pub fn new(id: Uuid, search_text: String, token: u32, file_types: BTreeSet<String>) -> Self {
        Self {
            id,
            search_text,
            token,
            state: SearchStates::REQUESTED,
            started_at: Utc::now(),
            ended_at: None,
            response_count: 0,
            file_count: 0,
            locked_file_count: 0,
            file_types,
            responses: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_completed()
    }

    /// Apply a live state report from the network.
    ///
    /// Only the `REQUESTED -> IN_PROGRESS` step is taken here; completion and
    /// its reasons are applied by [`Search::complete`]. Returns whether the
    /// state changed.
    pub fn advance(&mut self, reported: SearchStates) -> bool {
        if self.state.is_completed() || self.state.contains(SearchStates::IN_PROGRESS) {
            return false;
        }

        if reported.intersects(SearchStates::IN_PROGRESS | SearchStates::COMPLETED) {
            self.state = SearchStates::IN_PROGRESS;
            return true;
        }

        false
    }

    /// Move to the terminal state, keeping only terminal reason flags from
    /// `reasons`. A completed search is never modified again.
    pub fn complete(&mut self, reasons: SearchStates, ended_at: DateTime<Utc>) -> bool {
        if self.state.is_completed() {
            return false;
        }

        self.state = SearchStates::COMPLETED | (reasons & SearchStates::TERMINAL_REASONS);
        self.ended_at = Some(ended_at);
        true
    }

    /// Replace the live counters
    pub fn set_counts(&mut self, response_count: usize, file_count: usize, locked_file_count: usize) {
        self.response_count = response_count;
        self.file_count = file_count;
        self.locked_file_count = locked_file_count;
    }

    /// Copy of this search with the bulk response collection left out
    pub fn without_responses(&self) -> Self {
        Self {
            id: self.id,
            search_text: self.search_text.clone(),
            token: self.token,
            state: self.state,
            started_at: self.started_at,
            ended_at: self.ended_at,
            response_count: self.response_count,
            file_count: self.file_count,
            locked_file_count: self.locked_file_count,
            file_types: self.file_types.clone(),
            responses: Vec::new(),
        }
    }

    /// Duration between start and end, if ended
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|ended| ended - self.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search() -> Search {
        Search::new(Uuid::new_v4(), "artist .mp3".to_string(), 7, BTreeSet::new())
    }

    #[test]
    fn test_new_search_is_requested() {
        let search = search();
        assert_eq!(search.state, SearchStates::REQUESTED);
        assert!(search.ended_at.is_none());
        assert!(search.is_active());
    }

    #[test]
    fn test_advance_only_moves_forward_once() {
        let mut search = search();

        assert!(!search.advance(SearchStates::REQUESTED));
        assert!(search.advance(SearchStates::IN_PROGRESS));
        assert_eq!(search.state, SearchStates::IN_PROGRESS);
        assert!(!search.advance(SearchStates::IN_PROGRESS));
    }

    #[test]
    fn test_reported_completion_does_not_complete() {
        let mut search = search();

        search.advance(SearchStates::COMPLETED | SearchStates::TIMED_OUT);
        assert_eq!(search.state, SearchStates::IN_PROGRESS);
        assert!(search.ended_at.is_none());
    }

    #[test]
    fn test_complete_sets_ended_at_and_reasons() {
        let mut search = search();
        search.advance(SearchStates::IN_PROGRESS);

        let now = Utc::now();
        assert!(search.complete(SearchStates::IN_PROGRESS | SearchStates::CANCELLED, now));
        assert_eq!(search.state, SearchStates::COMPLETED | SearchStates::CANCELLED);
        assert_eq!(search.ended_at, Some(now));
    }

    #[test]
    fn test_completed_is_final() {
        let mut search = search();
        search.complete(SearchStates::ERRORED, Utc::now());
        let ended_at = search.ended_at;

        assert!(!search.complete(SearchStates::CANCELLED, Utc::now()));
        assert!(!search.advance(SearchStates::IN_PROGRESS));
        assert_eq!(search.state, SearchStates::COMPLETED | SearchStates::ERRORED);
        assert_eq!(search.ended_at, ended_at);
    }

    #[test]
    fn test_without_responses_leaves_original_untouched() {
        let mut search = search();
        search.responses.push(Response {
            username: "a".to_string(),
            ..Default::default()
        });

        let light = search.without_responses();
        assert!(light.responses.is_empty());
        assert_eq!(search.responses.len(), 1);
        assert_eq!(light.id, search.id);
    }
}
