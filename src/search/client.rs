//! Peer network collaborator contract
//!
//! The network performs the actual search and reports progress through the
//! handlers passed at dispatch. Dispatch itself is synchronous: it either
//! rejects the search outright or hands back a future that resolves when the
//! network considers the search over.

use futures::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::{File, Response, SearchOptions, SearchQuery, SearchScope, SearchStates};

/// A peer's answer as delivered by the network
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerResponse {
    pub username: String,
    pub token: u32,
    pub upload_speed: u32,
    pub queue_length: u64,
    pub has_free_upload_slot: bool,
    pub files: Vec<File>,
    pub locked_files: Vec<File>,
}

impl PeerResponse {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn locked_file_count(&self) -> usize {
        self.locked_files.len()
    }

    /// Convert into the persisted form, tagging the resolved user group
    pub fn into_response(self, user_group: String) -> Response {
        Response {
            file_count: self.file_count(),
            locked_file_count: self.locked_file_count(),
            username: self.username,
            user_group: Some(user_group),
            token: self.token,
            upload_speed: self.upload_speed,
            queue_length: self.queue_length,
            has_free_upload_slot: self.has_free_upload_slot,
            files: self.files,
            locked_files: self.locked_files,
        }
    }
}

/// The network's live view of a search
#[derive(Debug, Clone, PartialEq)]
pub struct PeerSearch {
    pub token: u32,
    pub state: SearchStates,
    pub response_count: usize,
    pub file_count: usize,
    pub locked_file_count: usize,
}

impl PeerSearch {
    pub fn new(token: u32) -> Self {
        Self {
            token,
            state: SearchStates::REQUESTED,
            response_count: 0,
            file_count: 0,
            locked_file_count: 0,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerSearchError {
    /// The network refused the search before it started
    #[error("Search rejected: {0}")]
    Rejected(String),

    #[error("Search cancelled")]
    Cancelled,

    #[error("Search faulted: {0}")]
    Faulted(String),
}

pub type ResponseHandler = Arc<dyn Fn(PeerResponse) + Send + Sync>;
pub type StateChangedHandler = Arc<dyn Fn(SearchStates, PeerSearch) + Send + Sync>;
pub type ResponseReceivedHandler = Arc<dyn Fn(PeerSearch, PeerResponse) + Send + Sync>;

/// Callbacks invoked by the network, possibly concurrently, until the search
/// future resolves
#[derive(Clone)]
pub struct SearchHandlers {
    /// Every accepted response, in arrival order
    pub on_response: ResponseHandler,
    /// Previous state and the live search after the change
    pub on_state_changed: StateChangedHandler,
    /// Live search after the response was counted, and the response itself
    pub on_response_received: ResponseReceivedHandler,
}

impl SearchHandlers {
    pub fn noop() -> Self {
        Self {
            on_response: Arc::new(|_| {}),
            on_state_changed: Arc::new(|_, _| {}),
            on_response_received: Arc::new(|_, _| {}),
        }
    }
}

/// Resolves with the network's final view of the search
pub type PeerSearchFuture = BoxFuture<'static, Result<PeerSearch, PeerSearchError>>;

pub trait PeerSearchClient: Send + Sync {
    /// A fresh correlation token
    fn next_token(&self) -> u32;

    /// Dispatch a search.
    ///
    /// An `Err` here means nothing was started. The returned future resolves
    /// with `PeerSearchError::Cancelled` once `cancel` is observed.
    fn search(
        &self,
        query: &SearchQuery,
        scope: &SearchScope,
        token: u32,
        options: &SearchOptions,
        handlers: SearchHandlers,
        cancel: CancellationToken,
    ) -> Result<PeerSearchFuture, PeerSearchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_response_counts_files() {
        let peer = PeerResponse {
            username: "alice".to_string(),
            token: 3,
            files: vec![File::new("a.mp3", 1), File::new("b.mp3", 2)],
            locked_files: vec![File::new("c.flac", 3)],
            ..Default::default()
        };

        let response = peer.into_response("privileged".to_string());
        assert_eq!(response.file_count, 2);
        assert_eq!(response.locked_file_count, 1);
        assert_eq!(response.user_group.as_deref(), Some("privileged"));
        assert_eq!(response.token, 3);
    }
}
