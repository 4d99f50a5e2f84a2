//! Simulated peer network
//!
//! Produces synthetic peer responses on a timer. Honors cancellation, the
//! search timeout and the response/file limits the way the real network
//! does, so the service can run end to end without a wire protocol.

use futures::FutureExt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::client::{
    PeerResponse, PeerSearch, PeerSearchClient, PeerSearchError, PeerSearchFuture, SearchHandlers,
};
use crate::config::SimulationConfig;
use crate::models::{File, SearchOptions, SearchQuery, SearchScope, SearchStates};

/// Scripted failure injected into every search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SimulatedFailure {
    #[default]
    None,
    /// Refuse at dispatch
    Reject(String),
    /// Resolve faulted after this many responses
    FaultAfter(usize),
    /// Panic after this many responses
    PanicAfter(usize),
    /// Never finish on its own; only cancellation ends the search
    Hang,
}

pub struct SimulatedPeerClient {
    config: SimulationConfig,
    peers: Option<Vec<String>>,
    failure: SimulatedFailure,
    tokens: AtomicU32,
}

impl SimulatedPeerClient {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            peers: None,
            failure: SimulatedFailure::None,
            tokens: AtomicU32::new(1),
        }
    }

    /// Answer every network search with exactly these usernames, in order
    pub fn with_peers<I, S>(mut self, peers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.peers = Some(peers.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_failure(mut self, failure: SimulatedFailure) -> Self {
        self.failure = failure;
        self
    }

    fn peers_for(&self, scope: &SearchScope) -> Vec<String> {
        match scope {
            SearchScope::User { usernames } => usernames.clone(),
            SearchScope::Room { name } => (0..self.config.peer_count)
                .map(|n| format!("{name}-member-{n}"))
                .collect(),
            SearchScope::Network => match &self.peers {
                Some(peers) => peers.clone(),
                None => (0..self.config.peer_count)
                    .map(|n| format!("peer-{n}"))
                    .collect(),
            },
        }
    }

    fn respond(&self, index: usize, username: &str, query: &str, token: u32) -> PeerResponse {
        let files: Vec<File> = (0..self.config.files_per_response)
            .map(|n| {
                File::new(
                    format!("@@{username}\\shared\\{query}\\{:02} - track.mp3", n + 1),
                    4_000_000 + (n as u64) * 1_000,
                )
            })
            .collect();

        let locked = self.config.locked_every > 0 && (index + 1) % self.config.locked_every == 0;
        let (files, locked_files) = if locked {
            let locked_files = files
                .into_iter()
                .map(|mut f| {
                    f.is_locked = true;
                    f
                })
                .collect();
            (Vec::new(), locked_files)
        } else {
            (files, Vec::new())
        };

        PeerResponse {
            username: username.to_string(),
            token,
            upload_speed: 1_000 * (index as u32 + 1),
            queue_length: (index % 5) as u64,
            has_free_upload_slot: index % 2 == 0,
            files,
            locked_files,
        }
    }
}

fn accepted(response: &PeerResponse, options: &SearchOptions) -> bool {
    !options.filter_responses
        || (response.file_count() + response.locked_file_count()
            >= options.minimum_response_file_count
            && response.upload_speed >= options.minimum_peer_upload_speed
            && response.queue_length <= options.maximum_peer_queue_length)
}

impl PeerSearchClient for SimulatedPeerClient {
    fn next_token(&self) -> u32 {
        self.tokens.fetch_add(1, Ordering::Relaxed)
    }

    fn search(
        &self,
        query: &SearchQuery,
        scope: &SearchScope,
        token: u32,
        options: &SearchOptions,
        handlers: SearchHandlers,
        cancel: CancellationToken,
    ) -> Result<PeerSearchFuture, PeerSearchError> {
        if let SimulatedFailure::Reject(reason) = &self.failure {
            return Err(PeerSearchError::Rejected(reason.clone()));
        }

        let responses: Vec<PeerResponse> = self
            .peers_for(scope)
            .iter()
            .enumerate()
            .map(|(index, username)| self.respond(index, username, &query.search_text, token))
            .collect();

        let failure = self.failure.clone();
        let options = options.clone();
        let interval = Duration::from_millis(self.config.response_interval_ms);

        debug!(token, peers = responses.len(), "Simulated search dispatched");

        Ok(async move {
            let mut peer = PeerSearch::new(token);
            let deadline = tokio::time::sleep(options.search_timeout());
            tokio::pin!(deadline);

            peer.state = SearchStates::IN_PROGRESS;
            (handlers.on_state_changed)(SearchStates::REQUESTED, peer.clone());

            let mut reason = SearchStates::empty();
            let mut delivered = 0;

            for response in responses {
                match &failure {
                    SimulatedFailure::FaultAfter(n) if delivered == *n => {
                        return Err(PeerSearchError::Faulted(format!(
                            "connection lost after {delivered} responses"
                        )));
                    }
                    SimulatedFailure::PanicAfter(n) if delivered == *n => {
                        panic!("simulated peer panicked after {delivered} responses");
                    }
                    _ => {}
                }

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(PeerSearchError::Cancelled),
                    _ = &mut deadline, if failure != SimulatedFailure::Hang => {
                        reason = SearchStates::TIMED_OUT;
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }

                if !accepted(&response, &options) {
                    continue;
                }

                delivered += 1;
                peer.response_count += 1;
                peer.file_count += response.file_count();
                peer.locked_file_count += response.locked_file_count();

                (handlers.on_response)(response.clone());
                (handlers.on_response_received)(peer.clone(), response);

                if peer.response_count >= options.response_limit {
                    reason = SearchStates::RESPONSE_LIMIT_REACHED;
                    break;
                }
                if peer.file_count >= options.file_limit {
                    reason = SearchStates::FILE_LIMIT_REACHED;
                    break;
                }
            }

            if reason.is_empty() {
                match &failure {
                    SimulatedFailure::FaultAfter(n) if delivered == *n => {
                        return Err(PeerSearchError::Faulted(format!(
                            "connection lost after {delivered} responses"
                        )));
                    }
                    SimulatedFailure::PanicAfter(n) if delivered == *n => {
                        panic!("simulated peer panicked after {delivered} responses");
                    }
                    SimulatedFailure::Hang => {
                        cancel.cancelled().await;
                        return Err(PeerSearchError::Cancelled);
                    }
                    _ => {}
                }

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(PeerSearchError::Cancelled),
                    _ = &mut deadline => reason = SearchStates::TIMED_OUT,
                }
            }

            let previous = peer.state;
            peer.state = SearchStates::COMPLETED | reason;
            (handlers.on_state_changed)(previous, peer.clone());

            Ok(peer)
        }
        .boxed())
    }
}
