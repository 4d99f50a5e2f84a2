//! Search lifecycle orchestration
//!
//! Each started search gets one background task that owns every write for
//! that search: it persists and broadcasts the live updates the network
//! callbacks publish, awaits the network future, and finalizes the record
//! exactly once however the future resolves.

use chrono::Utc;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strum::IntoStaticStr;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::client::{
    PeerResponse, PeerSearch, PeerSearchClient, PeerSearchError, PeerSearchFuture, SearchHandlers,
};
use super::file_types::extract_file_types;
use super::notify::SearchBroadcaster;
use super::registry::CancellationRegistry;
use super::users::UserGroupResolver;
use crate::error::{AppError, Result};
use crate::metrics::{
    SEARCHES_ACTIVE, SEARCHES_FINALIZED_TOTAL, SEARCHES_PRUNED_TOTAL, SEARCHES_STARTED_TOTAL,
    SEARCH_DURATION_SECONDS, SEARCH_LIVE_UPDATES_TOTAL, SEARCH_RESPONSES_TOTAL,
};
use crate::models::{Response, Search, SearchOptions, SearchQuery, SearchScope, SearchStates};
use crate::state::{SearchFilter, SearchRepository};
use crate::throttle::InvokeLimiter;

/// How a search's network future resolved
#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SearchOutcome {
    /// Ended normally with the network's final view
    Completed(PeerSearch),
    Faulted(String),
    Cancelled,
}

impl SearchOutcome {
    /// Classify a joined network future.
    ///
    /// Any failure observed after cancellation was requested counts as a
    /// cancellation. A panic inside the future is a fault.
    pub fn classify(
        joined: std::result::Result<std::result::Result<PeerSearch, PeerSearchError>, JoinError>,
        cancel_requested: bool,
    ) -> Self {
        match joined {
            Ok(Ok(peer)) => Self::Completed(peer),
            Ok(Err(PeerSearchError::Cancelled)) => Self::Cancelled,
            Ok(Err(_)) if cancel_requested => Self::Cancelled,
            Ok(Err(e)) => Self::Faulted(e.to_string()),
            Err(e) if e.is_panic() => Self::Faulted(format!("search task panicked: {e}")),
            Err(_) if cancel_requested => Self::Cancelled,
            Err(e) => Self::Faulted(e.to_string()),
        }
    }

    /// Terminal reason flags this outcome contributes
    pub fn reasons(&self) -> SearchStates {
        match self {
            Self::Completed(peer) => peer.state & SearchStates::TERMINAL_REASONS,
            Self::Faulted(_) => SearchStates::ERRORED,
            Self::Cancelled => SearchStates::CANCELLED,
        }
    }

    pub fn label(&self) -> &'static str {
        self.into()
    }
}

/// Collaborators the service is built from
pub struct SearchServiceDeps {
    pub client: Arc<dyn PeerSearchClient>,
    pub repository: SearchRepository,
    pub broadcaster: Arc<dyn SearchBroadcaster>,
    pub users: Arc<dyn UserGroupResolver>,
}

/// Lifecycle owner for every search
pub struct SearchService {
    client: Arc<dyn PeerSearchClient>,
    repository: SearchRepository,
    broadcaster: Arc<dyn SearchBroadcaster>,
    users: Arc<dyn UserGroupResolver>,
    registry: CancellationRegistry,
    /// Finalizer signals keyed by id, tagged with the owning token
    completions: DashMap<Uuid, (u32, watch::Receiver<bool>)>,
    tracker: TaskTracker,
    response_throttle: Duration,
    accepting: AtomicBool,
}

/// A search's in-memory state while it is in flight
struct LiveSearch {
    id: Uuid,
    search: Arc<Mutex<Search>>,
    responses: Arc<Mutex<Vec<PeerResponse>>>,
    limiter: Arc<InvokeLimiter>,
}

/// Disposes the invoke limiter on every exit path out of finalize
struct LimiterRelease(Arc<InvokeLimiter>);

impl Drop for LimiterRelease {
    fn drop(&mut self) {
        self.0.dispose();
    }
}

/// What a registered search holds in the service. Dropping it releases
/// whatever is still held, on every path out of start or the driver task.
struct ActiveEntry {
    service: Arc<SearchService>,
    id: Uuid,
    token: u32,
    registered: bool,
    /// `SEARCHES_ACTIVE` was incremented for this search
    counted: bool,
    done: Option<watch::Sender<bool>>,
}

impl ActiveEntry {
    fn new(service: Arc<SearchService>, id: Uuid, token: u32) -> Self {
        Self {
            service,
            id,
            token,
            registered: true,
            counted: false,
            done: None,
        }
    }

    /// Release the cancellation entry. Idempotent.
    fn unregister(&mut self) {
        if std::mem::take(&mut self.registered) {
            self.service.registry.remove(&self.id);
        }
    }
}

impl Drop for ActiveEntry {
    fn drop(&mut self) {
        self.unregister();

        if self.counted {
            SEARCHES_ACTIVE.dec();
        }

        let token = self.token;
        self.service
            .completions
            .remove_if(&self.id, |_, (owner, _)| *owner == token);

        if let Some(done) = self.done.take() {
            let _ = done.send(true);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl SearchService {
    pub fn new(deps: SearchServiceDeps, response_throttle: Duration) -> Self {
        Self {
            client: deps.client,
            repository: deps.repository,
            broadcaster: deps.broadcaster,
            users: deps.users,
            registry: CancellationRegistry::new(),
            completions: DashMap::new(),
            tracker: TaskTracker::new(),
            response_throttle,
            accepting: AtomicBool::new(true),
        }
    }

    pub fn repository(&self) -> &SearchRepository {
        &self.repository
    }

    /// Number of searches currently registered for cancellation
    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_active(&self, id: &Uuid) -> bool {
        self.registry.contains(id)
    }

    /// Start a search and return its in-flight snapshot.
    ///
    /// Returns once the search is dispatched; completion is observed by a
    /// background task. Only validation, id conflicts, persistence of the
    /// initial record and dispatch failures surface here. Everything after
    /// registration runs on a tracked task, so a caller that stops waiting
    /// never strands the search half-started.
    pub async fn start(
        self: &Arc<Self>,
        id: Uuid,
        query: SearchQuery,
        scope: SearchScope,
        options: SearchOptions,
    ) -> Result<Search> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(AppError::Conflict(
                "Search service is shutting down".to_string(),
            ));
        }

        query.validate()?;
        options.validate()?;

        let token = self.client.next_token();
        let cancel = CancellationToken::new();

        if !self.registry.register(id, cancel.clone()) {
            return Err(AppError::Conflict(format!(
                "Search {} is already in progress",
                id
            )));
        }

        let entry = ActiveEntry::new(Arc::clone(self), id, token);
        let this = Arc::clone(self);
        let launch = self
            .tracker
            .spawn(async move { this.launch(entry, query, scope, options, cancel).await });

        match launch.await {
            Ok(result) => result,
            Err(e) => {
                error!(search_id = %id, error = %e, "Search launch panicked");
                self.fail_stored(&id).await;
                Err(AppError::Internal(format!("Search {} could not be started", id)))
            }
        }
    }

    /// Persist, announce and dispatch a registered search, then hand it to
    /// its driver task
    async fn launch(
        self: Arc<Self>,
        mut entry: ActiveEntry,
        query: SearchQuery,
        scope: SearchScope,
        options: SearchOptions,
        cancel: CancellationToken,
    ) -> Result<Search> {
        let id = entry.id;
        let token = entry.token;
        let search = Search::new(
            id,
            query.search_text.clone(),
            token,
            extract_file_types(&query.search_text),
        );

        self.repository.add(&search).await?;
        self.notify_create(&search).await;

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let live = LiveSearch {
            id,
            search: Arc::new(Mutex::new(search)),
            responses: Arc::new(Mutex::new(Vec::new())),
            limiter: Arc::new(InvokeLimiter::new(self.response_throttle)),
        };
        let handlers = live.handlers(updates_tx);

        let future = match self
            .client
            .search(&query, &scope, token, &options, handlers, cancel.clone())
        {
            Ok(future) => future,
            Err(e) => return Err(self.fail_dispatch(entry, live, e).await),
        };

        SEARCHES_STARTED_TOTAL.inc();
        SEARCHES_ACTIVE.inc();
        entry.counted = true;
        info!(
            search_id = %id,
            query = %query.search_text,
            token,
            "Search started"
        );

        let snapshot = live.search.lock().clone();

        let (done_tx, done_rx) = watch::channel(false);
        self.completions.insert(id, (token, done_rx));
        entry.done = Some(done_tx);

        let this = Arc::clone(&self);
        self.tracker.spawn(async move {
            let outcome = this.drive(future, updates_rx, &cancel).await;
            entry.unregister();

            let record = live.search.clone();
            if let Err(panic) = AssertUnwindSafe(this.finalize(live, outcome))
                .catch_unwind()
                .await
            {
                error!(
                    search_id = %id,
                    panic = panic_message(&*panic),
                    "Search finalize panicked"
                );
                let failed = record.lock().clone();
                this.persist_fault(failed).await;
            }
        });

        Ok(snapshot)
    }

    /// Best-effort terminal write for a search whose own path panicked
    async fn persist_fault(&self, mut search: Search) {
        search.complete(SearchStates::ERRORED, Utc::now());
        SEARCHES_FINALIZED_TOTAL.with_label_values(&["faulted"]).inc();

        if let Err(e) = self.repository.update(&search).await {
            error!(search_id = %search.id, error = %e, "Failed to persist faulted search");
        }
    }

    async fn fail_stored(&self, id: &Uuid) {
        match self.repository.find(&SearchFilter::by_id(*id), false).await {
            Ok(Some(search)) => self.persist_fault(search).await,
            Ok(None) => {}
            Err(e) => error!(search_id = %id, error = %e, "Failed to load faulted search"),
        }
    }

    /// Persist, broadcast and clean up a search the network refused
    async fn fail_dispatch(
        &self,
        mut entry: ActiveEntry,
        live: LiveSearch,
        cause: PeerSearchError,
    ) -> AppError {
        let _release = LimiterRelease(live.limiter.clone());
        error!(search_id = %live.id, error = %cause, "Failed to dispatch search");

        let failed = {
            let mut search = live.search.lock();
            search.complete(SearchStates::ERRORED, Utc::now());
            search.clone()
        };

        if let Err(e) = self.repository.update(&failed).await {
            error!(search_id = %live.id, error = %e, "Failed to persist rejected search");
        }
        self.notify_update(&failed).await;
        entry.unregister();

        SEARCHES_FINALIZED_TOTAL.with_label_values(&["rejected"]).inc();
        AppError::Dispatch(cause.to_string())
    }

    /// Publish live updates until the network future resolves
    async fn drive(
        &self,
        future: PeerSearchFuture,
        mut updates: mpsc::UnboundedReceiver<Search>,
        cancel: &CancellationToken,
    ) -> SearchOutcome {
        let mut search = tokio::spawn(future);

        let joined = loop {
            tokio::select! {
                biased;
                Some(update) = updates.recv() => self.publish_live(update).await,
                joined = &mut search => break joined,
            }
        };

        while let Ok(update) = updates.try_recv() {
            self.publish_live(update).await;
        }

        SearchOutcome::classify(joined, cancel.is_cancelled())
    }

    async fn publish_live(&self, update: Search) {
        if let Err(e) = self.repository.update(&update).await {
            warn!(search_id = %update.id, error = %e, "Failed to persist live search update");
        }
        self.notify_update(&update).await;
    }

    /// Freeze the final state of a search. Runs exactly once per started
    /// search, after its cancellation entry has been released.
    async fn finalize(&self, live: LiveSearch, outcome: SearchOutcome) {
        let _release = LimiterRelease(live.limiter.clone());

        match &outcome {
            SearchOutcome::Completed(_) => {
                debug!(search_id = %live.id, "Search ended normally")
            }
            SearchOutcome::Faulted(cause) => {
                error!(search_id = %live.id, error = %cause, "Search faulted")
            }
            SearchOutcome::Cancelled => info!(search_id = %live.id, "Search cancelled"),
        }

        let buffered = std::mem::take(&mut *live.responses.lock());
        let responses: Vec<Response> = buffered
            .into_iter()
            .map(|r| {
                let group = self.users.group_of(&r.username);
                r.into_response(group)
            })
            .collect();

        let finished = {
            let mut search = live.search.lock();
            search.complete(outcome.reasons(), Utc::now());
            search.set_counts(
                responses.len(),
                responses.iter().map(|r| r.file_count).sum(),
                responses.iter().map(|r| r.locked_file_count).sum(),
            );
            search.responses = responses;
            search.clone()
        };

        SEARCHES_FINALIZED_TOTAL
            .with_label_values(&[outcome.label()])
            .inc();
        SEARCH_RESPONSES_TOTAL.inc_by(finished.responses.len() as u64);
        if let Some(duration) = finished.duration().and_then(|d| d.to_std().ok()) {
            SEARCH_DURATION_SECONDS.observe(duration.as_secs_f64());
        }

        if let Err(e) = self.commit(&finished).await {
            error!(search_id = %live.id, error = %e, "Failed to finalize search");
            return;
        }

        debug!(
            search_id = %live.id,
            state = ?finished.state,
            responses = finished.responses.len(),
            "Search finalized"
        );
    }

    async fn commit(&self, finished: &Search) -> Result<()> {
        self.repository.update(finished).await?;
        self.repository.cache(finished.clone()).await;
        self.notify_update(&finished.without_responses()).await;
        Ok(())
    }

    async fn notify_create(&self, search: &Search) {
        if let Err(e) = self.broadcaster.on_create(search).await {
            warn!(search_id = %search.id, error = %e, "Failed to broadcast search creation");
        }
    }

    async fn notify_update(&self, search: &Search) {
        if let Err(e) = self.broadcaster.on_update(search).await {
            warn!(search_id = %search.id, error = %e, "Failed to broadcast search update");
        }
    }

    /// Request cancellation of an in-flight search.
    ///
    /// Returns false if `id` was never started or has already finalized.
    pub fn try_cancel(&self, id: &Uuid) -> bool {
        let cancelled = self.registry.try_cancel(id);
        if cancelled {
            info!(search_id = %id, "Search cancellation requested");
        }
        cancelled
    }

    /// Wait until the background finalizer for `id` has finished
    pub async fn wait_for_completion(&self, id: &Uuid) {
        let receiver = self.completions.get(id).map(|entry| entry.value().1.clone());

        if let Some(mut receiver) = receiver {
            // A dropped sender means the finalizer task is gone as well
            let _ = receiver.wait_for(|done| *done).await;
        }
    }

    /// Number of persisted searches, finished or not
    pub async fn stored_count(&self) -> Result<u64> {
        self.repository.count(&SearchFilter::default()).await
    }

    pub async fn find(&self, filter: &SearchFilter, include_responses: bool) -> Result<Option<Search>> {
        self.repository.find(filter, include_responses).await
    }

    pub async fn get(&self, id: &Uuid, include_responses: bool) -> Result<Search> {
        self.find(&SearchFilter::by_id(*id), include_responses)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Search {} not found", id)))
    }

    pub async fn list(&self, filter: &SearchFilter) -> Result<Vec<Search>> {
        self.repository.list(filter).await
    }

    /// A page of a search's persisted responses
    pub async fn responses(&self, id: &Uuid, skip: usize, take: usize) -> Result<Vec<Response>> {
        self.repository
            .responses(id, skip, take)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Search {} not found", id)))
    }

    /// Delete a finished search. In-flight searches must be cancelled first.
    pub async fn delete(&self, id: &Uuid) -> Result<()> {
        if self.registry.contains(id) {
            return Err(AppError::Conflict(format!(
                "Search {} is still in progress",
                id
            )));
        }

        let removed = self
            .repository
            .delete(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Search {} not found", id)))?;

        if let Err(e) = self.broadcaster.on_delete(&removed).await {
            warn!(search_id = %id, error = %e, "Failed to broadcast search deletion");
        }

        info!(search_id = %id, "Search deleted");
        Ok(())
    }

    /// Delete searches that ended more than `age_minutes` ago
    pub async fn prune(&self, age_minutes: u64) -> Result<usize> {
        let pruned = self.repository.prune_older_than(age_minutes).await?;

        for search in &pruned {
            if let Err(e) = self.broadcaster.on_delete(search).await {
                warn!(search_id = %search.id, error = %e, "Failed to broadcast search deletion");
            }
        }

        SEARCHES_PRUNED_TOTAL.inc_by(pruned.len() as u64);
        info!(count = pruned.len(), age_minutes, "Pruned expired searches");
        Ok(pruned.len())
    }

    /// Stop accepting searches, cancel the ones in flight and wait for their
    /// finalizers
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::Release);

        let cancelled = self.registry.cancel_all();
        info!(cancelled, "Search service shutting down");

        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl LiveSearch {
    /// Wire the network callbacks to this search.
    ///
    /// Counters are updated on every callback; only the notification of
    /// response-driven updates passes through the invoke limiter.
    fn handlers(&self, updates: mpsc::UnboundedSender<Search>) -> SearchHandlers {
        let responses = self.responses.clone();
        let on_response = Arc::new(move |response: PeerResponse| {
            responses.lock().push(response);
        });

        let id = self.id;
        let search = self.search.clone();
        let state_updates = updates.clone();
        let on_state_changed = Arc::new(move |previous: SearchStates, peer: PeerSearch| {
            let snapshot = {
                let mut search = search.lock();
                if !search.advance(peer.state) {
                    return;
                }
                search.set_counts(peer.response_count, peer.file_count, peer.locked_file_count);
                search.clone()
            };

            debug!(
                search_id = %id,
                previous = ?previous,
                state = ?snapshot.state,
                "Search state changed"
            );
            let _ = state_updates.send(snapshot);
        });

        let search = self.search.clone();
        let limiter = self.limiter.clone();
        let on_response_received = Arc::new(move |peer: PeerSearch, _response: PeerResponse| {
            {
                let mut search = search.lock();
                if search.state.is_completed() {
                    return;
                }
                search.advance(SearchStates::IN_PROGRESS);
                search.set_counts(peer.response_count, peer.file_count, peer.locked_file_count);
            }

            let published = limiter.invoke(|| {
                let _ = updates.send(search.lock().clone());
            });

            let disposition = if published { "published" } else { "coalesced" };
            SEARCH_LIVE_UPDATES_TOTAL
                .with_label_values(&[disposition])
                .inc();
        });

        SearchHandlers {
            on_response,
            on_state_changed,
            on_response_received,
        }
    }
}
