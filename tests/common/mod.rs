//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use peer_search_manager::{
    config::{SimulationConfig, UsersConfig},
    models::{Response, Search, SearchOptions},
    search::{
        BroadcastError, SearchBroadcaster, SearchService, SearchServiceDeps, SimulatedPeerClient,
        StaticGroupResolver, UserGroupResolver,
    },
    state::{
        create_in_memory_store, InMemoryStore, SearchCache, SearchFilter, SearchRepository,
        SearchStore,
    },
    AppError,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const THROTTLE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub enum Notification {
    Created(Search),
    Updated(Search),
    Deleted(Search),
}

/// Broadcaster that remembers every notification in order
#[derive(Default)]
pub struct RecordingBroadcaster {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingBroadcaster {
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub fn created(&self) -> Vec<Search> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Created(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<Search> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Updated(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<Search> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Deleted(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl SearchBroadcaster for RecordingBroadcaster {
    async fn on_create(&self, search: &Search) -> Result<(), BroadcastError> {
        self.notifications
            .lock()
            .push(Notification::Created(search.clone()));
        Ok(())
    }

    async fn on_update(&self, search: &Search) -> Result<(), BroadcastError> {
        self.notifications
            .lock()
            .push(Notification::Updated(search.clone()));
        Ok(())
    }

    async fn on_delete(&self, search: &Search) -> Result<(), BroadcastError> {
        self.notifications
            .lock()
            .push(Notification::Deleted(search.clone()));
        Ok(())
    }
}

/// Broadcaster whose transport is always down
pub struct FailingBroadcaster;

#[async_trait]
impl SearchBroadcaster for FailingBroadcaster {
    async fn on_create(&self, _search: &Search) -> Result<(), BroadcastError> {
        Err(BroadcastError::Delivery("transport down".to_string()))
    }

    async fn on_update(&self, _search: &Search) -> Result<(), BroadcastError> {
        Err(BroadcastError::Delivery("transport down".to_string()))
    }

    async fn on_delete(&self, _search: &Search) -> Result<(), BroadcastError> {
        Err(BroadcastError::Delivery("transport down".to_string()))
    }
}

/// Broadcaster whose creation notice takes longer than any caller waits
pub struct SlowCreateBroadcaster(pub Duration);

#[async_trait]
impl SearchBroadcaster for SlowCreateBroadcaster {
    async fn on_create(&self, _search: &Search) -> Result<(), BroadcastError> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }

    async fn on_update(&self, _search: &Search) -> Result<(), BroadcastError> {
        Ok(())
    }

    async fn on_delete(&self, _search: &Search) -> Result<(), BroadcastError> {
        Ok(())
    }
}

/// Broadcaster with a bug in its creation path
pub struct PanickingCreateBroadcaster;

#[async_trait]
impl SearchBroadcaster for PanickingCreateBroadcaster {
    async fn on_create(&self, _search: &Search) -> Result<(), BroadcastError> {
        panic!("creation notice exploded");
    }

    async fn on_update(&self, _search: &Search) -> Result<(), BroadcastError> {
        Ok(())
    }

    async fn on_delete(&self, _search: &Search) -> Result<(), BroadcastError> {
        Ok(())
    }
}

/// Resolver that panics for every user
pub struct PanickingResolver;

impl UserGroupResolver for PanickingResolver {
    fn group_of(&self, username: &str) -> String {
        panic!("no group lookup for {username}");
    }
}

/// In-memory store that refuses to persist any completed search
#[derive(Default)]
pub struct FinalWriteFailingStore {
    inner: InMemoryStore,
}

#[async_trait]
impl SearchStore for FinalWriteFailingStore {
    async fn add(&self, search: &Search) -> peer_search_manager::Result<()> {
        self.inner.add(search).await
    }

    async fn update(&self, search: &Search) -> peer_search_manager::Result<()> {
        if search.state.is_completed() {
            return Err(AppError::Database("disk full".to_string()));
        }
        self.inner.update(search).await
    }

    async fn delete(&self, id: &Uuid) -> peer_search_manager::Result<Option<Search>> {
        self.inner.delete(id).await
    }

    async fn get(&self, id: &Uuid, include_responses: bool) -> peer_search_manager::Result<Option<Search>> {
        self.inner.get(id, include_responses).await
    }

    async fn list(&self, filter: &SearchFilter) -> peer_search_manager::Result<Vec<Search>> {
        self.inner.list(filter).await
    }

    async fn responses(
        &self,
        id: &Uuid,
        skip: usize,
        take: usize,
    ) -> peer_search_manager::Result<Option<Vec<Response>>> {
        self.inner.responses(id, skip, take).await
    }

    async fn count(&self, filter: &SearchFilter) -> peer_search_manager::Result<u64> {
        self.inner.count(filter).await
    }
}

pub struct Harness {
    pub service: Arc<SearchService>,
    pub repository: SearchRepository,
    pub broadcaster: Arc<RecordingBroadcaster>,
}

/// Three peers answering 30ms apart with one file each
pub fn simulation() -> SimulationConfig {
    SimulationConfig {
        peer_count: 3,
        response_interval_ms: 30,
        files_per_response: 1,
        locked_every: 0,
    }
}

pub fn options(search_timeout_ms: u64) -> SearchOptions {
    SearchOptions {
        search_timeout_ms,
        ..Default::default()
    }
}

pub fn repository() -> SearchRepository {
    SearchRepository::new(
        create_in_memory_store(),
        SearchCache::new(100, Duration::from_secs(300)),
    )
}

pub fn harness(client: SimulatedPeerClient) -> Harness {
    harness_with_users(client, UsersConfig::default())
}

pub fn harness_with_users(client: SimulatedPeerClient, users: UsersConfig) -> Harness {
    let repository = repository();
    let broadcaster = Arc::new(RecordingBroadcaster::default());

    let service = Arc::new(SearchService::new(
        SearchServiceDeps {
            client: Arc::new(client),
            repository: repository.clone(),
            broadcaster: broadcaster.clone(),
            users: Arc::new(StaticGroupResolver::new(&users)),
        },
        THROTTLE,
    ));

    Harness {
        service,
        repository,
        broadcaster,
    }
}

pub fn service_with_broadcaster(
    client: SimulatedPeerClient,
    broadcaster: Arc<dyn SearchBroadcaster>,
) -> (Arc<SearchService>, SearchRepository) {
    service_with(
        client,
        create_in_memory_store(),
        broadcaster,
        Arc::new(StaticGroupResolver::new(&UsersConfig::default())),
    )
}

/// Service over arbitrary collaborators
pub fn service_with(
    client: SimulatedPeerClient,
    store: Arc<dyn SearchStore>,
    broadcaster: Arc<dyn SearchBroadcaster>,
    users: Arc<dyn UserGroupResolver>,
) -> (Arc<SearchService>, SearchRepository) {
    let repository = SearchRepository::new(store, SearchCache::new(100, Duration::from_secs(300)));
    let service = Arc::new(SearchService::new(
        SearchServiceDeps {
            client: Arc::new(client),
            repository: repository.clone(),
            broadcaster,
            users,
        },
        THROTTLE,
    ));
    (service, repository)
}

pub fn groups(entries: &[(&str, &[&str])]) -> UsersConfig {
    let groups: HashMap<String, Vec<String>> = entries
        .iter()
        .map(|(group, users)| {
            (
                group.to_string(),
                users.iter().map(|u| u.to_string()).collect(),
            )
        })
        .collect();

    UsersConfig {
        groups,
        ..Default::default()
    }
}

/// Parse Prometheus text output into metric name -> sample lines
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics: HashMap<String, Vec<String>> = HashMap::new();

    for line in output.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let name = line
            .split(|c| c == '{' || c == ' ')
            .next()
            .unwrap_or_default()
            .to_string();
        metrics.entry(name).or_default().push(line.to_string());
    }

    metrics
}
