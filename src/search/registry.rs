use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Cancellation handles of in-flight searches, keyed by search id
#[derive(Debug, Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<DashMap<Uuid, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `token` under `id` unless the id is already registered
    pub fn register(&self, id: Uuid, token: CancellationToken) -> bool {
        match self.tokens.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(token);
                true
            }
        }
    }

    /// Signal cancellation for `id`. Returns false if it is not registered.
    pub fn try_cancel(&self, id: &Uuid) -> bool {
        match self.tokens.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: &Uuid) -> Option<CancellationToken> {
        self.tokens.remove(id).map(|(_, token)| token)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.tokens.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Signal every registered search; returns how many were signalled
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for entry in self.tokens.iter() {
            entry.value().cancel();
            cancelled += 1;
        }
        cancelled
    }
}
