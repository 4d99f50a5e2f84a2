use async_trait::async_trait;
use thiserror::Error;

use crate::models::Search;

/// Failure to push a notification to live subscribers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("Broadcaster is closed")]
    Closed,

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Pushes search lifecycle notifications to every live subscriber.
///
/// Delivery is best effort. Callers log failures and carry on.
#[async_trait]
pub trait SearchBroadcaster: Send + Sync {
    async fn on_create(&self, search: &Search) -> Result<(), BroadcastError>;

    /// Called for live progress and once more at finalization. The payload
    /// never carries the response collection.
    async fn on_update(&self, search: &Search) -> Result<(), BroadcastError>;

    async fn on_delete(&self, search: &Search) -> Result<(), BroadcastError>;
}
