use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::config::SearchConfig;

/// Query text submitted to the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SearchQuery {
    #[validate(length(min = 1, max = 1024), custom(function = "not_blank"))]
    pub search_text: String,
}

impl SearchQuery {
    pub fn new(search_text: impl Into<String>) -> Self {
        Self {
            search_text: search_text.into(),
        }
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Where the query is sent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchScope {
    /// Every peer on the network
    #[default]
    Network,
    /// Members of a chat room
    Room { name: String },
    /// A fixed set of users
    User { usernames: Vec<String> },
}

/// Limits and response filters handed to the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SearchOptions {
    /// Network-side search timeout (milliseconds)
    #[validate(range(min = 1, max = 3_600_000))]
    pub search_timeout_ms: u64,

    #[validate(range(min = 1))]
    pub response_limit: usize,

    #[validate(range(min = 1))]
    pub file_limit: usize,

    /// Drop responses that fail the filters below
    pub filter_responses: bool,

    pub minimum_response_file_count: usize,

    pub minimum_peer_upload_speed: u32,

    pub maximum_peer_queue_length: u64,
}

impl SearchOptions {
    /// Options built from the configured defaults
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            search_timeout_ms: config.default_timeout_secs * 1000,
            response_limit: config.default_response_limit,
            file_limit: config.default_file_limit,
            ..Default::default()
        }
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            search_timeout_ms: 15_000,
            response_limit: 100,
            file_limit: 10_000,
            filter_responses: true,
            minimum_response_file_count: 1,
            minimum_peer_upload_speed: 0,
            maximum_peer_queue_length: 1_000_000,
        }
    }
}
