pub mod handlers;
pub mod middleware;
pub mod routes;

pub use routes::*;

use crate::{
    config::Config, search::SearchService, throttle::AdmissionLimiter,
    websocket::WebSocketState,
};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchService>,
    pub websocket: Arc<WebSocketState>,
    /// Per-address admission for the search API
    pub admission: Arc<AdmissionLimiter<IpAddr>>,
    pub config: Arc<Config>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(search: Arc<SearchService>, websocket: Arc<WebSocketState>, config: Config) -> Self {
        let rate_limiting = &config.security.rate_limiting;
        let admission = Arc::new(AdmissionLimiter::new(
            rate_limiting.capacity,
            rate_limiting.window(),
        ));

        Self {
            search,
            websocket,
            admission,
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }
}
