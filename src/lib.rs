//! Peer Search Manager
//!
//! Lifecycle management for streaming searches over a peer network: a
//! search is dispatched, responses stream in at network speed, throttled
//! progress is pushed to live subscribers, and the record is finalized and
//! persisted exactly once however the search ends.

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod search;
pub mod state;
pub mod throttle;
pub mod websocket;

pub use error::{AppError, Result};
