//! Search lifecycle core
//!
//! [`SearchService`] dispatches searches to a [`PeerSearchClient`], keeps
//! the record current while responses stream in and finalizes it exactly
//! once. The network, the broadcaster and the user-group resolver are
//! collaborators behind traits.

pub mod client;
pub mod file_types;
pub mod notify;
pub mod registry;
pub mod service;
pub mod simulated;
pub mod users;

pub use client::{
    PeerResponse, PeerSearch, PeerSearchClient, PeerSearchError, PeerSearchFuture, SearchHandlers,
};
pub use file_types::extract_file_types;
pub use notify::{BroadcastError, SearchBroadcaster};
pub use registry::CancellationRegistry;
pub use service::{SearchOutcome, SearchService, SearchServiceDeps};
pub use simulated::{SimulatedFailure, SimulatedPeerClient};
pub use users::{StaticGroupResolver, UserGroupResolver};
