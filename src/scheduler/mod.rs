//! Scheduled maintenance
//!
//! Runs the search prune sweep on a cron schedule using
//! tokio-cron-scheduler.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use peer_search_manager::{config::SearchConfig, search::SearchService};
//! use peer_search_manager::scheduler::PruneScheduler;
//!
//! # async fn run(service: Arc<SearchService>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut scheduler = PruneScheduler::new(service, &SearchConfig::default()).await?;
//! scheduler.start().await?;
//! // ...
//! scheduler.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod prune;

pub use error::{SchedulerError, SchedulerResult};
pub use prune::PruneScheduler;
