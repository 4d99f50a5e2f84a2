use thiserror::Error;

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Prune scheduler could not start: {0}")]
    Start(String),

    #[error("Prune scheduler could not shut down: {0}")]
    Shutdown(String),

    #[error("Prune job could not be registered: {0}")]
    RegisterJob(String),

    /// The configured `prune_schedule` is not a valid cron expression
    #[error("Invalid prune schedule '{schedule}': {reason}")]
    InvalidSchedule { schedule: String, reason: String },
}
