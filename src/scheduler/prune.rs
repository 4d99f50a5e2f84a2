use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::{SchedulerError, SchedulerResult};
use crate::config::SearchConfig;
use crate::search::SearchService;

/// Periodically deletes searches past the retention age
pub struct PruneScheduler {
    scheduler: JobScheduler,
    job_id: Option<Uuid>,
    running: bool,
}

impl PruneScheduler {
    /// Create the scheduler and register the prune job.
    ///
    /// When pruning is disabled the scheduler is created without a job.
    pub async fn new(service: Arc<SearchService>, config: &SearchConfig) -> SchedulerResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::Start(e.to_string()))?;

        let mut this = Self {
            scheduler,
            job_id: None,
            running: false,
        };

        if config.prune_enabled {
            this.job_id = Some(
                this.add_prune_job(service, &config.prune_schedule, config.retention_minutes)
                    .await?,
            );
        } else {
            info!("Search pruning is disabled in configuration");
        }

        Ok(this)
    }

    async fn add_prune_job(
        &self,
        service: Arc<SearchService>,
        schedule: &str,
        retention_minutes: u64,
    ) -> SchedulerResult<Uuid> {
        let job = Job::new_async(schedule, move |_uuid, _lock| {
            let service = service.clone();
            Box::pin(async move {
                debug!(retention_minutes, "Running scheduled search prune");
                if let Err(e) = service.prune(retention_minutes).await {
                    error!(error = %e, "Scheduled search prune failed");
                }
            })
        })
        .map_err(|e| SchedulerError::InvalidSchedule {
            schedule: schedule.to_string(),
            reason: e.to_string(),
        })?;

        let id = self
            .scheduler
            .add(job)
            .await
            .map_err(|e| SchedulerError::RegisterJob(e.to_string()))?;

        info!(job_id = %id, schedule, retention_minutes, "Search prune job scheduled");
        Ok(id)
    }

    pub fn job_id(&self) -> Option<Uuid> {
        self.job_id
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.running {
            warn!("Scheduler is already running");
            return Ok(());
        }

        self.scheduler
            .start()
            .await
            .map_err(|e| SchedulerError::Start(e.to_string()))?;
        self.running = true;

        info!("Scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> SchedulerResult<()> {
        if !self.running {
            return Ok(());
        }

        self.scheduler
            .shutdown()
            .await
            .map_err(|e| SchedulerError::Shutdown(e.to_string()))?;
        self.running = false;

        info!("Scheduler shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{SearchServiceDeps, SimulatedPeerClient, StaticGroupResolver};
    use crate::state::{create_in_memory_store, SearchCache, SearchRepository};
    use crate::websocket::{WebSocketConfig, WebSocketState};
    use std::time::Duration;

    fn service() -> Arc<SearchService> {
        let repository = SearchRepository::new(
            create_in_memory_store(),
            SearchCache::new(100, Duration::from_secs(60)),
        );
        let websocket = WebSocketState::new(WebSocketConfig::default());

        Arc::new(SearchService::new(
            SearchServiceDeps {
                client: Arc::new(SimulatedPeerClient::new(Default::default())),
                repository,
                broadcaster: websocket.broadcaster.clone(),
                users: Arc::new(StaticGroupResolver::new(&Default::default())),
            },
            Duration::from_millis(250),
        ))
    }

    #[tokio::test]
    async fn test_prune_job_registered() {
        let scheduler = PruneScheduler::new(service(), &SearchConfig::default())
            .await
            .unwrap();
        assert!(scheduler.job_id().is_some());
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_disabled_pruning_registers_nothing() {
        let config = SearchConfig {
            prune_enabled: false,
            ..Default::default()
        };
        let scheduler = PruneScheduler::new(service(), &config).await.unwrap();
        assert!(scheduler.job_id().is_none());
    }

    #[tokio::test]
    async fn test_invalid_schedule_rejected() {
        let config = SearchConfig {
            prune_schedule: "not a schedule".to_string(),
            ..Default::default()
        };
        let result = PruneScheduler::new(service(), &config).await;
        assert!(matches!(
            result,
            Err(SchedulerError::InvalidSchedule { ref schedule, .. }) if schedule == "not a schedule"
        ));
    }
}
