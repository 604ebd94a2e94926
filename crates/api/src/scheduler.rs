//! Cron scheduler for the expiry check and log maintenance.
//!
//! Owned by the binary's `main`; route handlers only see a `SchedulerStatus`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use chrono_tz::Tz;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};

use stockwatch_common::config::AppConfig;
use stockwatch_common::error::AppError;
use stockwatch_engine::pipeline::NotificationPipeline;

/// Log pruning runs daily at 03:30 in the configured timezone.
const PRUNE_SCHEDULE: &str = "0 30 3 * * *";

/// Cloneable read-only view of whether the scheduler is running.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStatus(Arc<AtomicBool>);

impl SchedulerStatus {
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self, running: bool) {
        self.0.store(running, Ordering::SeqCst);
    }
}

/// Cron-based scheduler driving the notification pipeline.
pub struct NotifyScheduler {
    scheduler: JobScheduler,
    pipeline: Arc<NotificationPipeline>,
    schedule: String,
    timezone: Tz,
    retention_days: u64,
    status: SchedulerStatus,
}

impl std::fmt::Debug for NotifyScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyScheduler")
            .field("schedule", &self.schedule)
            .field("timezone", &self.timezone)
            .field("running", &self.status.is_running())
            .finish()
    }
}

impl NotifyScheduler {
    pub async fn new(
        pipeline: Arc<NotificationPipeline>,
        config: &AppConfig,
    ) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler,
            pipeline,
            schedule: config.notify_schedule.clone(),
            timezone: config.notify_timezone,
            retention_days: config.notify_log_retention_days,
            status: SchedulerStatus::default(),
        })
    }

    pub fn status(&self) -> SchedulerStatus {
        self.status.clone()
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    /// Register the expiry check and, when retention is enabled, log pruning.
    pub async fn register_jobs(&self) -> Result<(), AppError> {
        self.register_expiry_check().await?;
        if self.retention_days > 0 {
            self.register_log_prune().await?;
        }
        Ok(())
    }

    /// Start firing registered jobs.
    pub async fn start(&self) -> Result<(), AppError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to start scheduler: {}", e)))?;

        self.status.set(true);
        tracing::info!(
            schedule = %self.schedule,
            timezone = %self.timezone,
            "Cron scheduler started"
        );
        Ok(())
    }

    /// Stop the scheduler. A run already in flight finishes on its own task.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        if !self.is_running() {
            return Ok(());
        }

        let mut scheduler = self.scheduler.clone();
        scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to shutdown scheduler: {}", e)))?;

        self.status.set(false);
        tracing::info!("Cron scheduler shut down");
        Ok(())
    }

    /// Expiry check at the configured schedule.
    async fn register_expiry_check(&self) -> Result<(), AppError> {
        let pipeline = Arc::clone(&self.pipeline);
        let schedule = self.schedule.as_str();
        let job = CronJob::new_async_tz(schedule, self.timezone, move |_uuid, _lock| {
            let pipeline = Arc::clone(&pipeline);
            Box::pin(async move {
                match pipeline.run(Utc::now()).await {
                    Ok(summary) => tracing::info!(
                        checked = summary.checked,
                        notified = summary.notified,
                        failed = summary.failed,
                        "Scheduled expiry check complete"
                    ),
                    Err(AppError::Conflict(_)) => {
                        tracing::info!("Skipping scheduled expiry check: a run is in progress")
                    }
                    Err(e) => tracing::error!(error = %e, "Scheduled expiry check failed"),
                }
            })
        })
        .map_err(|e| {
            AppError::Config(format!(
                "Invalid NOTIFY_SCHEDULE '{}': {}",
                self.schedule, e
            ))
        })?;

        self.scheduler.add(job).await.map_err(|e| {
            AppError::Internal(format!("Failed to add expiry_check schedule: {}", e))
        })?;

        tracing::info!(schedule = %self.schedule, "Registered: expiry_check");
        Ok(())
    }

    /// Notification log pruning, daily.
    async fn register_log_prune(&self) -> Result<(), AppError> {
        let pipeline = Arc::clone(&self.pipeline);
        let retention_days = self.retention_days;
        let job = CronJob::new_async_tz(PRUNE_SCHEDULE, self.timezone, move |_uuid, _lock| {
            let pipeline = Arc::clone(&pipeline);
            Box::pin(async move {
                if let Err(e) = pipeline.prune_log(Utc::now(), retention_days).await {
                    tracing::error!(error = %e, "Notification log pruning failed");
                }
            })
        })
        .map_err(|e| AppError::Internal(format!("Failed to create log_prune schedule: {}", e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to add log_prune schedule: {}", e)))?;

        tracing::info!(retention_days, "Registered: log_prune (daily at 03:30)");
        Ok(())
    }
}
