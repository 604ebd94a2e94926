//! Notification pipeline.
//!
//! One run:
//! 1. Selects items crossing a threshold (`ItemSelector`)
//! 2. Drops pairs still in cooldown (`Deduplicator`)
//! 3. Sends each remaining pair to every enabled webhook of its owner
//!    (`WebhookDispatcher`)
//! 4. Records each send in the notification log as soon as its outcome is
//!    known
//!
//! Runs are serialized through a `RunGuard` and bounded by a run timeout.
//! Store failures abort the run; individual webhook failures never do.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use uuid::Uuid;

use stockwatch_common::config::AppConfig;
use stockwatch_common::error::AppError;
use stockwatch_common::types::{NewNotificationLog, WebhookConfig};
use stockwatch_notifier::webhook::{DispatchJob, DispatchResult, WebhookDispatcher};

use crate::dedup::Deduplicator;
use crate::run_guard::RunGuard;
use crate::selector::{CandidatesByUser, ItemSelector};
use crate::store::NotificationStore;

/// Counters reported by a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// (item, condition) pairs selected
    pub checked: usize,
    /// Webhook sends that were delivered
    pub notified: usize,
    /// Webhook sends that failed, timed out, or had an unusable template
    pub failed: usize,
    /// Pairs skipped because they were delivered within the cooldown
    pub suppressed: usize,
}

pub struct NotificationPipeline {
    store: Arc<dyn NotificationStore>,
    selector: ItemSelector,
    dedup: Deduplicator,
    dispatcher: WebhookDispatcher,
    guard: RunGuard,
    run_timeout: Duration,
}

impl NotificationPipeline {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        dispatcher: WebhookDispatcher,
        guard: RunGuard,
        config: &AppConfig,
    ) -> Result<Self, AppError> {
        Ok(Self {
            store,
            selector: ItemSelector::new(config.notify_timezone),
            dedup: Deduplicator::new(config.notify_cooldown_hours)?,
            dispatcher,
            guard,
            run_timeout: Duration::from_secs(config.run_timeout_secs),
        })
    }

    /// Build the dispatcher from configuration and assemble the pipeline.
    pub fn from_config(
        store: Arc<dyn NotificationStore>,
        guard: RunGuard,
        config: &AppConfig,
    ) -> Result<Self, AppError> {
        let dispatcher = WebhookDispatcher::new(
            Duration::from_millis(config.webhook_timeout_ms),
            config.webhook_concurrency,
        )
        .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Self::new(store, dispatcher, guard, config)
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_busy()
    }

    /// Execute one run as of `now`.
    ///
    /// Returns `AppError::Conflict` when another run holds the guard and
    /// `AppError::Timeout` when the run exceeds the configured bound.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunSummary, AppError> {
        let permit = self
            .guard
            .try_acquire()
            .await?
            .ok_or_else(|| AppError::Conflict("A notification run is already in progress".into()))?;

        tracing::info!(%now, "Notification run started");
        let started = std::time::Instant::now();

        let result = tokio::time::timeout(self.run_timeout, self.run_inner(now)).await;
        permit.release().await;

        let summary = match result {
            Ok(inner) => inner?,
            Err(_) => {
                tracing::error!(
                    timeout_secs = self.run_timeout.as_secs(),
                    "Notification run exceeded its time limit"
                );
                return Err(AppError::Timeout(format!(
                    "Notification run exceeded {}s",
                    self.run_timeout.as_secs()
                )));
            }
        };

        tracing::info!(
            checked = summary.checked,
            notified = summary.notified,
            failed = summary.failed,
            suppressed = summary.suppressed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Notification run finished"
        );

        Ok(summary)
    }

    async fn run_inner(&self, now: DateTime<Utc>) -> Result<RunSummary, AppError> {
        let store = self.store.as_ref();

        let selected = self.selector.select(store, now).await?;
        let checked = selected.values().map(Vec::len).sum();

        let dedup = self.dedup.filter(store, selected, now).await?;
        let mut summary = RunSummary {
            checked,
            suppressed: dedup.suppressed,
            ..RunSummary::default()
        };

        if dedup.eligible.is_empty() {
            return Ok(summary);
        }

        let user_ids: Vec<Uuid> = dedup.eligible.keys().copied().collect();
        let webhooks = store.enabled_webhooks(&user_ids).await?;
        let jobs = build_jobs(dedup.eligible, webhooks);

        tracing::debug!(jobs = jobs.len(), "Dispatching webhooks");

        // Log timestamps follow the run's clock so that `now` stays the
        // single time reference for selection, cooldown and logging.
        let wall_start = Utc::now();
        let mut results = std::pin::pin!(self.dispatcher.dispatch(jobs));
        while let Some(result) = results.next().await {
            let sent_at = now + (result.finished_at - wall_start);
            self.record(&result, sent_at, &mut summary).await?;
        }

        Ok(summary)
    }

    /// Write the log entry for one send and update the counters.
    async fn record(
        &self,
        result: &DispatchResult,
        sent_at: DateTime<Utc>,
        summary: &mut RunSummary,
    ) -> Result<(), AppError> {
        let Some(status) = result.outcome.log_status() else {
            summary.failed += 1;
            return Ok(());
        };

        self.store
            .record_notification(NewNotificationLog {
                item_id: result.item_id,
                user_id: result.user_id,
                webhook_id: Some(result.webhook_id),
                condition: result.condition,
                status,
                http_status: result.outcome.http_status().map(i32::from),
                error_detail: result.outcome.error_detail(),
                sent_at,
            })
            .await?;

        if result.outcome.is_delivered() {
            summary.notified += 1;
        } else {
            summary.failed += 1;
        }
        Ok(())
    }

    /// Delete log entries older than `retention_days`. Zero keeps everything.
    pub async fn prune_log(
        &self,
        now: DateTime<Utc>,
        retention_days: u64,
    ) -> Result<u64, AppError> {
        if retention_days == 0 {
            return Ok(0);
        }

        let cutoff = i64::try_from(retention_days)
            .ok()
            .and_then(chrono::Duration::try_days)
            .and_then(|retention| now.checked_sub_signed(retention))
            .ok_or_else(|| {
                AppError::Config(format!("Retention of {} days is out of range", retention_days))
            })?;
        let removed = self.store.prune_notifications(cutoff).await?;
        tracing::info!(removed, %cutoff, "Pruned notification log");
        Ok(removed)
    }
}

/// Pair every eligible candidate with each enabled webhook of its owner.
fn build_jobs(eligible: CandidatesByUser, webhooks: Vec<WebhookConfig>) -> Vec<DispatchJob> {
    let mut by_user: HashMap<Uuid, Vec<WebhookConfig>> = HashMap::new();
    for webhook in webhooks {
        by_user.entry(webhook.user_id).or_default().push(webhook);
    }

    let mut jobs = Vec::new();
    for (user_id, candidates) in eligible {
        let Some(hooks) = by_user.get(&user_id) else {
            tracing::debug!(
                user_id = %user_id,
                pending = candidates.len(),
                "User has no enabled webhooks"
            );
            continue;
        };

        for candidate in &candidates {
            for webhook in hooks {
                jobs.push(DispatchJob {
                    webhook: webhook.clone(),
                    candidate: candidate.clone(),
                });
            }
        }
    }
    jobs
}
