//! Shared application state for the Axum API server.

use std::sync::Arc;

use stockwatch_common::config::AppConfig;
use stockwatch_engine::pipeline::NotificationPipeline;

use crate::scheduler::SchedulerStatus;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<NotificationPipeline>,
    pub config: AppConfig,
    pub scheduler: SchedulerStatus,
}

impl AppState {
    pub fn new(
        pipeline: Arc<NotificationPipeline>,
        config: AppConfig,
        scheduler: SchedulerStatus,
    ) -> Self {
        Self {
            pipeline,
            config,
            scheduler,
        }
    }
}
