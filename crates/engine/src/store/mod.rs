//! Storage interface for the notification pipeline.
//!
//! The pipeline never reaches for a global client: a `NotificationStore` is
//! opened by the process entry point and handed to every component.

mod memory;
mod postgres;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use stockwatch_common::error::AppError;
use stockwatch_common::types::{
    ConditionKind, Item, NewNotificationLog, NotificationLog, WebhookConfig,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Non-archived items that may cross a threshold: out of stock, or
    /// notification-enabled with an expiration date. The exact rule is
    /// applied by the selector.
    async fn candidate_items(&self) -> Result<Vec<Item>, AppError>;

    /// Enabled webhook configs belonging to any of `user_ids`.
    async fn enabled_webhooks(&self, user_ids: &[Uuid]) -> Result<Vec<WebhookConfig>, AppError>;

    /// (item, condition) pairs among `item_ids` with a delivered notification
    /// sent strictly after `since`.
    async fn delivered_since(
        &self,
        item_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<HashSet<(Uuid, ConditionKind)>, AppError>;

    async fn record_notification(
        &self,
        entry: NewNotificationLog,
    ) -> Result<NotificationLog, AppError>;

    /// Most recent log entries, newest first.
    async fn recent_notifications(&self, limit: i64) -> Result<Vec<NotificationLog>, AppError>;

    /// Delete log entries sent before `older_than`, returning how many went.
    async fn prune_notifications(&self, older_than: DateTime<Utc>) -> Result<u64, AppError>;

    /// Release underlying resources. Called once at shutdown.
    async fn close(&self);
}
