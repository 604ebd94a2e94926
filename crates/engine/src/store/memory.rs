use std::collections::HashSet;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use stockwatch_common::error::AppError;
use stockwatch_common::types::{
    ConditionKind, DeliveryStatus, Item, NewNotificationLog, NotificationLog, WebhookConfig,
};

use super::NotificationStore;

#[derive(Debug, Default)]
struct Tables {
    items: Vec<Item>,
    webhooks: Vec<WebhookConfig>,
    log: Vec<NotificationLog>,
}

/// In-process store for tests and local dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_item(&self, item: Item) {
        self.write().items.push(item);
    }

    pub fn insert_webhook(&self, webhook: WebhookConfig) {
        self.write().webhooks.push(webhook);
    }

    /// Snapshot of the notification log in insertion order.
    pub fn notification_log(&self) -> Vec<NotificationLog> {
        self.read().log.clone()
    }

    /// Make every query fail with a store error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Internal("store unavailable".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn candidate_items(&self) -> Result<Vec<Item>, AppError> {
        self.check_available()?;
        let mut items: Vec<Item> = self
            .read()
            .items
            .iter()
            .filter(|i| !i.archived)
            .filter(|i| i.stock <= 0 || (i.notify_enabled && i.expiration_date.is_some()))
            .cloned()
            .collect();
        items.sort_by(|a, b| (a.user_id, &a.name).cmp(&(b.user_id, &b.name)));
        Ok(items)
    }

    async fn enabled_webhooks(&self, user_ids: &[Uuid]) -> Result<Vec<WebhookConfig>, AppError> {
        self.check_available()?;
        Ok(self
            .read()
            .webhooks
            .iter()
            .filter(|w| w.enabled && user_ids.contains(&w.user_id))
            .cloned()
            .collect())
    }

    async fn delivered_since(
        &self,
        item_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<HashSet<(Uuid, ConditionKind)>, AppError> {
        self.check_available()?;
        Ok(self
            .read()
            .log
            .iter()
            .filter(|l| l.status == DeliveryStatus::Delivered && l.sent_at > since)
            .filter(|l| item_ids.contains(&l.item_id))
            .map(|l| (l.item_id, l.condition))
            .collect())
    }

    async fn record_notification(
        &self,
        entry: NewNotificationLog,
    ) -> Result<NotificationLog, AppError> {
        self.check_available()?;
        let log = NotificationLog {
            id: Uuid::new_v4(),
            item_id: entry.item_id,
            user_id: entry.user_id,
            webhook_id: entry.webhook_id,
            condition: entry.condition,
            status: entry.status,
            http_status: entry.http_status,
            error_detail: entry.error_detail,
            sent_at: entry.sent_at,
        };
        self.write().log.push(log.clone());
        Ok(log)
    }

    async fn recent_notifications(&self, limit: i64) -> Result<Vec<NotificationLog>, AppError> {
        self.check_available()?;
        let mut logs = self.read().log.clone();
        logs.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        logs.truncate(limit.max(0) as usize);
        Ok(logs)
    }

    async fn prune_notifications(&self, older_than: DateTime<Utc>) -> Result<u64, AppError> {
        self.check_available()?;
        let mut tables = self.write();
        let before = tables.log.len();
        tables.log.retain(|l| l.sent_at >= older_than);
        Ok((before - tables.log.len()) as u64)
    }

    async fn close(&self) {}
}
