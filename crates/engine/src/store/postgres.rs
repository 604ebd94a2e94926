use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use stockwatch_common::error::AppError;
use stockwatch_common::types::{
    ConditionKind, Item, NewNotificationLog, NotificationLog, WebhookConfig,
};

use super::NotificationStore;

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn candidate_items(&self) -> Result<Vec<Item>, AppError> {
        let items: Vec<Item> = sqlx::query_as(
            r#"
            SELECT *
            FROM items
            WHERE archived = FALSE
              AND (stock <= 0 OR (notify_enabled = TRUE AND expiration_date IS NOT NULL))
            ORDER BY user_id, name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    async fn enabled_webhooks(&self, user_ids: &[Uuid]) -> Result<Vec<WebhookConfig>, AppError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let webhooks: Vec<WebhookConfig> = sqlx::query_as(
            r#"
            SELECT *
            FROM webhook_configs
            WHERE enabled = TRUE AND user_id = ANY($1)
            ORDER BY user_id, created_at
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(webhooks)
    }

    async fn delivered_since(
        &self,
        item_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<HashSet<(Uuid, ConditionKind)>, AppError> {
        if item_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let rows: Vec<(Uuid, ConditionKind)> = sqlx::query_as(
            r#"
            SELECT DISTINCT item_id, condition
            FROM notification_log
            WHERE item_id = ANY($1)
              AND status = 'delivered'
              AND sent_at > $2
            "#,
        )
        .bind(item_ids)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn record_notification(
        &self,
        entry: NewNotificationLog,
    ) -> Result<NotificationLog, AppError> {
        let log: NotificationLog = sqlx::query_as(
            r#"
            INSERT INTO notification_log
                (id, item_id, user_id, webhook_id, condition, status,
                 http_status, error_detail, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.item_id)
        .bind(entry.user_id)
        .bind(entry.webhook_id)
        .bind(entry.condition.to_string())
        .bind(entry.status.to_string())
        .bind(entry.http_status)
        .bind(&entry.error_detail)
        .bind(entry.sent_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(log)
    }

    async fn recent_notifications(&self, limit: i64) -> Result<Vec<NotificationLog>, AppError> {
        let logs: Vec<NotificationLog> =
            sqlx::query_as("SELECT * FROM notification_log ORDER BY sent_at DESC LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;

        Ok(logs)
    }

    async fn prune_notifications(&self, older_than: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM notification_log WHERE sent_at < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }
}
