use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why an item is being reported.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ConditionKind {
    OutOfStock,
    Expiring,
    Expired,
}

impl std::fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionKind::OutOfStock => write!(f, "out_of_stock"),
            ConditionKind::Expiring => write!(f, "expiring"),
            ConditionKind::Expired => write!(f, "expired"),
        }
    }
}

/// Terminal outcome of one webhook delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed,
    TimedOut,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Delivered => write!(f, "delivered"),
            DeliveryStatus::Failed => write!(f, "failed"),
            DeliveryStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// A household item tracked by a user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Item {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub stock: i32,
    pub expiration_date: Option<NaiveDate>,
    pub lifespan_days: Option<i32>,
    pub notify_advance_days: i32,
    pub notify_enabled: bool,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user's outbound webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookConfig {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub url: String,
    pub enabled: bool,
    /// Body template; empty means the built-in default JSON body.
    pub template: String,
    pub created_at: DateTime<Utc>,
}

/// An item that crossed a threshold, paired with the condition it crossed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub item: Item,
    pub condition: ConditionKind,
    /// Calendar days until expiration; negative once expired.
    pub days_left: Option<i64>,
}

impl Candidate {
    pub fn key(&self) -> (Uuid, ConditionKind) {
        (self.item.id, self.condition)
    }
}

/// A persisted record of one delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationLog {
    pub id: Uuid,
    pub item_id: Uuid,
    pub user_id: Uuid,
    pub webhook_id: Option<Uuid>,
    pub condition: ConditionKind,
    pub status: DeliveryStatus,
    pub http_status: Option<i32>,
    pub error_detail: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Fields for a new notification log entry.
#[derive(Debug, Clone)]
pub struct NewNotificationLog {
    pub item_id: Uuid,
    pub user_id: Uuid,
    pub webhook_id: Option<Uuid>,
    pub condition: ConditionKind,
    pub status: DeliveryStatus,
    pub http_status: Option<i32>,
    pub error_detail: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_display_matches_serde() {
        for kind in [
            ConditionKind::OutOfStock,
            ConditionKind::Expiring,
            ConditionKind::Expired,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::Value::String(kind.to_string()));
        }
    }

    #[test]
    fn test_delivery_status_display() {
        assert_eq!(DeliveryStatus::Delivered.to_string(), "delivered");
        assert_eq!(DeliveryStatus::TimedOut.to_string(), "timed_out");
    }
}
