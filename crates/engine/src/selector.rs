//! Item selector: finds items that crossed a stock or expiry threshold.
//!
//! An item yields one candidate per condition it meets:
//! - `stock <= 0` → `out_of_stock`, regardless of its notification settings
//! - notifications enabled and `days_left <= notify_advance_days` →
//!   `expiring` (days_left >= 0) or `expired` (days_left < 0)
//!
//! `days_left` is the calendar-day distance from "today" in the configured
//! timezone to the expiration date.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use stockwatch_common::error::AppError;
use stockwatch_common::types::{Candidate, ConditionKind, Item};

use crate::store::NotificationStore;

/// Candidates grouped by owning user.
pub type CandidatesByUser = BTreeMap<Uuid, Vec<Candidate>>;

pub struct ItemSelector {
    timezone: Tz,
}

impl ItemSelector {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// The calendar date `now` falls on in the selector's timezone.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    /// Load candidate items and classify them as of `now`.
    pub async fn select(
        &self,
        store: &dyn NotificationStore,
        now: DateTime<Utc>,
    ) -> Result<CandidatesByUser, AppError> {
        let today = self.local_date(now);
        let items = store.candidate_items().await?;

        let mut grouped = CandidatesByUser::new();
        for item in &items {
            for candidate in classify_item(item, today) {
                grouped
                    .entry(candidate.item.user_id)
                    .or_default()
                    .push(candidate);
            }
        }

        tracing::debug!(
            scanned = items.len(),
            users = grouped.len(),
            %today,
            "Item selection complete"
        );

        Ok(grouped)
    }
}

/// Apply the threshold rules to a single item.
pub fn classify_item(item: &Item, today: NaiveDate) -> Vec<Candidate> {
    if item.archived {
        return Vec::new();
    }

    let days_left = item
        .expiration_date
        .map(|exp| exp.signed_duration_since(today).num_days());

    let mut out = Vec::new();

    if item.stock <= 0 {
        out.push(Candidate {
            item: item.clone(),
            condition: ConditionKind::OutOfStock,
            days_left,
        });
    }

    if let Some(days) = days_left
        && item.notify_enabled
        && days <= i64::from(item.notify_advance_days)
    {
        let condition = if days < 0 {
            ConditionKind::Expired
        } else {
            ConditionKind::Expiring
        };
        out.push(Candidate {
            item: item.clone(),
            condition,
            days_left,
        });
    }

    out
}
