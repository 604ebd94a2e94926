//! Deduplicator: suppresses alerts already delivered within the cooldown.
//!
//! After an (item, condition) pair is delivered, the pair is quiet for a
//! rolling window (default 24h) measured back from the current run. State
//! lives entirely in the notification log, so it survives restarts and is
//! shared by every process using the same database.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use stockwatch_common::error::AppError;

use crate::selector::CandidatesByUser;
use crate::store::NotificationStore;

/// Default cooldown in hours.
pub const DEFAULT_COOLDOWN_HOURS: u64 = 24;

/// Candidates that survived deduplication.
#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub eligible: CandidatesByUser,
    pub suppressed: usize,
}

pub struct Deduplicator {
    cooldown: Duration,
}

impl Deduplicator {
    /// Fails when the cooldown cannot be represented as a time span.
    pub fn new(cooldown_hours: u64) -> Result<Self, AppError> {
        let cooldown = i64::try_from(cooldown_hours)
            .ok()
            .and_then(Duration::try_hours)
            .ok_or_else(|| {
                AppError::Config(format!("Cooldown of {} hours is out of range", cooldown_hours))
            })?;

        Ok(Self { cooldown })
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Drop every candidate whose pair was delivered after `now - cooldown`.
    pub async fn filter(
        &self,
        store: &dyn NotificationStore,
        candidates: CandidatesByUser,
        now: DateTime<Utc>,
    ) -> Result<DedupOutcome, AppError> {
        let mut item_ids: Vec<Uuid> = candidates
            .values()
            .flatten()
            .map(|c| c.item.id)
            .collect();
        item_ids.sort_unstable();
        item_ids.dedup();

        if item_ids.is_empty() {
            return Ok(DedupOutcome::default());
        }

        let since = now - self.cooldown;
        let recent = store.delivered_since(&item_ids, since).await?;

        let mut outcome = DedupOutcome::default();
        for (user_id, list) in candidates {
            let kept: Vec<_> = list
                .into_iter()
                .filter(|c| {
                    let in_cooldown = recent.contains(&c.key());
                    if in_cooldown {
                        tracing::debug!(
                            item_id = %c.item.id,
                            condition = %c.condition,
                            "Alert suppressed, pair in cooldown"
                        );
                        outcome.suppressed += 1;
                    }
                    !in_cooldown
                })
                .collect();

            if !kept.is_empty() {
                outcome.eligible.insert(user_id, kept);
            }
        }

        Ok(outcome)
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self {
            cooldown: Duration::hours(DEFAULT_COOLDOWN_HOURS as i64),
        }
    }
}
