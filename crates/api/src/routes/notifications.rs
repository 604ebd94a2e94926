//! Notification log listing.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use stockwatch_common::error::AppError;
use stockwatch_common::types::NotificationLog;

use crate::middleware::auth::TriggerAuth;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/notifications", get(list_notifications))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
}

/// GET /api/notifications: most recent delivery attempts, newest first.
async fn list_notifications(
    State(state): State<AppState>,
    _auth: TriggerAuth,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<NotificationLog>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }

    let logs = state.pipeline.store().recent_notifications(limit).await?;
    Ok(Json(logs))
}
