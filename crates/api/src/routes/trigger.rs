//! Externally triggered notification run.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;

use stockwatch_common::error::AppError;
use stockwatch_engine::pipeline::RunSummary;

use crate::middleware::auth::TriggerAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/cron/check-expiry", post(check_expiry))
}

/// POST /api/cron/check-expiry: run the expiry check now and report counters.
///
/// Rejected with 401 before any work when the bearer secret is wrong, and
/// with 409 while another run (scheduled or manual) is in progress.
async fn check_expiry(
    State(state): State<AppState>,
    _auth: TriggerAuth,
) -> Result<Json<RunSummary>, AppError> {
    tracing::info!("Notification run requested via HTTP trigger");
    let summary = state.pipeline.run(Utc::now()).await?;
    Ok(Json(summary))
}
