use crate::middleware::CurrentActor;
use crate::services::{CycleReport, MatchSummary};
use crate::startup::AppState;
use axum::{extract::State, Json};
use service_core::error::AppError;

/// POST /sync/run
///
/// Runs a full cycle on demand and returns once every connection has resolved.
#[tracing::instrument(skip(state))]
pub async fn run_sync(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<CycleReport>, AppError> {
    tracing::info!(actor = %actor, "Manual sync cycle requested");
    Ok(Json(state.sync.run_cycle().await?))
}

/// POST /matching/run
#[tracing::instrument(skip(state))]
pub async fn run_matching(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<MatchSummary>, AppError> {
    tracing::info!(actor = %actor, "Manual auto-match run requested");
    Ok(Json(state.matcher.run().await?))
}
