use crate::dtos::ListAlertsQuery;
use crate::middleware::CurrentActor;
use crate::models::BankAlert;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

/// GET /alerts
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<ListAlertsQuery>,
) -> Result<Json<Vec<BankAlert>>, AppError> {
    Ok(Json(state.alerts.list(&query.into()).await?))
}

/// POST /alerts/:id/read
#[tracing::instrument(skip(state))]
pub async fn mark_alert_read(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<BankAlert>, AppError> {
    Ok(Json(state.alerts.mark_read(&actor, id).await?))
}

/// POST /alerts/:id/dismiss
#[tracing::instrument(skip(state))]
pub async fn dismiss_alert(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<BankAlert>, AppError> {
    Ok(Json(state.alerts.dismiss(&actor, id).await?))
}
