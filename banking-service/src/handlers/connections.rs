use crate::dtos::{ListConnectionsQuery, OverrideBalanceRequest, RegisterConnectionRequest};
use crate::middleware::CurrentActor;
use crate::models::BankConnection;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

/// POST /connections
#[tracing::instrument(skip(state, req))]
pub async fn register_connection(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<RegisterConnectionRequest>,
) -> Result<(StatusCode, Json<BankConnection>), AppError> {
    req.validate()?;
    let connection = state.connections.register(&actor, req.into()).await?;
    Ok((StatusCode::CREATED, Json(connection)))
}

/// GET /connections
pub async fn list_connections(
    State(state): State<AppState>,
    Query(query): Query<ListConnectionsQuery>,
) -> Result<Json<Vec<BankConnection>>, AppError> {
    Ok(Json(state.connections.list(query.active_only).await?))
}

/// GET /connections/:id
pub async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BankConnection>, AppError> {
    Ok(Json(state.connections.get(id).await?))
}

/// POST /connections/:id/deactivate
#[tracing::instrument(skip(state))]
pub async fn deactivate_connection(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<BankConnection>, AppError> {
    Ok(Json(state.connections.deactivate(&actor, id).await?))
}

/// PUT /connections/:id/balance
#[tracing::instrument(skip(state, req))]
pub async fn override_balance(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Json(req): Json<OverrideBalanceRequest>,
) -> Result<Json<BankConnection>, AppError> {
    let connection = state
        .connections
        .override_balance(&actor, id, req.balance, req.available_balance)
        .await?;
    Ok(Json(connection))
}
