use crate::dtos::{ListTransactionsQuery, MatchTransactionRequest, ReverseTransactionRequest};
use crate::middleware::CurrentActor;
use crate::models::BankTransaction;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

/// GET /transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<Vec<BankTransaction>>, AppError> {
    Ok(Json(state.transactions.list(&query.into()).await?))
}

/// GET /transactions/:id
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BankTransaction>, AppError> {
    Ok(Json(state.transactions.get(id).await?))
}

/// POST /transactions/:id/match
#[tracing::instrument(skip(state, req))]
pub async fn match_transaction(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Json(req): Json<MatchTransactionRequest>,
) -> Result<Json<BankTransaction>, AppError> {
    Ok(Json(
        state.transactions.match_transaction(&actor, id, req).await?,
    ))
}

/// POST /transactions/:id/reconcile
#[tracing::instrument(skip(state))]
pub async fn reconcile_transaction(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<BankTransaction>, AppError> {
    Ok(Json(state.transactions.reconcile(&actor, id).await?))
}

/// POST /transactions/:id/reverse
#[tracing::instrument(skip(state, req))]
pub async fn reverse_transaction(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Json(req): Json<ReverseTransactionRequest>,
) -> Result<(StatusCode, Json<BankTransaction>), AppError> {
    let reversal = state.transactions.reverse(&actor, id, req).await?;
    Ok((StatusCode::CREATED, Json(reversal)))
}
