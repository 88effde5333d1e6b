use crate::dtos::{CompleteSessionRequest, CreateSessionRequest, ListSessionsQuery};
use crate::middleware::CurrentActor;
use crate::models::ReconciliationSession;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

/// POST /sessions
#[tracing::instrument(skip(state, req))]
pub async fn create_session(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<ReconciliationSession>), AppError> {
    let session = state.sessions.create(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<Vec<ReconciliationSession>>, AppError> {
    Ok(Json(state.sessions.list(query.connection_id).await?))
}

/// GET /sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReconciliationSession>, AppError> {
    Ok(Json(state.sessions.get(id).await?))
}

/// POST /sessions/:id/start
#[tracing::instrument(skip(state))]
pub async fn start_session(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<ReconciliationSession>, AppError> {
    Ok(Json(state.sessions.start(&actor, id).await?))
}

/// POST /sessions/:id/complete
///
/// The body is optional; an empty request completes without notes.
#[tracing::instrument(skip(state, req))]
pub async fn complete_session(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    req: Option<Json<CompleteSessionRequest>>,
) -> Result<Json<ReconciliationSession>, AppError> {
    let req = req.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(state.sessions.complete(&actor, id, req).await?))
}

/// POST /sessions/:id/approve
#[tracing::instrument(skip(state))]
pub async fn approve_session(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<ReconciliationSession>, AppError> {
    Ok(Json(state.sessions.approve(&actor, id).await?))
}
