//! Acting principal extraction.
//!
//! Authentication happens upstream at the gateway, which forwards the verified user id in
//! `x-user-id`. Every mutating handler takes a [`CurrentActor`] so the id reaches the
//! audit trail.

use crate::models::Actor;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use service_core::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing {} header", USER_ID_HEADER))
            })?;

        Ok(Self(Actor::user(user_id)))
    }
}
