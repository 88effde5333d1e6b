//! Who may approve a completed reconciliation session.

use crate::models::Actor;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::collections::HashSet;
use std::time::Duration;

pub const APPROVE_CAPABILITY: &str = "reconciliation.session:approve";

#[async_trait]
pub trait ApprovalAuthority: Send + Sync {
    async fn can_approve_reconciliation(&self, actor: &Actor) -> Result<bool, AppError>;
}

/// Fixed allow-list of user ids.
#[derive(Debug, Default)]
pub struct StaticApprovalAuthority {
    approvers: HashSet<String>,
}

impl StaticApprovalAuthority {
    pub fn new<I, S>(approvers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            approvers: approvers.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ApprovalAuthority for StaticApprovalAuthority {
    async fn can_approve_reconciliation(&self, actor: &Actor) -> Result<bool, AppError> {
        Ok(match actor {
            Actor::User(id) => self.approvers.contains(id),
            Actor::System(_) => false,
        })
    }
}

/// Capability check against the auth service.
pub struct HttpApprovalAuthority {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct CapabilityCheckRequest<'a> {
    user_id: &'a str,
    capability: &'a str,
}

#[derive(Deserialize)]
struct CapabilityCheckResponse {
    allowed: bool,
}

impl HttpApprovalAuthority {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Failed to build auth client: {}", e))
        })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ApprovalAuthority for HttpApprovalAuthority {
    async fn can_approve_reconciliation(&self, actor: &Actor) -> Result<bool, AppError> {
        let user_id = match actor {
            Actor::User(id) => id,
            Actor::System(_) => return Ok(false),
        };

        let url = format!("{}/capabilities/check", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&CapabilityCheckRequest {
                user_id,
                capability: APPROVE_CAPABILITY,
            })
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("Auth service unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::BadGateway(format!(
                "Auth service returned {}",
                response.status()
            )));
        }

        let body: CapabilityCheckResponse = response
            .json()
            .await
            .map_err(|e| AppError::BadGateway(format!("Invalid auth response: {}", e)))?;

        tracing::debug!(user_id = %user_id, allowed = body.allowed, "Approval capability checked");
        Ok(body.allowed)
    }
}
