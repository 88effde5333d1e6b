//! Append-only audit records for every state-changing operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub actor: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, event: &AuditEvent) -> anyhow::Result<()> {
        tracing::info!(
            target: "audit",
            actor = %event.actor,
            action = %event.action,
            resource_type = %event.resource_type,
            resource_id = %event.resource_id,
            before = %event.before.clone().unwrap_or_default(),
            after = %event.after.clone().unwrap_or_default(),
            "Audit event"
        );
        Ok(())
    }
}

/// `POST {base}/audit-events`.
pub struct HttpAuditSink {
    client: Client,
    base_url: String,
}

impl HttpAuditSink {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    async fn record(&self, event: &AuditEvent) -> anyhow::Result<()> {
        let url = format!("{}/audit-events", self.base_url);
        let response = self.client.post(&url).json(event).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Audit service returned {}", response.status());
        }
        Ok(())
    }
}
