//! Outbound alert notifications. Delivery itself belongs to the notification service.

use crate::models::BankAlert;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct AlertNotification {
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub priority: String,
    pub recipient_group: String,
    pub reference_type: String,
    pub reference_id: String,
    pub metadata: serde_json::Value,
}

impl From<&BankAlert> for AlertNotification {
    fn from(alert: &BankAlert) -> Self {
        let (reference_type, reference_id) = match alert.transaction_id {
            Some(tx) => ("bank_transaction", tx.to_string()),
            None => ("bank_connection", alert.connection_id.to_string()),
        };
        Self {
            title: alert.title.clone(),
            message: alert.message.clone(),
            alert_type: alert.alert_type.as_str().to_string(),
            priority: alert.priority.as_str().to_string(),
            recipient_group: alert.recipient_group.clone(),
            reference_type: reference_type.to_string(),
            reference_id,
            metadata: serde_json::json!({
                "alert_id": alert.id,
                "connection_id": alert.connection_id,
                "amount": alert.amount,
                "currency": alert.currency,
            }),
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &AlertNotification) -> anyhow::Result<()>;
}

/// Writes notifications to the structured log only.
#[derive(Debug, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, notification: &AlertNotification) -> anyhow::Result<()> {
        tracing::info!(
            title = %notification.title,
            alert_type = %notification.alert_type,
            priority = %notification.priority,
            recipient_group = %notification.recipient_group,
            reference_type = %notification.reference_type,
            reference_id = %notification.reference_id,
            "Alert notification"
        );
        Ok(())
    }
}

/// `POST {base}/notifications`.
pub struct HttpNotificationSink {
    client: Client,
    base_url: String,
}

impl HttpNotificationSink {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl NotificationSink for HttpNotificationSink {
    async fn notify(&self, notification: &AlertNotification) -> anyhow::Result<()> {
        let url = format!("{}/notifications", self.base_url);
        let response = self.client.post(&url).json(notification).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Notification service returned {}", response.status());
        }
        Ok(())
    }
}
