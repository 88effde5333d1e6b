//! Read access to open invoices owned by the invoicing service.

use crate::models::Invoice;
use async_trait::async_trait;
use reqwest::Client;
use service_core::error::AppError;
use std::time::Duration;
use tokio::sync::RwLock;

#[async_trait]
pub trait InvoiceSource: Send + Sync {
    async fn list_open_invoices(&self) -> Result<Vec<Invoice>, AppError>;
}

/// `GET {base}/invoices?status=open`.
pub struct HttpInvoiceSource {
    client: Client,
    base_url: String,
}

impl HttpInvoiceSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Failed to build invoice client: {}", e))
        })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl InvoiceSource for HttpInvoiceSource {
    async fn list_open_invoices(&self) -> Result<Vec<Invoice>, AppError> {
        let url = format!("{}/invoices", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("status", "open")])
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("Invoice service unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::BadGateway(format!(
                "Invoice service returned {}: {}",
                status, body
            )));
        }

        response
            .json::<Vec<Invoice>>()
            .await
            .map_err(|e| AppError::BadGateway(format!("Invalid invoice payload: {}", e)))
    }
}

/// In-process invoice list, replaceable at runtime.
#[derive(Default)]
pub struct StaticInvoiceSource {
    invoices: RwLock<Vec<Invoice>>,
}

impl StaticInvoiceSource {
    pub fn new(invoices: Vec<Invoice>) -> Self {
        Self {
            invoices: RwLock::new(invoices),
        }
    }

    pub async fn replace(&self, invoices: Vec<Invoice>) {
        *self.invoices.write().await = invoices;
    }
}

#[async_trait]
impl InvoiceSource for StaticInvoiceSource {
    async fn list_open_invoices(&self) -> Result<Vec<Invoice>, AppError> {
        Ok(self.invoices.read().await.clone())
    }
}
