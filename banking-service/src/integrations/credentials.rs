//! Account token resolution, delegated to a secret store.

use crate::models::BankConnection;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::error::AppError;
use std::collections::HashMap;
use std::time::Duration;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` when no token is provisioned for this account.
    async fn account_token(
        &self,
        connection: &BankConnection,
    ) -> Result<Option<Secret<String>>, AppError>;
}

/// Tokens held in process, keyed by `(bank_code, account_number)`.
#[derive(Default)]
pub struct StaticCredentialStore {
    tokens: HashMap<(String, String), Secret<String>>,
    fallback: Option<Secret<String>>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, bank_code: &str, account_number: &str, token: &str) -> Self {
        self.tokens.insert(
            (bank_code.to_ascii_lowercase(), account_number.to_string()),
            Secret::new(token.to_string()),
        );
        self
    }

    /// Token handed out for accounts without a specific entry.
    pub fn with_fallback(mut self, token: &str) -> Self {
        self.fallback = Some(Secret::new(token.to_string()));
        self
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn account_token(
        &self,
        connection: &BankConnection,
    ) -> Result<Option<Secret<String>>, AppError> {
        let key = (
            connection.bank_code.to_ascii_lowercase(),
            connection.account_number.clone(),
        );
        Ok(self
            .tokens
            .get(&key)
            .or(self.fallback.as_ref())
            .cloned())
    }
}

/// HTTP secret store: `GET {base}/v1/bank-credentials/{bank_code}/{account_number}`.
pub struct VaultCredentialStore {
    client: Client,
    base_url: String,
    token: Option<Secret<String>>,
}

#[derive(Deserialize)]
struct CredentialResponse {
    token: String,
}

impl VaultCredentialStore {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<Secret<String>>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Failed to build vault client: {}", e))
        })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl CredentialStore for VaultCredentialStore {
    async fn account_token(
        &self,
        connection: &BankConnection,
    ) -> Result<Option<Secret<String>>, AppError> {
        let url = format!(
            "{}/v1/bank-credentials/{}/{}",
            self.base_url, connection.bank_code, connection.account_number
        );

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            AppError::BadGateway(format!("Credential vault unreachable: {}", e))
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: CredentialResponse = response.json().await.map_err(|e| {
                    AppError::BadGateway(format!("Invalid credential vault response: {}", e))
                })?;
                Ok(Some(Secret::new(body.token)))
            }
            status => Err(AppError::BadGateway(format!(
                "Credential vault returned {}",
                status
            ))),
        }
    }
}
