//! Bank channel capability: balance and transaction feeds for one bank.

use crate::models::{NewTransaction, TransactionType};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use service_core::retry::Retryable;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// Network failure or timeout before a response was received.
    #[error("Bank channel unreachable: {0}")]
    Unreachable(String),

    /// The channel answered with a non-success status.
    #[error("Bank channel returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed bank channel response: {0}")]
    Malformed(String),
}

impl ChannelError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "unreachable",
            Self::Api { .. } => "api_error",
            Self::Malformed(_) => "malformed",
        }
    }
}

impl Retryable for ChannelError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable(_) => true,
            Self::Api { status, .. } => {
                *status >= 500 || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            }
            Self::Malformed(_) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub available_balance: Decimal,
    /// Ledger balance when the channel reports one separately.
    #[serde(default)]
    pub ledger_balance: Option<Decimal>,
}

impl BalanceSnapshot {
    pub fn balance(&self) -> Decimal {
        self.ledger_balance.unwrap_or(self.available_balance)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelTransaction {
    #[serde(rename = "ref")]
    pub reference: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub value_date: Option<NaiveDate>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub counterparty: Option<String>,
    #[serde(default)]
    pub balance_after: Option<Decimal>,
}

impl ChannelTransaction {
    /// Normalize into an ingestible record, keeping the original payload.
    pub fn into_new(self, default_currency: &str) -> NewTransaction {
        let raw_payload = serde_json::to_value(&self).unwrap_or(serde_json::Value::Null);
        NewTransaction {
            external_ref: self.reference,
            transaction_type: self.transaction_type,
            amount: self.amount.abs(),
            currency: self
                .currency
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or_else(|| default_currency.to_string()),
            description: self.description,
            counterparty: self.counterparty,
            transaction_date: self.date,
            value_date: self.value_date,
            balance_after: self.balance_after,
            raw_payload,
        }
    }
}

#[async_trait]
pub trait BankChannel: Send + Sync {
    async fn fetch_balance(&self, token: &Secret<String>) -> Result<BalanceSnapshot, ChannelError>;

    async fn fetch_transactions(
        &self,
        token: &Secret<String>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ChannelTransaction>, ChannelError>;
}

/// REST bank gateway: `GET {base}/balance` and `GET {base}/transactions?from=&to=`.
pub struct HttpBankChannel {
    client: Client,
    base_url: String,
}

/// Gateways answer either with a bare array or with `{"transactions": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TransactionsPayload {
    List(Vec<ChannelTransaction>),
    Envelope { transactions: Vec<ChannelTransaction> },
}

impl From<TransactionsPayload> for Vec<ChannelTransaction> {
    fn from(payload: TransactionsPayload) -> Self {
        match payload {
            TransactionsPayload::List(transactions)
            | TransactionsPayload::Envelope { transactions } => transactions,
        }
    }
}

fn read_error(e: reqwest::Error) -> ChannelError {
    if e.is_decode() {
        ChannelError::Malformed(e.to_string())
    } else {
        ChannelError::Unreachable(e.to_string())
    }
}

impl HttpBankChannel {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ChannelError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChannelError::Unreachable(format!("Failed to build client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        token: &Secret<String>,
    ) -> Result<reqwest::Response, ChannelError> {
        let response = request
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| ChannelError::Unreachable(e.to_string()))?;

        let status = response.status();
        tracing::debug!(status = %status, base_url = %self.base_url, "Bank channel response");

        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(ChannelError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl BankChannel for HttpBankChannel {
    async fn fetch_balance(&self, token: &Secret<String>) -> Result<BalanceSnapshot, ChannelError> {
        let url = format!("{}/balance", self.base_url);
        self.send(self.client.get(&url), token)
            .await?
            .json::<BalanceSnapshot>()
            .await
            .map_err(read_error)
    }

    async fn fetch_transactions(
        &self,
        token: &Secret<String>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ChannelTransaction>, ChannelError> {
        let url = format!("{}/transactions", self.base_url);
        let request = self
            .client
            .get(&url)
            .query(&[("from", from.to_rfc3339()), ("to", to.to_rfc3339())]);
        let payload = self
            .send(request, token)
            .await?
            .json::<TransactionsPayload>()
            .await
            .map_err(read_error)?;
        Ok(payload.into())
    }
}

/// Channels by lowercase bank code.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, Arc<dyn BankChannel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, bank_code: &str, channel: Arc<dyn BankChannel>) -> Self {
        self.channels.insert(bank_code.to_ascii_lowercase(), channel);
        self
    }

    /// Build HTTP channels for every configured endpoint.
    pub fn from_endpoints(
        endpoints: &HashMap<String, String>,
        call_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let mut registry = Self::new();
        for (code, url) in endpoints {
            let channel = HttpBankChannel::new(url.clone(), call_timeout)?;
            registry = registry.with_channel(code, Arc::new(channel));
        }
        Ok(registry)
    }

    pub fn get(&self, bank_code: &str) -> Option<Arc<dyn BankChannel>> {
        self.channels.get(&bank_code.to_ascii_lowercase()).cloned()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_retryable() {
        let e = ChannelError::Api {
            status: 503,
            message: "down".to_string(),
        };
        assert!(e.is_retryable());
        let e = ChannelError::Api {
            status: 429,
            message: "slow down".to_string(),
        };
        assert!(e.is_retryable());
        assert!(ChannelError::Unreachable("timeout".to_string()).is_retryable());
    }

    #[test]
    fn client_errors_are_permanent() {
        let e = ChannelError::Api {
            status: 401,
            message: "bad token".to_string(),
        };
        assert!(!e.is_retryable());
        assert!(!ChannelError::Malformed("eof".to_string()).is_retryable());
    }

    #[test]
    fn channel_payload_normalizes_into_new_transaction() {
        let tx: ChannelTransaction = serde_json::from_str(
            r#"{"ref":"UTR9","date":"2024-04-02","type":"debit","amount":"-75.50","description":"Fuel"}"#,
        )
        .unwrap();
        let new = tx.into_new("INR");
        assert_eq!(new.external_ref, "UTR9");
        assert_eq!(new.transaction_type, TransactionType::Debit);
        assert_eq!(new.amount, Decimal::new(7550, 2));
        assert_eq!(new.currency, "INR");
        assert_eq!(new.raw_payload["ref"], "UTR9");
    }

    #[test]
    fn transaction_feed_accepts_array_and_envelope() {
        let item = r#"{"ref":"UTR1","date":"2024-04-02","type":"credit","amount":"10"}"#;

        let list: TransactionsPayload = serde_json::from_str(&format!("[{}]", item)).unwrap();
        let list: Vec<ChannelTransaction> = list.into();
        assert_eq!(list.len(), 1);

        let wrapped: TransactionsPayload =
            serde_json::from_str(&format!(r#"{{"transactions":[{},{}]}}"#, item, item)).unwrap();
        let wrapped: Vec<ChannelTransaction> = wrapped.into();
        assert_eq!(wrapped.len(), 2);
        assert_eq!(wrapped[0].reference, "UTR1");
    }

    #[test]
    fn registry_lookup_ignores_case() {
        struct Never;

        #[async_trait]
        impl BankChannel for Never {
            async fn fetch_balance(
                &self,
                _token: &Secret<String>,
            ) -> Result<BalanceSnapshot, ChannelError> {
                Err(ChannelError::Unreachable("never".to_string()))
            }

            async fn fetch_transactions(
                &self,
                _token: &Secret<String>,
                _from: DateTime<Utc>,
                _to: DateTime<Utc>,
            ) -> Result<Vec<ChannelTransaction>, ChannelError> {
                Ok(vec![])
            }
        }

        let registry = ChannelRegistry::new().with_channel("HDFC", Arc::new(Never));
        assert!(registry.get("hdfc").is_some());
        assert!(registry.get("icici").is_none());
    }
}
