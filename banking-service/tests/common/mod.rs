//! Common test utilities for banking-service integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use banking_service::config::{
    AlertConfig, BankingConfig, DatabaseConfig, IntegrationsConfig, StoreBackend, SyncConfig,
};
use banking_service::integrations::{
    AlertNotification, AuditEvent, AuditSink, BalanceSnapshot, BankChannel, ChannelError,
    ChannelRegistry, ChannelTransaction, NotificationSink, StaticApprovalAuthority,
    StaticCredentialStore, StaticInvoiceSource,
};
use banking_service::models::{BankConnection, Invoice, InvoiceStatus, TransactionType};
use banking_service::startup::{AppState, Application, ServiceComponents};
use banking_service::store::MemoryStore;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::Config as CommonConfig;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use uuid::Uuid;

static INIT: Once = Once::new();

pub const OPERATOR: &str = "ops-user";
pub const APPROVER: &str = "approver-1";

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,banking_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Decimal fields are serialized as strings.
pub fn json_dec(value: &Value) -> Decimal {
    dec(value.as_str().expect("decimal serialized as string"))
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[derive(Debug, Clone, Copy)]
pub enum FakeFailure {
    Unreachable,
    Status(u16),
}

impl FakeFailure {
    fn to_error(self) -> ChannelError {
        match self {
            Self::Unreachable => ChannelError::Unreachable("connection refused".to_string()),
            Self::Status(status) => ChannelError::Api {
                status,
                message: "fake bank error".to_string(),
            },
        }
    }
}

#[derive(Default)]
struct FakeBankState {
    balance: Decimal,
    transactions: Vec<ChannelTransaction>,
    delay: Option<Duration>,
    balance_failure: Option<FakeFailure>,
    transactions_failure: Option<FakeFailure>,
}

/// Scriptable bank channel.
#[derive(Default)]
pub struct FakeBank {
    state: Mutex<FakeBankState>,
    pub balance_calls: AtomicUsize,
    pub transaction_calls: AtomicUsize,
}

impl FakeBank {
    pub fn set_balance(&self, balance: &str) {
        self.state.lock().unwrap().balance = dec(balance);
    }

    pub fn push_transaction(&self, tx: ChannelTransaction) {
        self.state.lock().unwrap().transactions.push(tx);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn fail_balance(&self, failure: FakeFailure) {
        self.state.lock().unwrap().balance_failure = Some(failure);
    }

    pub fn fail_transactions(&self, failure: FakeFailure) {
        self.state.lock().unwrap().transactions_failure = Some(failure);
    }

    pub fn heal(&self) {
        let mut state = self.state.lock().unwrap();
        state.delay = None;
        state.balance_failure = None;
        state.transactions_failure = None;
    }
}

#[async_trait]
impl BankChannel for FakeBank {
    async fn fetch_balance(&self, _token: &Secret<String>) -> Result<BalanceSnapshot, ChannelError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        let (delay, failure, balance) = {
            let state = self.state.lock().unwrap();
            (state.delay, state.balance_failure, state.balance)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = failure {
            return Err(failure.to_error());
        }
        Ok(BalanceSnapshot {
            available_balance: balance,
            ledger_balance: None,
        })
    }

    async fn fetch_transactions(
        &self,
        _token: &Secret<String>,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<ChannelTransaction>, ChannelError> {
        self.transaction_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if let Some(failure) = state.transactions_failure {
            return Err(failure.to_error());
        }
        Ok(state.transactions.clone())
    }
}

pub fn channel_tx(reference: &str, kind: TransactionType, amount: &str, description: &str) -> ChannelTransaction {
    channel_tx_on(reference, kind, amount, description, today())
}

pub fn channel_tx_on(
    reference: &str,
    kind: TransactionType,
    amount: &str,
    description: &str,
    date: NaiveDate,
) -> ChannelTransaction {
    ChannelTransaction {
        reference: reference.to_string(),
        date,
        value_date: None,
        transaction_type: kind,
        amount: dec(amount),
        currency: None,
        description: description.to_string(),
        counterparty: Some("Acme Logistics".to_string()),
        balance_after: None,
    }
}

pub fn invoice(number: &str, total: &str, due_date: NaiveDate) -> Invoice {
    Invoice {
        id: Uuid::new_v4(),
        number: number.to_string(),
        total: dec(total),
        paid: Decimal::ZERO,
        due_date,
        job_ref: None,
        status: InvoiceStatus::Issued,
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<AlertNotification>>,
    unavailable: AtomicBool,
}

impl RecordingNotifier {
    /// Reject every delivery until further notice.
    pub fn go_down(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, notification: &AlertNotification) -> anyhow::Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            anyhow::bail!("notification-service unavailable");
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAudit {
    pub events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAudit {
    pub fn actions(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn record(&self, event: &AuditEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub fn test_sync_config() -> SyncConfig {
    SyncConfig {
        interval: Duration::from_secs(3600),
        max_concurrency: 4,
        call_timeout: Duration::from_millis(100),
        attempt_timeout: Duration::from_millis(500),
        max_retries: 1,
        initial_backoff: Duration::from_millis(1),
        lookback: chrono::Duration::days(1),
        lease: Duration::from_secs(60),
        scheduler_enabled: false,
    }
}

fn test_config() -> BankingConfig {
    BankingConfig {
        common: CommonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        service_name: "banking-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        store: StoreBackend::Memory,
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 1,
        },
        sync: test_sync_config(),
        alerts: AlertConfig::default(),
        integrations: IntegrationsConfig {
            approver_ids: vec![APPROVER.to_string()],
            ..Default::default()
        },
    }
}

/// Test application wrapper. `hdfc` and `icici` have fake channels; any other bank code has
/// none.
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub invoices: Arc<StaticInvoiceSource>,
    pub hdfc: Arc<FakeBank>,
    pub icici: Arc<FakeBank>,
    pub notifier: Arc<RecordingNotifier>,
    pub audit: Arc<RecordingAudit>,
}

pub async fn spawn_app() -> TestApp {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let invoices = Arc::new(StaticInvoiceSource::new(Vec::new()));
    let hdfc = Arc::new(FakeBank::default());
    let icici = Arc::new(FakeBank::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let audit = Arc::new(RecordingAudit::default());

    let components = ServiceComponents {
        store: store.clone(),
        channels: ChannelRegistry::new()
            .with_channel("hdfc", hdfc.clone())
            .with_channel("icici", icici.clone()),
        credentials: Arc::new(StaticCredentialStore::new().with_fallback("test-token")),
        invoices: invoices.clone(),
        approvals: Arc::new(StaticApprovalAuthority::new([APPROVER])),
        audit_sink: audit.clone(),
        notifier: notifier.clone(),
    };

    let app = Application::build_with_components(test_config(), components)
        .await
        .expect("Failed to build application");

    let address = format!("http://127.0.0.1:{}", app.port());
    let state = app.state().clone();

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    TestApp {
        address,
        client: reqwest::Client::new(),
        state,
        store,
        invoices,
        hdfc,
        icici,
        notifier,
        audit,
    }
}

impl TestApp {
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_as(&self, user: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .header("x-user-id", user)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.post_as(OPERATOR, path, body).await
    }

    /// Register a connection through the API and return it from the store.
    pub async fn register_connection(&self, bank_code: &str, account_number: &str) -> BankConnection {
        let response = self
            .post(
                "/connections",
                json!({
                    "bank_code": bank_code,
                    "account_number": account_number,
                    "currency": "INR",
                    "display_name": format!("{} operating", bank_code),
                }),
            )
            .await;
        assert_eq!(response.status(), 201);
        let body: Value = response.json().await.unwrap();
        let id = Uuid::parse_str(body["id"].as_str().unwrap()).unwrap();
        self.state.connections.get(id).await.unwrap()
    }
}
