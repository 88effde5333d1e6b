//! Configuration module for banking-service.

use rust_decimal::Decimal;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BankingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store: StoreBackend,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub alerts: AlertConfig,
    pub integrations: IntegrationsConfig,
}

/// Which persistence backend the service runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "Unknown STORE_BACKEND '{}' (expected postgres or memory)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Period between scheduled sync cycles.
    pub interval: Duration,
    /// Connections synchronized in parallel within one cycle.
    pub max_concurrency: usize,
    /// Bound on a single bank channel call.
    pub call_timeout: Duration,
    /// Bound on one whole attempt (balance + transactions).
    pub attempt_timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    /// Window used on the first sync of a connection.
    pub lookback: chrono::Duration,
    /// A `syncing` stamp older than this is considered abandoned.
    pub lease: Duration,
    pub scheduler_enabled: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30 * 60),
            max_concurrency: 4,
            call_timeout: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(120),
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
            lookback: chrono::Duration::days(1),
            lease: Duration::from_secs(15 * 60),
            scheduler_enabled: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub low_balance_threshold: Decimal,
    pub large_transaction_threshold: Decimal,
    pub recipient_groups: Vec<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            low_balance_threshold: Decimal::new(10_000, 0),
            large_transaction_threshold: Decimal::new(1_000_000, 0),
            recipient_groups: vec!["finance".to_string()],
        }
    }
}

/// Endpoints of the collaborators this service talks to. Empty means "not configured".
#[derive(Debug, Clone, Default)]
pub struct IntegrationsConfig {
    /// Bank code (lowercase) to channel base URL.
    pub bank_channels: HashMap<String, String>,
    pub credential_vault_url: String,
    pub credential_vault_token: Option<Secret<String>>,
    pub invoice_service_url: String,
    pub auth_service_url: String,
    pub notification_service_url: String,
    pub audit_service_url: String,
    /// Static approvers used when no auth service is configured.
    pub approver_ids: Vec<String>,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|s| parse_list(&s))
        .unwrap_or_default()
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `code=url,code=url` into a lookup keyed by lowercase bank code.
pub fn parse_bank_channels(raw: &str) -> Result<HashMap<String, String>, AppError> {
    let mut channels = HashMap::new();
    for entry in parse_list(raw) {
        let (code, url) = entry.split_once('=').ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!(
                "Invalid BANK_CHANNELS entry '{}' (expected code=url)",
                entry
            ))
        })?;
        channels.insert(
            code.trim().to_ascii_lowercase(),
            url.trim().trim_end_matches('/').to_string(),
        );
    }
    Ok(channels)
}

fn env_decimal(key: &str, default: Decimal) -> Result<Decimal, AppError> {
    match env::var(key) {
        Ok(raw) => Decimal::from_str(raw.trim())
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}

impl BankingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let store = StoreBackend::parse(
            &env::var("STORE_BACKEND").unwrap_or_else(|_| "postgres".to_string()),
        )?;

        let database_url = match (store, env::var("DATABASE_URL")) {
            (_, Ok(url)) => url,
            (StoreBackend::Memory, Err(_)) => String::new(),
            (StoreBackend::Postgres, Err(_)) => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "DATABASE_URL is required"
                )))
            }
        };

        let sync_defaults = SyncConfig::default();
        let sync = SyncConfig {
            interval: Duration::from_secs(env_parse(
                "SYNC_INTERVAL_SECS",
                sync_defaults.interval.as_secs(),
            )),
            max_concurrency: env_parse("SYNC_MAX_CONCURRENCY", sync_defaults.max_concurrency)
                .max(1),
            call_timeout: Duration::from_secs(env_parse(
                "SYNC_CALL_TIMEOUT_SECS",
                sync_defaults.call_timeout.as_secs(),
            )),
            attempt_timeout: Duration::from_secs(env_parse(
                "SYNC_ATTEMPT_TIMEOUT_SECS",
                sync_defaults.attempt_timeout.as_secs(),
            )),
            max_retries: env_parse("SYNC_MAX_RETRIES", sync_defaults.max_retries),
            initial_backoff: Duration::from_millis(env_parse(
                "SYNC_INITIAL_BACKOFF_MS",
                sync_defaults.initial_backoff.as_millis() as u64,
            )),
            lookback: chrono::Duration::days(env_parse("SYNC_LOOKBACK_DAYS", 1)),
            lease: Duration::from_secs(env_parse(
                "SYNC_LEASE_SECS",
                sync_defaults.lease.as_secs(),
            )),
            scheduler_enabled: env_parse("SYNC_SCHEDULER_ENABLED", true),
        };

        let alert_defaults = AlertConfig::default();
        let recipient_groups = env_list("ALERT_RECIPIENT_GROUPS");
        let alerts = AlertConfig {
            low_balance_threshold: env_decimal(
                "LOW_BALANCE_THRESHOLD",
                alert_defaults.low_balance_threshold,
            )?,
            large_transaction_threshold: env_decimal(
                "LARGE_TRANSACTION_THRESHOLD",
                alert_defaults.large_transaction_threshold,
            )?,
            recipient_groups: if recipient_groups.is_empty() {
                alert_defaults.recipient_groups
            } else {
                recipient_groups
            },
        };

        let integrations = IntegrationsConfig {
            bank_channels: parse_bank_channels(&env::var("BANK_CHANNELS").unwrap_or_default())?,
            credential_vault_url: env::var("CREDENTIAL_VAULT_URL").unwrap_or_default(),
            credential_vault_token: env::var("CREDENTIAL_VAULT_TOKEN").ok().map(Secret::new),
            invoice_service_url: env::var("INVOICE_SERVICE_URL")
                .unwrap_or_else(|_| "http://invoicing-service:3000".to_string()),
            auth_service_url: env::var("AUTH_SERVICE_URL").unwrap_or_default(),
            notification_service_url: env::var("NOTIFICATION_SERVICE_URL").unwrap_or_default(),
            audit_service_url: env::var("AUDIT_SERVICE_URL").unwrap_or_default(),
            approver_ids: env_list("APPROVER_IDS"),
        };

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "banking-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            store,
            database: DatabaseConfig {
                url: database_url,
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: env_parse("DATABASE_MIN_CONNECTIONS", 2),
            },
            sync,
            alerts,
            integrations,
        })
    }
}
