use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Syncing,
    Synced,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "syncing" => Self::Syncing,
            "synced" => Self::Synced,
            "error" => Self::Error,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    #[default]
    Current,
    Savings,
    CreditCard,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Savings => "savings",
            Self::CreditCard => "credit_card",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "savings" => Self::Savings,
            "credit_card" => Self::CreditCard,
            _ => Self::Current,
        }
    }
}

/// A registered external bank account under synchronization.
#[derive(Debug, Clone, Serialize)]
pub struct BankConnection {
    pub id: Uuid,
    pub bank_code: String,
    pub display_name: String,
    pub account_number: String,
    pub account_type: AccountType,
    pub currency: String,
    /// `None` until the first successful sync or manual override.
    pub balance: Option<Decimal>,
    pub available_balance: Option<Decimal>,
    pub sync_status: SyncStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_started_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewConnection {
    pub bank_code: String,
    pub display_name: String,
    pub account_number: String,
    pub account_type: AccountType,
    pub currency: String,
}

impl BankConnection {
    pub fn new(new: NewConnection) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            bank_code: new.bank_code.to_ascii_lowercase(),
            display_name: new.display_name,
            account_number: new.account_number,
            account_type: new.account_type,
            currency: new.currency.to_ascii_uppercase(),
            balance: None,
            available_balance: None,
            sync_status: SyncStatus::Pending,
            last_sync_at: None,
            sync_started_at: None,
            error_message: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a `syncing` stamp should still block another sync attempt.
    pub fn sync_in_flight(&self, now: DateTime<Utc>, lease: chrono::Duration) -> bool {
        self.sync_status == SyncStatus::Syncing
            && self
                .sync_started_at
                .map(|started| now - started < lease)
                .unwrap_or(false)
    }
}
