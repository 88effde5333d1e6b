use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    SyncError,
    LowBalance,
    LargeTransaction,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyncError => "sync_error",
            Self::LowBalance => "low_balance",
            Self::LargeTransaction => "large_transaction",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "low_balance" => Self::LowBalance,
            "large_transaction" => Self::LargeTransaction,
            _ => Self::SyncError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "medium" => Self::Medium,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Low,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BankAlert {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    pub title: String,
    pub message: String,
    pub recipient_group: String,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub is_dismissed: bool,
    pub dismissed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub connection_id: Option<Uuid>,
    pub unread_only: bool,
    pub include_dismissed: bool,
}

impl AlertFilter {
    pub fn matches(&self, alert: &BankAlert) -> bool {
        self.connection_id.map_or(true, |id| alert.connection_id == id)
            && (!self.unread_only || !alert.is_read)
            && (self.include_dismissed || !alert.is_dismissed)
    }
}
