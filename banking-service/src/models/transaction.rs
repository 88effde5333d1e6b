use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    #[serde(alias = "CREDIT", alias = "Credit", alias = "cr")]
    Credit,
    #[serde(alias = "DEBIT", alias = "Debit", alias = "dr")]
    Debit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "debit" => Self::Debit,
            _ => Self::Credit,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Credit => Self::Debit,
            Self::Debit => Self::Credit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Unmatched,
    Partial,
    Matched,
    Manual,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unmatched => "unmatched",
            Self::Partial => "partial",
            Self::Matched => "matched",
            Self::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "partial" => Self::Partial,
            "matched" => Self::Matched,
            "manual" => Self::Manual,
            _ => Self::Unmatched,
        }
    }

    /// Counted as matched when a reconciliation session is completed.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Matched | Self::Manual)
    }
}

/// A single debit or credit ingested from a bank channel.
///
/// `amount` is always a non-negative magnitude; direction lives in `transaction_type`.
#[derive(Debug, Clone, Serialize)]
pub struct BankTransaction {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub external_ref: String,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub counterparty: Option<String>,
    pub transaction_date: NaiveDate,
    pub value_date: Option<NaiveDate>,
    pub balance_after: Option<Decimal>,
    pub match_status: MatchStatus,
    pub match_confidence: i32,
    pub matched_invoice_ref: Option<String>,
    pub match_notes: Option<String>,
    pub reconciled: bool,
    pub reconciled_by: Option<String>,
    pub reconciled_at: Option<DateTime<Utc>>,
    pub raw_payload: serde_json::Value,
    pub reverses_transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Transaction data as normalized from a channel feed, before it has an identity.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub external_ref: String,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub counterparty: Option<String>,
    pub transaction_date: NaiveDate,
    pub value_date: Option<NaiveDate>,
    pub balance_after: Option<Decimal>,
    pub raw_payload: serde_json::Value,
}

impl BankTransaction {
    pub fn from_new(connection_id: Uuid, new: NewTransaction) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection_id,
            external_ref: new.external_ref,
            transaction_type: new.transaction_type,
            amount: new.amount.abs(),
            currency: new.currency,
            description: new.description,
            counterparty: new.counterparty,
            transaction_date: new.transaction_date,
            value_date: new.value_date,
            balance_after: new.balance_after,
            match_status: MatchStatus::Unmatched,
            match_confidence: 0,
            matched_invoice_ref: None,
            match_notes: None,
            reconciled: false,
            reconciled_by: None,
            reconciled_at: None,
            raw_payload: new.raw_payload,
            reverses_transaction_id: None,
            created_at: Utc::now(),
        }
    }

    /// Build the correcting entry for this transaction: same amount, opposite direction.
    pub fn reversal(&self, reason: &str) -> Self {
        let mut reversal = Self::from_new(
            self.connection_id,
            NewTransaction {
                external_ref: Self::reversal_ref(&self.external_ref),
                transaction_type: self.transaction_type.opposite(),
                amount: self.amount,
                currency: self.currency.clone(),
                description: format!("Reversal of {}: {}", self.external_ref, reason),
                counterparty: self.counterparty.clone(),
                transaction_date: Utc::now().date_naive(),
                value_date: None,
                balance_after: None,
                raw_payload: serde_json::json!({ "reversal_reason": reason }),
            },
        );
        reversal.reverses_transaction_id = Some(self.id);
        reversal
    }

    pub fn reversal_ref(external_ref: &str) -> String {
        format!("{}:reversal", external_ref)
    }

    /// Signed amount: credits positive, debits negative.
    pub fn signed_amount(&self) -> Decimal {
        match self.transaction_type {
            TransactionType::Credit => self.amount,
            TransactionType::Debit => -self.amount,
        }
    }

    /// Eligible for the auto-matcher. Reversal entries are corrections, never receipts.
    pub fn is_match_candidate(&self) -> bool {
        self.match_status == MatchStatus::Unmatched
            && self.transaction_type == TransactionType::Credit
            && !self.reconciled
            && self.reverses_transaction_id.is_none()
    }
}

/// Outcome of scoring a transaction against open invoices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchAssignment {
    pub status: MatchStatus,
    pub confidence: i32,
    pub invoice_ref: String,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub connection_id: Option<Uuid>,
    pub match_status: Option<MatchStatus>,
    pub reconciled: Option<bool>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<i64>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &BankTransaction) -> bool {
        self.connection_id.map_or(true, |id| tx.connection_id == id)
            && self.match_status.map_or(true, |s| tx.match_status == s)
            && self.reconciled.map_or(true, |r| tx.reconciled == r)
            && self.from.map_or(true, |d| tx.transaction_date >= d)
            && self.to.map_or(true, |d| tx.transaction_date <= d)
    }
}
