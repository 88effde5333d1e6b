use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    #[default]
    Issued,
    Overdue,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Void)
    }
}

/// Read-only view of an invoice owned by the invoicing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub number: String,
    pub total: Decimal,
    #[serde(default)]
    pub paid: Decimal,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub job_ref: Option<String>,
    #[serde(default)]
    pub status: InvoiceStatus,
}

impl Invoice {
    /// Amount still owed, floored at 1 so relative comparisons never divide by zero.
    pub fn outstanding(&self) -> Decimal {
        (self.total - self.paid).max(Decimal::ONE)
    }
}
