use crate::models::{MatchStatus, TransactionFilter};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MatchTransactionRequest {
    #[validate(
        length(min = 1, max = 100, message = "Invoice reference must be 1-100 characters"),
        custom(function = "super::not_blank")
    )]
    pub invoice_ref: String,

    #[validate(length(max = 1000, message = "Notes are too long"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReverseTransactionRequest {
    #[validate(
        length(min = 1, max = 500, message = "A reversal reason is required"),
        custom(function = "super::not_blank")
    )]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTransactionsQuery {
    pub connection_id: Option<Uuid>,
    pub match_status: Option<MatchStatus>,
    pub reconciled: Option<bool>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<i64>,
}

impl From<ListTransactionsQuery> for TransactionFilter {
    fn from(q: ListTransactionsQuery) -> Self {
        Self {
            connection_id: q.connection_id,
            match_status: q.match_status,
            reconciled: q.reconciled,
            from: q.from,
            to: q.to,
            limit: q.limit.map(|l| l.clamp(1, 1000)),
        }
    }
}
