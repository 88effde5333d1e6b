use crate::models::NewSession;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_period", skip_on_field_errors = false))]
pub struct CreateSessionRequest {
    pub connection_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub bank_opening_balance: Decimal,
    pub bank_closing_balance: Decimal,
    pub book_opening_balance: Decimal,
    pub book_closing_balance: Decimal,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

fn validate_period(req: &CreateSessionRequest) -> Result<(), ValidationError> {
    if req.period_end < req.period_start {
        let mut err = ValidationError::new("period");
        err.message = Some("period_end must not be before period_start".into());
        return Err(err);
    }
    Ok(())
}

impl From<CreateSessionRequest> for NewSession {
    fn from(req: CreateSessionRequest) -> Self {
        Self {
            connection_id: req.connection_id,
            period_start: req.period_start,
            period_end: req.period_end,
            bank_opening_balance: req.bank_opening_balance,
            bank_closing_balance: req.bank_closing_balance,
            book_opening_balance: req.book_opening_balance,
            book_closing_balance: req.book_closing_balance,
            notes: req.notes,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CompleteSessionRequest {
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListSessionsQuery {
    pub connection_id: Option<Uuid>,
}
