use crate::models::{AccountType, NewConnection};
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterConnectionRequest {
    #[validate(
        length(min = 1, max = 32, message = "Bank code must be 1-32 characters"),
        custom(function = "super::not_blank")
    )]
    pub bank_code: String,

    #[validate(
        length(min = 1, max = 64, message = "Account number must be 1-64 characters"),
        custom(function = "super::not_blank")
    )]
    pub account_number: String,

    #[validate(length(equal = 3, message = "Currency must be an ISO 4217 code"))]
    pub currency: String,

    #[validate(length(max = 200))]
    pub display_name: Option<String>,

    #[serde(default)]
    pub account_type: AccountType,
}

impl From<RegisterConnectionRequest> for NewConnection {
    fn from(req: RegisterConnectionRequest) -> Self {
        let display_name = req
            .display_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{} {}", req.bank_code.to_uppercase(), req.account_number));
        Self {
            bank_code: req.bank_code.trim().to_string(),
            display_name,
            account_number: req.account_number.trim().to_string(),
            account_type: req.account_type,
            currency: req.currency,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OverrideBalanceRequest {
    pub balance: Decimal,
    pub available_balance: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListConnectionsQuery {
    #[serde(default)]
    pub active_only: bool,
}
