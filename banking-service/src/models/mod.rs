//! Domain models for banking-service.

#![allow(clippy::should_implement_trait)]

pub mod actor;
pub mod alert;
pub mod connection;
pub mod invoice;
pub mod session;
pub mod transaction;

pub use actor::Actor;
pub use alert::{AlertFilter, AlertPriority, AlertType, BankAlert};
pub use connection::{AccountType, BankConnection, NewConnection, SyncStatus};
pub use invoice::{Invoice, InvoiceStatus};
pub use session::{
    NewSession, ReconciliationSession, SessionStatus, SessionSummary, SessionTransition,
};
pub use transaction::{
    BankTransaction, MatchAssignment, MatchStatus, NewTransaction, TransactionFilter,
    TransactionType,
};
