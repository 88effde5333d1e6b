//! Persistence for connections, transactions, sessions and alerts.
//!
//! Every operation that guards a state transition does so atomically inside the store,
//! so concurrent callers observe either the old or the new record, never a mix.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::models::{
    AlertFilter, BankAlert, BankConnection, BankTransaction, MatchAssignment, NewTransaction,
    ReconciliationSession, SessionTransition, TransactionFilter,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::time::Duration;
use uuid::Uuid;

/// Everything a successful sync attempt writes, applied all-or-nothing.
#[derive(Debug, Clone)]
pub struct SyncCommit {
    pub balance: Decimal,
    pub available_balance: Decimal,
    pub synced_at: DateTime<Utc>,
    pub transactions: Vec<NewTransaction>,
}

#[derive(Debug, Clone)]
pub struct SyncCommitResult {
    pub before: BankConnection,
    pub after: BankConnection,
    /// Newly stored rows; duplicates of existing external references are not included.
    pub inserted: Vec<BankTransaction>,
    pub skipped: usize,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    // Connections

    /// `Conflict` when the account is already registered for the bank.
    async fn insert_connection(&self, connection: &BankConnection)
        -> Result<BankConnection, AppError>;

    async fn get_connection(&self, id: Uuid) -> Result<Option<BankConnection>, AppError>;

    async fn list_connections(&self, active_only: bool) -> Result<Vec<BankConnection>, AppError>;

    /// `Conflict` when the connection is already inactive.
    async fn deactivate_connection(&self, id: Uuid) -> Result<BankConnection, AppError>;

    async fn override_balance(
        &self,
        id: Uuid,
        balance: Decimal,
        available_balance: Option<Decimal>,
    ) -> Result<BankConnection, AppError>;

    /// Move an active connection to `syncing` unless another attempt holds an unexpired
    /// lease. Returns `None` when the guard could not be taken or the id is unknown.
    async fn try_begin_sync(
        &self,
        id: Uuid,
        lease: Duration,
    ) -> Result<Option<BankConnection>, AppError>;

    async fn commit_sync(&self, id: Uuid, commit: SyncCommit)
        -> Result<SyncCommitResult, AppError>;

    async fn record_sync_failure(&self, id: Uuid, message: &str)
        -> Result<BankConnection, AppError>;

    // Transactions

    async fn get_transaction(&self, id: Uuid) -> Result<Option<BankTransaction>, AppError>;

    /// Ordered by transaction date, then creation time.
    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<BankTransaction>, AppError>;

    /// Unmatched, unreconciled credits in a stable order.
    async fn list_match_candidates(&self) -> Result<Vec<BankTransaction>, AppError>;

    /// Applies only while the row is still unmatched and unreconciled.
    async fn apply_auto_match(
        &self,
        id: Uuid,
        assignment: &MatchAssignment,
    ) -> Result<Option<BankTransaction>, AppError>;

    /// `NotFound` or `Conflict` (reconciled).
    async fn apply_manual_match(
        &self,
        id: Uuid,
        invoice_ref: &str,
        notes: Option<&str>,
    ) -> Result<BankTransaction, AppError>;

    /// `NotFound` or `Conflict` (already reconciled).
    async fn mark_reconciled(
        &self,
        id: Uuid,
        reconciled_by: &str,
        at: DateTime<Utc>,
    ) -> Result<BankTransaction, AppError>;

    /// `Conflict` when a reversal with the same external reference exists.
    async fn insert_reversal(&self, reversal: &BankTransaction)
        -> Result<BankTransaction, AppError>;

    // Reconciliation sessions

    async fn insert_session(
        &self,
        session: &ReconciliationSession,
    ) -> Result<ReconciliationSession, AppError>;

    async fn get_session(&self, id: Uuid) -> Result<Option<ReconciliationSession>, AppError>;

    async fn list_sessions(
        &self,
        connection_id: Option<Uuid>,
    ) -> Result<Vec<ReconciliationSession>, AppError>;

    /// `NotFound`, or `InvalidState` naming the current status when the transition is not
    /// allowed from it.
    async fn transition_session(
        &self,
        id: Uuid,
        transition: &SessionTransition,
    ) -> Result<ReconciliationSession, AppError>;

    // Alerts

    async fn insert_alert(&self, alert: &BankAlert) -> Result<BankAlert, AppError>;

    async fn get_alert(&self, id: Uuid) -> Result<Option<BankAlert>, AppError>;

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<BankAlert>, AppError>;

    /// `NotFound` or `Conflict` (dismissed).
    async fn mark_alert_read(&self, id: Uuid, at: DateTime<Utc>) -> Result<BankAlert, AppError>;

    /// `NotFound` or `Conflict` (already dismissed).
    async fn dismiss_alert(&self, id: Uuid, at: DateTime<Utc>) -> Result<BankAlert, AppError>;
}

pub(crate) fn not_found(kind: &str, id: Uuid) -> AppError {
    AppError::NotFound(anyhow::anyhow!("{} {} not found", kind, id))
}

pub(crate) fn invalid_transition(
    transition: &SessionTransition,
    current: crate::models::SessionStatus,
) -> AppError {
    AppError::InvalidState(anyhow::anyhow!(
        "Cannot {} a session in status '{}'",
        transition.name(),
        current.as_str()
    ))
}
