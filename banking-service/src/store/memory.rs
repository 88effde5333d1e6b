//! In-process store used by development setups and the test suite.

use super::{invalid_transition, not_found, Store, SyncCommit, SyncCommitResult};
use crate::models::{
    AlertFilter, BankAlert, BankConnection, BankTransaction, MatchAssignment, MatchStatus,
    ReconciliationSession, SyncStatus, TransactionFilter,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    connections: HashMap<Uuid, BankConnection>,
    transactions: HashMap<Uuid, BankTransaction>,
    /// Idempotency index: (connection_id, external_ref).
    external_refs: HashSet<(Uuid, String)>,
    sessions: HashMap<Uuid, ReconciliationSession>,
    alerts: HashMap<Uuid, BankAlert>,
}

impl State {
    fn connection_mut(&mut self, id: Uuid) -> Result<&mut BankConnection, AppError> {
        self.connections
            .get_mut(&id)
            .ok_or_else(|| not_found("Connection", id))
    }

    fn transaction_mut(&mut self, id: Uuid) -> Result<&mut BankTransaction, AppError> {
        self.transactions
            .get_mut(&id)
            .ok_or_else(|| not_found("Transaction", id))
    }

    fn alert_mut(&mut self, id: Uuid) -> Result<&mut BankAlert, AppError> {
        self.alerts
            .get_mut(&id)
            .ok_or_else(|| not_found("Alert", id))
    }
}

/// All record sets behind one lock, so each operation is atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_transactions(mut rows: Vec<BankTransaction>) -> Vec<BankTransaction> {
    rows.sort_by(|a, b| {
        a.transaction_date
            .cmp(&b.transaction_date)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
    rows
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn insert_connection(
        &self,
        connection: &BankConnection,
    ) -> Result<BankConnection, AppError> {
        let mut state = self.state.write().await;
        let duplicate = state.connections.values().any(|c| {
            c.bank_code == connection.bank_code && c.account_number == connection.account_number
        });
        if duplicate {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Account {} is already registered for bank '{}'",
                connection.account_number,
                connection.bank_code
            )));
        }
        state
            .connections
            .insert(connection.id, connection.clone());
        Ok(connection.clone())
    }

    async fn get_connection(&self, id: Uuid) -> Result<Option<BankConnection>, AppError> {
        Ok(self.state.read().await.connections.get(&id).cloned())
    }

    async fn list_connections(&self, active_only: bool) -> Result<Vec<BankConnection>, AppError> {
        let state = self.state.read().await;
        let mut rows: Vec<BankConnection> = state
            .connections
            .values()
            .filter(|c| !active_only || c.is_active)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn deactivate_connection(&self, id: Uuid) -> Result<BankConnection, AppError> {
        let mut state = self.state.write().await;
        let connection = state.connection_mut(id)?;
        if !connection.is_active {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Connection {} is already inactive",
                id
            )));
        }
        connection.is_active = false;
        connection.updated_at = Utc::now();
        Ok(connection.clone())
    }

    async fn override_balance(
        &self,
        id: Uuid,
        balance: Decimal,
        available_balance: Option<Decimal>,
    ) -> Result<BankConnection, AppError> {
        let mut state = self.state.write().await;
        let connection = state.connection_mut(id)?;
        connection.balance = Some(balance);
        connection.available_balance = Some(available_balance.unwrap_or(balance));
        connection.updated_at = Utc::now();
        Ok(connection.clone())
    }

    async fn try_begin_sync(
        &self,
        id: Uuid,
        lease: Duration,
    ) -> Result<Option<BankConnection>, AppError> {
        let mut state = self.state.write().await;
        let Some(connection) = state.connections.get_mut(&id) else {
            return Ok(None);
        };
        let now = Utc::now();
        let lease = chrono::Duration::from_std(lease).unwrap_or(chrono::Duration::days(3650));

        if !connection.is_active || connection.sync_in_flight(now, lease) {
            return Ok(None);
        }

        connection.sync_status = SyncStatus::Syncing;
        connection.sync_started_at = Some(now);
        connection.updated_at = now;
        Ok(Some(connection.clone()))
    }

    async fn commit_sync(
        &self,
        id: Uuid,
        commit: SyncCommit,
    ) -> Result<SyncCommitResult, AppError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let connection = state.connection_mut(id)?;
        let before = connection.clone();
        connection.balance = Some(commit.balance);
        connection.available_balance = Some(commit.available_balance);
        connection.sync_status = SyncStatus::Synced;
        connection.last_sync_at = Some(commit.synced_at);
        connection.sync_started_at = None;
        connection.error_message = None;
        connection.updated_at = commit.synced_at;
        let after = connection.clone();

        let mut inserted = Vec::new();
        let mut skipped = 0;
        for new in commit.transactions {
            let key = (id, new.external_ref.clone());
            if !state.external_refs.insert(key) {
                skipped += 1;
                continue;
            }
            let tx = BankTransaction::from_new(id, new);
            state.transactions.insert(tx.id, tx.clone());
            inserted.push(tx);
        }

        Ok(SyncCommitResult {
            before,
            after,
            inserted,
            skipped,
        })
    }

    async fn record_sync_failure(
        &self,
        id: Uuid,
        message: &str,
    ) -> Result<BankConnection, AppError> {
        let mut state = self.state.write().await;
        let connection = state.connection_mut(id)?;
        connection.sync_status = SyncStatus::Error;
        connection.error_message = Some(message.to_string());
        connection.sync_started_at = None;
        connection.updated_at = Utc::now();
        Ok(connection.clone())
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<BankTransaction>, AppError> {
        Ok(self.state.read().await.transactions.get(&id).cloned())
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<BankTransaction>, AppError> {
        let state = self.state.read().await;
        let rows = state
            .transactions
            .values()
            .filter(|tx| filter.matches(tx))
            .cloned()
            .collect();
        let mut rows = sorted_transactions(rows);
        if let Some(limit) = filter.limit {
            rows.truncate(limit.max(0) as usize);
        }
        Ok(rows)
    }

    async fn list_match_candidates(&self) -> Result<Vec<BankTransaction>, AppError> {
        let state = self.state.read().await;
        let rows = state
            .transactions
            .values()
            .filter(|tx| tx.is_match_candidate())
            .cloned()
            .collect();
        Ok(sorted_transactions(rows))
    }

    async fn apply_auto_match(
        &self,
        id: Uuid,
        assignment: &MatchAssignment,
    ) -> Result<Option<BankTransaction>, AppError> {
        let mut state = self.state.write().await;
        let tx = state.transaction_mut(id)?;
        if !tx.is_match_candidate() {
            return Ok(None);
        }
        tx.match_status = assignment.status;
        tx.match_confidence = assignment.confidence;
        tx.matched_invoice_ref = Some(assignment.invoice_ref.clone());
        Ok(Some(tx.clone()))
    }

    async fn apply_manual_match(
        &self,
        id: Uuid,
        invoice_ref: &str,
        notes: Option<&str>,
    ) -> Result<BankTransaction, AppError> {
        let mut state = self.state.write().await;
        let tx = state.transaction_mut(id)?;
        if tx.reconciled {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Transaction {} is reconciled and cannot be re-matched",
                id
            )));
        }
        tx.match_status = MatchStatus::Manual;
        tx.match_confidence = 100;
        tx.matched_invoice_ref = Some(invoice_ref.to_string());
        tx.match_notes = notes.map(str::to_string);
        Ok(tx.clone())
    }

    async fn mark_reconciled(
        &self,
        id: Uuid,
        reconciled_by: &str,
        at: DateTime<Utc>,
    ) -> Result<BankTransaction, AppError> {
        let mut state = self.state.write().await;
        let tx = state.transaction_mut(id)?;
        if tx.reconciled {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Transaction {} is already reconciled",
                id
            )));
        }
        tx.reconciled = true;
        tx.reconciled_by = Some(reconciled_by.to_string());
        tx.reconciled_at = Some(at);
        Ok(tx.clone())
    }

    async fn insert_reversal(
        &self,
        reversal: &BankTransaction,
    ) -> Result<BankTransaction, AppError> {
        let mut state = self.state.write().await;
        let key = (reversal.connection_id, reversal.external_ref.clone());
        if !state.external_refs.insert(key) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Transaction has already been reversed ({})",
                reversal.external_ref
            )));
        }
        state.transactions.insert(reversal.id, reversal.clone());
        Ok(reversal.clone())
    }

    async fn insert_session(
        &self,
        session: &ReconciliationSession,
    ) -> Result<ReconciliationSession, AppError> {
        let mut state = self.state.write().await;
        state.sessions.insert(session.id, session.clone());
        Ok(session.clone())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<ReconciliationSession>, AppError> {
        Ok(self.state.read().await.sessions.get(&id).cloned())
    }

    async fn list_sessions(
        &self,
        connection_id: Option<Uuid>,
    ) -> Result<Vec<ReconciliationSession>, AppError> {
        let state = self.state.read().await;
        let mut rows: Vec<ReconciliationSession> = state
            .sessions
            .values()
            .filter(|s| connection_id.map_or(true, |id| s.connection_id == id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn transition_session(
        &self,
        id: Uuid,
        transition: &crate::models::SessionTransition,
    ) -> Result<ReconciliationSession, AppError> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(&id)
            .ok_or_else(|| not_found("Session", id))?;
        if !transition.allowed_from().contains(&session.status) {
            return Err(invalid_transition(transition, session.status));
        }
        session.apply(transition);
        Ok(session.clone())
    }

    async fn insert_alert(&self, alert: &BankAlert) -> Result<BankAlert, AppError> {
        let mut state = self.state.write().await;
        state.alerts.insert(alert.id, alert.clone());
        Ok(alert.clone())
    }

    async fn get_alert(&self, id: Uuid) -> Result<Option<BankAlert>, AppError> {
        Ok(self.state.read().await.alerts.get(&id).cloned())
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<BankAlert>, AppError> {
        let state = self.state.read().await;
        let mut rows: Vec<BankAlert> = state
            .alerts
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn mark_alert_read(&self, id: Uuid, at: DateTime<Utc>) -> Result<BankAlert, AppError> {
        let mut state = self.state.write().await;
        let alert = state.alert_mut(id)?;
        if alert.is_dismissed {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Alert {} has been dismissed",
                id
            )));
        }
        if !alert.is_read {
            alert.is_read = true;
            alert.read_at = Some(at);
        }
        Ok(alert.clone())
    }

    async fn dismiss_alert(&self, id: Uuid, at: DateTime<Utc>) -> Result<BankAlert, AppError> {
        let mut state = self.state.write().await;
        let alert = state.alert_mut(id)?;
        if alert.is_dismissed {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Alert {} is already dismissed",
                id
            )));
        }
        alert.is_dismissed = true;
        alert.dismissed_at = Some(at);
        Ok(alert.clone())
    }
}
