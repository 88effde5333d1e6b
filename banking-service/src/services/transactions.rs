//! Operator actions on ingested transactions.
//!
//! A reconciled transaction is final: matching or reconciling it again is a `Conflict`,
//! and corrections are made with a reversing entry rather than by editing the original.

use crate::dtos::{MatchTransactionRequest, ReverseTransactionRequest};
use crate::events::{DomainEvent, EventPublisher};
use crate::models::{Actor, BankTransaction, TransactionFilter};
use crate::services::metrics::record_operation;
use crate::store::{not_found, Store};
use chrono::Utc;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

pub struct TransactionService {
    store: Arc<dyn Store>,
    events: EventPublisher,
}

impl TransactionService {
    pub fn new(store: Arc<dyn Store>, events: EventPublisher) -> Self {
        Self { store, events }
    }

    /// Assign a transaction to an invoice by hand, overriding any auto-match.
    #[instrument(skip(self, req), fields(actor = %actor, invoice_ref = %req.invoice_ref))]
    pub async fn match_transaction(
        &self,
        actor: &Actor,
        id: Uuid,
        req: MatchTransactionRequest,
    ) -> Result<BankTransaction, AppError> {
        req.validate()?;
        let before = self.get(id).await?;

        let result = self
            .store
            .apply_manual_match(id, req.invoice_ref.trim(), req.notes.as_deref())
            .await;
        record_operation("manual_match", &result);
        let after = result?;

        info!(transaction_id = %id, "Transaction matched manually");
        self.events
            .publish(DomainEvent::TransactionMatched {
                actor: actor.clone(),
                before,
                after: after.clone(),
            })
            .await;

        Ok(after)
    }

    #[instrument(skip(self), fields(actor = %actor))]
    pub async fn reconcile(&self, actor: &Actor, id: Uuid) -> Result<BankTransaction, AppError> {
        let before = self.get(id).await?;

        let result = self.store.mark_reconciled(id, &actor.id(), Utc::now()).await;
        record_operation("reconcile", &result);
        let after = result?;

        info!(transaction_id = %id, "Transaction reconciled");
        self.events
            .publish(DomainEvent::TransactionReconciled {
                actor: actor.clone(),
                before,
                after: after.clone(),
            })
            .await;

        Ok(after)
    }

    /// Record a correcting entry of equal amount and opposite direction.
    ///
    /// The original is left untouched. Each transaction can be reversed once.
    #[instrument(skip(self, req), fields(actor = %actor))]
    pub async fn reverse(
        &self,
        actor: &Actor,
        id: Uuid,
        req: ReverseTransactionRequest,
    ) -> Result<BankTransaction, AppError> {
        req.validate()?;
        let original = self.get(id).await?;

        if original.reverses_transaction_id.is_some() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Transaction {} is itself a reversal and cannot be reversed",
                id
            )));
        }

        let result = self
            .store
            .insert_reversal(&original.reversal(req.reason.trim()))
            .await;
        record_operation("reverse", &result);
        let reversal = result?;

        info!(
            transaction_id = %id,
            reversal_id = %reversal.id,
            "Transaction reversed"
        );
        self.events
            .publish(DomainEvent::TransactionReversed {
                actor: actor.clone(),
                original,
                reversal: reversal.clone(),
            })
            .await;

        Ok(reversal)
    }

    pub async fn get(&self, id: Uuid) -> Result<BankTransaction, AppError> {
        self.store
            .get_transaction(id)
            .await?
            .ok_or_else(|| not_found("Transaction", id))
    }

    pub async fn list(&self, filter: &TransactionFilter) -> Result<Vec<BankTransaction>, AppError> {
        self.store.list_transactions(filter).await
    }
}
