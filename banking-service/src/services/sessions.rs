//! Reconciliation sessions: period-bounded bank-vs-book comparisons.

use crate::dtos::{CompleteSessionRequest, CreateSessionRequest};
use crate::events::{DomainEvent, EventPublisher};
use crate::integrations::ApprovalAuthority;
use crate::models::{
    Actor, BankTransaction, MatchStatus, ReconciliationSession, SessionStatus, SessionSummary,
    SessionTransition, TransactionFilter, TransactionType,
};
use crate::services::metrics::record_operation;
use crate::store::{not_found, Store};
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Net bank movement minus net book movement over the period.
pub fn compute_discrepancy(
    bank_opening: Decimal,
    bank_closing: Decimal,
    book_opening: Decimal,
    book_closing: Decimal,
) -> Decimal {
    (bank_closing - bank_opening) - (book_closing - book_opening)
}

/// Totals and match counts over the transactions that fall inside a session's period.
pub fn summarize(transactions: &[BankTransaction], discrepancy: Decimal) -> SessionSummary {
    let mut summary = SessionSummary {
        total_credits: Decimal::ZERO,
        total_debits: Decimal::ZERO,
        matched_count: 0,
        unmatched_count: 0,
        discrepancy,
    };

    for tx in transactions {
        match tx.transaction_type {
            TransactionType::Credit => summary.total_credits += tx.amount,
            TransactionType::Debit => summary.total_debits += tx.amount,
        }
        match tx.match_status {
            MatchStatus::Matched | MatchStatus::Manual => summary.matched_count += 1,
            MatchStatus::Unmatched | MatchStatus::Partial => summary.unmatched_count += 1,
        }
    }

    summary
}

pub struct SessionService {
    store: Arc<dyn Store>,
    approvals: Arc<dyn ApprovalAuthority>,
    events: EventPublisher,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn Store>,
        approvals: Arc<dyn ApprovalAuthority>,
        events: EventPublisher,
    ) -> Self {
        Self {
            store,
            approvals,
            events,
        }
    }

    #[instrument(skip(self, req), fields(actor = %actor, connection_id = %req.connection_id))]
    pub async fn create(
        &self,
        actor: &Actor,
        req: CreateSessionRequest,
    ) -> Result<ReconciliationSession, AppError> {
        req.validate()?;
        self.store
            .get_connection(req.connection_id)
            .await?
            .ok_or_else(|| not_found("Bank connection", req.connection_id))?;

        let session = ReconciliationSession::new(req.into(), actor.id());
        let result = self.store.insert_session(&session).await;
        record_operation("create_session", &result);
        let session = result?;

        info!(session_id = %session.id, "Reconciliation session created");
        self.events
            .publish(DomainEvent::SessionCreated {
                actor: actor.clone(),
                session: session.clone(),
            })
            .await;

        Ok(session)
    }

    #[instrument(skip(self), fields(actor = %actor))]
    pub async fn start(&self, actor: &Actor, id: Uuid) -> Result<ReconciliationSession, AppError> {
        let before = self.get(id).await?;
        self.transition(actor, before, SessionTransition::Start { at: Utc::now() })
            .await
    }

    /// Compute totals, counts and the discrepancy, then move to `completed`.
    #[instrument(skip(self, req), fields(actor = %actor))]
    pub async fn complete(
        &self,
        actor: &Actor,
        id: Uuid,
        req: CompleteSessionRequest,
    ) -> Result<ReconciliationSession, AppError> {
        req.validate()?;
        let before = self.get(id).await?;

        if !matches!(
            before.status,
            SessionStatus::Draft | SessionStatus::InProgress
        ) {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Cannot complete a session in status '{}'",
                before.status.as_str()
            )));
        }

        let transactions = self
            .store
            .list_transactions(&TransactionFilter {
                connection_id: Some(before.connection_id),
                from: Some(before.period_start),
                to: Some(before.period_end),
                ..Default::default()
            })
            .await?;

        let discrepancy = compute_discrepancy(
            before.bank_opening_balance,
            before.bank_closing_balance,
            before.book_opening_balance,
            before.book_closing_balance,
        );

        let complete = SessionTransition::Complete {
            actor: actor.id(),
            at: Utc::now(),
            notes: req.notes,
            summary: summarize(&transactions, discrepancy),
        };

        self.transition(actor, before, complete).await
    }

    /// Sign off a completed session. Requires the approval capability.
    #[instrument(skip(self), fields(actor = %actor))]
    pub async fn approve(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> Result<ReconciliationSession, AppError> {
        let before = self.get(id).await?;

        if !self.approvals.can_approve_reconciliation(actor).await? {
            warn!(session_id = %id, "Session approval denied");
            record_operation::<()>(
                "approve_session",
                &Err(AppError::Forbidden(anyhow::anyhow!("denied"))),
            );
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "{} is not allowed to approve reconciliation sessions",
                actor
            )));
        }

        self.transition(
            actor,
            before,
            SessionTransition::Approve {
                actor: actor.id(),
                at: Utc::now(),
            },
        )
        .await
    }

    async fn transition(
        &self,
        actor: &Actor,
        before: ReconciliationSession,
        transition: SessionTransition,
    ) -> Result<ReconciliationSession, AppError> {
        let operation = match &transition {
            SessionTransition::Start { .. } => "start_session",
            SessionTransition::Complete { .. } => "complete_session",
            SessionTransition::Approve { .. } => "approve_session",
        };

        let result = self.store.transition_session(before.id, &transition).await;
        record_operation(operation, &result);
        let after = result?;

        info!(
            session_id = %after.id,
            from = before.status.as_str(),
            to = after.status.as_str(),
            "Reconciliation session transitioned"
        );
        self.events
            .publish(DomainEvent::SessionTransitioned {
                actor: actor.clone(),
                before,
                after: after.clone(),
            })
            .await;

        Ok(after)
    }

    pub async fn get(&self, id: Uuid) -> Result<ReconciliationSession, AppError> {
        self.store
            .get_session(id)
            .await?
            .ok_or_else(|| not_found("Session", id))
    }

    pub async fn list(
        &self,
        connection_id: Option<Uuid>,
    ) -> Result<Vec<ReconciliationSession>, AppError> {
        self.store.list_sessions(connection_id).await
    }
}
