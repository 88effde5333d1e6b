//! Post-commit domain events.
//!
//! Every state change is published after it is persisted. Subscribers (audit, alerting)
//! are independent of each other and of publication order; a failing subscriber is
//! logged and never affects the change that produced the event.

use crate::models::{
    Actor, BankAlert, BankConnection, BankTransaction, ReconciliationSession,
};
use async_trait::async_trait;
use futures::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum DomainEvent {
    ConnectionRegistered {
        actor: Actor,
        connection: BankConnection,
    },
    ConnectionDeactivated {
        actor: Actor,
        before: BankConnection,
        after: BankConnection,
    },
    BalanceOverridden {
        actor: Actor,
        before: BankConnection,
        after: BankConnection,
    },
    SyncCompleted {
        actor: Actor,
        before: BankConnection,
        after: BankConnection,
        ingested: usize,
    },
    SyncErrored {
        actor: Actor,
        before: BankConnection,
        after: BankConnection,
    },
    /// Emitted alongside a sync commit or override whenever the ledger balance moved.
    BalanceChanged {
        connection: BankConnection,
        old: Option<Decimal>,
        new: Decimal,
    },
    TransactionIngested {
        actor: Actor,
        connection: BankConnection,
        transaction: BankTransaction,
    },
    TransactionAutoMatched {
        actor: Actor,
        before: BankTransaction,
        after: BankTransaction,
    },
    TransactionMatched {
        actor: Actor,
        before: BankTransaction,
        after: BankTransaction,
    },
    TransactionReconciled {
        actor: Actor,
        before: BankTransaction,
        after: BankTransaction,
    },
    TransactionReversed {
        actor: Actor,
        original: BankTransaction,
        reversal: BankTransaction,
    },
    SessionCreated {
        actor: Actor,
        session: ReconciliationSession,
    },
    SessionTransitioned {
        actor: Actor,
        before: ReconciliationSession,
        after: ReconciliationSession,
    },
    /// A rule fired and the alert was persisted.
    AlertRaised {
        actor: Actor,
        alert: BankAlert,
    },
    AlertUpdated {
        actor: Actor,
        before: BankAlert,
        after: BankAlert,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionRegistered { .. } => "connection_registered",
            Self::ConnectionDeactivated { .. } => "connection_deactivated",
            Self::BalanceOverridden { .. } => "balance_overridden",
            Self::SyncCompleted { .. } => "sync_completed",
            Self::SyncErrored { .. } => "sync_errored",
            Self::BalanceChanged { .. } => "balance_changed",
            Self::TransactionIngested { .. } => "transaction_ingested",
            Self::TransactionAutoMatched { .. } => "transaction_auto_matched",
            Self::TransactionMatched { .. } => "transaction_matched",
            Self::TransactionReconciled { .. } => "transaction_reconciled",
            Self::TransactionReversed { .. } => "transaction_reversed",
            Self::SessionCreated { .. } => "session_created",
            Self::SessionTransitioned { .. } => "session_transitioned",
            Self::AlertRaised { .. } => "alert_raised",
            Self::AlertUpdated { .. } => "alert_updated",
        }
    }
}

#[async_trait]
pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

/// Fans events out to every subscriber and waits for all of them.
#[derive(Clone, Default)]
pub struct EventPublisher {
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl EventPublisher {
    pub fn new(subscribers: Vec<Arc<dyn EventSubscriber>>) -> Self {
        Self { subscribers }
    }

    pub async fn publish(&self, event: DomainEvent) {
        let results = join_all(self.subscribers.iter().map(|s| s.handle(&event))).await;

        for (subscriber, result) in self.subscribers.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(
                    subscriber = subscriber.name(),
                    event = event.name(),
                    error = %e,
                    "Event subscriber failed"
                );
            }
        }
    }

    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            self.publish(event).await;
        }
    }
}
