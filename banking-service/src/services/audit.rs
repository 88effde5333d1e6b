//! Audit trail: turns every state-changing domain event into an audit record.

use crate::events::{DomainEvent, EventSubscriber};
use crate::integrations::{AuditEvent, AuditSink};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
}

impl AuditTrail {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }
}

fn snapshot<T: Serialize>(value: &T) -> anyhow::Result<Option<serde_json::Value>> {
    Ok(Some(serde_json::to_value(value)?))
}

/// Map an event to its audit record. Returns `None` for events that only mirror a change
/// already audited under another event.
pub fn audit_record(event: &DomainEvent) -> anyhow::Result<Option<AuditEvent>> {
    let (actor, resource_type, resource_id, before, after) = match event {
        DomainEvent::ConnectionRegistered { actor, connection } => (
            actor,
            "bank_connection",
            connection.id,
            None,
            snapshot(connection)?,
        ),
        DomainEvent::ConnectionDeactivated {
            actor,
            before,
            after,
        }
        | DomainEvent::BalanceOverridden {
            actor,
            before,
            after,
        }
        | DomainEvent::SyncCompleted {
            actor,
            before,
            after,
            ..
        }
        | DomainEvent::SyncErrored {
            actor,
            before,
            after,
        } => (
            actor,
            "bank_connection",
            after.id,
            snapshot(before)?,
            snapshot(after)?,
        ),
        // Covered by the sync or override event that carried the new balance.
        DomainEvent::BalanceChanged { .. } => return Ok(None),
        DomainEvent::TransactionIngested { actor, transaction, .. } => (
            actor,
            "bank_transaction",
            transaction.id,
            None,
            snapshot(transaction)?,
        ),
        DomainEvent::TransactionAutoMatched {
            actor,
            before,
            after,
        }
        | DomainEvent::TransactionMatched {
            actor,
            before,
            after,
        }
        | DomainEvent::TransactionReconciled {
            actor,
            before,
            after,
        } => (
            actor,
            "bank_transaction",
            after.id,
            snapshot(before)?,
            snapshot(after)?,
        ),
        DomainEvent::TransactionReversed {
            actor,
            original,
            reversal,
        } => (
            actor,
            "bank_transaction",
            reversal.id,
            snapshot(original)?,
            snapshot(reversal)?,
        ),
        DomainEvent::SessionCreated { actor, session } => (
            actor,
            "reconciliation_session",
            session.id,
            None,
            snapshot(session)?,
        ),
        DomainEvent::SessionTransitioned {
            actor,
            before,
            after,
        } => (
            actor,
            "reconciliation_session",
            after.id,
            snapshot(before)?,
            snapshot(after)?,
        ),
        DomainEvent::AlertRaised { actor, alert } => (
            actor,
            "bank_alert",
            alert.id,
            None,
            snapshot(alert)?,
        ),
        DomainEvent::AlertUpdated {
            actor,
            before,
            after,
        } => (
            actor,
            "bank_alert",
            after.id,
            snapshot(before)?,
            snapshot(after)?,
        ),
    };

    Ok(Some(AuditEvent {
        actor: actor.id(),
        action: event.name().to_string(),
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        before,
        after,
        timestamp: Utc::now(),
    }))
}

#[async_trait]
impl EventSubscriber for AuditTrail {
    fn name(&self) -> &'static str {
        "audit_trail"
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        if let Some(record) = audit_record(event)? {
            self.sink.record(&record).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Actor, AccountType, BankConnection, NewConnection, SyncStatus};

    fn connection() -> BankConnection {
        BankConnection::new(NewConnection {
            bank_code: "icici".to_string(),
            display_name: "Collections".to_string(),
            account_number: "0042".to_string(),
            account_type: AccountType::Current,
            currency: "INR".to_string(),
        })
    }

    #[test]
    fn transition_records_carry_before_and_after() {
        let before = connection();
        let mut after = before.clone();
        after.is_active = false;

        let record = audit_record(&DomainEvent::ConnectionDeactivated {
            actor: Actor::user("ops-7"),
            before,
            after: after.clone(),
        })
        .unwrap()
        .unwrap();

        assert_eq!(record.actor, "ops-7");
        assert_eq!(record.action, "connection_deactivated");
        assert_eq!(record.resource_id, after.id.to_string());
        assert_eq!(record.before.unwrap()["is_active"], true);
        assert_eq!(record.after.unwrap()["is_active"], false);
    }

    #[test]
    fn system_actors_are_attributed() {
        let before = connection();
        let mut after = before.clone();
        after.sync_status = SyncStatus::Error;

        let record = audit_record(&DomainEvent::SyncErrored {
            actor: Actor::System("sync-worker"),
            before,
            after,
        })
        .unwrap()
        .unwrap();
        assert_eq!(record.actor, "system:sync-worker");
    }
}
