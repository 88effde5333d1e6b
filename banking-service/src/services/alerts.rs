//! Alerting engine and the operator-facing alert inbox.
//!
//! Rules are evaluated on domain events at the moment of the transition; nothing is polled.

use crate::config::AlertConfig;
use crate::events::{DomainEvent, EventPublisher, EventSubscriber};
use crate::integrations::{AlertNotification, NotificationSink};
use crate::models::{
    Actor, AlertFilter, AlertPriority, AlertType, BankAlert, BankConnection, SyncStatus,
};
use crate::services::metrics::{record_alert, record_operation};
use crate::store::{not_found, Store};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

struct AlertDraft {
    alert_type: AlertType,
    priority: AlertPriority,
    title: String,
    message: String,
    transaction_id: Option<Uuid>,
    amount: Option<Decimal>,
    currency: Option<String>,
}

impl AlertDraft {
    fn for_group(&self, connection: &BankConnection, group: &str) -> BankAlert {
        BankAlert {
            id: Uuid::new_v4(),
            connection_id: connection.id,
            transaction_id: self.transaction_id,
            alert_type: self.alert_type,
            priority: self.priority,
            title: self.title.clone(),
            message: self.message.clone(),
            recipient_group: group.to_string(),
            amount: self.amount,
            currency: self.currency.clone(),
            is_read: false,
            read_at: None,
            is_dismissed: false,
            dismissed_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Evaluate the alert rules for one event. Returns one alert per recipient group for
/// every rule that fires.
pub fn evaluate(config: &AlertConfig, event: &DomainEvent) -> Vec<BankAlert> {
    let (connection, draft) = match event {
        DomainEvent::SyncErrored { after, .. } => (
            after,
            AlertDraft {
                alert_type: AlertType::SyncError,
                priority: AlertPriority::High,
                title: format!("Bank sync failed: {}", after.display_name),
                message: after
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Synchronization failed".to_string()),
                transaction_id: None,
                amount: None,
                currency: None,
            },
        ),
        DomainEvent::BalanceChanged {
            connection,
            old,
            new,
        } => {
            let threshold = config.low_balance_threshold;
            let crossed_below = old.map_or(true, |old| old >= threshold) && *new < threshold;
            let eligible =
                connection.is_active && connection.sync_status != SyncStatus::Error;
            if !(crossed_below && eligible) {
                return Vec::new();
            }
            (
                connection,
                AlertDraft {
                    alert_type: AlertType::LowBalance,
                    priority: AlertPriority::Critical,
                    title: format!("Low balance: {}", connection.display_name),
                    message: format!(
                        "Balance {} {} is below the threshold of {}",
                        new, connection.currency, threshold
                    ),
                    transaction_id: None,
                    amount: Some(*new),
                    currency: Some(connection.currency.clone()),
                },
            )
        }
        DomainEvent::TransactionIngested {
            connection,
            transaction,
            ..
        } => {
            if transaction.amount.abs() < config.large_transaction_threshold {
                return Vec::new();
            }
            (
                connection,
                AlertDraft {
                    alert_type: AlertType::LargeTransaction,
                    priority: AlertPriority::High,
                    title: format!(
                        "Large {} on {}",
                        transaction.transaction_type.as_str(),
                        connection.display_name
                    ),
                    message: format!(
                        "{} {} ({}): {}",
                        transaction.amount,
                        transaction.currency,
                        transaction.external_ref,
                        transaction.description
                    ),
                    transaction_id: Some(transaction.id),
                    amount: Some(transaction.amount),
                    currency: Some(transaction.currency.clone()),
                },
            )
        }
        DomainEvent::ConnectionRegistered { .. }
        | DomainEvent::ConnectionDeactivated { .. }
        | DomainEvent::BalanceOverridden { .. }
        | DomainEvent::SyncCompleted { .. }
        | DomainEvent::TransactionAutoMatched { .. }
        | DomainEvent::TransactionMatched { .. }
        | DomainEvent::TransactionReconciled { .. }
        | DomainEvent::TransactionReversed { .. }
        | DomainEvent::SessionCreated { .. }
        | DomainEvent::SessionTransitioned { .. }
        | DomainEvent::AlertRaised { .. }
        | DomainEvent::AlertUpdated { .. } => return Vec::new(),
    };

    config
        .recipient_groups
        .iter()
        .map(|group| draft.for_group(connection, group))
        .collect()
}

pub const ALERTING_ACTOR: Actor = Actor::System("alerting");

/// Persists alerts raised by the rules and forwards them to the notification sink.
///
/// `events` receives `AlertRaised` for each persisted alert. It must not contain the engine
/// itself.
pub struct AlertEngine {
    store: Arc<dyn Store>,
    notifier: Arc<dyn NotificationSink>,
    events: EventPublisher,
    config: AlertConfig,
}

impl AlertEngine {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn NotificationSink>,
        events: EventPublisher,
        config: AlertConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            events,
            config,
        }
    }
}

#[async_trait]
impl EventSubscriber for AlertEngine {
    fn name(&self) -> &'static str {
        "alert_engine"
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        for alert in evaluate(&self.config, event) {
            let alert = self.store.insert_alert(&alert).await?;
            record_alert(alert.alert_type.as_str(), alert.priority.as_str());

            info!(
                alert_id = %alert.id,
                connection_id = %alert.connection_id,
                alert_type = alert.alert_type.as_str(),
                priority = alert.priority.as_str(),
                recipient_group = %alert.recipient_group,
                "Alert raised"
            );

            self.events
                .publish(DomainEvent::AlertRaised {
                    actor: ALERTING_ACTOR,
                    alert: alert.clone(),
                })
                .await;

            if let Err(e) = self.notifier.notify(&AlertNotification::from(&alert)).await {
                warn!(alert_id = %alert.id, error = %e, "Failed to deliver alert notification");
            }
        }
        Ok(())
    }
}

pub struct AlertService {
    store: Arc<dyn Store>,
    events: EventPublisher,
}

impl AlertService {
    pub fn new(store: Arc<dyn Store>, events: EventPublisher) -> Self {
        Self { store, events }
    }

    pub async fn list(&self, filter: &AlertFilter) -> Result<Vec<BankAlert>, AppError> {
        self.store.list_alerts(filter).await
    }

    #[instrument(skip(self), fields(actor = %actor))]
    pub async fn mark_read(&self, actor: &Actor, id: Uuid) -> Result<BankAlert, AppError> {
        let before = self.get(id).await?;
        let result = self.store.mark_alert_read(id, Utc::now()).await;
        record_operation("mark_alert_read", &result);
        let after = result?;
        self.publish(actor, before, after.clone()).await;
        Ok(after)
    }

    #[instrument(skip(self), fields(actor = %actor))]
    pub async fn dismiss(&self, actor: &Actor, id: Uuid) -> Result<BankAlert, AppError> {
        let before = self.get(id).await?;
        let result = self.store.dismiss_alert(id, Utc::now()).await;
        record_operation("dismiss_alert", &result);
        let after = result?;
        self.publish(actor, before, after.clone()).await;
        Ok(after)
    }

    async fn get(&self, id: Uuid) -> Result<BankAlert, AppError> {
        self.store
            .get_alert(id)
            .await?
            .ok_or_else(|| not_found("Alert", id))
    }

    async fn publish(&self, actor: &Actor, before: BankAlert, after: BankAlert) {
        self.events
            .publish(DomainEvent::AlertUpdated {
                actor: actor.clone(),
                before,
                after,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AccountType, BankTransaction, NewConnection, NewTransaction, TransactionType,
    };
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn config() -> AlertConfig {
        AlertConfig {
            low_balance_threshold: d("10000"),
            large_transaction_threshold: d("1000000"),
            recipient_groups: vec!["finance".to_string(), "treasury".to_string()],
        }
    }

    fn connection() -> BankConnection {
        let mut c = BankConnection::new(NewConnection {
            bank_code: "hdfc".to_string(),
            display_name: "HDFC Operating".to_string(),
            account_number: "5010".to_string(),
            account_type: AccountType::Current,
            currency: "INR".to_string(),
        });
        c.sync_status = SyncStatus::Synced;
        c
    }

    fn ingested(amount: &str) -> DomainEvent {
        let connection = connection();
        let transaction = BankTransaction::from_new(
            connection.id,
            NewTransaction {
                external_ref: "TXN-1".to_string(),
                transaction_type: TransactionType::Debit,
                amount: d(amount),
                currency: "INR".to_string(),
                description: "Vendor payout".to_string(),
                counterparty: None,
                transaction_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
                value_date: None,
                balance_after: None,
                raw_payload: serde_json::Value::Null,
            },
        );
        DomainEvent::TransactionIngested {
            actor: Actor::System("sync-worker"),
            connection,
            transaction,
        }
    }

    fn balance_changed(old: Option<&str>, new: &str, connection: BankConnection) -> DomainEvent {
        DomainEvent::BalanceChanged {
            connection,
            old: old.map(d),
            new: d(new),
        }
    }

    #[test]
    fn sync_error_alerts_every_group_with_high_priority() {
        let before = connection();
        let mut after = before.clone();
        after.sync_status = SyncStatus::Error;
        after.error_message = Some("Bank channel unreachable: timeout".to_string());

        let alerts = evaluate(
            &config(),
            &DomainEvent::SyncErrored {
                actor: Actor::System("sync-worker"),
                before,
                after,
            },
        );

        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().all(|a| a.priority == AlertPriority::High));
        assert!(alerts.iter().all(|a| a.alert_type == AlertType::SyncError));
        assert_eq!(alerts[0].message, "Bank channel unreachable: timeout");
        assert_eq!(alerts[1].recipient_group, "treasury");
    }

    #[test]
    fn low_balance_fires_only_when_crossing_the_threshold() {
        let alerts = evaluate(&config(), &balance_changed(Some("12000"), "9000", connection()));
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].priority, AlertPriority::Critical);
        assert_eq!(alerts[0].amount, Some(d("9000")));

        // Already below: no repeat alert.
        assert!(evaluate(&config(), &balance_changed(Some("9500"), "9000", connection())).is_empty());
        // Still above.
        assert!(evaluate(&config(), &balance_changed(Some("12000"), "10000", connection())).is_empty());
    }

    #[test]
    fn low_balance_treats_unknown_previous_balance_as_above() {
        let alerts = evaluate(&config(), &balance_changed(None, "50", connection()));
        assert_eq!(alerts.len(), 2);
    }

    #[test]
    fn low_balance_is_suppressed_for_inactive_or_errored_connections() {
        let mut inactive = connection();
        inactive.is_active = false;
        assert!(evaluate(&config(), &balance_changed(Some("12000"), "10", inactive)).is_empty());

        let mut errored = connection();
        errored.sync_status = SyncStatus::Error;
        assert!(evaluate(&config(), &balance_changed(Some("12000"), "10", errored)).is_empty());
    }

    #[test]
    fn large_transaction_threshold_is_inclusive() {
        let alerts = evaluate(&config(), &ingested("1000000"));
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].alert_type, AlertType::LargeTransaction);
        assert!(alerts[0].transaction_id.is_some());

        assert!(evaluate(&config(), &ingested("999999.99")).is_empty());
    }
}
