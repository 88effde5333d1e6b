//! Connection registry: lifecycle of registered bank accounts.

use crate::events::{DomainEvent, EventPublisher};
use crate::models::{Actor, BankConnection, NewConnection};
use crate::services::metrics::record_operation;
use crate::store::{not_found, Store};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

pub struct ConnectionRegistry {
    store: Arc<dyn Store>,
    events: EventPublisher,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn Store>, events: EventPublisher) -> Self {
        Self { store, events }
    }

    #[instrument(skip(self, new), fields(actor = %actor, bank_code = %new.bank_code))]
    pub async fn register(
        &self,
        actor: &Actor,
        new: NewConnection,
    ) -> Result<BankConnection, AppError> {
        let connection = BankConnection::new(new);
        let result = self.store.insert_connection(&connection).await;
        record_operation("register_connection", &result);
        let connection = result?;

        info!(connection_id = %connection.id, "Bank connection registered");
        self.events
            .publish(DomainEvent::ConnectionRegistered {
                actor: actor.clone(),
                connection: connection.clone(),
            })
            .await;

        Ok(connection)
    }

    #[instrument(skip(self), fields(actor = %actor))]
    pub async fn deactivate(&self, actor: &Actor, id: Uuid) -> Result<BankConnection, AppError> {
        let before = self.get(id).await?;
        let result = self.store.deactivate_connection(id).await;
        record_operation("deactivate_connection", &result);
        let after = result?;

        info!(connection_id = %id, "Bank connection deactivated");
        self.events
            .publish(DomainEvent::ConnectionDeactivated {
                actor: actor.clone(),
                before,
                after: after.clone(),
            })
            .await;

        Ok(after)
    }

    /// Manually set the balance, e.g. when a bank feed is unavailable.
    #[instrument(skip(self), fields(actor = %actor))]
    pub async fn override_balance(
        &self,
        actor: &Actor,
        id: Uuid,
        balance: Decimal,
        available_balance: Option<Decimal>,
    ) -> Result<BankConnection, AppError> {
        let before = self.get(id).await?;
        let result = self
            .store
            .override_balance(id, balance, available_balance)
            .await;
        record_operation("override_balance", &result);
        let after = result?;

        info!(connection_id = %id, balance = %balance, "Bank balance overridden");

        let mut events = vec![DomainEvent::BalanceOverridden {
            actor: actor.clone(),
            before: before.clone(),
            after: after.clone(),
        }];
        if before.balance != Some(balance) {
            events.push(DomainEvent::BalanceChanged {
                connection: after.clone(),
                old: before.balance,
                new: balance,
            });
        }
        self.events.publish_all(events).await;

        Ok(after)
    }

    pub async fn get(&self, id: Uuid) -> Result<BankConnection, AppError> {
        self.store
            .get_connection(id)
            .await?
            .ok_or_else(|| not_found("Bank connection", id))
    }

    pub async fn list(&self, active_only: bool) -> Result<Vec<BankConnection>, AppError> {
        self.store.list_connections(active_only).await
    }
}
