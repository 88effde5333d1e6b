//! Synchronization worker: pulls balances and transactions from bank channels.
//!
//! Each connection is synced independently with bounded parallelism. A connection's
//! attempt (balance fetch, transaction fetch, ingest) is one retryable unit that either
//! commits completely or leaves the connection unchanged apart from the recorded error.

use crate::config::SyncConfig;
use crate::events::{DomainEvent, EventPublisher};
use crate::integrations::{BankChannel, ChannelError, ChannelRegistry, CredentialStore};
use crate::models::{Actor, BankConnection};
use crate::services::matching::{AutoMatcher, MatchSummary};
use crate::services::metrics::{record_ingested, record_sync};
use crate::store::{Store, SyncCommit, SyncCommitResult};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use secrecy::Secret;
use serde::Serialize;
use service_core::error::AppError;
use service_core::retry::{retry_with_backoff, RetryConfig, Retryable};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub const SYNC_ACTOR: Actor = Actor::System("sync-worker");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoChannel,
    NoCredentials,
    AlreadySyncing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Synced { inserted: usize, skipped: usize },
    Skipped { reason: SkipReason },
    Failed { error: String },
}

impl SyncOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Synced { .. } => "synced",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSyncReport {
    pub connection_id: Uuid,
    pub bank_code: String,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub connections: Vec<ConnectionSyncReport>,
    pub matching: Option<MatchSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matching_error: Option<String>,
}

impl CycleReport {
    pub fn outcome_for(&self, connection_id: Uuid) -> Option<&SyncOutcome> {
        self.connections
            .iter()
            .find(|r| r.connection_id == connection_id)
            .map(|r| &r.outcome)
    }

    pub fn failed(&self) -> usize {
        self.connections
            .iter()
            .filter(|r| matches!(r.outcome, SyncOutcome::Failed { .. }))
            .count()
    }
}

#[derive(Debug, Error)]
enum SyncError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Sync attempt timed out after {0:?}")]
    AttemptTimeout(Duration),

    #[error("Failed to persist sync: {0}")]
    Store(AppError),

    #[error("Credential lookup failed: {0}")]
    Credentials(AppError),
}

impl Retryable for SyncError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Channel(e) => e.is_retryable(),
            Self::AttemptTimeout(_) => true,
            Self::Store(e) => matches!(e, AppError::DatabaseError(_)),
            Self::Credentials(_) => false,
        }
    }
}

pub struct SyncWorker {
    store: Arc<dyn Store>,
    channels: ChannelRegistry,
    credentials: Arc<dyn CredentialStore>,
    matcher: Arc<AutoMatcher>,
    events: EventPublisher,
    config: SyncConfig,
}

impl SyncWorker {
    pub fn new(
        store: Arc<dyn Store>,
        channels: ChannelRegistry,
        credentials: Arc<dyn CredentialStore>,
        matcher: Arc<AutoMatcher>,
        events: EventPublisher,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            channels,
            credentials,
            matcher,
            events,
            config,
        }
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.config.max_retries,
            initial_backoff: self.config.initial_backoff,
            max_backoff: self.config.initial_backoff * 8,
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Sync every active connection, then run the auto-matcher once all have resolved.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport, AppError> {
        let started_at = Utc::now();
        let connections = self.store.list_connections(true).await?;

        info!(connections = connections.len(), "Starting sync cycle");

        let reports: Vec<ConnectionSyncReport> = stream::iter(connections)
            .map(|connection| self.sync_connection(connection))
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let (matching, matching_error) = match self.matcher.run().await {
            Ok(summary) => (Some(summary), None),
            Err(e) => {
                error!(error = %e, "Auto-match run failed after sync cycle");
                (None, Some(e.to_string()))
            }
        };

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            connections: reports,
            matching,
            matching_error,
        };

        info!(
            connections = report.connections.len(),
            failed = report.failed(),
            "Sync cycle completed"
        );

        Ok(report)
    }

    /// Sync a single connection. Failures are recorded on the connection, never returned.
    #[instrument(skip(self, connection), fields(connection_id = %connection.id, bank_code = %connection.bank_code))]
    pub async fn sync_connection(&self, connection: BankConnection) -> ConnectionSyncReport {
        let started = Instant::now();
        let outcome = self.sync_one(&connection).await;
        record_sync(outcome.label(), started.elapsed().as_secs_f64());

        ConnectionSyncReport {
            connection_id: connection.id,
            bank_code: connection.bank_code,
            outcome,
        }
    }

    async fn sync_one(&self, connection: &BankConnection) -> SyncOutcome {
        let Some(channel) = self.channels.get(&connection.bank_code) else {
            info!("No bank channel registered for bank, skipping");
            return SyncOutcome::Skipped {
                reason: SkipReason::NoChannel,
            };
        };

        let token = match self.credentials.account_token(connection).await {
            Ok(Some(token)) => Ok(token),
            Ok(None) => {
                info!("No account token provisioned, skipping");
                return SyncOutcome::Skipped {
                    reason: SkipReason::NoCredentials,
                };
            }
            Err(e) => Err(SyncError::Credentials(e)),
        };

        let guarded = match self.store.try_begin_sync(connection.id, self.config.lease).await {
            Ok(Some(guarded)) => guarded,
            Ok(None) => {
                info!("Connection is already syncing or inactive, skipping");
                return SyncOutcome::Skipped {
                    reason: SkipReason::AlreadySyncing,
                };
            }
            Err(e) => {
                error!(error = %e, "Failed to acquire sync guard");
                return SyncOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        let result = match token {
            Ok(token) => self.attempt_with_retries(&*channel, &token, &guarded).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(committed) => self.on_synced(committed).await,
            Err(e) => self.on_failed(connection, e).await,
        }
    }

    async fn attempt_with_retries(
        &self,
        channel: &dyn BankChannel,
        token: &Secret<String>,
        connection: &BankConnection,
    ) -> Result<SyncCommitResult, SyncError> {
        let attempt_timeout = self.config.attempt_timeout;
        retry_with_backoff(&self.retry_config(), "bank_sync", || async move {
            match timeout(attempt_timeout, self.attempt(channel, token, connection)).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::AttemptTimeout(attempt_timeout)),
            }
        })
        .await
    }

    async fn attempt(
        &self,
        channel: &dyn BankChannel,
        token: &Secret<String>,
        connection: &BankConnection,
    ) -> Result<SyncCommitResult, SyncError> {
        let call_timeout = self.config.call_timeout;
        let timed_out = |call: &str| {
            ChannelError::Unreachable(format!("{} request timed out after {:?}", call, call_timeout))
        };

        let balance = timeout(call_timeout, channel.fetch_balance(token))
            .await
            .map_err(|_| timed_out("balance"))??;

        let to = Utc::now();
        let from = connection.last_sync_at.unwrap_or(to - self.config.lookback);

        let transactions = timeout(call_timeout, channel.fetch_transactions(token, from, to))
            .await
            .map_err(|_| timed_out("transactions"))??;

        let commit = SyncCommit {
            balance: balance.balance(),
            available_balance: balance.available_balance,
            synced_at: to,
            transactions: transactions
                .into_iter()
                .map(|t| t.into_new(&connection.currency))
                .collect(),
        };

        self.store
            .commit_sync(connection.id, commit)
            .await
            .map_err(SyncError::Store)
    }

    async fn on_synced(&self, committed: SyncCommitResult) -> SyncOutcome {
        let SyncCommitResult {
            before,
            after,
            inserted,
            skipped,
        } = committed;

        record_ingested(inserted.len(), skipped);
        info!(
            inserted = inserted.len(),
            skipped = skipped,
            balance = ?after.balance,
            "Connection synced"
        );

        let mut events = vec![DomainEvent::SyncCompleted {
            actor: SYNC_ACTOR,
            before: before.clone(),
            after: after.clone(),
            ingested: inserted.len(),
        }];

        if let Some(new) = after.balance {
            if before.balance != Some(new) {
                events.push(DomainEvent::BalanceChanged {
                    connection: after.clone(),
                    old: before.balance,
                    new,
                });
            }
        }

        let inserted_count = inserted.len();
        events.extend(inserted.into_iter().map(|transaction| {
            DomainEvent::TransactionIngested {
                actor: SYNC_ACTOR,
                connection: after.clone(),
                transaction,
            }
        }));

        self.events.publish_all(events).await;

        SyncOutcome::Synced {
            inserted: inserted_count,
            skipped,
        }
    }

    async fn on_failed(&self, before: &BankConnection, e: SyncError) -> SyncOutcome {
        let message = e.to_string();
        warn!(error = %message, "Connection sync failed");

        match self.store.record_sync_failure(before.id, &message).await {
            Ok(after) => {
                self.events
                    .publish(DomainEvent::SyncErrored {
                        actor: SYNC_ACTOR,
                        before: before.clone(),
                        after,
                    })
                    .await;
            }
            Err(store_err) => {
                error!(error = %store_err, "Failed to record sync failure");
            }
        }

        SyncOutcome::Failed { error: message }
    }
}
