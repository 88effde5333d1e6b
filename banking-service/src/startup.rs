//! Application startup and lifecycle management.

use crate::config::{BankingConfig, StoreBackend};
use crate::events::{EventPublisher, EventSubscriber};
use crate::handlers::{alerts, connections, health, sessions, sync, transactions};
use crate::integrations::{
    ApprovalAuthority, AuditSink, ChannelRegistry, CredentialStore, HttpApprovalAuthority,
    HttpAuditSink, HttpInvoiceSource, HttpNotificationSink, InvoiceSource, LogAuditSink,
    LogNotificationSink, NotificationSink, StaticApprovalAuthority, StaticCredentialStore,
    StaticInvoiceSource, VaultCredentialStore,
};
use crate::services::{
    init_metrics, AlertEngine, AlertService, AuditTrail, AutoMatcher, ConnectionRegistry,
    SessionService, SyncScheduler, SyncWorker, TransactionService,
};
use crate::store::{MemoryStore, PgStore, Store};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: BankingConfig,
    pub store: Arc<dyn Store>,
    pub connections: Arc<ConnectionRegistry>,
    pub transactions: Arc<TransactionService>,
    pub sessions: Arc<SessionService>,
    pub alerts: Arc<AlertService>,
    pub sync: Arc<SyncWorker>,
    pub matcher: Arc<AutoMatcher>,
}

/// External collaborators the service is wired with.
///
/// Built from configuration in production; tests construct it directly with fakes.
pub struct ServiceComponents {
    pub store: Arc<dyn Store>,
    pub channels: ChannelRegistry,
    pub credentials: Arc<dyn CredentialStore>,
    pub invoices: Arc<dyn InvoiceSource>,
    pub approvals: Arc<dyn ApprovalAuthority>,
    pub audit_sink: Arc<dyn AuditSink>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl ServiceComponents {
    pub async fn from_config(config: &BankingConfig) -> Result<Self, AppError> {
        let timeout = config.sync.call_timeout;
        let integrations = &config.integrations;

        let store: Arc<dyn Store> = match config.store {
            StoreBackend::Postgres => {
                let store = PgStore::new(
                    &config.database.url,
                    config.database.max_connections,
                    config.database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    e
                })?;
                store.run_migrations().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    e
                })?;
                Arc::new(store)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store - data is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let channels = ChannelRegistry::from_endpoints(&integrations.bank_channels, timeout)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("{}", e)))?;
        if channels.is_empty() {
            tracing::warn!("No bank channels configured - sync cycles will skip every connection");
        }

        let credentials: Arc<dyn CredentialStore> = if integrations.credential_vault_url.is_empty()
        {
            tracing::warn!("Credential vault URL not configured - no account tokens available");
            Arc::new(StaticCredentialStore::new())
        } else {
            Arc::new(VaultCredentialStore::new(
                integrations.credential_vault_url.clone(),
                integrations.credential_vault_token.clone(),
                timeout,
            )?)
        };

        let invoices: Arc<dyn InvoiceSource> = if integrations.invoice_service_url.is_empty() {
            tracing::info!("Invoice service URL not configured - auto-match has no candidates");
            Arc::new(StaticInvoiceSource::new(Vec::new()))
        } else {
            Arc::new(HttpInvoiceSource::new(
                integrations.invoice_service_url.clone(),
                timeout,
            )?)
        };

        let approvals: Arc<dyn ApprovalAuthority> = if integrations.auth_service_url.is_empty() {
            tracing::info!(
                approvers = integrations.approver_ids.len(),
                "Auth service URL not configured - using static approver list"
            );
            Arc::new(StaticApprovalAuthority::new(
                integrations.approver_ids.iter().cloned(),
            ))
        } else {
            Arc::new(HttpApprovalAuthority::new(
                integrations.auth_service_url.clone(),
                timeout,
            )?)
        };

        let audit_sink: Arc<dyn AuditSink> = if integrations.audit_service_url.is_empty() {
            Arc::new(LogAuditSink)
        } else {
            Arc::new(
                HttpAuditSink::new(integrations.audit_service_url.clone(), timeout)
                    .map_err(AppError::ConfigError)?,
            )
        };

        let notifier: Arc<dyn NotificationSink> =
            if integrations.notification_service_url.is_empty() {
                Arc::new(LogNotificationSink)
            } else {
                Arc::new(
                    HttpNotificationSink::new(
                        integrations.notification_service_url.clone(),
                        timeout,
                    )
                    .map_err(AppError::ConfigError)?,
                )
            };

        Ok(Self {
            store,
            channels,
            credentials,
            invoices,
            approvals,
            audit_sink,
            notifier,
        })
    }
}

impl AppState {
    /// Wire services and event subscribers around the given collaborators.
    pub fn new(config: BankingConfig, components: ServiceComponents) -> Self {
        let ServiceComponents {
            store,
            channels,
            credentials,
            invoices,
            approvals,
            audit_sink,
            notifier,
        } = components;

        let audit: Arc<dyn EventSubscriber> = Arc::new(AuditTrail::new(audit_sink));
        let subscribers: Vec<Arc<dyn EventSubscriber>> = vec![
            audit.clone(),
            Arc::new(AlertEngine::new(
                store.clone(),
                notifier,
                EventPublisher::new(vec![audit]),
                config.alerts.clone(),
            )),
        ];
        let events = EventPublisher::new(subscribers);

        let matcher = Arc::new(AutoMatcher::new(store.clone(), invoices, events.clone()));
        let sync = Arc::new(SyncWorker::new(
            store.clone(),
            channels,
            credentials,
            matcher.clone(),
            events.clone(),
            config.sync.clone(),
        ));

        Self {
            connections: Arc::new(ConnectionRegistry::new(store.clone(), events.clone())),
            transactions: Arc::new(TransactionService::new(store.clone(), events.clone())),
            sessions: Arc::new(SessionService::new(store.clone(), approvals, events.clone())),
            alerts: Arc::new(AlertService::new(store.clone(), events)),
            sync,
            matcher,
            store,
            config,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_endpoint))
        .route(
            "/connections",
            get(connections::list_connections).post(connections::register_connection),
        )
        .route("/connections/:id", get(connections::get_connection))
        .route(
            "/connections/:id/deactivate",
            post(connections::deactivate_connection),
        )
        .route("/connections/:id/balance", put(connections::override_balance))
        .route("/sync/run", post(sync::run_sync))
        .route("/matching/run", post(sync::run_matching))
        .route("/transactions", get(transactions::list_transactions))
        .route("/transactions/:id", get(transactions::get_transaction))
        .route(
            "/transactions/:id/match",
            post(transactions::match_transaction),
        )
        .route(
            "/transactions/:id/reconcile",
            post(transactions::reconcile_transaction),
        )
        .route(
            "/transactions/:id/reverse",
            post(transactions::reverse_transaction),
        )
        .route(
            "/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route("/sessions/:id", get(sessions::get_session))
        .route("/sessions/:id/start", post(sessions::start_session))
        .route("/sessions/:id/complete", post(sessions::complete_session))
        .route("/sessions/:id/approve", post(sessions::approve_session))
        .route("/alerts", get(alerts::list_alerts))
        .route("/alerts/:id/read", post(alerts::mark_alert_read))
        .route("/alerts/:id/dismiss", post(alerts::dismiss_alert))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with collaborators derived from configuration.
    pub async fn build(config: BankingConfig) -> Result<Self, AppError> {
        let components = ServiceComponents::from_config(&config).await?;
        Self::build_with_components(config, components).await
    }

    /// Build the application around caller-supplied collaborators.
    pub async fn build_with_components(
        config: BankingConfig,
        components: ServiceComponents,
    ) -> Result<Self, AppError> {
        init_metrics();

        let state = AppState::new(config, components);

        let addr: SocketAddr = format!("{}:{}", state.config.common.host, state.config.common.port)
            .parse()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid listen address: {}", e)))?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Banking service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve HTTP and, when enabled, run the sync scheduler until stopped.
    ///
    /// Dropping the returned future cancels the scheduler.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let shutdown = CancellationToken::new();
        let _cancel_on_exit = shutdown.clone().drop_guard();

        let sync_config = &self.state.config.sync;
        if sync_config.scheduler_enabled {
            let scheduler = SyncScheduler::new(self.state.sync.clone(), sync_config.interval);
            tokio::spawn(scheduler.run(shutdown.clone()));
        } else {
            tracing::info!("Sync scheduler disabled by configuration");
        }

        tracing::info!(
            service = %self.state.config.service_name,
            version = %self.state.config.service_version,
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router(self.state))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "HTTP server error");
                std::io::Error::other(format!("HTTP server error: {}", e))
            })
    }
}
