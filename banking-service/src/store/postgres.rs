//! PostgreSQL store.

use super::{invalid_transition, not_found, Store, SyncCommit, SyncCommitResult};
use crate::models::{
    AccountType, AlertFilter, AlertPriority, AlertType, BankAlert, BankConnection,
    BankTransaction, MatchAssignment, MatchStatus, ReconciliationSession, SessionStatus,
    SessionTransition, SyncStatus, TransactionFilter, TransactionType,
};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const CONNECTION_COLUMNS: &str = "id, bank_code, display_name, account_number, account_type, \
    currency, balance, available_balance, sync_status, last_sync_at, sync_started_at, \
    error_message, is_active, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, connection_id, external_ref, transaction_type, amount, \
    currency, description, counterparty, transaction_date, value_date, balance_after, \
    match_status, match_confidence, matched_invoice_ref, match_notes, reconciled, \
    reconciled_by, reconciled_at, raw_payload, reverses_transaction_id, created_at";

const SESSION_COLUMNS: &str = "id, connection_id, period_start, period_end, \
    bank_opening_balance, bank_closing_balance, book_opening_balance, book_closing_balance, \
    total_credits, total_debits, matched_count, unmatched_count, discrepancy, status, notes, \
    created_by, created_at, started_at, completed_by, completed_at, approved_by, approved_at";

const ALERT_COLUMNS: &str = "id, connection_id, transaction_id, alert_type, priority, title, \
    message, recipient_group, amount, currency, is_read, read_at, is_dismissed, dismissed_at, \
    created_at";

#[derive(Debug, FromRow)]
struct ConnectionRow {
    id: Uuid,
    bank_code: String,
    display_name: String,
    account_number: String,
    account_type: String,
    currency: String,
    balance: Option<Decimal>,
    available_balance: Option<Decimal>,
    sync_status: String,
    last_sync_at: Option<DateTime<Utc>>,
    sync_started_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ConnectionRow> for BankConnection {
    fn from(r: ConnectionRow) -> Self {
        Self {
            id: r.id,
            bank_code: r.bank_code,
            display_name: r.display_name,
            account_number: r.account_number,
            account_type: AccountType::from_str(&r.account_type),
            currency: r.currency,
            balance: r.balance,
            available_balance: r.available_balance,
            sync_status: SyncStatus::from_str(&r.sync_status),
            last_sync_at: r.last_sync_at,
            sync_started_at: r.sync_started_at,
            error_message: r.error_message,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    connection_id: Uuid,
    external_ref: String,
    transaction_type: String,
    amount: Decimal,
    currency: String,
    description: String,
    counterparty: Option<String>,
    transaction_date: NaiveDate,
    value_date: Option<NaiveDate>,
    balance_after: Option<Decimal>,
    match_status: String,
    match_confidence: i32,
    matched_invoice_ref: Option<String>,
    match_notes: Option<String>,
    reconciled: bool,
    reconciled_by: Option<String>,
    reconciled_at: Option<DateTime<Utc>>,
    raw_payload: serde_json::Value,
    reverses_transaction_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<TransactionRow> for BankTransaction {
    fn from(r: TransactionRow) -> Self {
        Self {
            id: r.id,
            connection_id: r.connection_id,
            external_ref: r.external_ref,
            transaction_type: TransactionType::from_str(&r.transaction_type),
            amount: r.amount,
            currency: r.currency,
            description: r.description,
            counterparty: r.counterparty,
            transaction_date: r.transaction_date,
            value_date: r.value_date,
            balance_after: r.balance_after,
            match_status: MatchStatus::from_str(&r.match_status),
            match_confidence: r.match_confidence,
            matched_invoice_ref: r.matched_invoice_ref,
            match_notes: r.match_notes,
            reconciled: r.reconciled,
            reconciled_by: r.reconciled_by,
            reconciled_at: r.reconciled_at,
            raw_payload: r.raw_payload,
            reverses_transaction_id: r.reverses_transaction_id,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    id: Uuid,
    connection_id: Uuid,
    period_start: NaiveDate,
    period_end: NaiveDate,
    bank_opening_balance: Decimal,
    bank_closing_balance: Decimal,
    book_opening_balance: Decimal,
    book_closing_balance: Decimal,
    total_credits: Decimal,
    total_debits: Decimal,
    matched_count: i32,
    unmatched_count: i32,
    discrepancy: Option<Decimal>,
    status: String,
    notes: Option<String>,
    created_by: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_by: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    approved_by: Option<String>,
    approved_at: Option<DateTime<Utc>>,
}

impl From<SessionRow> for ReconciliationSession {
    fn from(r: SessionRow) -> Self {
        Self {
            id: r.id,
            connection_id: r.connection_id,
            period_start: r.period_start,
            period_end: r.period_end,
            bank_opening_balance: r.bank_opening_balance,
            bank_closing_balance: r.bank_closing_balance,
            book_opening_balance: r.book_opening_balance,
            book_closing_balance: r.book_closing_balance,
            total_credits: r.total_credits,
            total_debits: r.total_debits,
            matched_count: r.matched_count,
            unmatched_count: r.unmatched_count,
            discrepancy: r.discrepancy,
            status: SessionStatus::from_str(&r.status),
            notes: r.notes,
            created_by: r.created_by,
            created_at: r.created_at,
            started_at: r.started_at,
            completed_by: r.completed_by,
            completed_at: r.completed_at,
            approved_by: r.approved_by,
            approved_at: r.approved_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct AlertRow {
    id: Uuid,
    connection_id: Uuid,
    transaction_id: Option<Uuid>,
    alert_type: String,
    priority: String,
    title: String,
    message: String,
    recipient_group: String,
    amount: Option<Decimal>,
    currency: Option<String>,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    is_dismissed: bool,
    dismissed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<AlertRow> for BankAlert {
    fn from(r: AlertRow) -> Self {
        Self {
            id: r.id,
            connection_id: r.connection_id,
            transaction_id: r.transaction_id,
            alert_type: AlertType::from_str(&r.alert_type),
            priority: AlertPriority::from_str(&r.priority),
            title: r.title,
            message: r.message,
            recipient_group: r.recipient_group,
            amount: r.amount,
            currency: r.currency,
            is_read: r.is_read,
            read_at: r.read_at,
            is_dismissed: r.is_dismissed,
            dismissed_at: r.dismissed_at,
            created_at: r.created_at,
        }
    }
}

fn db_error(context: &str, e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("Failed to {}: {}", context, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "banking-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn fetch_connection(&self, id: Uuid) -> Result<Option<BankConnection>, AppError> {
        let row = sqlx::query_as::<_, ConnectionRow>(&format!(
            "SELECT {} FROM bank_connections WHERE id = $1",
            CONNECTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get connection", e))?;
        Ok(row.map(Into::into))
    }

    async fn fetch_transaction(&self, id: Uuid) -> Result<Option<BankTransaction>, AppError> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM bank_transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get transaction", e))?;
        Ok(row.map(Into::into))
    }

    async fn fetch_alert(&self, id: Uuid) -> Result<Option<BankAlert>, AppError> {
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {} FROM bank_alerts WHERE id = $1",
            ALERT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get alert", e))?;
        Ok(row.map(Into::into))
    }

    async fn fetch_session(&self, id: Uuid) -> Result<Option<ReconciliationSession>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM reconciliation_sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get session", e))?;
        Ok(row.map(Into::into))
    }

    /// Turn a guarded update that matched no row into the right error.
    async fn transaction_guard_error(&self, id: Uuid, conflict: &str) -> AppError {
        match self.fetch_transaction(id).await {
            Ok(Some(_)) => AppError::Conflict(anyhow::anyhow!("Transaction {} {}", id, conflict)),
            Ok(None) => not_found("Transaction", id),
            Err(e) => e,
        }
    }

    async fn alert_guard_error(&self, id: Uuid, conflict: &str) -> AppError {
        match self.fetch_alert(id).await {
            Ok(Some(_)) => AppError::Conflict(anyhow::anyhow!("Alert {} {}", id, conflict)),
            Ok(None) => not_found("Alert", id),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl Store for PgStore {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, connection), fields(bank_code = %connection.bank_code))]
    async fn insert_connection(
        &self,
        connection: &BankConnection,
    ) -> Result<BankConnection, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_connection"])
            .start_timer();

        let row = sqlx::query_as::<_, ConnectionRow>(&format!(
            r#"
            INSERT INTO bank_connections (id, bank_code, display_name, account_number, account_type,
                currency, sync_status, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING {}
            "#,
            CONNECTION_COLUMNS
        ))
        .bind(connection.id)
        .bind(&connection.bank_code)
        .bind(&connection.display_name)
        .bind(&connection.account_number)
        .bind(connection.account_type.as_str())
        .bind(&connection.currency)
        .bind(connection.sync_status.as_str())
        .bind(connection.is_active)
        .bind(connection.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Account {} is already registered for bank '{}'",
                    connection.account_number,
                    connection.bank_code
                ))
            }
            _ => db_error("create connection", e),
        })?;

        timer.observe_duration();
        info!(connection_id = %row.id, "Bank connection created");

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn get_connection(&self, id: Uuid) -> Result<Option<BankConnection>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_connection"])
            .start_timer();
        let connection = self.fetch_connection(id).await?;
        timer.observe_duration();
        Ok(connection)
    }

    #[instrument(skip(self))]
    async fn list_connections(&self, active_only: bool) -> Result<Vec<BankConnection>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_connections"])
            .start_timer();

        let rows = sqlx::query_as::<_, ConnectionRow>(&format!(
            r#"
            SELECT {} FROM bank_connections
            WHERE ($1 = FALSE OR is_active = TRUE)
            ORDER BY created_at, id
            "#,
            CONNECTION_COLUMNS
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list connections", e))?;

        timer.observe_duration();
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn deactivate_connection(&self, id: Uuid) -> Result<BankConnection, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["deactivate_connection"])
            .start_timer();

        let row = sqlx::query_as::<_, ConnectionRow>(&format!(
            r#"
            UPDATE bank_connections
            SET is_active = FALSE, updated_at = NOW()
            WHERE id = $1 AND is_active = TRUE
            RETURNING {}
            "#,
            CONNECTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("deactivate connection", e))?;

        timer.observe_duration();

        match row {
            Some(row) => Ok(row.into()),
            None => match self.fetch_connection(id).await? {
                Some(_) => Err(AppError::Conflict(anyhow::anyhow!(
                    "Connection {} is already inactive",
                    id
                ))),
                None => Err(not_found("Connection", id)),
            },
        }
    }

    #[instrument(skip(self))]
    async fn override_balance(
        &self,
        id: Uuid,
        balance: Decimal,
        available_balance: Option<Decimal>,
    ) -> Result<BankConnection, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["override_balance"])
            .start_timer();

        let row = sqlx::query_as::<_, ConnectionRow>(&format!(
            r#"
            UPDATE bank_connections
            SET balance = $2, available_balance = COALESCE($3, $2), updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            CONNECTION_COLUMNS
        ))
        .bind(id)
        .bind(balance)
        .bind(available_balance)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("override balance", e))?
        .ok_or_else(|| not_found("Connection", id))?;

        timer.observe_duration();
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn try_begin_sync(
        &self,
        id: Uuid,
        lease: Duration,
    ) -> Result<Option<BankConnection>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["try_begin_sync"])
            .start_timer();

        let row = sqlx::query_as::<_, ConnectionRow>(&format!(
            r#"
            UPDATE bank_connections
            SET sync_status = 'syncing', sync_started_at = NOW(), updated_at = NOW()
            WHERE id = $1
              AND is_active = TRUE
              AND (sync_status <> 'syncing'
                   OR sync_started_at IS NULL
                   OR sync_started_at < NOW() - make_interval(secs => $2))
            RETURNING {}
            "#,
            CONNECTION_COLUMNS
        ))
        .bind(id)
        .bind(lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("acquire sync guard", e))?;

        timer.observe_duration();
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, commit), fields(transactions = commit.transactions.len()))]
    async fn commit_sync(
        &self,
        id: Uuid,
        commit: SyncCommit,
    ) -> Result<SyncCommitResult, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["commit_sync"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin sync transaction", e))?;

        let before: BankConnection = sqlx::query_as::<_, ConnectionRow>(&format!(
            "SELECT {} FROM bank_connections WHERE id = $1 FOR UPDATE",
            CONNECTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("lock connection", e))?
        .ok_or_else(|| not_found("Connection", id))?
        .into();

        let after: BankConnection = sqlx::query_as::<_, ConnectionRow>(&format!(
            r#"
            UPDATE bank_connections
            SET balance = $2, available_balance = $3, sync_status = 'synced',
                last_sync_at = $4, sync_started_at = NULL, error_message = NULL, updated_at = $4
            WHERE id = $1
            RETURNING {}
            "#,
            CONNECTION_COLUMNS
        ))
        .bind(id)
        .bind(commit.balance)
        .bind(commit.available_balance)
        .bind(commit.synced_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("update connection balance", e))?
        .into();

        let mut inserted = Vec::new();
        let mut skipped = 0;
        for new in commit.transactions {
            let record = BankTransaction::from_new(id, new);
            let row = sqlx::query_as::<_, TransactionRow>(&format!(
                r#"
                INSERT INTO bank_transactions (id, connection_id, external_ref, transaction_type,
                    amount, currency, description, counterparty, transaction_date, value_date,
                    balance_after, match_status, match_confidence, reconciled, raw_payload, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                ON CONFLICT (connection_id, external_ref) DO NOTHING
                RETURNING {}
                "#,
                TRANSACTION_COLUMNS
            ))
            .bind(record.id)
            .bind(record.connection_id)
            .bind(&record.external_ref)
            .bind(record.transaction_type.as_str())
            .bind(record.amount)
            .bind(&record.currency)
            .bind(&record.description)
            .bind(&record.counterparty)
            .bind(record.transaction_date)
            .bind(record.value_date)
            .bind(record.balance_after)
            .bind(record.match_status.as_str())
            .bind(record.match_confidence)
            .bind(record.reconciled)
            .bind(&record.raw_payload)
            .bind(record.created_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("insert bank transaction", e))?;

            match row {
                Some(row) => inserted.push(row.into()),
                None => skipped += 1,
            }
        }

        tx.commit()
            .await
            .map_err(|e| db_error("commit sync transaction", e))?;

        timer.observe_duration();
        info!(
            connection_id = %id,
            inserted = inserted.len(),
            skipped = skipped,
            "Sync committed"
        );

        Ok(SyncCommitResult {
            before,
            after,
            inserted,
            skipped,
        })
    }

    #[instrument(skip(self, message))]
    async fn record_sync_failure(
        &self,
        id: Uuid,
        message: &str,
    ) -> Result<BankConnection, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_sync_failure"])
            .start_timer();

        let row = sqlx::query_as::<_, ConnectionRow>(&format!(
            r#"
            UPDATE bank_connections
            SET sync_status = 'error', error_message = $2, sync_started_at = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            CONNECTION_COLUMNS
        ))
        .bind(id)
        .bind(message)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("record sync failure", e))?
        .ok_or_else(|| not_found("Connection", id))?;

        timer.observe_duration();
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn get_transaction(&self, id: Uuid) -> Result<Option<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_transaction"])
            .start_timer();
        let tx = self.fetch_transaction(id).await?;
        timer.observe_duration();
        Ok(tx)
    }

    #[instrument(skip(self))]
    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_transactions"])
            .start_timer();

        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {} FROM bank_transactions
            WHERE ($1::uuid IS NULL OR connection_id = $1)
              AND ($2::varchar IS NULL OR match_status = $2)
              AND ($3::boolean IS NULL OR reconciled = $3)
              AND ($4::date IS NULL OR transaction_date >= $4)
              AND ($5::date IS NULL OR transaction_date <= $5)
            ORDER BY transaction_date, created_at, id
            LIMIT $6
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(filter.connection_id)
        .bind(filter.match_status.map(|s| s.as_str()))
        .bind(filter.reconciled)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list transactions", e))?;

        timer.observe_duration();
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn list_match_candidates(&self) -> Result<Vec<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_match_candidates"])
            .start_timer();

        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {} FROM bank_transactions
            WHERE match_status = 'unmatched' AND reconciled = FALSE AND transaction_type = 'credit'
              AND reverses_transaction_id IS NULL
            ORDER BY transaction_date, created_at, id
            "#,
            TRANSACTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list match candidates", e))?;

        timer.observe_duration();
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, assignment), fields(confidence = assignment.confidence))]
    async fn apply_auto_match(
        &self,
        id: Uuid,
        assignment: &MatchAssignment,
    ) -> Result<Option<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_auto_match"])
            .start_timer();

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE bank_transactions
            SET match_status = $2, match_confidence = $3, matched_invoice_ref = $4
            WHERE id = $1 AND match_status = 'unmatched' AND reconciled = FALSE
              AND reverses_transaction_id IS NULL
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .bind(assignment.status.as_str())
        .bind(assignment.confidence)
        .bind(&assignment.invoice_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("apply auto match", e))?;

        timer.observe_duration();
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, notes))]
    async fn apply_manual_match(
        &self,
        id: Uuid,
        invoice_ref: &str,
        notes: Option<&str>,
    ) -> Result<BankTransaction, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_manual_match"])
            .start_timer();

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE bank_transactions
            SET match_status = 'manual', match_confidence = 100,
                matched_invoice_ref = $2, match_notes = $3
            WHERE id = $1 AND reconciled = FALSE
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .bind(invoice_ref)
        .bind(notes)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("apply manual match", e))?;

        timer.observe_duration();

        match row {
            Some(row) => Ok(row.into()),
            None => Err(self
                .transaction_guard_error(id, "is reconciled and cannot be re-matched")
                .await),
        }
    }

    #[instrument(skip(self))]
    async fn mark_reconciled(
        &self,
        id: Uuid,
        reconciled_by: &str,
        at: DateTime<Utc>,
    ) -> Result<BankTransaction, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_reconciled"])
            .start_timer();

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE bank_transactions
            SET reconciled = TRUE, reconciled_by = $2, reconciled_at = $3
            WHERE id = $1 AND reconciled = FALSE
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .bind(reconciled_by)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("reconcile transaction", e))?;

        timer.observe_duration();

        match row {
            Some(row) => Ok(row.into()),
            None => Err(self.transaction_guard_error(id, "is already reconciled").await),
        }
    }

    #[instrument(skip(self, reversal), fields(external_ref = %reversal.external_ref))]
    async fn insert_reversal(
        &self,
        reversal: &BankTransaction,
    ) -> Result<BankTransaction, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_reversal"])
            .start_timer();

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO bank_transactions (id, connection_id, external_ref, transaction_type,
                amount, currency, description, counterparty, transaction_date, value_date,
                balance_after, match_status, match_confidence, reconciled, raw_payload,
                reverses_transaction_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(reversal.id)
        .bind(reversal.connection_id)
        .bind(&reversal.external_ref)
        .bind(reversal.transaction_type.as_str())
        .bind(reversal.amount)
        .bind(&reversal.currency)
        .bind(&reversal.description)
        .bind(&reversal.counterparty)
        .bind(reversal.transaction_date)
        .bind(reversal.value_date)
        .bind(reversal.balance_after)
        .bind(reversal.match_status.as_str())
        .bind(reversal.match_confidence)
        .bind(reversal.reconciled)
        .bind(&reversal.raw_payload)
        .bind(reversal.reverses_transaction_id)
        .bind(reversal.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Transaction has already been reversed ({})",
                    reversal.external_ref
                ))
            }
            _ => db_error("insert reversal", e),
        })?;

        timer.observe_duration();
        Ok(row.into())
    }

    #[instrument(skip(self, session), fields(connection_id = %session.connection_id))]
    async fn insert_session(
        &self,
        session: &ReconciliationSession,
    ) -> Result<ReconciliationSession, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_session"])
            .start_timer();

        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            INSERT INTO reconciliation_sessions (id, connection_id, period_start, period_end,
                bank_opening_balance, bank_closing_balance, book_opening_balance,
                book_closing_balance, status, notes, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(session.id)
        .bind(session.connection_id)
        .bind(session.period_start)
        .bind(session.period_end)
        .bind(session.bank_opening_balance)
        .bind(session.bank_closing_balance)
        .bind(session.book_opening_balance)
        .bind(session.book_closing_balance)
        .bind(session.status.as_str())
        .bind(&session.notes)
        .bind(&session.created_by)
        .bind(session.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("create session", e))?;

        timer.observe_duration();
        info!(session_id = %row.id, "Reconciliation session created");
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn get_session(&self, id: Uuid) -> Result<Option<ReconciliationSession>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_session"])
            .start_timer();
        let session = self.fetch_session(id).await?;
        timer.observe_duration();
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn list_sessions(
        &self,
        connection_id: Option<Uuid>,
    ) -> Result<Vec<ReconciliationSession>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_sessions"])
            .start_timer();

        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {} FROM reconciliation_sessions
            WHERE ($1::uuid IS NULL OR connection_id = $1)
            ORDER BY created_at DESC, id
            "#,
            SESSION_COLUMNS
        ))
        .bind(connection_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list sessions", e))?;

        timer.observe_duration();
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, transition), fields(transition = transition.name()))]
    async fn transition_session(
        &self,
        id: Uuid,
        transition: &SessionTransition,
    ) -> Result<ReconciliationSession, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transition_session"])
            .start_timer();

        let current = self
            .fetch_session(id)
            .await?
            .ok_or_else(|| not_found("Session", id))?;
        if !transition.allowed_from().contains(&current.status) {
            return Err(invalid_transition(transition, current.status));
        }

        let mut next = current.clone();
        next.apply(transition);

        // Guarded on the status we validated against; a concurrent transition wins.
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            UPDATE reconciliation_sessions
            SET status = $3, total_credits = $4, total_debits = $5, matched_count = $6,
                unmatched_count = $7, discrepancy = $8, notes = $9, started_at = $10,
                completed_by = $11, completed_at = $12, approved_by = $13, approved_at = $14
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(id)
        .bind(current.status.as_str())
        .bind(next.status.as_str())
        .bind(next.total_credits)
        .bind(next.total_debits)
        .bind(next.matched_count)
        .bind(next.unmatched_count)
        .bind(next.discrepancy)
        .bind(&next.notes)
        .bind(next.started_at)
        .bind(&next.completed_by)
        .bind(next.completed_at)
        .bind(&next.approved_by)
        .bind(next.approved_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("transition session", e))?;

        timer.observe_duration();

        match row {
            Some(row) => Ok(row.into()),
            None => {
                let status = self
                    .fetch_session(id)
                    .await?
                    .map(|s| s.status)
                    .ok_or_else(|| not_found("Session", id))?;
                Err(invalid_transition(transition, status))
            }
        }
    }

    #[instrument(skip(self, alert), fields(alert_type = alert.alert_type.as_str()))]
    async fn insert_alert(&self, alert: &BankAlert) -> Result<BankAlert, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_alert"])
            .start_timer();

        let row = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            INSERT INTO bank_alerts (id, connection_id, transaction_id, alert_type, priority, title,
                message, recipient_group, amount, currency, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            ALERT_COLUMNS
        ))
        .bind(alert.id)
        .bind(alert.connection_id)
        .bind(alert.transaction_id)
        .bind(alert.alert_type.as_str())
        .bind(alert.priority.as_str())
        .bind(&alert.title)
        .bind(&alert.message)
        .bind(&alert.recipient_group)
        .bind(alert.amount)
        .bind(&alert.currency)
        .bind(alert.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("create alert", e))?;

        timer.observe_duration();
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn get_alert(&self, id: Uuid) -> Result<Option<BankAlert>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_alert"])
            .start_timer();
        let alert = self.fetch_alert(id).await?;
        timer.observe_duration();
        Ok(alert)
    }

    #[instrument(skip(self))]
    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<BankAlert>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_alerts"])
            .start_timer();

        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            SELECT {} FROM bank_alerts
            WHERE ($1::uuid IS NULL OR connection_id = $1)
              AND ($2 = FALSE OR is_read = FALSE)
              AND ($3 = TRUE OR is_dismissed = FALSE)
            ORDER BY created_at DESC, id
            "#,
            ALERT_COLUMNS
        ))
        .bind(filter.connection_id)
        .bind(filter.unread_only)
        .bind(filter.include_dismissed)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list alerts", e))?;

        timer.observe_duration();
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn mark_alert_read(&self, id: Uuid, at: DateTime<Utc>) -> Result<BankAlert, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_alert_read"])
            .start_timer();

        let row = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            UPDATE bank_alerts
            SET is_read = TRUE, read_at = COALESCE(read_at, $2)
            WHERE id = $1 AND is_dismissed = FALSE
            RETURNING {}
            "#,
            ALERT_COLUMNS
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("mark alert read", e))?;

        timer.observe_duration();

        match row {
            Some(row) => Ok(row.into()),
            None => Err(self.alert_guard_error(id, "has been dismissed").await),
        }
    }

    #[instrument(skip(self))]
    async fn dismiss_alert(&self, id: Uuid, at: DateTime<Utc>) -> Result<BankAlert, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["dismiss_alert"])
            .start_timer();

        let row = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            UPDATE bank_alerts
            SET is_dismissed = TRUE, dismissed_at = $2
            WHERE id = $1 AND is_dismissed = FALSE
            RETURNING {}
            "#,
            ALERT_COLUMNS
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("dismiss alert", e))?;

        timer.observe_duration();

        match row {
            Some(row) => Ok(row.into()),
            None => Err(self.alert_guard_error(id, "is already dismissed").await),
        }
    }
}
