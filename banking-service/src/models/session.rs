use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Draft,
    InProgress,
    Completed,
    Approved,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Approved => "approved",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "approved" => Self::Approved,
            _ => Self::Draft,
        }
    }
}

/// Bank-vs-book comparison over a closed date range.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationSession {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub bank_opening_balance: Decimal,
    pub bank_closing_balance: Decimal,
    pub book_opening_balance: Decimal,
    pub book_closing_balance: Decimal,
    pub total_credits: Decimal,
    pub total_debits: Decimal,
    pub matched_count: i32,
    pub unmatched_count: i32,
    pub discrepancy: Option<Decimal>,
    pub status: SessionStatus,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub connection_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub bank_opening_balance: Decimal,
    pub bank_closing_balance: Decimal,
    pub book_opening_balance: Decimal,
    pub book_closing_balance: Decimal,
    pub notes: Option<String>,
}

impl ReconciliationSession {
    pub fn new(new: NewSession, created_by: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection_id: new.connection_id,
            period_start: new.period_start,
            period_end: new.period_end,
            bank_opening_balance: new.bank_opening_balance,
            bank_closing_balance: new.bank_closing_balance,
            book_opening_balance: new.book_opening_balance,
            book_closing_balance: new.book_closing_balance,
            total_credits: Decimal::ZERO,
            total_debits: Decimal::ZERO,
            matched_count: 0,
            unmatched_count: 0,
            discrepancy: None,
            status: SessionStatus::Draft,
            notes: new.notes,
            created_by,
            created_at: Utc::now(),
            started_at: None,
            completed_by: None,
            completed_at: None,
            approved_by: None,
            approved_at: None,
        }
    }

    /// Apply a transition that the store has already validated against `allowed_from`.
    pub fn apply(&mut self, transition: &SessionTransition) {
        self.status = transition.target();
        match transition {
            SessionTransition::Start { at } => self.started_at = Some(*at),
            SessionTransition::Complete {
                actor,
                at,
                notes,
                summary,
            } => {
                self.total_credits = summary.total_credits;
                self.total_debits = summary.total_debits;
                self.matched_count = summary.matched_count;
                self.unmatched_count = summary.unmatched_count;
                self.discrepancy = Some(summary.discrepancy);
                self.completed_by = Some(actor.clone());
                self.completed_at = Some(*at);
                if notes.is_some() {
                    self.notes = notes.clone();
                }
            }
            SessionTransition::Approve { actor, at } => {
                self.approved_by = Some(actor.clone());
                self.approved_at = Some(*at);
            }
        }
    }
}

/// Figures computed when a session is completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub total_credits: Decimal,
    pub total_debits: Decimal,
    pub matched_count: i32,
    pub unmatched_count: i32,
    pub discrepancy: Decimal,
}

/// Forward-only lifecycle steps: draft -> in_progress -> completed -> approved.
#[derive(Debug, Clone)]
pub enum SessionTransition {
    Start {
        at: DateTime<Utc>,
    },
    Complete {
        actor: String,
        at: DateTime<Utc>,
        notes: Option<String>,
        summary: SessionSummary,
    },
    Approve {
        actor: String,
        at: DateTime<Utc>,
    },
}

impl SessionTransition {
    pub fn target(&self) -> SessionStatus {
        match self {
            Self::Start { .. } => SessionStatus::InProgress,
            Self::Complete { .. } => SessionStatus::Completed,
            Self::Approve { .. } => SessionStatus::Approved,
        }
    }

    pub fn allowed_from(&self) -> &'static [SessionStatus] {
        match self {
            Self::Start { .. } => &[SessionStatus::Draft],
            Self::Complete { .. } => &[SessionStatus::Draft, SessionStatus::InProgress],
            Self::Approve { .. } => &[SessionStatus::Completed],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Complete { .. } => "complete",
            Self::Approve { .. } => "approve",
        }
    }
}
