//! Auto-match engine: assigns unmatched credits to open invoices.

use crate::events::{DomainEvent, EventPublisher};
use crate::integrations::InvoiceSource;
use crate::models::{Actor, Invoice, MatchStatus};
use crate::services::metrics::record_auto_match;
use crate::services::scoring::best_match;
use crate::store::Store;
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const AUTO_MATCH_ACTOR: Actor = Actor::System("auto-match");

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MatchSummary {
    pub candidates: usize,
    pub matched: usize,
    pub partial: usize,
    pub unmatched: usize,
    /// Candidates that changed underneath the run (e.g. matched manually meanwhile).
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_source_error: Option<String>,
}

pub struct AutoMatcher {
    store: Arc<dyn Store>,
    invoices: Arc<dyn InvoiceSource>,
    events: EventPublisher,
}

impl AutoMatcher {
    pub fn new(
        store: Arc<dyn Store>,
        invoices: Arc<dyn InvoiceSource>,
        events: EventPublisher,
    ) -> Self {
        Self {
            store,
            invoices,
            events,
        }
    }

    /// Score every candidate against the current open invoices and persist the winners.
    ///
    /// Only reads invoices; never changes their payment state.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<MatchSummary, AppError> {
        let candidates = self.store.list_match_candidates().await?;
        let mut summary = MatchSummary {
            candidates: candidates.len(),
            ..Default::default()
        };

        if candidates.is_empty() {
            return Ok(summary);
        }

        let mut open: Vec<Invoice> = match self.invoices.list_open_invoices().await {
            Ok(invoices) => invoices
                .into_iter()
                .filter(|i| !i.status.is_terminal())
                .collect(),
            Err(e) => {
                warn!(error = %e, "Invoice source unavailable, auto-match skipped");
                summary.unmatched = candidates.len();
                summary.invoice_source_error = Some(e.to_string());
                return Ok(summary);
            }
        };
        open.sort_by_key(|i| i.id);

        for transaction in candidates {
            let Some(assignment) = best_match(&transaction, &open) else {
                summary.unmatched += 1;
                record_auto_match(MatchStatus::Unmatched.as_str());
                continue;
            };

            match self.store.apply_auto_match(transaction.id, &assignment).await? {
                Some(after) => {
                    match assignment.status {
                        MatchStatus::Matched => summary.matched += 1,
                        _ => summary.partial += 1,
                    }
                    record_auto_match(assignment.status.as_str());
                    self.events
                        .publish(DomainEvent::TransactionAutoMatched {
                            actor: AUTO_MATCH_ACTOR,
                            before: transaction,
                            after,
                        })
                        .await;
                }
                None => summary.skipped += 1,
            }
        }

        info!(
            candidates = summary.candidates,
            matched = summary.matched,
            partial = summary.partial,
            unmatched = summary.unmatched,
            skipped = summary.skipped,
            "Auto-match run completed"
        );

        Ok(summary)
    }
}
