//! Transaction-to-invoice scoring.
//!
//! A score is the sum of three independent components, capped at 100:
//! amount agreement (50/30/0), reference found in the description (30/20/0) and
//! proximity of the transaction date to the invoice due date (20/10/5/0).

use crate::models::{BankTransaction, Invoice, MatchAssignment, MatchStatus};
use chrono::NaiveDate;
use rust_decimal::Decimal;

pub const MAX_SCORE: i32 = 100;
pub const MATCHED_THRESHOLD: i32 = 80;
pub const PARTIAL_THRESHOLD: i32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub amount: i32,
    pub reference: i32,
    pub date: i32,
}

impl Score {
    pub fn total(&self) -> i32 {
        (self.amount + self.reference + self.date).min(MAX_SCORE)
    }
}

pub fn amount_score(amount: Decimal, outstanding: Decimal) -> i32 {
    let difference = (amount - outstanding).abs();
    if difference < Decimal::new(1, 2) {
        50
    } else if difference / outstanding < Decimal::new(5, 2) {
        30
    } else {
        0
    }
}

pub fn reference_score(description: &str, invoice: &Invoice) -> i32 {
    let haystack = description.to_lowercase();
    let appears = |needle: &str| {
        let needle = needle.trim().to_lowercase();
        !needle.is_empty() && haystack.contains(&needle)
    };

    if appears(&invoice.number) {
        30
    } else if invoice.job_ref.as_deref().is_some_and(appears) {
        20
    } else {
        0
    }
}

pub fn date_score(transaction_date: NaiveDate, due_date: NaiveDate) -> i32 {
    match (transaction_date - due_date).num_days().abs() {
        0..=3 => 20,
        4..=7 => 10,
        8..=30 => 5,
        _ => 0,
    }
}

pub fn score(transaction: &BankTransaction, invoice: &Invoice) -> Score {
    Score {
        amount: amount_score(transaction.amount, invoice.outstanding()),
        reference: reference_score(&transaction.description, invoice),
        date: date_score(transaction.transaction_date, invoice.due_date),
    }
}

pub fn classify(total: i32) -> MatchStatus {
    if total >= MATCHED_THRESHOLD {
        MatchStatus::Matched
    } else if total >= PARTIAL_THRESHOLD {
        MatchStatus::Partial
    } else {
        MatchStatus::Unmatched
    }
}

/// Pick the highest-scoring open invoice for a transaction.
///
/// Equal scores resolve to the lowest invoice id, so the result does not depend on the
/// order invoices are supplied in. Returns `None` when the best score stays below the
/// partial threshold.
pub fn best_match(transaction: &BankTransaction, invoices: &[Invoice]) -> Option<MatchAssignment> {
    let mut best: Option<(&Invoice, i32)> = None;

    for invoice in invoices.iter().filter(|i| !i.status.is_terminal()) {
        let total = score(transaction, invoice).total();
        best = match best {
            Some((current, current_total))
                if current_total > total || (current_total == total && current.id <= invoice.id) =>
            {
                Some((current, current_total))
            }
            _ => Some((invoice, total)),
        };
    }

    let (invoice, total) = best?;
    match classify(total) {
        MatchStatus::Unmatched => None,
        status => Some(MatchAssignment {
            status,
            confidence: total,
            invoice_ref: invoice.number.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InvoiceStatus, NewTransaction, TransactionType};
    use std::str::FromStr;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn credit(amount: &str, description: &str, on: NaiveDate) -> BankTransaction {
        BankTransaction::from_new(
            Uuid::new_v4(),
            NewTransaction {
                external_ref: "UTR".to_string(),
                transaction_type: TransactionType::Credit,
                amount: dec(amount),
                currency: "INR".to_string(),
                description: description.to_string(),
                counterparty: None,
                transaction_date: on,
                value_date: None,
                balance_after: None,
                raw_payload: serde_json::Value::Null,
            },
        )
    }

    fn invoice(id: u128, number: &str, total: &str, due: NaiveDate) -> Invoice {
        Invoice {
            id: Uuid::from_u128(id),
            number: number.to_string(),
            total: dec(total),
            paid: Decimal::ZERO,
            due_date: due,
            job_ref: Some("JOB-77".to_string()),
            status: InvoiceStatus::Issued,
        }
    }

    #[test]
    fn exact_amount_reference_and_same_day_scores_100() {
        let tx = credit("1500.00", "NEFT from ACME ref inv-2024-001", date(2024, 3, 10));
        let inv = invoice(1, "INV-2024-001", "1500.00", date(2024, 3, 10));

        let s = score(&tx, &inv);
        assert_eq!(s, Score { amount: 50, reference: 30, date: 20 });
        assert_eq!(s.total(), 100);

        let assignment = best_match(&tx, &[inv]).unwrap();
        assert_eq!(assignment.status, MatchStatus::Matched);
        assert_eq!(assignment.confidence, 100);
        assert_eq!(assignment.invoice_ref, "INV-2024-001");
    }

    #[test]
    fn ten_percent_off_no_reference_forty_days_scores_zero() {
        let tx = credit("1100.00", "Cash deposit", date(2024, 3, 10));
        let mut inv = invoice(1, "INV-9", "1000.00", date(2024, 1, 30));
        inv.job_ref = None;

        assert_eq!(score(&tx, &inv).total(), 0);
        assert!(best_match(&tx, &[inv]).is_none());
    }

    #[test]
    fn amount_component_bands() {
        assert_eq!(amount_score(dec("100.004"), dec("100.00")), 50);
        assert_eq!(amount_score(dec("104.00"), dec("100.00")), 30);
        assert_eq!(amount_score(dec("105.00"), dec("100.00")), 0);
    }

    #[test]
    fn job_reference_is_secondary() {
        let inv = invoice(1, "INV-5", "10", date(2024, 1, 1));
        assert_eq!(reference_score("payment for job-77", &inv), 20);
        assert_eq!(reference_score("INV-5 / JOB-77", &inv), 30);
        assert_eq!(reference_score("unrelated", &inv), 0);
    }

    #[test]
    fn empty_references_never_match() {
        let mut inv = invoice(1, "  ", "10", date(2024, 1, 1));
        inv.job_ref = Some(String::new());
        assert_eq!(reference_score("anything at all", &inv), 0);
    }

    #[test]
    fn date_component_bands() {
        let due = date(2024, 6, 15);
        assert_eq!(date_score(date(2024, 6, 12), due), 20);
        assert_eq!(date_score(date(2024, 6, 22), due), 10);
        assert_eq!(date_score(date(2024, 7, 15), due), 5);
        assert_eq!(date_score(date(2024, 7, 16), due), 0);
    }

    #[test]
    fn partial_band_between_40_and_79() {
        // 30 (within 5%) + 20 (job ref) + 20 (same day) = 70
        let tx = credit("980.00", "job-77 settlement", date(2024, 2, 1));
        let inv = invoice(1, "INV-1", "1000.00", date(2024, 2, 1));
        let assignment = best_match(&tx, &[inv]).unwrap();
        assert_eq!(assignment.status, MatchStatus::Partial);
        assert_eq!(assignment.confidence, 70);
    }

    #[test]
    fn ties_resolve_to_lowest_invoice_id_regardless_of_order() {
        let tx = credit("500.00", "transfer", date(2024, 4, 1));
        let a = invoice(7, "INV-A", "500.00", date(2024, 4, 1));
        let b = invoice(3, "INV-B", "500.00", date(2024, 4, 1));

        let forward = best_match(&tx, &[a.clone(), b.clone()]).unwrap();
        let backward = best_match(&tx, &[b, a]).unwrap();
        assert_eq!(forward.invoice_ref, "INV-B");
        assert_eq!(forward, backward);
    }

    #[test]
    fn terminal_invoices_are_ignored() {
        let tx = credit("500.00", "INV-P", date(2024, 4, 1));
        let mut paid = invoice(1, "INV-P", "500.00", date(2024, 4, 1));
        paid.status = InvoiceStatus::Paid;
        assert!(best_match(&tx, &[paid]).is_none());
    }

    #[test]
    fn fully_paid_invoice_uses_floor_of_one() {
        let tx = credit("1.00", "INV-F", date(2024, 4, 1));
        let mut inv = invoice(1, "INV-F", "250.00", date(2024, 4, 1));
        inv.paid = dec("250.00");
        assert_eq!(score(&tx, &inv).amount, 50);
    }
}
