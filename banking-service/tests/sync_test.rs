//! Integration tests for bank synchronization cycles.

mod common;

use banking_service::models::{
    AlertFilter, AlertPriority, AlertType, MatchStatus, SyncStatus, TransactionFilter,
    TransactionType,
};
use banking_service::services::sync::SkipReason;
use banking_service::services::SyncOutcome;
use banking_service::store::Store;
use common::{channel_tx, dec, invoice, spawn_app, today, FakeFailure};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn repeated_cycles_ingest_each_reference_once() {
    let app = spawn_app().await;
    let connection = app.register_connection("hdfc", "50100001").await;

    app.hdfc.set_balance("250000.00");
    app.hdfc
        .push_transaction(channel_tx("TXN-1", TransactionType::Credit, "1200.00", "NEFT inward"));
    app.hdfc
        .push_transaction(channel_tx("TXN-2", TransactionType::Debit, "300.00", "Fuel card"));

    let first = app.state.sync.run_cycle().await.unwrap();
    assert_eq!(
        first.outcome_for(connection.id),
        Some(&SyncOutcome::Synced {
            inserted: 2,
            skipped: 0
        })
    );

    let second = app.state.sync.run_cycle().await.unwrap();
    assert_eq!(
        second.outcome_for(connection.id),
        Some(&SyncOutcome::Synced {
            inserted: 0,
            skipped: 2
        })
    );

    let stored = app
        .store
        .list_transactions(&TransactionFilter {
            connection_id: Some(connection.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored
        .iter()
        .all(|t| t.match_status == MatchStatus::Unmatched && !t.reconciled));

    let synced = app.state.connections.get(connection.id).await.unwrap();
    assert_eq!(synced.sync_status, SyncStatus::Synced);
    assert_eq!(synced.balance, Some(dec("250000")));
    assert!(synced.last_sync_at.is_some());
    assert!(synced.error_message.is_none());
}

#[tokio::test]
async fn timed_out_connection_does_not_block_others_and_matching_still_runs() {
    let app = spawn_app().await;
    let slow = app.register_connection("hdfc", "SLOW-1").await;
    let healthy = app.register_connection("icici", "OK-1").await;

    app.hdfc.set_balance("1000");
    app.hdfc.set_delay(Duration::from_secs(2));

    app.icici.set_balance("90000");
    app.icici.push_transaction(channel_tx(
        "ICI-77",
        TransactionType::Credit,
        "45000.00",
        "Payment for INV-2024-0042",
    ));
    app.invoices
        .replace(vec![invoice("INV-2024-0042", "45000.00", today())])
        .await;

    let report = app.state.sync.run_cycle().await.unwrap();

    assert!(matches!(
        report.outcome_for(slow.id),
        Some(SyncOutcome::Failed { .. })
    ));
    assert!(matches!(
        report.outcome_for(healthy.id),
        Some(SyncOutcome::Synced { inserted: 1, .. })
    ));

    let matching = report.matching.expect("auto-match runs after every cycle");
    assert_eq!(matching.matched, 1);

    let failed = app.state.connections.get(slow.id).await.unwrap();
    assert_eq!(failed.sync_status, SyncStatus::Error);
    assert!(failed.error_message.is_some());
    assert_eq!(failed.balance, None);

    let matched = app
        .store
        .list_transactions(&TransactionFilter {
            connection_id: Some(healthy.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(matched[0].match_status, MatchStatus::Matched);
    assert_eq!(matched[0].matched_invoice_ref.as_deref(), Some("INV-2024-0042"));
}

#[tokio::test]
async fn failure_after_balance_fetch_leaves_no_partial_update() {
    let app = spawn_app().await;
    let connection = app.register_connection("hdfc", "ATOMIC-1").await;

    app.hdfc.set_balance("5000000");
    app.hdfc
        .push_transaction(channel_tx("TXN-9", TransactionType::Credit, "10.00", "Interest"));
    app.hdfc.fail_transactions(FakeFailure::Status(503));

    let report = app.state.sync.run_cycle().await.unwrap();
    assert!(matches!(
        report.outcome_for(connection.id),
        Some(SyncOutcome::Failed { .. })
    ));

    let after = app.state.connections.get(connection.id).await.unwrap();
    assert_eq!(after.sync_status, SyncStatus::Error);
    assert_eq!(after.balance, None);
    assert!(after.last_sync_at.is_none());

    let stored = app
        .store
        .list_transactions(&TransactionFilter::default())
        .await
        .unwrap();
    assert!(stored.is_empty());

    // Recovery on the next cycle clears the error.
    app.hdfc.heal();
    app.state.sync.run_cycle().await.unwrap();
    let recovered = app.state.connections.get(connection.id).await.unwrap();
    assert_eq!(recovered.sync_status, SyncStatus::Synced);
    assert!(recovered.error_message.is_none());
}

#[tokio::test]
async fn client_errors_are_not_retried_but_server_errors_are() {
    let app = spawn_app().await;
    app.register_connection("hdfc", "AUTH-1").await;
    app.register_connection("icici", "FLAKY-1").await;

    app.hdfc.fail_balance(FakeFailure::Status(401));
    app.icici.fail_balance(FakeFailure::Status(502));

    app.state.sync.run_cycle().await.unwrap();

    // max_retries = 1 in the test configuration.
    assert_eq!(app.hdfc.balance_calls.load(Ordering::SeqCst), 1);
    assert_eq!(app.icici.balance_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn connections_without_channel_or_already_syncing_are_skipped() {
    let app = spawn_app().await;
    let no_channel = app.register_connection("sbi", "000123").await;
    let busy = app.register_connection("hdfc", "BUSY-1").await;

    app.store
        .try_begin_sync(busy.id, Duration::from_secs(60))
        .await
        .unwrap()
        .expect("guard acquired");

    let report = app.state.sync.run_cycle().await.unwrap();

    assert_eq!(
        report.outcome_for(no_channel.id),
        Some(&SyncOutcome::Skipped {
            reason: SkipReason::NoChannel
        })
    );
    assert_eq!(
        report.outcome_for(busy.id),
        Some(&SyncOutcome::Skipped {
            reason: SkipReason::AlreadySyncing
        })
    );
    assert_eq!(app.hdfc.balance_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn deactivated_connections_are_not_synced() {
    let app = spawn_app().await;
    let connection = app.register_connection("hdfc", "OLD-1").await;

    let response = app
        .post(&format!("/connections/{}/deactivate", connection.id), json!({}))
        .await;
    assert_eq!(response.status(), 200);

    let report = app.state.sync.run_cycle().await.unwrap();
    assert!(report.outcome_for(connection.id).is_none());
    assert_eq!(app.hdfc.balance_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sync_raises_error_low_balance_and_large_transaction_alerts() {
    let app = spawn_app().await;
    let low = app.register_connection("hdfc", "LOW-1").await;
    let broken = app.register_connection("icici", "DOWN-1").await;

    app.hdfc.set_balance("5000");
    app.hdfc.push_transaction(channel_tx(
        "BIG-1",
        TransactionType::Credit,
        "2500000",
        "Customer advance",
    ));
    app.icici.fail_balance(FakeFailure::Unreachable);

    app.state.sync.run_cycle().await.unwrap();

    let alerts = app
        .store
        .list_alerts(&AlertFilter::default())
        .await
        .unwrap();

    let of = |t: AlertType| alerts.iter().filter(|a| a.alert_type == t).collect::<Vec<_>>();

    let errors = of(AlertType::SyncError);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].connection_id, broken.id);
    assert_eq!(errors[0].priority, AlertPriority::High);

    let low_balance = of(AlertType::LowBalance);
    assert_eq!(low_balance.len(), 1);
    assert_eq!(low_balance[0].connection_id, low.id);
    assert_eq!(low_balance[0].priority, AlertPriority::Critical);

    let large = of(AlertType::LargeTransaction);
    assert_eq!(large.len(), 1);
    assert_eq!(large[0].priority, AlertPriority::High);
    assert_eq!(large[0].amount, Some(dec("2500000")));

    assert_eq!(app.notifier.sent.lock().unwrap().len(), 3);

    // Balance stays below the threshold: no repeat alert on the next cycle.
    app.icici.heal();
    app.state.sync.run_cycle().await.unwrap();
    let low_again = app
        .store
        .list_alerts(&AlertFilter {
            connection_id: Some(low.id),
            ..Default::default()
        })
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.alert_type == AlertType::LowBalance)
        .count();
    assert_eq!(low_again, 1);
}

#[tokio::test]
async fn manual_trigger_returns_cycle_report() {
    let app = spawn_app().await;
    let connection = app.register_connection("hdfc", "HTTP-1").await;
    app.hdfc.set_balance("20000");

    let response = app.post("/sync/run", json!({})).await;
    assert_eq!(response.status(), 200);

    let report: Value = response.json().await.unwrap();
    let entry = &report["connections"][0];
    assert_eq!(entry["connection_id"], connection.id.to_string());
    assert_eq!(entry["outcome"], "synced");
    assert!(report["matching"].is_object());
}

#[tokio::test]
async fn sync_steps_are_audited_as_system_actor() {
    let app = spawn_app().await;
    app.register_connection("hdfc", "AUD-1").await;
    app.hdfc.set_balance("20000");
    app.hdfc.push_transaction(channel_tx(
        "AUD-TX-1",
        TransactionType::Credit,
        "150.00",
        "Receipt",
    ));

    app.state.sync.run_cycle().await.unwrap();

    let events = app.audit.events.lock().unwrap().clone();
    let completed = events
        .iter()
        .find(|e| e.action == "sync_completed")
        .expect("sync audited");
    assert_eq!(completed.actor, "system:sync-worker");
    let ingested = events
        .iter()
        .find(|e| e.action == "transaction_ingested")
        .expect("ingestion audited");
    assert_eq!(ingested.actor, "system:sync-worker");
    assert_eq!(ingested.after.as_ref().unwrap()["external_ref"], "AUD-TX-1");
    assert!(events
        .iter()
        .any(|e| e.action == "connection_registered" && e.actor == common::OPERATOR));
}
