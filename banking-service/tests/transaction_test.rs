//! Integration tests for manual match, reconcile and reversal.

mod common;

use banking_service::models::{BankTransaction, TransactionFilter, TransactionType};
use banking_service::store::Store;
use common::{channel_tx, spawn_app, TestApp};
use serde_json::{json, Value};

async fn ingest_one(app: &TestApp, reference: &str, kind: TransactionType) -> BankTransaction {
    app.register_connection("hdfc", &format!("ACC-{}", reference)).await;
    app.hdfc.set_balance("100000");
    app.hdfc
        .push_transaction(channel_tx(reference, kind, "4200.00", "Inward remittance"));
    app.state.sync.run_cycle().await.unwrap();

    app.store
        .list_transactions(&TransactionFilter::default())
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.external_ref == reference)
        .expect("transaction ingested")
}

#[tokio::test]
async fn manual_match_overrides_and_sets_full_confidence() {
    let app = spawn_app().await;
    let tx = ingest_one(&app, "M-1", TransactionType::Credit).await;

    let response = app
        .post(
            &format!("/transactions/{}/match", tx.id),
            json!({ "invoice_ref": "INV-77", "notes": "Confirmed with customer" }),
        )
        .await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["match_status"], "manual");
    assert_eq!(body["match_confidence"], 100);
    assert_eq!(body["matched_invoice_ref"], "INV-77");
    assert_eq!(body["match_notes"], "Confirmed with customer");
    assert_eq!(body["reconciled"], false);
}

#[tokio::test]
async fn reconciled_transactions_are_immutable() {
    let app = spawn_app().await;
    let tx = ingest_one(&app, "R-1", TransactionType::Credit).await;

    app.post(
        &format!("/transactions/{}/match", tx.id),
        json!({ "invoice_ref": "INV-1" }),
    )
    .await;
    let response = app
        .post(&format!("/transactions/{}/reconcile", tx.id), json!({}))
        .await;
    assert_eq!(response.status(), 200);
    let reconciled: Value = response.json().await.unwrap();
    assert_eq!(reconciled["reconciled"], true);
    assert_eq!(reconciled["reconciled_by"], common::OPERATOR);

    let rematch = app
        .post(
            &format!("/transactions/{}/match", tx.id),
            json!({ "invoice_ref": "INV-2" }),
        )
        .await;
    assert_eq!(rematch.status(), 409);

    let again = app
        .post(&format!("/transactions/{}/reconcile", tx.id), json!({}))
        .await;
    assert_eq!(again.status(), 409);

    let stored = app.state.transactions.get(tx.id).await.unwrap();
    assert_eq!(stored.matched_invoice_ref.as_deref(), Some("INV-1"));
    assert_eq!(stored.reconciled_by.as_deref(), Some(common::OPERATOR));
}

#[tokio::test]
async fn match_request_is_validated() {
    let app = spawn_app().await;
    let tx = ingest_one(&app, "V-1", TransactionType::Credit).await;

    let blank = app
        .post(
            &format!("/transactions/{}/match", tx.id),
            json!({ "invoice_ref": "   " }),
        )
        .await;
    assert_eq!(blank.status(), 422);

    let long_notes = app
        .post(
            &format!("/transactions/{}/match", tx.id),
            json!({ "invoice_ref": "INV-1", "notes": "x".repeat(1001) }),
        )
        .await;
    assert_eq!(long_notes.status(), 422);

    let unknown = app
        .post(
            &format!("/transactions/{}/match", uuid::Uuid::new_v4()),
            json!({ "invoice_ref": "INV-1" }),
        )
        .await;
    assert_eq!(unknown.status(), 404);
}

#[tokio::test]
async fn mutations_require_an_actor() {
    let app = spawn_app().await;
    let tx = ingest_one(&app, "A-1", TransactionType::Credit).await;

    let response = app
        .client
        .post(format!("{}/transactions/{}/reconcile", app.address, tx.id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let stored = app.state.transactions.get(tx.id).await.unwrap();
    assert!(!stored.reconciled);
}

#[tokio::test]
async fn reversal_creates_opposite_entry_once() {
    let app = spawn_app().await;
    let tx = ingest_one(&app, "REV-1", TransactionType::Credit).await;

    let response = app
        .post(
            &format!("/transactions/{}/reverse", tx.id),
            json!({ "reason": "Duplicate credit from bank" }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let reversal: Value = response.json().await.unwrap();
    assert_eq!(reversal["transaction_type"], "debit");
    assert_eq!(reversal["amount"], "4200.00");
    assert_eq!(reversal["external_ref"], "REV-1:reversal");
    assert_eq!(reversal["reverses_transaction_id"], tx.id.to_string());

    let second = app
        .post(
            &format!("/transactions/{}/reverse", tx.id),
            json!({ "reason": "again" }),
        )
        .await;
    assert_eq!(second.status(), 409);

    let reversal_id = reversal["id"].as_str().unwrap();
    let of_reversal = app
        .post(
            &format!("/transactions/{}/reverse", reversal_id),
            json!({ "reason": "undo" }),
        )
        .await;
    assert_eq!(of_reversal.status(), 400);

    let original = app.state.transactions.get(tx.id).await.unwrap();
    assert_eq!(original.transaction_type, TransactionType::Credit);
    assert_eq!(original.match_status, tx.match_status);
}

#[tokio::test]
async fn list_filters_by_connection_and_status() {
    let app = spawn_app().await;
    let tx = ingest_one(&app, "L-1", TransactionType::Credit).await;

    let response = app
        .get(&format!(
            "/transactions?connection_id={}&match_status=unmatched",
            tx.connection_id
        ))
        .await;
    assert_eq!(response.status(), 200);
    let rows: Vec<Value> = response.json().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["external_ref"], "L-1");

    let reconciled: Vec<Value> = app
        .get("/transactions?reconciled=true")
        .await
        .json()
        .await
        .unwrap();
    assert!(reconciled.is_empty());
}
