//! Integration tests for reconciliation sessions.

mod common;

use banking_service::models::{TransactionFilter, TransactionType};
use banking_service::store::Store;
use chrono::Duration;
use common::{channel_tx, channel_tx_on, dec, json_dec, spawn_app, today, TestApp, APPROVER};
use serde_json::{json, Value};
use uuid::Uuid;

async fn create_session(app: &TestApp, connection_id: Uuid) -> Value {
    let response = app
        .post(
            "/sessions",
            json!({
                "connection_id": connection_id,
                "period_start": (today() - Duration::days(7)).to_string(),
                "period_end": today().to_string(),
                "bank_opening_balance": "1000.00",
                "bank_closing_balance": "1500.00",
                "book_opening_balance": "1000.00",
                "book_closing_balance": "1450.00",
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    response.json().await.unwrap()
}

#[tokio::test]
async fn session_moves_forward_to_approval() {
    let app = spawn_app().await;
    let connection = app.register_connection("hdfc", "SES-1").await;
    let session = create_session(&app, connection.id).await;
    assert_eq!(session["status"], "draft");
    assert_eq!(session["created_by"], common::OPERATOR);
    let id = session["id"].as_str().unwrap();

    let started = app.post(&format!("/sessions/{}/start", id), json!({})).await;
    assert_eq!(started.status(), 200);
    let started: Value = started.json().await.unwrap();
    assert_eq!(started["status"], "in_progress");

    let completed = app
        .post(
            &format!("/sessions/{}/complete", id),
            json!({ "notes": "Bank charges not yet booked" }),
        )
        .await;
    assert_eq!(completed.status(), 200);
    let completed: Value = completed.json().await.unwrap();
    assert_eq!(completed["status"], "completed");
    assert_eq!(json_dec(&completed["discrepancy"]), dec("50"));
    assert_eq!(completed["completed_by"], common::OPERATOR);
    assert_eq!(completed["notes"], "Bank charges not yet booked");

    let approved = app
        .post_as(APPROVER, &format!("/sessions/{}/approve", id), json!({}))
        .await;
    assert_eq!(approved.status(), 200);
    let approved: Value = approved.json().await.unwrap();
    assert_eq!(approved["status"], "approved");
    assert_eq!(approved["approved_by"], APPROVER);
    assert!(approved["approved_at"].is_string());
}

#[tokio::test]
async fn approving_a_draft_is_a_state_error() {
    let app = spawn_app().await;
    let connection = app.register_connection("hdfc", "SES-2").await;
    let session = create_session(&app, connection.id).await;
    let id = session["id"].as_str().unwrap();

    let response = app
        .post_as(APPROVER, &format!("/sessions/{}/approve", id), json!({}))
        .await;
    assert_eq!(response.status(), 409);
    let body: Value = response.json().await.unwrap();
    assert!(body["details"].as_str().unwrap().contains("draft"));

    let stored: Value = app.get(&format!("/sessions/{}", id)).await.json().await.unwrap();
    assert_eq!(stored["status"], "draft");
}

#[tokio::test]
async fn transitions_never_move_backwards() {
    let app = spawn_app().await;
    let connection = app.register_connection("hdfc", "SES-3").await;
    let session = create_session(&app, connection.id).await;
    let id = session["id"].as_str().unwrap();

    // Completing straight from draft is allowed.
    let completed = app.post(&format!("/sessions/{}/complete", id), json!({})).await;
    assert_eq!(completed.status(), 200);

    let start = app.post(&format!("/sessions/{}/start", id), json!({})).await;
    assert_eq!(start.status(), 409);

    let complete_again = app.post(&format!("/sessions/{}/complete", id), json!({})).await;
    assert_eq!(complete_again.status(), 409);
}

#[tokio::test]
async fn approval_requires_the_capability() {
    let app = spawn_app().await;
    let connection = app.register_connection("hdfc", "SES-4").await;
    let session = create_session(&app, connection.id).await;
    let id = session["id"].as_str().unwrap();
    app.post(&format!("/sessions/{}/complete", id), json!({})).await;

    let response = app.post(&format!("/sessions/{}/approve", id), json!({})).await;
    assert_eq!(response.status(), 403);

    let stored = app
        .state
        .sessions
        .get(Uuid::parse_str(id).unwrap())
        .await
        .unwrap();
    assert!(stored.approved_by.is_none());
}

#[tokio::test]
async fn completion_summarizes_transactions_in_period() {
    let app = spawn_app().await;
    let connection = app.register_connection("hdfc", "SES-5").await;
    app.hdfc.set_balance("100000");
    app.hdfc
        .push_transaction(channel_tx("IN-1", TransactionType::Credit, "700.00", "Receipt"));
    app.hdfc
        .push_transaction(channel_tx("IN-2", TransactionType::Credit, "300.00", "Receipt"));
    app.hdfc
        .push_transaction(channel_tx("OUT-1", TransactionType::Debit, "150.25", "Bank charges"));
    app.hdfc.push_transaction(channel_tx_on(
        "OLD-1",
        TransactionType::Credit,
        "9999.00",
        "Outside period",
        today() - Duration::days(30),
    ));
    app.state.sync.run_cycle().await.unwrap();

    let in_1 = app
        .store
        .list_transactions(&TransactionFilter::default())
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.external_ref == "IN-1")
        .unwrap();
    app.post(
        &format!("/transactions/{}/match", in_1.id),
        json!({ "invoice_ref": "INV-700" }),
    )
    .await;

    let session = create_session(&app, connection.id).await;
    let id = session["id"].as_str().unwrap();
    let completed: Value = app
        .post(&format!("/sessions/{}/complete", id), json!({}))
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(json_dec(&completed["total_credits"]), dec("1000"));
    assert_eq!(json_dec(&completed["total_debits"]), dec("150.25"));
    assert_eq!(completed["matched_count"], 1);
    assert_eq!(completed["unmatched_count"], 2);
}

#[tokio::test]
async fn create_validates_period_and_connection() {
    let app = spawn_app().await;
    let connection = app.register_connection("hdfc", "SES-6").await;

    let inverted = app
        .post(
            "/sessions",
            json!({
                "connection_id": connection.id,
                "period_start": "2024-02-01",
                "period_end": "2024-01-01",
                "bank_opening_balance": "0",
                "bank_closing_balance": "0",
                "book_opening_balance": "0",
                "book_closing_balance": "0",
            }),
        )
        .await;
    assert_eq!(inverted.status(), 422);

    let unknown = app
        .post(
            "/sessions",
            json!({
                "connection_id": Uuid::new_v4(),
                "period_start": "2024-01-01",
                "period_end": "2024-01-31",
                "bank_opening_balance": "0",
                "bank_closing_balance": "0",
                "book_opening_balance": "0",
                "book_closing_balance": "0",
            }),
        )
        .await;
    assert_eq!(unknown.status(), 404);

    let sessions: Vec<Value> = app
        .get(&format!("/sessions?connection_id={}", connection.id))
        .await
        .json()
        .await
        .unwrap();
    assert!(sessions.is_empty());
}
