//! HTTP surface tests for health, metrics and connection management.

mod common;

use common::{dec, json_dec, spawn_app};
use serde_json::{json, Value};

#[tokio::test]
async fn health_and_metrics_are_served() {
    let app = spawn_app().await;

    let health = app.get("/health").await;
    assert_eq!(health.status(), 200);

    let ready = app.get("/ready").await;
    assert_eq!(ready.status(), 200);

    app.register_connection("hdfc", "API-0").await;
    let metrics = app.get("/metrics").await;
    assert_eq!(metrics.status(), 200);
    let body = metrics.text().await.unwrap();
    assert!(body.contains("banking_"));
}

#[tokio::test]
async fn duplicate_connection_is_a_conflict() {
    let app = spawn_app().await;
    app.register_connection("hdfc", "API-1").await;

    let response = app
        .post(
            "/connections",
            json!({
                "bank_code": "hdfc",
                "account_number": "API-1",
                "currency": "INR",
            }),
        )
        .await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn registration_is_validated() {
    let app = spawn_app().await;
    let response = app
        .post(
            "/connections",
            json!({
                "bank_code": " ",
                "account_number": "API-2",
                "currency": "INR",
            }),
        )
        .await;
    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn deactivation_happens_once() {
    let app = spawn_app().await;
    let connection = app.register_connection("icici", "API-3").await;
    let path = format!("/connections/{}/deactivate", connection.id);

    let first = app.post(&path, json!({})).await;
    assert_eq!(first.status(), 200);
    let body: Value = first.json().await.unwrap();
    assert_eq!(body["is_active"], false);

    let second = app.post(&path, json!({})).await;
    assert_eq!(second.status(), 409);

    let active: Vec<Value> = app
        .get("/connections?active_only=true")
        .await
        .json()
        .await
        .unwrap();
    assert!(active.is_empty());
}

#[tokio::test]
async fn balance_override_updates_connection() {
    let app = spawn_app().await;
    let connection = app.register_connection("hdfc", "API-4").await;

    let response = app
        .client
        .put(format!(
            "{}/connections/{}/balance",
            app.address, connection.id
        ))
        .header("x-user-id", common::OPERATOR)
        .json(&json!({ "balance": "2500.50", "available_balance": "2000.00" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(json_dec(&body["balance"]), dec("2500.50"));

    let stored = app.state.connections.get(connection.id).await.unwrap();
    assert_eq!(stored.balance, Some(dec("2500.50")));
}
