//! Health, readiness and the ambient HTTP surface.

mod common;

use common::TestApp;
use serde_json::Value;

#[tokio::test]
async fn health_check_returns_ok() {
    // Arrange
    let app = TestApp::spawn().await;

    // Act
    let response = app.get_public("/health").await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);

    let body = response.text().await.expect("Failed to read response body");
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn health_status_names_the_service() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/health/status").await;

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "office-hours");
}

#[tokio::test]
async fn readiness_reports_slot_store_up() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/health/ready").await;

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["slot_store"]["status"], "up");
}

#[tokio::test]
async fn liveness_returns_ok() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/health/live").await;

    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn nonexistent_endpoint_returns_404() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/nonexistent-endpoint").await;

    assert_eq!(response.status().as_u16(), 404);
    assert_eq!(common::error_code(response).await, "NOT_FOUND");
}

#[tokio::test]
async fn request_id_is_echoed() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!("{}/health", app.base_url))
        .header("x-request-id", "req-abc-123")
        .send()
        .await
        .unwrap();

    assert_eq!(
        response.headers()["x-request-id"].to_str().unwrap(),
        "req-abc-123"
    );
}

#[tokio::test]
async fn request_id_is_generated_when_absent() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/health").await;

    let id = response.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/api-docs/openapi.json").await;

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["info"]["title"], "Office Hours API");
}

#[tokio::test]
async fn metrics_endpoint_reports_disabled_exporter() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/metrics").await;

    assert_eq!(response.status().as_u16(), 503);
}
