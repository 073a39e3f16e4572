//! Integration tests for leadflow-insights API endpoints
//!
//! Tests cover:
//! - 404 before triage has written an insight
//! - Latest insight returned once written
//! - Health endpoint

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use leadflow_common::db::{connect_readonly, init_database, insights, leads};
use leadflow_common::models::{Insight, Lead, LeadRequest};
use leadflow_common::classifier::RuleBasedClassifier;
use leadflow_insights::{build_router, AppState};
use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

/// Test helper: writable pool for seeding plus the read-only app on top
async fn setup() -> (TempDir, SqlitePool, axum::Router) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("leadflow.db");
    let rw = init_database(&path).await.unwrap();
    let ro = connect_readonly(&path).await.unwrap();
    (dir, rw, build_router(AppState::new(ro)))
}

async fn seed_lead(pool: &SqlitePool, note: &str) -> Lead {
    let request = LeadRequest {
        email: Some("a@x.com".to_string()),
        phone: None,
        name: None,
        note: note.to_string(),
        source: Some("web".to_string()),
    };
    let lead = Lead::from_request(
        leadflow_common::uuid_utils::generate_string(),
        &request,
        leadflow_common::time::now(),
    );
    leads::insert_with_idempotency(pool, &lead, &lead.id, "{}", "{}")
        .await
        .unwrap();
    lead
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

#[tokio::test]
async fn test_insight_not_found_before_processing() {
    let (_dir, rw, app) = setup().await;
    let lead = seed_lead(&rw, "I need urgent pricing for 50 seats").await;

    let response = app
        .oneshot(get(&format!("/leads/{}/insight", lead.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_insight_returned_after_processing() {
    let (_dir, rw, app) = setup().await;
    let lead = seed_lead(&rw, "I need urgent pricing for 50 seats").await;

    let payload = RuleBasedClassifier::new().classify(&lead.note);
    let insight = Insight::new(
        leadflow_common::uuid_utils::generate_string(),
        lead.id.clone(),
        leadflow_common::hashing::content_hash(&lead.note),
        payload,
        leadflow_common::time::now(),
    );
    insights::insert_insight(&rw, &insight).await.unwrap();

    let response = app
        .oneshot(get(&format!("/leads/{}/insight", lead.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["lead_id"], lead.id.as_str());
    assert_eq!(body["intent"], "buy");
    assert_eq!(body["priority"], "P0");
    assert_eq!(body["next_action"], "call");
    assert_eq!(body["tags"], serde_json::json!(["enterprise", "urgent"]));
}

#[tokio::test]
async fn test_unknown_lead_is_404() {
    let (_dir, _rw, app) = setup().await;

    let response = app.oneshot(get("/leads/missing/insight")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, _rw, app) = setup().await;

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "leadflow-insights");
    assert!(body["version"].is_string());
}
