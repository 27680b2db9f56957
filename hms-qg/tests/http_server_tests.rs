//! HTTP Server & Routing Integration Tests
//!
//! Exercises the query gate endpoints through the full router with static
//! source clients.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use hms_common::confidence::ScoringWeights;
use hms_common::sources::StaticSourceClient;
use hms_common::{SourceIdentity, SourcePolicy};
use hms_qg::gate::QueryGate;
use hms_qg::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn empty_gate() -> QueryGate {
    QueryGate::new(
        ScoringWeights::default(),
        SourcePolicy::default(),
        0.85,
        Duration::from_secs(1),
    )
    .unwrap()
}

/// Supabase and Notion both know product 42; only Notion knows product 7
fn test_app() -> Router {
    let supabase = StaticSourceClient::new(
        SourceIdentity::Supabase,
        "products",
        vec![("42".to_string(), json!({"sku": "P-42", "name": "Widget", "price": 10}))],
    );
    let notion = StaticSourceClient::new(
        SourceIdentity::Notion,
        "catalog",
        vec![
            ("page-42".to_string(), json!({"sku": "P-42", "name": "Widget", "price": 10})),
            ("page-7".to_string(), json!({"sku": "P-7", "name": "Gadget", "price": null})),
        ],
    );
    let gate = empty_gate()
        .with_client(Arc::new(supabase))
        .with_client(Arc::new(notion));
    build_router(AppState::new(Arc::new(gate)))
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// TC-QG-001: Both sources agree, answer is gated through
#[tokio::test]
async fn tc_qg_001_query_answerable() {
    // Given: Two sources holding the same product
    let app = test_app();

    // When: Query by sku
    let (status, body) = call(
        app,
        post_json(
            "/api/v1/query",
            &json!({"query": "price of P-42", "filters": {"sku": "P-42"}, "require_verification": true}),
        ),
    )
    .await;

    // Then: Answerable, no conflicts, both sources reported
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answerable"], true);
    assert_eq!(body["meets_threshold"], true);
    assert_eq!(body["information_not_found"], false);
    assert_eq!(body["verified_sources"], 2);
    assert_eq!(body["conflicts"], json!([]));
    assert_eq!(body["sources"].as_array().unwrap().len(), 2);
    let confidence = body["aggregated_confidence"].as_f64().unwrap();
    assert!(confidence > 0.95 && confidence <= 1.0);
}

/// TC-QG-002: Nothing found anywhere, gate refuses
#[tokio::test]
async fn tc_qg_002_no_data_anywhere() {
    let (status, body) = call(
        test_app(),
        post_json("/api/v1/query", &json!({"query": "price of P-1", "filters": {"sku": "P-1"}})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answerable"], false);
    assert_eq!(body["information_not_found"], true);
    assert_eq!(body["unknown_reason"]["reason"], "no_data");
    assert_eq!(body["unknown_message"], "no data in any source");
}

/// TC-QG-003: require_verification turns a refusal into 422 with issues
#[tokio::test]
async fn tc_qg_003_require_verification() {
    let (status, body) = call(
        test_app(),
        post_json(
            "/api/v1/query",
            &json!({"query": "price of P-7", "filters": {"sku": "P-7"}, "require_verification": true}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VERIFICATION_FAILED");
    assert_eq!(body["detail"]["message"], "Data validation failed");
    assert!(!body["detail"]["issues"].as_array().unwrap().is_empty());
    assert_eq!(body["detail"]["response"]["query"], "price of P-7");
}

/// TC-QG-004: Source selection and unknown sources
#[tokio::test]
async fn tc_qg_004_source_selection() {
    let (status, body) = call(
        test_app(),
        post_json(
            "/api/v1/query",
            &json!({"query": "q", "sources": ["notion"], "filters": {"sku": "P-42"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sources"].as_array().unwrap().len(), 1);
    assert_eq!(body["sources"][0]["record"]["origin"], "notion");

    let (status, body) = call(
        test_app(),
        post_json("/api/v1/query", &json!({"query": "q", "sources": ["airtable"]})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, body) = call(
        test_app(),
        post_json("/api/v1/query/supabase", &json!({"filters": {"sku": "P-42"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sources"][0]["record"]["origin_record_id"], "42");
}

/// TC-QG-005: No source clients registered
#[tokio::test]
async fn tc_qg_005_no_sources_registered() {
    let app = build_router(AppState::new(Arc::new(empty_gate())));
    let (status, _) = call(app.clone(), post_json("/api/v1/query", &json!({"query": "q"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (_, health) = call(app, Request::builder().uri("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["module"], "hms-qg");
}

/// TC-QG-006: Evaluate caller-supplied records (conflict surfaced, not resolved)
#[tokio::test]
async fn tc_qg_006_evaluate_reports_conflicts() {
    let records = json!([
        {"origin": "supabase", "origin_record_id": "42", "payload": {"price": 10}, "verified": true},
        {"origin": "notion", "origin_record_id": "page-42", "payload": {"price": 12}, "verified": true}
    ]);
    let (status, body) = call(
        test_app(),
        post_json("/api/v1/evaluate", &json!({"query": "price", "records": records})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answerable"], true);
    let conflicts = body["conflicts"].as_array().unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0]["field"], "price");
    assert_eq!(conflicts[0]["left"]["value"], 10);
    assert_eq!(conflicts[0]["right"]["value"], 12);
}

/// TC-QG-007: Contract violations are reported, never defaulted
#[tokio::test]
async fn tc_qg_007_contract_violations() {
    let (status, body) = call(
        test_app(),
        post_json("/api/v1/evaluate", &json!({"records": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "CONTRACT_VIOLATION");

    let (status, _) = call(
        test_app(),
        post_json("/api/v1/query", &json!({"query": "q", "confidence_threshold": 1.2})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(test_app(), post_json("/api/v1/query", &json!({"query": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// TC-QG-008: Prompt generation with and without a refusal
#[tokio::test]
async fn tc_qg_008_prompt_generate() {
    let (status, body) = call(
        test_app(),
        post_json(
            "/api/v1/prompt/generate",
            &json!({"query": "price of P-42", "filters": {"sku": "P-42"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["should_use_dont_know"], false);
    assert_eq!(body["strictness"], "lenient");
    assert!(body["prompt"]["user_prompt"]
        .as_str()
        .unwrap()
        .contains("[Source: supabase-42]"));

    let (status, body) = call(
        test_app(),
        post_json(
            "/api/v1/prompt/generate",
            &json!({"query": "price of P-1", "filters": {"sku": "P-1"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["should_use_dont_know"], true);
    assert_eq!(body["strictness"], "strict");
    assert!(body["dont_know_response"]
        .as_str()
        .unwrap()
        .starts_with("I don't know."));
}

/// TC-QG-009: Answer checks
#[tokio::test]
async fn tc_qg_009_prompt_check() {
    let (_, body) = call(
        test_app(),
        post_json(
            "/api/v1/prompt/check",
            &json!({
                "query": "price of P-42",
                "filters": {"sku": "P-42"},
                "answer": "The Widget costs 10."
            }),
        ),
    )
    .await;
    assert_eq!(body["is_valid"], false);
    assert_eq!(body["issues"][0]["issue"], "missing_citations");

    let (_, body) = call(
        test_app(),
        post_json(
            "/api/v1/prompt/check",
            &json!({
                "query": "price of P-1",
                "filters": {"sku": "P-1"},
                "answer": "It costs 5 [Source: supabase-1]."
            }),
        ),
    )
    .await;
    assert_eq!(body["answerable"], false);
    assert_eq!(body["issues"][0]["issue"], "missing_dont_know");
}

/// TC-QG-010: Unreadable bodies get the standard error body
#[tokio::test]
async fn tc_qg_010_malformed_bodies() {
    // Given: Broken JSON, a body missing `query`, and a body without a content type
    let broken = Request::builder()
        .method("POST")
        .uri("/api/v1/query")
        .header("content-type", "application/json")
        .body(Body::from("{\"query\": "))
        .unwrap();
    let untyped = Request::builder()
        .method("POST")
        .uri("/api/v1/prompt/generate")
        .body(Body::from("{\"query\": \"q\"}"))
        .unwrap();

    for request in [
        broken,
        post_json("/api/v1/evaluate", &json!({"query": "q"})),
        post_json("/api/v1/prompt/check", &json!({"query": "q"})),
        untyped,
    ] {
        // When: Each is posted
        let (status, body) = call(test_app(), request).await;

        // Then: 400 with the JSON error envelope
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert!(!body["error"]["message"].as_str().unwrap().is_empty());
    }
}

/// TC-QG-011: A source that verifiably had nothing satisfies the verification rule
#[tokio::test]
async fn tc_qg_011_verified_absence_counts() {
    let records = json!([
        {"origin": "supabase", "origin_record_id": "42", "payload": {"price": 10}, "verified": false},
        {"origin": "notion", "information_missing": true, "verified": true}
    ]);
    let (status, body) = call(
        test_app(),
        post_json("/api/v1/evaluate", &json!({"query": "price", "records": records})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified_sources"], 1);
    assert_eq!(body["meets_threshold"], true);
    assert_eq!(body["answerable"], true);
}
