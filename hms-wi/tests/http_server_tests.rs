//! HTTP Server & Routing Integration Tests
//!
//! Exercises the webhook endpoints through the full router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use hms_common::cache::InMemoryEvidenceCache;
use hms_common::hooks::TracingIndexHook;
use hms_common::MetricsRecorder;
use hms_wi::engine::{ChangeProcessor, EngineSettings, OutcomeStatus, RetryEngine, RetryPolicy};
use hms_wi::intake::{SignatureVerifier, WebhookIntake, SIGNATURE_HEADER};
use hms_wi::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct TestService {
    app: Router,
    engine: Arc<RetryEngine>,
    metrics: Arc<MetricsRecorder>,
}

fn test_service(signing_secret: Option<&str>) -> TestService {
    let metrics = Arc::new(MetricsRecorder::new());
    let processor = ChangeProcessor::new(
        Arc::new(InMemoryEvidenceCache::new()),
        Arc::new(TracingIndexHook),
        Duration::from_secs(1),
    );
    let engine = Arc::new(RetryEngine::start(
        EngineSettings {
            policy: RetryPolicy::new(3, Duration::from_millis(10)),
            workers: 2,
            queue_capacity: 8,
        },
        Arc::new(processor),
        Arc::clone(&metrics),
    ));
    let signature = signing_secret.map(|secret| SignatureVerifier::new(secret).unwrap());
    let intake = Arc::new(WebhookIntake::new(signature, Arc::clone(&engine)));
    let app = build_router(AppState::new(intake, Arc::clone(&engine), Arc::clone(&metrics)));
    TestService { app, engine, metrics }
}

fn envelope(source: &str) -> Value {
    json!({
        "event_type": "update",
        "source": source,
        "table_name": "products",
        "record_id": "42",
        "data": {"name": "Widget", "price": 10},
        "timestamp": "2025-01-02T03:04:05Z"
    })
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    post(uri, serde_json::to_vec(body).unwrap())
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// TC-WI-001: Valid Supabase webhook is accepted and echoed
#[tokio::test]
async fn tc_wi_001_supabase_webhook_accepted() {
    // Given: Service without signature verification
    let service = test_service(None);
    let mut outcomes = service.engine.subscribe();

    // When: POST a valid Supabase envelope
    let response = service
        .app
        .oneshot(post_json("/api/v1/webhooks/supabase", &envelope("supabase")))
        .await
        .unwrap();

    // Then: 202 with the echoed event fields
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["details"]["event_type"], "update");
    assert_eq!(body["details"]["source"], "supabase");
    assert_eq!(body["details"]["record_id"], "42");
    assert_eq!(body["details"]["table_name"], "products");
    assert!(body["details"]["timestamp"].as_str().unwrap().starts_with("2025-01-02T03:04:05"));

    // And: Processed in the background
    let outcome = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Succeeded);
    assert_eq!(service.metrics.snapshot().total_processed, 1);
}

/// TC-WI-002: Scenario C, wrong source for the Supabase endpoint
#[tokio::test]
async fn tc_wi_002_source_mismatch_rejected() {
    // Given: Service without signature verification
    let service = test_service(None);

    // When: A Notion-tagged payload is posted to the Supabase endpoint
    let response = service
        .app
        .oneshot(post_json("/api/v1/webhooks/supabase", &envelope("notion")))
        .await
        .unwrap();

    // Then: 400 invalid_source, nothing queued or counted
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_source");
    assert_eq!(body["expected"], "supabase");
    assert_eq!(body["received"], "notion");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = service.metrics.snapshot();
    assert_eq!(stats.total_processed, 0);
    assert_eq!(stats.total_failed, 0);
    assert_eq!(stats.total_retries, 0);
    assert_eq!(service.engine.queue_depth(), 0);
}

/// TC-WI-003: Missing fields produce 422 with field locations
#[tokio::test]
async fn tc_wi_003_schema_errors_have_locations() {
    let service = test_service(None);
    let payload = json!({"event_type": "upsert", "source": "notion", "data": {}});

    let response = service
        .app
        .oneshot(post_json("/api/v1/webhooks/notion", &payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    let detail = body["detail"].as_array().unwrap();
    let locations: Vec<&str> = detail.iter().map(|e| e["loc"][1].as_str().unwrap()).collect();
    assert!(locations.contains(&"event_type"));
    assert!(locations.contains(&"table_name"));
    assert!(locations.contains(&"record_id"));
    assert!(locations.contains(&"timestamp"));
    let event_type = detail.iter().find(|e| e["loc"][1] == "event_type").unwrap();
    assert_eq!(event_type["type"], "enum");
}

/// TC-WI-004: Non-JSON body is a 400
#[tokio::test]
async fn tc_wi_004_malformed_body() {
    let service = test_service(None);
    let response = service
        .app
        .oneshot(post("/api/v1/webhooks/supabase", "{not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "BAD_REQUEST");
}

/// TC-WI-005: Signature verification gates every request when enabled
#[tokio::test]
async fn tc_wi_005_signature_required() {
    // Given: Verification enabled with a shared secret
    let service = test_service(Some("shared-secret"));
    let body = serde_json::to_vec(&envelope("supabase")).unwrap();
    let signer = SignatureVerifier::new("shared-secret").unwrap();

    // When/Then: No header → 401
    let response = service
        .app
        .clone()
        .oneshot(post("/api/v1/webhooks/supabase", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // When/Then: Wrong signature on a malformed body → 401, not 400
    let mut request = post("/api/v1/webhooks/supabase", "{not json");
    request
        .headers_mut()
        .insert(SIGNATURE_HEADER, signer.sign(b"something else").parse().unwrap());
    let response = service.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // When/Then: Correct signature → 202
    let mut request = post("/api/v1/webhooks/supabase", body.clone());
    request
        .headers_mut()
        .insert(SIGNATURE_HEADER, format!("sha256={}", signer.sign(&body)).parse().unwrap());
    let response = service.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

/// TC-WI-006: Intake refuses with 503 once the engine is shutting down
#[tokio::test]
async fn tc_wi_006_unavailable_after_shutdown() {
    let service = test_service(None);
    service.engine.shutdown().await;

    let response = service
        .app
        .clone()
        .oneshot(post_json("/api/v1/webhooks/supabase", &envelope("supabase")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let health = service
        .app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(health).await["status"], "draining");
}

/// TC-WI-007: Dry-run endpoint reports without queueing
#[tokio::test]
async fn tc_wi_007_test_endpoint() {
    let service = test_service(None);

    let valid = body_json(
        service
            .app
            .clone()
            .oneshot(post_json("/api/v1/webhooks/test", &envelope("supabase")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(valid["status"], "valid");
    assert_eq!(valid["would_be_processed"], true);
    assert_eq!(valid["parsed_payload"]["record_id"], "42");

    let missing = body_json(
        service
            .app
            .clone()
            .oneshot(post_json("/api/v1/webhooks/test", &json!({"event_type": "insert"})))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(missing["status"], "validation_failed");
    assert_eq!(
        missing["missing_fields"],
        json!(["source", "table_name", "record_id", "data", "timestamp"])
    );

    let invalid = body_json(
        service
            .app
            .oneshot(post("/api/v1/webhooks/test", "nope"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(invalid["status"], "invalid");
    assert_eq!(invalid["would_be_processed"], false);

    assert_eq!(service.metrics.snapshot().total_processed, 0);
}

/// TC-WI-008: Stats reflect processing and can be reset
#[tokio::test]
async fn tc_wi_008_stats_and_reset() {
    // Given: One processed delete event
    let service = test_service(None);
    let mut outcomes = service.engine.subscribe();
    let mut payload = envelope("notion");
    payload["event_type"] = json!("delete");
    payload["data"] = json!({});
    let response = service
        .app
        .clone()
        .oneshot(post_json("/api/v1/webhooks/notion", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
        .await
        .unwrap()
        .unwrap();

    // When: GET stats
    let stats = body_json(
        service
            .app
            .clone()
            .oneshot(Request::builder().uri("/api/v1/webhooks/stats").body(Body::empty()).unwrap())
            .await
            .unwrap(),
    )
    .await;

    // Then: Counts by type and source
    assert_eq!(stats["total_processed"], 1);
    assert_eq!(stats["total_failed"], 0);
    assert_eq!(stats["success_rate"], 1.0);
    assert_eq!(stats["events_by_type"]["delete"], 1);
    assert_eq!(stats["events_by_type"]["insert"], 0);
    assert_eq!(stats["events_by_source"]["notion"], 1);

    // When: Reset
    let reset = body_json(
        service
            .app
            .oneshot(post("/api/v1/webhooks/stats/reset", Body::empty()))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(reset["previous"]["total_processed"], 1);
    assert_eq!(service.metrics.snapshot().total_processed, 0);
}

/// TC-WI-009: Health reports module identity
#[tokio::test]
async fn tc_wi_009_health() {
    let service = test_service(None);
    let response = service
        .app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "hms-wi");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["signature_verification"], false);
}
