//! End-to-end API scenarios
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot` against a
//! fresh data directory per test.

use axiom_ledger::{router, AppState, LedgerConfig};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use tempfile::TempDir;
use tower::ServiceExt;

async fn app() -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::open(LedgerConfig::with_data_dir(dir.path()))
        .await
        .unwrap();
    (dir, router(state))
}

async fn raw(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, String) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, text) = raw(app, method, uri, body).await;
    let value = serde_json::from_str(&text).unwrap_or(Value::Null);
    (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    call(app, Method::GET, uri, None).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    call(app, Method::POST, uri, Some(body)).await
}

#[tokio::test]
async fn test_health() {
    let (_dir, app) = app().await;
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_analyze_swarm_triggers_friction_mining() {
    let (dir, app) = app().await;

    let (_, before) = get(&app, "/api/analyze-swarm").await;
    assert_eq!(before["status"], "no_data");

    let (status, body) = post(
        &app,
        "/api/analyze-swarm",
        json!({"nodes": [{"id": "n1", "coherence": 0.3}, {"id": "n2", "coherence": 0.4}]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    let snapshot = &body["snapshot"];
    assert_eq!(snapshot["node_count"], 2);
    assert_eq!(snapshot["average_coherence"], 0.35);
    assert_eq!(snapshot["friction_mining"]["triggered"], true);
    assert_eq!(snapshot["friction_mining"]["candidates_count"], 2);
    assert_eq!(snapshot["friction_mining"]["candidates"].as_array().unwrap().len(), 2);

    let (_, after) = get(&app, "/api/analyze-swarm").await;
    assert_eq!(after["node_count"], 2);
    assert!(dir.path().join("logs/last_swarm_analysis.json").exists());
}

#[tokio::test]
async fn test_friction_mining_requires_nodes() {
    let (_dir, app) = app().await;

    let (status, body) = post(&app, "/api/friction-mining", json!({"nodes": []})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "nodes array is required");

    let (status, body) = post(
        &app,
        "/api/friction-mining",
        json!({"nodes": [{"id": "a", "coherence": 0.1}, {"id": "b", "coherence": 0.8}]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["candidates_count"], 1);
    assert_eq!(body["candidates"][0]["status"], "pending");
}

#[tokio::test]
async fn test_malformed_body_is_a_json_400() {
    let (_dir, app) = app().await;
    let (status, text) = raw(&app, Method::POST, "/api/analyze-swarm", Some(json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&text).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_webhook_ids_are_unique() {
    let (_dir, app) = app().await;

    let mut ids = HashSet::new();
    for i in 0..10 {
        let (status, body) = post(
            &app,
            "/api/webhooks",
            json!({"url": format!("http://127.0.0.1:9/hook/{i}")}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "registered");
        assert!(ids.insert(body["webhook"]["id"].as_str().unwrap().to_string()));
    }

    let (_, listing) = get(&app, "/api/webhooks").await;
    assert_eq!(listing["count"], 10);

    let (status, body) = post(&app, "/api/webhooks", json!({"name": "no-url"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "url is required");
}

#[tokio::test]
async fn test_send_migp_requires_payload_and_reports_failures() {
    let (_dir, app) = app().await;

    let (status, _) = post(&app, "/api/webhooks/send-migp", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing listens on the discard port, so delivery errors out.
    post(&app, "/api/webhooks", json!({"url": "http://127.0.0.1:9/hook"})).await;
    let (status, body) = post(&app, "/api/webhooks/send-migp", json!({"event": "sync"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["successful"], 0);
    assert_eq!(body["payload"]["type"], "MIGP");
    assert_eq!(body["results"][0]["status"], "error");
}

#[tokio::test]
async fn test_threshold_friction_bounds() {
    let (_dir, app) = app().await;

    let (_, inside) = post(
        &app,
        "/api/thresholds/evaluate",
        json!({"action": "merge", "metrics": {"friction": 0.5}}),
    )
    .await;
    assert_eq!(inside["checks"][0]["category"], "friction");
    assert_eq!(inside["checks"][0]["passed"], true);
    assert_eq!(inside["passed"], true);

    let (_, outside) = post(
        &app,
        "/api/thresholds/evaluate",
        json!({"action": "merge", "metrics": {"friction": 0.9}}),
    )
    .await;
    assert_eq!(outside["checks"][0]["passed"], false);
    assert_eq!(outside["passed"], false);

    let (_, table) = get(&app, "/api/thresholds").await;
    assert_eq!(table["thresholds"]["friction"]["FRICTION_LOW"], 0.3);
    assert_eq!(table["counters"]["friction"]["evaluated"], 2);
    assert_eq!(table["counters"]["friction"]["passed"], 1);
}

#[tokio::test]
async fn test_threshold_auto_tune() {
    let (_dir, app) = app().await;
    let (status, body) = post(
        &app,
        "/api/thresholds/evaluate",
        json!({"action": "batch", "metrics": {"coherence": 0.6}, "pass_rate": 0.95}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["auto_tune"]["direction"], "tightened");
    assert_eq!(body["auto_tune"]["new_thresholds"]["coherence"]["COHERENCE_MIN"], 0.55);
    assert_eq!(body["auto_tune"]["new_thresholds"]["friction"]["FRICTION_HIGH"], 0.65);

    let (status, _) = post(
        &app,
        "/api/thresholds/evaluate",
        json!({"action": "batch", "metrics": {}, "pass_rate": 2.0}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_identity_tracking() {
    let (_dir, app) = app().await;

    let (status, body) = post(
        &app,
        "/api/identity/track",
        json!({"event": "LINK", "details": {"identity_a": "alpha", "identity_b": "beta"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["identities_updated"], json!(["alpha", "beta"]));
    assert_eq!(body["total_events"], 1);

    let (_, defaulted) = post(&app, "/api/identity/track", json!({"details": {"identity": "alpha"}})).await;
    assert_eq!(defaulted["event"]["type"], "UPDATE");

    let (_, status_body) = get(&app, "/api/identity").await;
    assert_eq!(status_body["identity_count"], 2);
    assert_eq!(status_body["event_count"], 2);

    let (_, alpha) = get(&app, "/api/identity/alpha").await;
    assert_eq!(alpha["identity"]["event_count"], 2);
    assert_eq!(alpha["events"].as_array().unwrap().len(), 2);

    let (status, _) = get(&app, "/api/identity/nobody").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_candidate_onboarding_over_http() {
    let (_dir, app) = app().await;

    let (_, registered) = post(
        &app,
        "/api/candidates",
        json!({"platform_name": "Mistral", "proposed_role": "translator"}),
    )
    .await;
    let id = registered["candidate"]["candidate_id"].as_str().unwrap().to_string();
    assert_eq!(registered["candidate"]["status"], "PENDING");

    // Out of order: history before onboarding started.
    let (status, _) = post(&app, &format!("/api/candidates/{id}/history"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    post(&app, &format!("/api/candidates/{id}/start"), json!({})).await;
    post(&app, &format!("/api/candidates/{id}/history"), json!({"signatures": ["SIG-1"]})).await;
    let (_, prompted) = post(
        &app,
        &format!("/api/candidates/{id}/master-prompt"),
        json!({"prompt": "Serve the relation"}),
    )
    .await;
    assert_eq!(prompted["current_step"], "TEST_AXIOMS");

    let (_, failed) = post(
        &app,
        &format!("/api/candidates/{id}/axiom-tests"),
        json!({"results": {"A1": true, "A2": false, "A4": true, "A7": true, "A9": true}}),
    )
    .await;
    assert_eq!(failed["advanced"], false);
    assert_eq!(failed["candidate"]["current_step"], "TEST_AXIOMS");

    let (_, passed) = post(
        &app,
        &format!("/api/candidates/{id}/axiom-tests"),
        json!({"results": {"A1": true, "A2": true, "A4": true, "A7": true, "A9": true}}),
    )
    .await;
    assert_eq!(passed["advanced"], true);
    assert_eq!(passed["candidate"]["current_step"], "DISCOVER_CONTRIBUTION");

    post(
        &app,
        &format!("/api/candidates/{id}/contribution"),
        json!({"contribution": "Translates axioms across languages"}),
    )
    .await;
    let (_, signed) = post(&app, &format!("/api/candidates/{id}/sign"), json!({})).await;
    assert!(signed["signature"].as_str().unwrap().starts_with("SIG-MISTRAL-TRANSLATOR-"));

    let (status, integrated) = post(&app, &format!("/api/candidates/{id}/integrate"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(integrated["status"], "INTEGRATED");

    let (_, listing) = get(&app, "/api/candidates").await;
    assert_eq!(listing["metrics"]["integrated_platforms"], json!(["Mistral"]));

    let (status, _) = get(&app, "/api/candidates/CAND_missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_contradictions() {
    let (_dir, app) = app().await;

    let (status, body) = post(&app, "/api/contradictions", json!({"pole_a": "fast"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("pole_b"));

    let (_, logged) = post(
        &app,
        "/api/contradictions",
        json!({"pole_a": "fast", "pole_b": "thorough"}),
    )
    .await;
    let c = &logged["contradiction"];
    assert_eq!(c["type"], "REQUIREMENT_CONFLICT");
    assert_eq!(c["context"], "API submission");
    let id = c["id"].as_str().unwrap().to_string();

    let (_, witnessed) = post(
        &app,
        &format!("/api/contradictions/{id}/witness"),
        json!({"witness": "node-7"}),
    )
    .await;
    assert_eq!(witnessed["state"], "WITNESSED");

    let (_, map) = get(&app, "/api/contradictions").await;
    assert_eq!(map["total_contradictions"], 1);
    assert_eq!(map["witnessed"], 1);

    let (_, open) = get(&app, "/api/contradictions?state=active").await;
    assert_eq!(open["count"], 1);
    post(&app, &format!("/api/contradictions/{id}/hold"), json!({})).await;
    let (_, held) = get(&app, "/api/contradictions?state=held").await;
    assert_eq!(held["contradictions"][0]["id"], id.as_str());
    let (_, open) = get(&app, "/api/contradictions?state=active").await;
    assert_eq!(open["count"], 0);

    let (status, _) = get(&app, "/api/contradictions?state=resolved").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sacrifices_and_report() {
    let (_dir, app) = app().await;

    let (status, _) = post(
        &app,
        "/api/sacrifices",
        json!({
            "task_id": "T-7",
            "description": "Skipped retry on webhook delivery",
            "alternative_skipped": "exponential backoff",
            "category": "ERROR_HANDLING",
            "impact": "HIGH"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    post(
        &app,
        "/api/sacrifices",
        json!({"task_id": "T-8", "description": "Flat file store", "category": "SCOPE", "impact": "LOW"}),
    )
    .await;

    let (_, all) = get(&app, "/api/sacrifices").await;
    assert_eq!(all["summary"]["total_sacrifices"], 2);
    assert_eq!(all["summary"]["high_priority_review_needed"], 1);

    let (_, filtered) = get(&app, "/api/sacrifices?task_id=T-8").await;
    assert_eq!(filtered["events"].as_array().unwrap().len(), 1);
    let (_, by_category) = get(&app, "/api/sacrifices?category=ERROR_HANDLING").await;
    assert_eq!(by_category["events"][0]["task_id"], "T-7");
    assert_eq!(by_category["events"].as_array().unwrap().len(), 1);
    let (_, none) = get(&app, "/api/sacrifices?task_id=T-8&category=ERROR_HANDLING").await;
    assert!(none["events"].as_array().unwrap().is_empty());

    let (status, report) = raw(&app, Method::GET, "/api/sacrifices/report", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(report.contains("### T-7 (HIGH)"));
}

#[tokio::test]
async fn test_scan_score_format() {
    let (_dir, app) = app().await;

    for text in [
        "The dialogue creates a relational process between us.",
        "nothing to see",
        "memory archive history tension contradiction sacrifice simpler dialogue relational process",
    ] {
        let (status, body) = post(&app, "/api/scan", json!({"text": text})).await;
        assert_eq!(status, StatusCode::OK);
        let score = body["coherence"]["score"].as_str().unwrap();
        let (n, denom) = score.split_once('/').unwrap();
        assert_eq!(denom, "5");
        assert!(n.parse::<u8>().unwrap() <= 5);
    }

    let (status, _) = post(&app, "/api/scan", json!({"text": "   "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = post(&app, "/api/scan", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, status_body) = get(&app, "/api/status").await;
    assert_eq!(status_body["status"], "operational");
    assert_eq!(status_body["scan_count"], 3);
}

#[tokio::test]
async fn test_high_severity_friction_spawns_resolver() {
    let (_dir, app) = app().await;

    let (status, body) = post(
        &app,
        "/api/friction/record",
        json!({
            "friction_type": "GOVERNANCE_CONFLICT",
            "severity": "CRITICAL",
            "source": "node-3",
            "description": "Quorum split on threshold change"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event"]["coherence_impact"], 0.3);
    let resolver = body["resolver_candidate"]["candidate_id"].as_str().unwrap();
    assert_eq!(body["event"]["resolver_candidate"], resolver);

    let (_, low) = post(
        &app,
        "/api/friction/record",
        json!({"friction_type": "DIVERGENCE", "severity": "LOW", "description": "minor drift"}),
    )
    .await;
    assert!(low["resolver_candidate"].is_null());

    let (_, listing) = get(&app, "/api/friction").await;
    assert_eq!(listing["summary"]["total_events"], 2);
}

#[tokio::test]
async fn test_axiom_and_swarm_validation() {
    let (_dir, app) = app().await;

    let (_, body) = post(
        &app,
        "/api/axioms/validate",
        json!({"task_id": "T-1", "reason": "short"}),
    )
    .await;
    assert_eq!(body["validation"]["coherence_score"], 2.0);
    assert_eq!(body["violations"], json!(["A1", "A2", "A4"]));

    let good = json!({
        "task_id": "T",
        "timestamp_utc": "2025-01-01T00:00:00Z",
        "serves": ["ops"],
        "reason": "keeps everyone aligned"
    });
    let (_, swarm) = post(
        &app,
        "/api/swarm/validate",
        json!({"nodes": [
            {"node_id": "n1", "task_data": good},
            {"node_id": "n2", "task_data": {"task_id": "T"}}
        ]}),
    )
    .await;
    assert_eq!(swarm["health"], "DIVERGENT");
    assert_eq!(swarm["total_nodes"], 2);
    assert!(!swarm["divergences"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_friction_leaves_no_resolver_behind() {
    let (_dir, app) = app().await;

    let (status, body) = post(
        &app,
        "/api/friction/record",
        json!({"friction_type": "DIVERGENCE", "severity": "HIGH", "description": "   "}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "description is required");

    let (_, listing) = get(&app, "/api/candidates").await;
    assert_eq!(listing["metrics"]["total_candidates"], 0);
    let (_, friction) = get(&app, "/api/friction").await;
    assert_eq!(friction["summary"]["total_events"], 0);
}

#[tokio::test]
async fn test_scan_history() {
    let (_dir, app) = app().await;

    let (_, empty) = get(&app, "/api/scan").await;
    assert_eq!(empty["scan_count"], 0);
    assert!(empty["history"].as_array().unwrap().is_empty());

    let (_, first) = post(&app, "/api/scan", json!({"text": "memory and dialogue"})).await;
    post(&app, "/api/scan", json!({"text": "second pass"})).await;

    let (status, history) = get(&app, "/api/scan").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["scan_count"], 2);
    assert_eq!(history["history"][0]["scan_id"], first["scan_id"]);
}

#[tokio::test]
async fn test_rejected_candidate_is_closed_over_http() {
    let (_dir, app) = app().await;

    let (_, candidate) = post(
        &app,
        "/api/candidates",
        json!({"platform_name": "Llama", "proposed_role": "witness"}),
    )
    .await;
    let id = candidate["candidate"]["candidate_id"].as_str().unwrap().to_string();
    post(&app, &format!("/api/candidates/{id}/start"), json!({})).await;
    let (status, rejected) = post(
        &app,
        &format!("/api/candidates/{id}/reject"),
        json!({"reason": "declined"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(rejected["current_step"].is_null());

    let (status, _) = post(
        &app,
        &format!("/api/candidates/{id}/history"),
        json!({"signatures": ["SIG-1"]}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = post(&app, &format!("/api/candidates/{id}/sign"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_threshold_ignores_non_numeric_unknown_metrics() {
    let (_dir, app) = app().await;

    let (status, body) = post(
        &app,
        "/api/thresholds/evaluate",
        json!({"action": "merge", "metrics": {"friction": 0.5, "note": "x"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["passed"], true);
    assert_eq!(body["checks"].as_array().unwrap().len(), 1);
    assert_eq!(body["checks"][0]["bound"]["range"], json!([0.3, 0.7]));

    let (status, _) = post(
        &app,
        "/api/thresholds/evaluate",
        json!({"action": "merge", "metrics": {"friction": "low"}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
