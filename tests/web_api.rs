//! HTTP API tests driven through the router with `oneshot`

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::*;
use edfl_gate::app_state::AppState;
use edfl_gate::config_loader::ServiceConfig;
use edfl_gate::server::build_router;
use edfl_gate::{ProviderError, Settings};

fn app_with(provider: Arc<ScriptedProvider>) -> Router {
    let state = AppState::new(Arc::new(evaluator(provider)), Settings::default());
    build_router(Arc::new(state))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_service() {
    let (status, body) = send(app_with(ScriptedProvider::new(always_stock)), get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["service"].is_string());
}

#[tokio::test]
async fn models_and_defaults_are_listed() {
    let app = app_with(ScriptedProvider::new(always_stock));

    let (status, body) = send(app.clone(), get("/api/models")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["models"].as_array().unwrap().len(), 8);
    assert_eq!(body["recommended"], "gpt-4.1-mini");

    let (status, body) = send(app, get("/api/settings/defaults")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["defaults"]["B_clip"], 12.0);
    assert_eq!(body["defaults"]["n_samples"], 7);
    assert_eq!(body["defaults"]["clip_mode"], "one-sided");
}

#[tokio::test]
async fn evaluate_returns_decision_and_certificate() {
    let app = app_with(ScriptedProvider::new(knows_nobel));
    let request = post_json(
        "/api/evaluate",
        json!({ "prompt": NOBEL_PROMPT, "settings": { "h_star": 0.05, "generate_answer": true } }),
    );

    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["result"]["decision"], "ANSWER");
    assert_eq!(body["result"]["decision_answer"], true);
    assert_eq!(body["result"]["answer"], NOBEL_ANSWER);
    assert!(body["result"]["metrics"]["isr"].as_f64().unwrap() > 1.0);
    assert_eq!(body["result"]["sla_certificate"]["decision"], "ANSWER");
    assert_eq!(body["settings_used"]["h_star"], 0.05);
    assert_eq!(body["settings_used"]["skeleton_policy"], "closed_book");
}

#[tokio::test]
async fn answer_field_is_absent_unless_requested() {
    let app = app_with(ScriptedProvider::new(always_stock));
    let (status, body) = send(app, post_json("/api/evaluate", json!({ "prompt": STOCK_PROMPT }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["decision"], "REFUSE");
    assert!(body["result"].get("answer").is_none());
}

#[tokio::test]
async fn missing_prompt_is_bad_request() {
    let app = app_with(ScriptedProvider::new(always_stock));
    let (status, body) = send(app.clone(), post_json("/api/evaluate", json!({ "settings": {} }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Prompt is required");

    let (status, _) = send(app, post_json("/api/evaluate", json!({ "prompt": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_settings_are_configuration_errors() {
    let app = app_with(ScriptedProvider::new(always_stock));
    let request = post_json(
        "/api/evaluate",
        json!({ "prompt": STOCK_PROMPT, "settings": { "m": 1 } }),
    );
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "ConfigurationError");
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let app = app_with(ScriptedProvider::new(always_stock));
    let request = Request::builder()
        .method("POST")
        .uri("/api/evaluate")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn insufficient_evidence_is_service_unavailable() {
    let provider = ScriptedProvider::new(|request| {
        if mask_count(&request.prompt) > 0 {
            Err(ProviderError::Server {
                status: 503,
                message: "overloaded".into(),
            })
        } else {
            knows_nobel(request)
        }
    });
    let (status, body) = send(
        app_with(provider),
        post_json("/api/evaluate", json!({ "prompt": NOBEL_PROMPT })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["type"], "InsufficientEvidenceError");
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let (status, body) = send(app_with(ScriptedProvider::new(always_stock)), get("/api/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn wrong_method_is_json_405() {
    let app = app_with(ScriptedProvider::new(always_stock));
    let (status, body) = send(app.clone(), get("/api/evaluate")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, json!({ "success": false, "error": "Method not allowed" }));

    let (status, body) = send(app, post_json("/api/health", json!({}))).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn prompt_is_trimmed_before_certification() {
    let app = app_with(ScriptedProvider::new(knows_nobel));
    let (status, padded) = send(
        app.clone(),
        post_json("/api/evaluate", json!({ "prompt": format!("  \n{NOBEL_PROMPT}\t  ") })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{padded}");
    let (_, trimmed) = send(app, post_json("/api/evaluate", json!({ "prompt": NOBEL_PROMPT }))).await;

    let padded = &padded["result"]["sla_certificate"];
    let trimmed = &trimmed["result"]["sla_certificate"];
    assert_eq!(padded["prompt_sha256"], edfl_gate::canonicalize::sha256_hex(NOBEL_PROMPT));
    assert_eq!(padded["prompt_sha256"], trimmed["prompt_sha256"]);
    assert_eq!(padded["digest"], trimmed["digest"]);
}

#[tokio::test]
async fn state_from_config_applies_default_overlay() {
    let mut config = ServiceConfig::default();
    config.defaults.h_star = Some(0.1);
    config.provider.models = vec!["gpt-4o".into()];

    let state = AppState::with_provider(&config, ScriptedProvider::new(always_stock)).unwrap();
    assert_eq!(state.defaults.h_star, 0.1);
    assert_eq!(state.recommended_model(), "gpt-4o");

    let (_, body) = send(build_router(Arc::new(state)), get("/api/models")).await;
    assert_eq!(body["models"], json!(["gpt-4o"]));
}
