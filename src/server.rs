use crate::api_errors::AppError;
use crate::app_state::AppState;
use crate::config::SettingsOverrides;
use crate::pipeline::EvaluationResult;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub const SERVICE_NAME: &str = "EDFL Hallucination Risk Calculator";

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub prompt: Option<String>,
    #[serde(default)]
    pub settings: SettingsOverrides,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    success: bool,
    result: EvaluationResult,
    settings_used: crate::config::Settings,
}

/// Build the HTTP router: evaluation, model listing, defaults and health
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/evaluate", post(evaluate))
        .route("/api/models", get(list_models))
        .route("/api/settings/defaults", get(default_settings))
        .route("/api/health", get(health))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn evaluate(
    State(st): State<Arc<AppState>>,
    payload: Result<Json<EvaluateRequest>, JsonRejection>,
) -> Result<Json<EvaluateResponse>, AppError> {
    let Json(req) = payload.map_err(|e| AppError::bad_request(format!("invalid request body: {e}")))?;
    let prompt = req
        .prompt
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::bad_request("Prompt is required"))?;

    let settings = st.defaults.with_overrides(&req.settings);
    let result = st.evaluator.evaluate(&prompt, &settings).await?;

    Ok(Json(EvaluateResponse {
        success: true,
        settings_used: result.settings_used.clone(),
        result,
    }))
}

async fn list_models(State(st): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "models": st.models(),
        "recommended": st.recommended_model(),
    }))
}

async fn default_settings(State(st): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "defaults": st.defaults,
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn not_found() -> AppError {
    AppError::not_found("Endpoint not found")
}

async fn method_not_allowed() -> AppError {
    AppError::method_not_allowed("Method not allowed")
}

/// Bind and serve until the process is stopped
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> crate::errors::GateResult<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| crate::errors::GateError::io(format!("bind {addr}"), e))?;
    tracing::info!("HTTP server listening on http://{addr}");
    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| crate::errors::GateError::io("serve HTTP", e))
}
