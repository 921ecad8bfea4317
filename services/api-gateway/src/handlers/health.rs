use axum::{extract::State, http::header, response::IntoResponse, Json};
use prometheus::{Encoder, TextEncoder};
use serde_json::{json, Value};

use covenant_utils::log_error;

use crate::app::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let store = match state.store.health_check().await {
        Ok(()) => json!({"status": "healthy"}),
        Err(e) => json!({"status": "unhealthy", "message": e.to_string()}),
    };
    let status = if store["status"] == "healthy" { "healthy" } else { "degraded" };

    Json(json!({
        "status": status,
        "service": "covenant",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": { "store": store }
    }))
}

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&state.registry.gather(), &mut buffer) {
        log_error!(e, "Failed to encode metrics");
    }
    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer)
}
