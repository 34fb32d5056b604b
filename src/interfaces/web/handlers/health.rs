use axum::Json;
use serde_json::{Value, json};

/// Liveness check. Unauthenticated and never audited.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "OpenClaw Gateway API",
    }))
}
