use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use serde_json::{Value, json};
use tracing::error;

use super::super::AppState;
use super::super::audit::AuditRecord;
use super::super::auth::{RequestMeta, authenticate};
use super::parse_payload;
use crate::core::error::ErrorCode;
use crate::skills::envelope::Envelope;

pub async fn list_skills(State(state): State<AppState>, meta: RequestMeta) -> Response {
    let mut audit = AuditRecord::begin("GET", "/api/skills", &meta);
    let token = match authenticate(&state, &meta, None).await {
        Ok(token) => token,
        Err(denied) => {
            return audit
                .finish(&state, denied.status, denied.envelope.to_value())
                .await;
        }
    };
    audit.token(&token.name);

    match state.registry.visible_skills(&token).await {
        Ok(skills) => {
            let body = json!({
                "success": true,
                "data": { "count": skills.len(), "skills": skills },
            });
            audit.finish(&state, StatusCode::OK, body).await
        }
        Err(e) => {
            error!("Failed to list skills: {}", e);
            let body = Envelope::fail(
                ErrorCode::ServerError,
                format!("Failed to list skills: {}", e),
            )
            .to_value();
            audit
                .finish(&state, StatusCode::INTERNAL_SERVER_ERROR, body)
                .await
        }
    }
}

pub async fn execute_skill(
    State(state): State<AppState>,
    Path(code): Path<String>,
    meta: RequestMeta,
    body: Bytes,
) -> Response {
    let mut audit = AuditRecord::begin("POST", format!("/api/skills/{}", code), &meta);
    audit.skill(&code);
    audit.request_raw(&String::from_utf8_lossy(&body));

    let token = match authenticate(&state, &meta, Some(&code)).await {
        Ok(token) => token,
        Err(denied) => {
            return audit
                .finish(&state, denied.status, denied.envelope.to_value())
                .await;
        }
    };
    audit.token(&token.name);

    let payload = match parse_payload(&body) {
        Ok(payload) => payload,
        Err(message) => {
            let body = Envelope::fail(ErrorCode::InvalidJson, message).to_value();
            return audit.finish(&state, StatusCode::BAD_REQUEST, body).await;
        }
    };
    audit.request(&Value::Object(payload.clone()));

    match state.registry.run(&code, payload, &token.roles).await {
        Ok(envelope) => {
            let status = if envelope.success {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            };
            audit.finish(&state, status, envelope.to_value()).await
        }
        Err(e) => {
            error!("Error executing skill {}: {}", code, e);
            let mut envelope = Envelope::fail(
                ErrorCode::ExecutionError,
                format!("Failed to execute skill: {}", e),
            );
            envelope.skill = Some(code.clone());
            audit
                .finish(&state, StatusCode::INTERNAL_SERVER_ERROR, envelope.to_value())
                .await
        }
    }
}
