use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::time::Instant;

use super::AppState;
use super::auth::RequestMeta;
use crate::core::store::types::{NewRequestLog, RequestStatus};

/// One gateway call's request-log row. `finish` consumes the record, so
/// each handler path writes exactly one row and then answers.
pub struct AuditRecord {
    endpoint: String,
    method: &'static str,
    token_name: String,
    skill_code: Option<String>,
    request_json: String,
    remote_ip: String,
    user_agent: String,
    started: Instant,
}

impl AuditRecord {
    pub fn begin(method: &'static str, endpoint: impl Into<String>, meta: &RequestMeta) -> Self {
        let token_name = if meta.token.is_some() {
            "invalid"
        } else {
            "anonymous"
        };
        Self {
            endpoint: endpoint.into(),
            method,
            token_name: token_name.to_string(),
            skill_code: None,
            request_json: "{}".to_string(),
            remote_ip: meta.remote_ip.clone(),
            user_agent: meta.user_agent.clone(),
            started: Instant::now(),
        }
    }

    pub fn token(&mut self, name: &str) {
        self.token_name = name.to_string();
    }

    pub fn skill(&mut self, code: &str) {
        self.skill_code = Some(code.to_string());
    }

    pub fn request(&mut self, payload: &Value) {
        self.request_json = payload.to_string();
    }

    pub fn request_raw(&mut self, raw: &str) {
        self.request_json = raw.to_string();
    }

    /// Writes the row and returns the response. A failed write only reaches
    /// the diagnostics channel.
    pub async fn finish(self, state: &AppState, status: StatusCode, body: Value) -> Response {
        let succeeded = body.get("success").and_then(Value::as_bool) == Some(true);
        let entry = NewRequestLog {
            token_name: self.token_name,
            endpoint: self.endpoint,
            method: self.method.to_string(),
            skill_code: self.skill_code,
            request_json: self.request_json,
            response_json: body.to_string(),
            status: if succeeded {
                RequestStatus::Ok
            } else {
                RequestStatus::Error
            },
            error: if succeeded {
                None
            } else {
                body.get("error").and_then(Value::as_str).map(str::to_string)
            },
            duration_ms: self.started.elapsed().as_millis() as i64,
            remote_addr: Some(self.remote_ip),
            user_agent: Some(self.user_agent),
        };
        if let Err(e) = state.store.insert_request_log(&entry).await {
            state.diagnostics.note(
                "audit",
                format!("request log for {} failed: {}", entry.endpoint, e),
            );
        }
        (status, Json(body)).into_response()
    }
}
