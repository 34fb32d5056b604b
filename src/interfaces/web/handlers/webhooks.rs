use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

use super::super::AppState;
use super::super::auth::RequestMeta;
use crate::core::error::ErrorCode;
use crate::core::store::types::{
    JobStatus, JobUpdate, NewWebhookLog, NewWorkflowJob, WorkflowType,
};
use crate::skills::executors::{Payload, text};

pub const SIGNATURE_HEADER: &str = "x-openclaw-signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Missing or invalid X-OpenClaw-Signature")]
    InvalidSignature,
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),
    #[error("Unknown webhook ID: {0}")]
    UnknownWebhook(String),
    #[error("Invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl WebhookError {
    fn status(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> ErrorCode {
        match self {
            WebhookError::InvalidSignature => ErrorCode::InvalidSignature,
            _ => ErrorCode::WebhookError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WebhookKind {
    LeadCreated,
    BulkImportComplete,
    WorkflowStatus,
}

impl WebhookKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "lead_created" => Some(WebhookKind::LeadCreated),
            "bulk_import_complete" => Some(WebhookKind::BulkImportComplete),
            "workflow_status" => Some(WebhookKind::WorkflowStatus),
            _ => None,
        }
    }
}

/// Checks a `sha256=<hex>` header against HMAC-SHA256 of the raw body.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(hex_sig) = header.trim().strip_prefix("sha256=") else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(hex_sig.as_bytes(), expected.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

fn check_signature(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<(), WebhookError> {
    match state.config.webhook_secret() {
        Some(secret) => {
            let header = headers
                .get(SIGNATURE_HEADER)
                .and_then(|v| v.to_str().ok())
                .ok_or(WebhookError::InvalidSignature)?;
            if verify_signature(secret, body, header) {
                Ok(())
            } else {
                Err(WebhookError::InvalidSignature)
            }
        }
        None if state.config.webhooks.allow_unsigned => {
            warn!("No webhook secret configured; accepting unsigned webhook");
            Ok(())
        }
        None => Err(WebhookError::InvalidSignature),
    }
}

fn parse_body(body: &[u8]) -> Result<Payload, WebhookError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Payload::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(WebhookError::InvalidJson("expected a JSON object".into())),
        Err(e) => Err(WebhookError::InvalidJson(e.to_string())),
    }
}

/// Identifiers may arrive as strings or numbers.
fn key(payload: &Payload, name: &str) -> Option<String> {
    match payload.get(name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn present(payload: &Payload, name: &str) -> Option<Value> {
    payload.get(name).filter(|v| !v.is_null()).cloned()
}

fn estimated_completion(payload: &Payload) -> Result<Option<String>, WebhookError> {
    let Some(raw) = text(payload, "estimated_completion") else {
        return Ok(None);
    };
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.to_rfc3339()))
        .map_err(|_| WebhookError::InvalidField {
            field: "estimated_completion",
            value: raw.to_string(),
        })
}

fn lead_created(payload: &Payload) -> Value {
    json!({
        "success": true,
        "webhook": "lead_created",
        "message": "Lead creation acknowledged",
        "lead_id": present(payload, "lead_id"),
    })
}

async fn bulk_import_complete(state: &AppState, payload: &Payload) -> Result<Value, WebhookError> {
    if let Some(job_id) = key(payload, "job_id") {
        let result = present(payload, "result").unwrap_or_else(|| Value::Object(payload.clone()));
        let update = JobUpdate {
            status: Some(JobStatus::Completed),
            progress_percent: Some(100.0),
            result_json: Some(result.to_string()),
            ..Default::default()
        };
        if !state.store.update_job(&job_id, &update).await? {
            info!(job_id = %job_id, "Bulk import callback for unknown job");
        }
    }
    Ok(json!({
        "success": true,
        "webhook": "bulk_import_complete",
        "message": "Bulk import acknowledged",
        "job_id": present(payload, "job_id"),
    }))
}

/// Upserts a job: unknown ids are created only while pending or running,
/// known ids keep their stored values for anything the payload omits.
async fn workflow_status(state: &AppState, payload: &Payload) -> Result<Value, WebhookError> {
    let job_id = key(payload, "job_id").or_else(|| key(payload, "n8n_execution_id"));
    if let (Some(job_id), Some(raw_status)) = (job_id.as_deref(), text(payload, "status")) {
        let status = JobStatus::parse(raw_status).ok_or_else(|| WebhookError::InvalidField {
            field: "status",
            value: raw_status.to_string(),
        })?;
        let progress = payload.get("progress_percent").and_then(Value::as_f64);
        let eta = estimated_completion(payload)?;
        let error_message = text(payload, "error_message").map(str::to_string);

        match state.store.find_job(job_id).await? {
            None if status.is_open() => {
                let raw_type = text(payload, "workflow_type").unwrap_or("data_sync");
                let workflow_type =
                    WorkflowType::parse(raw_type).ok_or_else(|| WebhookError::InvalidField {
                        field: "workflow_type",
                        value: raw_type.to_string(),
                    })?;
                state
                    .store
                    .create_job(&NewWorkflowJob {
                        job_id: job_id.to_string(),
                        workflow_type,
                        status,
                        progress_percent: progress.unwrap_or(0.0),
                        n8n_execution_id: key(payload, "n8n_execution_id"),
                        error_message,
                        estimated_completion: eta,
                    })
                    .await?;
            }
            None => {}
            Some(_) => {
                let update = JobUpdate {
                    status: Some(status),
                    progress_percent: progress,
                    result_json: present(payload, "result").map(|r| r.to_string()),
                    error_message,
                    estimated_completion: eta,
                };
                state.store.update_job(job_id, &update).await?;
            }
        }
    }
    Ok(json!({
        "success": true,
        "webhook": "workflow_status",
        "message": "Status updated",
        "job_id": job_id,
    }))
}

async fn dispatch(state: &AppState, webhook_id: &str, payload: &Payload) -> Result<Value, WebhookError> {
    match WebhookKind::parse(webhook_id) {
        Some(WebhookKind::LeadCreated) => Ok(lead_created(payload)),
        Some(WebhookKind::BulkImportComplete) => bulk_import_complete(state, payload).await,
        Some(WebhookKind::WorkflowStatus) => workflow_status(state, payload).await,
        None => Err(WebhookError::UnknownWebhook(webhook_id.to_string())),
    }
}

async fn receive(
    state: &AppState,
    webhook_id: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(Payload, Value), WebhookError> {
    check_signature(state, headers, body)?;
    let payload = parse_body(body)?;
    let response = dispatch(state, webhook_id, &payload).await?;
    Ok((payload, response))
}

/// Inbound callback from the automation engine. Every call, whatever the
/// outcome, leaves exactly one webhook log row.
pub async fn n8n_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
    meta: RequestMeta,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let raw = String::from_utf8_lossy(&body).into_owned();

    let outcome = receive(&state, &webhook_id, &headers, &body).await;
    let (status, payload_json, response, workflow_id) = match outcome {
        Ok((payload, response)) => {
            let workflow_id =
                key(&payload, "n8n_workflow_id").or_else(|| key(&payload, "workflow_id"));
            (
                StatusCode::OK,
                Value::Object(payload).to_string(),
                response,
                workflow_id,
            )
        }
        Err(e) => {
            if matches!(e, WebhookError::InvalidSignature) {
                warn!(webhook = %webhook_id, ip = %meta.remote_ip, "Rejected webhook signature");
            } else {
                error!("Webhook error for {}: {}", webhook_id, e);
            }
            let response = json!({
                "success": false,
                "error": e.code(),
                "message": e.to_string(),
            });
            (e.status(), raw, response, None)
        }
    };

    let entry = NewWebhookLog {
        webhook_id: webhook_id.clone(),
        payload_json,
        response_json: response.to_string(),
        status_code: status.as_u16(),
        execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        source_ip: Some(meta.remote_ip.clone()),
        n8n_workflow_id: workflow_id,
        error_message: response
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string),
    };
    if let Err(e) = state.store.insert_webhook_log(&entry).await {
        state
            .diagnostics
            .note("audit", format!("webhook log for {} failed: {}", webhook_id, e));
    }
    (status, Json(response)).into_response()
}
