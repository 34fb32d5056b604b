use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use serde_json::{Value, json};
use tracing::{error, info};
use uuid::Uuid;

use super::super::AppState;
use super::super::audit::AuditRecord;
use super::super::auth::{Denial, RequestMeta, authenticate};
use super::parse_payload;
use crate::core::error::ErrorCode;
use crate::core::store::types::{JobStatus, JobUpdate, NewWorkflowJob, WorkflowType};
use crate::skills::envelope::Envelope;
use crate::skills::executors::{BulkImportExecutor, Payload, SkillExecutor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BulkOperation {
    Import,
    Export,
    Update,
}

impl BulkOperation {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "import" => Some(BulkOperation::Import),
            "export" => Some(BulkOperation::Export),
            "update" => Some(BulkOperation::Update),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            BulkOperation::Import => "import",
            BulkOperation::Export => "export",
            BulkOperation::Update => "update",
        }
    }

    /// Tokens are scoped to bulk work through this synthetic skill code.
    fn skill_code(self) -> String {
        format!("bulk_{}", self.as_str())
    }
}

pub async fn bulk_operation(
    State(state): State<AppState>,
    Path(operation): Path<String>,
    meta: RequestMeta,
    body: Bytes,
) -> Response {
    let mut audit = AuditRecord::begin("POST", format!("/api/bulk/{}", operation), &meta);
    audit.request_raw(&String::from_utf8_lossy(&body));

    if meta.token.is_none() {
        let denied = Denial::missing();
        return audit
            .finish(&state, denied.status, denied.envelope.to_value())
            .await;
    }
    let Some(op) = BulkOperation::parse(&operation) else {
        let body = Envelope::fail(
            ErrorCode::InvalidOperation,
            "operation must be import, export, or update",
        )
        .to_value();
        return audit.finish(&state, StatusCode::BAD_REQUEST, body).await;
    };
    let skill_code = op.skill_code();
    audit.skill(&skill_code);

    let token = match authenticate(&state, &meta, Some(&skill_code)).await {
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

    let outcome = match op {
        BulkOperation::Import => run_import(&state, payload).await,
        BulkOperation::Export | BulkOperation::Update => Ok(Envelope::fail(
            ErrorCode::NotImplemented,
            format!("Bulk {} not implemented", op.as_str()),
        )),
    };
    match outcome {
        Ok(envelope) => {
            let status = if envelope.success {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            };
            audit.finish(&state, status, envelope.to_value()).await
        }
        Err(message) => {
            error!("Bulk {} error: {}", op.as_str(), message);
            let body = Envelope::fail(ErrorCode::BulkError, message).to_value();
            audit
                .finish(&state, StatusCode::INTERNAL_SERVER_ERROR, body)
                .await
        }
    }
}

/// Runs an import under a `bulk_import` workflow job so callers can poll it.
/// `Err` carries the message for a `BULK_ERROR` response.
async fn run_import(state: &AppState, payload: Payload) -> Result<Envelope, String> {
    let job_id = Uuid::new_v4().to_string();
    state
        .store
        .create_job(&NewWorkflowJob {
            job_id: job_id.clone(),
            workflow_type: WorkflowType::BulkImport,
            status: JobStatus::Running,
            progress_percent: 0.0,
            n8n_execution_id: None,
            error_message: None,
            estimated_completion: None,
        })
        .await
        .map_err(|e| format!("Failed to create import job: {}", e))?;

    let store = state.store.clone();
    let handle = tokio::spawn(async move { BulkImportExecutor.execute(&store, &payload).await });
    let envelope = match handle.await {
        Ok(envelope) => envelope,
        Err(e) => {
            let message = format!("Import aborted: {}", e);
            finish_job(state, &job_id, JobStatus::Failed, None, Some(message.clone())).await;
            return Err(message);
        }
    };

    let envelope = if envelope.success {
        let result = envelope.data.clone().unwrap_or(Value::Null);
        finish_job(state, &job_id, JobStatus::Completed, Some(result.to_string()), None).await;
        info!(job_id = %job_id, "Bulk import completed");
        let mut data = match envelope.data {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        data.insert("job_id".to_string(), json!(job_id));
        Envelope::ok(Value::Object(data))
    } else {
        finish_job(state, &job_id, JobStatus::Failed, None, envelope.message.clone()).await;
        envelope.with_extra("job_id", json!(job_id))
    };
    Ok(envelope)
}

async fn finish_job(
    state: &AppState,
    job_id: &str,
    status: JobStatus,
    result_json: Option<String>,
    error_message: Option<String>,
) {
    let update = JobUpdate {
        status: Some(status),
        progress_percent: (status == JobStatus::Completed).then_some(100.0),
        result_json,
        error_message,
        estimated_completion: None,
    };
    if let Err(e) = state.store.update_job(job_id, &update).await {
        state
            .diagnostics
            .note("jobs", format!("could not record {} for job {}: {}", status.as_str(), job_id, e));
    }
}
