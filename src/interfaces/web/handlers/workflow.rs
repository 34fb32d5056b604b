use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use serde_json::{Map, Value, json};
use tracing::error;

use super::super::AppState;
use super::super::audit::AuditRecord;
use super::super::auth::RequestMeta;
use crate::core::error::ErrorCode;
use crate::core::store::types::WorkflowJob;
use crate::skills::envelope::Envelope;

/// Stored results are JSON text; anything that no longer parses is handed
/// back verbatim.
fn snapshot(job: WorkflowJob) -> Value {
    let mut data = Map::new();
    data.insert("job_id".into(), json!(job.job_id));
    data.insert("status".into(), json!(job.status));
    data.insert("progress".into(), json!(job.progress_percent));
    data.insert("workflow_type".into(), json!(job.workflow_type));
    data.insert("created_at".into(), json!(job.created_at));
    data.insert("error".into(), json!(job.error_message));
    if let Some(raw) = job.result_json.filter(|r| !r.is_empty()) {
        let result = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
        data.insert("result".into(), result);
    }
    if let Some(eta) = job.estimated_completion {
        data.insert("estimated_completion".into(), json!(eta));
    }
    Value::Object(data)
}

/// Unauthenticated: knowing the job id is the credential.
pub async fn workflow_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    meta: RequestMeta,
) -> Response {
    let mut audit = AuditRecord::begin("GET", format!("/api/workflow/status/{}", job_id), &meta);
    audit.token("anonymous");

    match state.store.find_job(&job_id).await {
        Ok(Some(job)) => {
            let body = Envelope::ok(snapshot(job)).to_value();
            audit.finish(&state, StatusCode::OK, body).await
        }
        Ok(None) => {
            let body = Envelope::fail(
                ErrorCode::JobNotFound,
                format!("No workflow job with id {}", job_id),
            )
            .to_value();
            audit.finish(&state, StatusCode::NOT_FOUND, body).await
        }
        Err(e) => {
            error!("Workflow status error: {}", e);
            let body = Envelope::fail(ErrorCode::StatusError, e.to_string()).to_value();
            audit
                .finish(&state, StatusCode::INTERNAL_SERVER_ERROR, body)
                .await
        }
    }
}
