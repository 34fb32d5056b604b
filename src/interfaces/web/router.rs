use axum::{
    Router,
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::AppState;
use super::auth::TOKEN_HEADER;
use super::handlers::webhooks::SIGNATURE_HEADER;
use super::handlers::{bulk, health, skills, webhooks, workflow};

/// `None` when no origins are configured: browsers get no CORS grant at all.
fn build_cors(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    if origins.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::CONTENT_TYPE,
                HeaderName::from_static(TOKEN_HEADER),
                HeaderName::from_static(SIGNATURE_HEADER),
            ]),
    )
}

pub fn build_api_router(state: AppState) -> Router {
    let mut router: Router<AppState> = Router::new()
        .route("/api/health", get(health::health))
        .route("/api/skills", get(skills::list_skills))
        .route("/api/skills/{code}", post(skills::execute_skill))
        .route("/api/bulk/{operation}", post(bulk::bulk_operation))
        .route(
            "/api/workflow/status/{job_id}",
            get(workflow::workflow_status),
        )
        .route("/webhook/n8n/{webhook_id}", post(webhooks::n8n_webhook))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http());
    if let Some(cors) = build_cors(&state.config.server.cors_origins) {
        router = router.layer(cors);
    }
    router.with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::GatewayConfig;
    use crate::core::store::types::NewToken;
    use axum::http::StatusCode;
    use hmac::{Hmac, Mac};
    use serde_json::{Value, json};
    use sha2::Sha256;
    use tower::util::ServiceExt;

    async fn send(
        state: &AppState,
        method: Method,
        path: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> (StatusCode, Value, axum::http::HeaderMap) {
        let mut req = Request::builder().method(method).uri(path);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        let req = req.body(Body::from(body.to_string())).unwrap();
        let resp = build_api_router(state.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let resp_headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap_or(json!({}));
        (status, json, resp_headers)
    }

    async fn token(state: &AppState, new: NewToken) -> String {
        state.store.create_api_token(&new).await.unwrap().0
    }

    async fn open_token(state: &AppState) -> String {
        token(
            state,
            NewToken {
                name: "n8n".into(),
                ..Default::default()
            },
        )
        .await
    }

    async fn log_count(state: &AppState) -> usize {
        state.store.list_request_logs(1000).await.unwrap().len()
    }

    #[tokio::test]
    async fn health_is_public_idempotent_and_unaudited() {
        let state = AppState::for_tests().await;
        let (status, first, headers) = send(&state, Method::GET, "/api/health", &[], "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["status"], "ok");
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["cache-control"], "no-store");

        let (_, second, _) = send(&state, Method::GET, "/api/health", &[], "").await;
        let t1 = chrono::DateTime::parse_from_rfc3339(first["timestamp"].as_str().unwrap()).unwrap();
        let t2 = chrono::DateTime::parse_from_rfc3339(second["timestamp"].as_str().unwrap()).unwrap();
        assert!(t2 >= t1);
        assert_eq!(log_count(&state).await, 0);
    }

    #[tokio::test]
    async fn ping_with_valid_token() {
        let state = AppState::for_tests().await;
        let raw = open_token(&state).await;
        let (status, body, _) = send(
            &state,
            Method::POST,
            "/api/skills/ping",
            &[("X-OPENCLAW-TOKEN", raw.as_str()), ("content-type", "application/json")],
            "",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["message"], "pong");
        assert_eq!(body["skill"], "ping");
        assert!(body["query_time_ms"].is_u64());

        let logs = state.store.list_request_logs(10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].token_name, "n8n");
        assert_eq!(logs[0].status, "ok");
        assert_eq!(logs[0].skill_code.as_deref(), Some("ping"));

        let tokens = state.store.list_api_tokens().await.unwrap();
        assert_eq!(tokens[0].use_count, 1);
    }

    #[tokio::test]
    async fn missing_token_is_rejected_and_audited() {
        let state = AppState::for_tests().await;
        let (status, body, _) = send(&state, Method::POST, "/api/skills/ping", &[], "{}").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "MISSING_TOKEN");
        assert!(body["message"].is_string());

        let logs = state.store.list_request_logs(10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].token_name, "anonymous");
        assert_eq!(logs[0].error.as_deref(), Some("MISSING_TOKEN"));
    }

    #[tokio::test]
    async fn list_skills_requires_token_and_follows_scope() {
        let state = AppState::for_tests().await;
        let (status, body, _) = send(&state, Method::GET, "/api/skills", &[], "").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "MISSING_TOKEN");

        let raw = token(
            &state,
            NewToken {
                name: "reports".into(),
                allowed_skills: vec!["summary".into(), "ping".into()],
                ..Default::default()
            },
        )
        .await;
        let (status, body, _) =
            send(&state, Method::GET, "/api/skills", &[(TOKEN_HEADER, raw.as_str())], "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["count"], 2);
        assert_eq!(body["data"]["skills"][0]["code"], "ping");
        assert!(body["data"]["skills"][0].get("input_schema").is_none());
        assert_eq!(log_count(&state).await, 2);
    }

    #[tokio::test]
    async fn invalid_token_is_checked_before_json() {
        let state = AppState::for_tests().await;
        let (status, body, _) = send(
            &state,
            Method::POST,
            "/api/skills/ping",
            &[(TOKEN_HEADER, "ocg_wrong")],
            "{not json",
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "INVALID_TOKEN");
        let logs = state.store.list_request_logs(10).await.unwrap();
        assert_eq!(logs[0].token_name, "invalid");
    }

    #[tokio::test]
    async fn malformed_or_non_object_json_is_invalid_json() {
        let state = AppState::for_tests().await;
        let raw = open_token(&state).await;
        for body in ["{not json", "[1, 2]", "\"text\""] {
            let (status, resp, _) = send(
                &state,
                Method::POST,
                "/api/skills/ping",
                &[(TOKEN_HEADER, raw.as_str())],
                body,
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(resp["error"], "INVALID_JSON");
        }
        assert_eq!(log_count(&state).await, 3);
    }

    #[tokio::test]
    async fn skill_failure_is_http_400() {
        let state = AppState::for_tests().await;
        let raw = open_token(&state).await;
        let (status, body, _) = send(
            &state,
            Method::POST,
            "/api/skills/advanced_lead",
            &[(TOKEN_HEADER, raw.as_str())],
            r#"{"name":"Acme Corp","email_from":"bad-email"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "INVALID_EMAIL");
        assert_eq!(body["skill"], "advanced_lead");

        let logs = state.store.list_request_logs(10).await.unwrap();
        assert_eq!(logs[0].status, "error");
        assert_eq!(logs[0].error.as_deref(), Some("INVALID_EMAIL"));
        // The caller was authorized, so the use still counts.
        assert_eq!(state.store.list_api_tokens().await.unwrap()[0].use_count, 1);
    }

    #[tokio::test]
    async fn limit_above_skill_max_is_rejected() {
        let state = AppState::for_tests().await;
        let raw = open_token(&state).await;
        let (status, body, _) = send(
            &state,
            Method::POST,
            "/api/skills/users",
            &[(TOKEN_HEADER, raw.as_str())],
            r#"{"limit": 1000}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn out_of_scope_skill_is_not_allowed() {
        let state = AppState::for_tests().await;
        let raw = token(
            &state,
            NewToken {
                name: "ping-only".into(),
                allowed_skills: vec!["ping".into()],
                ..Default::default()
            },
        )
        .await;
        let (status, body, _) = send(
            &state,
            Method::POST,
            "/api/skills/summary",
            &[(TOKEN_HEADER, raw.as_str())],
            "",
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "SKILL_NOT_ALLOWED");
    }

    #[tokio::test]
    async fn ip_allowlist_rejects_unknown_addresses() {
        let state = AppState::for_tests().await;
        let raw = token(
            &state,
            NewToken {
                name: "office".into(),
                allowed_ips: vec!["10.0.0.1".into()],
                ..Default::default()
            },
        )
        .await;
        let (status, body, _) = send(
            &state,
            Method::POST,
            "/api/skills/ping",
            &[(TOKEN_HEADER, raw.as_str())],
            "",
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "IP_NOT_ALLOWED");
    }

    #[tokio::test]
    async fn token_store_failure_is_server_error() {
        let state = AppState::for_tests().await;
        state
            .store
            .get_db()
            .lock()
            .await
            .execute_batch("DROP TABLE api_tokens")
            .unwrap();
        let (status, body, _) = send(
            &state,
            Method::POST,
            "/api/skills/ping",
            &[(TOKEN_HEADER, "ocg_any")],
            "",
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "SERVER_ERROR");
    }

    #[tokio::test]
    async fn audit_failure_never_changes_the_response() {
        let state = AppState::for_tests().await;
        let raw = open_token(&state).await;
        let mut notes = state.diagnostics.subscribe();
        state
            .store
            .get_db()
            .lock()
            .await
            .execute_batch("DROP TABLE request_log")
            .unwrap();
        let (status, body, _) = send(
            &state,
            Method::POST,
            "/api/skills/ping",
            &[(TOKEN_HEADER, raw.as_str())],
            "",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["message"], "pong");
        let note = notes.try_recv().unwrap();
        assert!(note.starts_with("[audit]"));
    }

    #[tokio::test]
    async fn bulk_rejects_unknown_operation_before_validating_token() {
        let state = AppState::for_tests().await;
        let (status, body, _) = send(
            &state,
            Method::POST,
            "/api/bulk/delete",
            &[(TOKEN_HEADER, "ocg_not_checked")],
            "{}",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_OPERATION");

        let (status, body, _) = send(&state, Method::POST, "/api/bulk/delete", &[], "{}").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "MISSING_TOKEN");
        assert_eq!(log_count(&state).await, 2);
    }

    #[tokio::test]
    async fn bulk_import_tracks_a_job() {
        let state = AppState::for_tests().await;
        let raw = open_token(&state).await;
        let payload = json!({
            "type": "customers",
            "data": [{"name": "Acme", "email": "acme@example.com"}, {"email": "x@example.com"}],
        });
        let (status, body, _) = send(
            &state,
            Method::POST,
            "/api/bulk/import",
            &[(TOKEN_HEADER, raw.as_str())],
            &payload.to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["created"], 1);
        let job_id = body["data"]["job_id"].as_str().unwrap().to_string();

        let (status, snap, _) = send(
            &state,
            Method::GET,
            &format!("/api/workflow/status/{}", job_id),
            &[],
            "",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snap["data"]["status"], "completed");
        assert_eq!(snap["data"]["progress"], 100.0);
        assert_eq!(snap["data"]["workflow_type"], "bulk_import");
        assert_eq!(snap["data"]["result"]["created"], 1);

        let logs = state.store.list_request_logs(10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].token_name, "anonymous");
        assert_eq!(logs[1].skill_code.as_deref(), Some("bulk_import"));
    }

    #[tokio::test]
    async fn failed_bulk_import_marks_job_failed() {
        let state = AppState::for_tests().await;
        let raw = open_token(&state).await;
        let (status, body, _) = send(
            &state,
            Method::POST,
            "/api/bulk/import",
            &[(TOKEN_HEADER, raw.as_str())],
            r#"{"type": "invoices", "data": [{"name": "x"}]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_TYPE");
        let job_id = body["job_id"].as_str().unwrap();
        let job = state.store.find_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, "failed");
        assert!(job.error_message.is_some());
    }

    #[tokio::test]
    async fn bulk_export_is_not_implemented() {
        let state = AppState::for_tests().await;
        let raw = open_token(&state).await;
        let (status, body, _) = send(
            &state,
            Method::POST,
            "/api/bulk/export",
            &[(TOKEN_HEADER, raw.as_str())],
            "{}",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "NOT_IMPLEMENTED");
    }

    #[tokio::test]
    async fn unknown_job_is_404() {
        let state = AppState::for_tests().await;
        let (status, body, _) =
            send(&state, Method::GET, "/api/workflow/status/unknown-id", &[], "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "JOB_NOT_FOUND");
        assert_eq!(log_count(&state).await, 1);
    }

    fn unsigned_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.webhooks.allow_unsigned = true;
        config
    }

    fn signed_config(secret: &str) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.webhooks.secret = Some(secret.to_string());
        config
    }

    fn sign(secret: &str, body: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body.as_bytes());
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[tokio::test]
    async fn unsigned_webhook_is_rejected_by_default() {
        let state = AppState::for_tests().await;
        let (status, body, _) = send(
            &state,
            Method::POST,
            "/webhook/n8n/workflow_status",
            &[],
            r#"{"job_id": "j-1", "status": "pending"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "INVALID_SIGNATURE");
        assert!(state.store.find_job("j-1").await.unwrap().is_none());

        let logs = state.store.list_webhook_logs(10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status_code, 401);
        assert!(!logs[0].success);
    }

    #[tokio::test]
    async fn opted_in_unsigned_webhook_creates_pending_job() {
        let state = AppState::for_tests_with(unsigned_config()).await;
        let (status, body, _) = send(
            &state,
            Method::POST,
            "/webhook/n8n/workflow_status",
            &[],
            r#"{"job_id": "j-1", "status": "pending", "n8n_workflow_id": "wf-9"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Status updated");
        assert_eq!(body["job_id"], "j-1");
        let job = state.store.find_job("j-1").await.unwrap().unwrap();
        assert_eq!(job.status, "pending");
        assert_eq!(job.workflow_type, "data_sync");
        assert_eq!(state.store.list_webhook_logs(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn workflow_status_upsert_preserves_prior_values() {
        let state = AppState::for_tests_with(unsigned_config()).await;
        let path = "/webhook/n8n/workflow_status";
        send(
            &state,
            Method::POST,
            path,
            &[],
            r#"{"n8n_execution_id": "exec-7", "status": "running", "progress_percent": 30, "error_message": "slow"}"#,
        )
        .await;
        send(
            &state,
            Method::POST,
            path,
            &[],
            r#"{"job_id": "exec-7", "status": "completed", "result": {"rows": 4}}"#,
        )
        .await;
        let job = state.store.find_job("exec-7").await.unwrap().unwrap();
        assert_eq!(job.status, "completed");
        assert_eq!(job.progress_percent, 30.0);
        assert_eq!(job.error_message.as_deref(), Some("slow"));
        assert_eq!(job.result_json.as_deref(), Some(r#"{"rows":4}"#));

        // Terminal statuses never create jobs.
        send(
            &state,
            Method::POST,
            path,
            &[],
            r#"{"job_id": "ghost", "status": "failed"}"#,
        )
        .await;
        assert!(state.store.find_job("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn signed_webhook_completes_bulk_job() {
        let secret = "s3cret";
        let state = AppState::for_tests_with(signed_config(secret)).await;
        let body = r#"{"job_id": "bulk-1", "status": "running"}"#;
        let sig = sign(secret, body);
        let (status, _, _) = send(
            &state,
            Method::POST,
            "/webhook/n8n/workflow_status",
            &[("X-OpenClaw-Signature", sig.as_str())],
            body,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let body = r#"{"job_id": "bulk-1", "result": {"imported": 12}}"#;
        let sig = sign(secret, body);
        let (status, resp, _) = send(
            &state,
            Method::POST,
            "/webhook/n8n/bulk_import_complete",
            &[("X-OpenClaw-Signature", sig.as_str())],
            body,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["message"], "Bulk import acknowledged");
        let job = state.store.find_job("bulk-1").await.unwrap().unwrap();
        assert_eq!(job.status, "completed");
        assert_eq!(job.progress_percent, 100.0);
        assert_eq!(job.result_json.as_deref(), Some(r#"{"imported":12}"#));
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_when_secret_set() {
        let state = AppState::for_tests_with(signed_config("s3cret")).await;
        let body = r#"{"lead_id": 5}"#;
        let sig = sign("wrong", body);
        let (status, resp, _) = send(
            &state,
            Method::POST,
            "/webhook/n8n/lead_created",
            &[("X-OpenClaw-Signature", sig.as_str())],
            body,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(resp["error"], "INVALID_SIGNATURE");

        let sig = sign("s3cret", body);
        let (status, resp, _) = send(
            &state,
            Method::POST,
            "/webhook/n8n/lead_created",
            &[("X-OpenClaw-Signature", sig.as_str())],
            body,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["lead_id"], 5);
        assert_eq!(state.store.list_webhook_logs(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_webhook_is_500_and_logged() {
        let state = AppState::for_tests_with(unsigned_config()).await;
        let (status, body, _) =
            send(&state, Method::POST, "/webhook/n8n/mystery", &[], "{}").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "WEBHOOK_ERROR");
        assert!(body["message"].as_str().unwrap().contains("mystery"));
        let logs = state.store.list_webhook_logs(10).await.unwrap();
        assert_eq!(logs[0].status_code, 500);
        assert_eq!(logs[0].error_message.as_deref(), Some("WEBHOOK_ERROR"));
    }

    #[test]
    fn cors_is_off_without_origins() {
        assert!(build_cors(&[]).is_none());
        assert!(build_cors(&["https://n8n.example.com".to_string()]).is_some());
    }
}
