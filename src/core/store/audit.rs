use anyhow::Result;
use rusqlite::params;

use super::types::{NewRequestLog, NewWebhookLog, RequestLogRecord, WebhookLogRecord};
use super::{Store, now_rfc3339};

impl Store {
    pub async fn insert_request_log(&self, entry: &NewRequestLog) -> Result<i64> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO request_log (token_name, endpoint, method, skill_code, request_json,
                                      response_json, status, error, duration_ms, remote_addr,
                                      user_agent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                entry.token_name,
                entry.endpoint,
                entry.method,
                entry.skill_code,
                entry.request_json,
                entry.response_json,
                entry.status.as_str(),
                entry.error,
                entry.duration_ms,
                entry.remote_addr,
                entry.user_agent,
                now_rfc3339(),
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Most recent entries first.
    pub async fn list_request_logs(&self, limit: i64) -> Result<Vec<RequestLogRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, token_name, endpoint, method, skill_code, status, error, duration_ms,
                    remote_addr, created_at
             FROM request_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(RequestLogRecord {
                id: row.get(0)?,
                token_name: row.get(1)?,
                endpoint: row.get(2)?,
                method: row.get(3)?,
                skill_code: row.get(4)?,
                status: row.get(5)?,
                error: row.get(6)?,
                duration_ms: row.get(7)?,
                remote_addr: row.get(8)?,
                created_at: row.get(9)?,
            })
        })?;
        let mut logs = Vec::new();
        for row in rows {
            logs.push(row?);
        }
        Ok(logs)
    }

    pub async fn insert_webhook_log(&self, entry: &NewWebhookLog) -> Result<i64> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO webhook_log (webhook_id, payload_json, response_json, status_code,
                                      execution_time_ms, source_ip, n8n_workflow_id, success,
                                      error_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.webhook_id,
                entry.payload_json,
                entry.response_json,
                entry.status_code,
                entry.execution_time_ms,
                entry.source_ip,
                entry.n8n_workflow_id,
                entry.status_code < 400,
                entry.error_message,
                now_rfc3339(),
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    pub async fn list_webhook_logs(&self, limit: i64) -> Result<Vec<WebhookLogRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, webhook_id, status_code, execution_time_ms, success, error_message,
                    created_at
             FROM webhook_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(WebhookLogRecord {
                id: row.get(0)?,
                webhook_id: row.get(1)?,
                status_code: row.get(2)?,
                execution_time_ms: row.get(3)?,
                success: row.get::<_, i64>(4)? != 0,
                error_message: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;
        let mut logs = Vec::new();
        for row in rows {
            logs.push(row?);
        }
        Ok(logs)
    }
}
