use anyhow::Result;
use rusqlite::{OptionalExtension, params};

use super::types::{JobUpdate, NewWorkflowJob, WorkflowJob};
use super::{Store, now_rfc3339};

const JOB_COLUMNS: &str = "job_id, workflow_type, status, progress_percent, result_json, \
     error_message, n8n_execution_id, estimated_completion, created_at, updated_at";

fn map_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkflowJob> {
    Ok(WorkflowJob {
        job_id: row.get(0)?,
        workflow_type: row.get(1)?,
        status: row.get(2)?,
        progress_percent: row.get(3)?,
        result_json: row.get(4)?,
        error_message: row.get(5)?,
        n8n_execution_id: row.get(6)?,
        estimated_completion: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl Store {
    pub async fn create_job(&self, job: &NewWorkflowJob) -> Result<WorkflowJob> {
        let now = now_rfc3339();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO workflow_jobs (job_id, workflow_type, status, progress_percent,
                                        n8n_execution_id, error_message, estimated_completion,
                                        created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                job.job_id,
                job.workflow_type.as_str(),
                job.status.as_str(),
                job.progress_percent,
                job.n8n_execution_id,
                job.error_message,
                job.estimated_completion,
                now,
            ],
        )?;
        let created = db.query_row(
            &format!("SELECT {} FROM workflow_jobs WHERE job_id = ?1", JOB_COLUMNS),
            params![job.job_id],
            map_job,
        )?;
        Ok(created)
    }

    pub async fn find_job(&self, job_id: &str) -> Result<Option<WorkflowJob>> {
        let db = self.db.lock().await;
        let job = db
            .query_row(
                &format!("SELECT {} FROM workflow_jobs WHERE job_id = ?1", JOB_COLUMNS),
                params![job_id],
                map_job,
            )
            .optional()?;
        Ok(job)
    }

    /// Applies the fields present in `update`, keeping stored values for the
    /// rest. Returns false when no job has this id.
    pub async fn update_job(&self, job_id: &str, update: &JobUpdate) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE workflow_jobs SET
                status = COALESCE(?1, status),
                progress_percent = COALESCE(?2, progress_percent),
                result_json = COALESCE(?3, result_json),
                error_message = COALESCE(?4, error_message),
                estimated_completion = COALESCE(?5, estimated_completion),
                updated_at = ?6
             WHERE job_id = ?7",
            params![
                update.status.map(|s| s.as_str()),
                update.progress_percent,
                update.result_json,
                update.error_message,
                update.estimated_completion,
                now_rfc3339(),
                job_id,
            ],
        )?;
        Ok(rows > 0)
    }

    pub async fn list_jobs(&self, limit: i64) -> Result<Vec<WorkflowJob>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM workflow_jobs ORDER BY id DESC LIMIT ?1",
            JOB_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit], map_job)?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::types::{JobStatus, WorkflowType};

    fn pending(id: &str) -> NewWorkflowJob {
        NewWorkflowJob {
            job_id: id.to_string(),
            workflow_type: WorkflowType::DataSync,
            status: JobStatus::Pending,
            progress_percent: 0.0,
            n8n_execution_id: None,
            error_message: None,
            estimated_completion: None,
        }
    }

    #[tokio::test]
    async fn create_then_find() {
        let store = Store::open_in_memory().unwrap();
        let job = store.create_job(&pending("job-1")).await.unwrap();
        assert_eq!(job.status, "pending");
        assert_eq!(job.workflow_type, "data_sync");
        assert!(store.find_job("job-1").await.unwrap().is_some());
        assert!(store.find_job("job-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn job_ids_are_unique() {
        let store = Store::open_in_memory().unwrap();
        store.create_job(&pending("dup")).await.unwrap();
        assert!(store.create_job(&pending("dup")).await.is_err());
    }

    #[tokio::test]
    async fn partial_update_preserves_absent_fields() {
        let store = Store::open_in_memory().unwrap();
        store.create_job(&pending("job-1")).await.unwrap();
        store
            .update_job(
                "job-1",
                &JobUpdate {
                    status: Some(JobStatus::Running),
                    progress_percent: Some(40.0),
                    result_json: Some(r#"{"rows":4}"#.into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .update_job(
                "job-1",
                &JobUpdate {
                    status: Some(JobStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let job = store.find_job("job-1").await.unwrap().unwrap();
        assert_eq!(job.status, "completed");
        assert_eq!(job.progress_percent, 40.0);
        assert_eq!(job.result_json.as_deref(), Some(r#"{"rows":4}"#));
    }

    #[tokio::test]
    async fn terminal_states_can_be_overwritten() {
        let store = Store::open_in_memory().unwrap();
        store.create_job(&pending("job-1")).await.unwrap();
        for status in [JobStatus::Failed, JobStatus::Running] {
            store
                .update_job(
                    "job-1",
                    &JobUpdate {
                        status: Some(status),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        let job = store.find_job("job-1").await.unwrap().unwrap();
        assert_eq!(job.status, "running");
        assert!(!store.update_job("missing", &JobUpdate::default()).await.unwrap());
    }
}
