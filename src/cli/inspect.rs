use anyhow::Result;

use crate::core::store::Store;
use crate::core::terminal::{print_info, print_table};

pub async fn list_skills(store: &Store) -> Result<()> {
    let skills = store.list_all_skills().await?;
    if skills.is_empty() {
        print_info("Registry is empty. Run `openclaw-gateway seed` first.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = skills
        .iter()
        .map(|s| {
            vec![
                s.sequence.to_string(),
                s.code.clone(),
                s.name.clone(),
                s.executor.clone(),
                s.max_limit.to_string(),
                if s.active { "yes" } else { "no" }.to_string(),
                if s.allowed_roles.is_empty() {
                    "-".to_string()
                } else {
                    s.allowed_roles.join(",")
                },
            ]
        })
        .collect();
    print_table(
        &["SEQ", "CODE", "NAME", "EXECUTOR", "MAX", "ACTIVE", "ROLES"],
        &rows,
    );
    Ok(())
}

pub async fn list_logs(store: &Store, limit: i64) -> Result<()> {
    let requests = store.list_request_logs(limit).await?;
    let webhooks = store.list_webhook_logs(limit).await?;

    if requests.is_empty() {
        print_info("No gateway requests recorded.");
    } else {
        let rows: Vec<Vec<String>> = requests
            .iter()
            .map(|r| {
                vec![
                    r.created_at.clone(),
                    r.method.clone(),
                    r.endpoint.clone(),
                    r.token_name.clone(),
                    r.status.clone(),
                    r.error.clone().unwrap_or_default(),
                    format!("{}ms", r.duration_ms),
                    r.remote_addr.clone().unwrap_or_default(),
                ]
            })
            .collect();
        print_table(
            &["TIME", "METHOD", "ENDPOINT", "TOKEN", "STATUS", "ERROR", "TOOK", "IP"],
            &rows,
        );
    }

    if webhooks.is_empty() {
        print_info("No webhook callbacks recorded.");
    } else {
        println!();
        let rows: Vec<Vec<String>> = webhooks
            .iter()
            .map(|w| {
                vec![
                    w.created_at.clone(),
                    w.webhook_id.clone(),
                    w.status_code.to_string(),
                    format!("{:.1}ms", w.execution_time_ms),
                    w.error_message.clone().unwrap_or_default(),
                ]
            })
            .collect();
        print_table(&["TIME", "WEBHOOK", "CODE", "TOOK", "ERROR"], &rows);
    }
    Ok(())
}

pub async fn list_jobs(store: &Store, limit: i64) -> Result<()> {
    let jobs = store.list_jobs(limit).await?;
    if jobs.is_empty() {
        print_info("No workflow jobs recorded.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = jobs
        .iter()
        .map(|j| {
            vec![
                j.job_id.clone(),
                j.workflow_type.clone(),
                j.status.clone(),
                format!("{:.0}%", j.progress_percent),
                j.updated_at.clone(),
                j.error_message.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(
        &["JOB", "TYPE", "STATUS", "PROGRESS", "UPDATED", "ERROR"],
        &rows,
    );
    Ok(())
}
