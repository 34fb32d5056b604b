use serde::Serialize;

/// Credential row. The raw secret is never stored, only its SHA-256 hash.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRecord {
    pub id: i64,
    pub name: String,
    pub active: bool,
    pub allowed_skills: Vec<String>,
    /// Comma-separated list; empty means every address is allowed.
    pub allowed_ips: String,
    pub roles: Vec<String>,
    pub expires_at: Option<String>,
    pub last_used_at: Option<String>,
    pub use_count: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewToken {
    pub name: String,
    /// Use this exact secret instead of generating one.
    pub secret: Option<String>,
    pub allowed_skills: Vec<String>,
    pub allowed_ips: Vec<String>,
    pub roles: Vec<String>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkillRecord {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub description: String,
    pub executor: String,
    pub active: bool,
    pub sequence: i64,
    pub max_limit: i64,
    pub allowed_roles: Vec<String>,
    pub input_schema: String,
    pub output_schema: String,
}

#[derive(Debug, Clone)]
pub struct NewSkill {
    pub code: String,
    pub name: String,
    pub description: String,
    pub executor: String,
    pub sequence: i64,
    pub max_limit: i64,
    pub allowed_roles: Vec<String>,
    pub input_schema: String,
    pub output_schema: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Ok,
    Error,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Ok => "ok",
            RequestStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewRequestLog {
    pub token_name: String,
    pub endpoint: String,
    pub method: String,
    pub skill_code: Option<String>,
    pub request_json: String,
    pub response_json: String,
    pub status: RequestStatus,
    pub error: Option<String>,
    pub duration_ms: i64,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestLogRecord {
    pub id: i64,
    pub token_name: String,
    pub endpoint: String,
    pub method: String,
    pub skill_code: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub duration_ms: i64,
    pub remote_addr: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewWebhookLog {
    pub webhook_id: String,
    pub payload_json: String,
    pub response_json: String,
    pub status_code: u16,
    pub execution_time_ms: f64,
    pub source_ip: Option<String>,
    pub n8n_workflow_id: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookLogRecord {
    pub id: i64,
    pub webhook_id: String,
    pub status_code: u16,
    pub execution_time_ms: f64,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    BulkImport,
    LeadCreation,
    DataSync,
    ReportGeneration,
}

impl WorkflowType {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowType::BulkImport => "bulk_import",
            WorkflowType::LeadCreation => "lead_creation",
            WorkflowType::DataSync => "data_sync",
            WorkflowType::ReportGeneration => "report_generation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bulk_import" => Some(WorkflowType::BulkImport),
            "lead_creation" => Some(WorkflowType::LeadCreation),
            "data_sync" => Some(WorkflowType::DataSync),
            "report_generation" => Some(WorkflowType::ReportGeneration),
            _ => None,
        }
    }
}

/// Job status. Transitions are advisory: any status may overwrite any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowJob {
    pub job_id: String,
    pub workflow_type: String,
    pub status: String,
    pub progress_percent: f64,
    pub result_json: Option<String>,
    pub error_message: Option<String>,
    pub n8n_execution_id: Option<String>,
    pub estimated_completion: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewWorkflowJob {
    pub job_id: String,
    pub workflow_type: WorkflowType,
    pub status: JobStatus,
    pub progress_percent: f64,
    pub n8n_execution_id: Option<String>,
    pub error_message: Option<String>,
    pub estimated_completion: Option<String>,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress_percent: Option<f64>,
    pub result_json: Option<String>,
    pub error_message: Option<String>,
    pub estimated_completion: Option<String>,
}
