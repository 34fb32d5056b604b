use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// Stable machine-readable failure codes carried in the `error` field of every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // authentication
    MissingToken,
    InvalidToken,
    TokenInactive,
    TokenExpired,
    IpNotAllowed,
    // authorization
    SkillNotAllowed,
    PermissionDenied,
    // input
    InvalidJson,
    MissingField,
    NameRequired,
    InvalidEmail,
    DataInvalid,
    DataRequired,
    TypeRequired,
    InvalidType,
    LimitExceeded,
    InvalidOperation,
    // execution
    QueryError,
    CreateError,
    CreationError,
    ExecutionError,
    ImportError,
    BulkError,
    ExecutorNotFound,
    SkillNotFound,
    NotImplemented,
    // integrity
    DuplicateFound,
    // infrastructure
    ServerError,
    StatusError,
    WebhookError,
    InvalidSignature,
    JobNotFound,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MissingToken => "MISSING_TOKEN",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::TokenInactive => "TOKEN_INACTIVE",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::IpNotAllowed => "IP_NOT_ALLOWED",
            ErrorCode::SkillNotAllowed => "SKILL_NOT_ALLOWED",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::InvalidJson => "INVALID_JSON",
            ErrorCode::MissingField => "MISSING_FIELD",
            ErrorCode::NameRequired => "NAME_REQUIRED",
            ErrorCode::InvalidEmail => "INVALID_EMAIL",
            ErrorCode::DataInvalid => "DATA_INVALID",
            ErrorCode::DataRequired => "DATA_REQUIRED",
            ErrorCode::TypeRequired => "TYPE_REQUIRED",
            ErrorCode::InvalidType => "INVALID_TYPE",
            ErrorCode::LimitExceeded => "LIMIT_EXCEEDED",
            ErrorCode::InvalidOperation => "INVALID_OPERATION",
            ErrorCode::QueryError => "QUERY_ERROR",
            ErrorCode::CreateError => "CREATE_ERROR",
            ErrorCode::CreationError => "CREATION_ERROR",
            ErrorCode::ExecutionError => "EXECUTION_ERROR",
            ErrorCode::ImportError => "IMPORT_ERROR",
            ErrorCode::BulkError => "BULK_ERROR",
            ErrorCode::ExecutorNotFound => "EXECUTOR_NOT_FOUND",
            ErrorCode::SkillNotFound => "SKILL_NOT_FOUND",
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
            ErrorCode::DuplicateFound => "DUPLICATE_FOUND",
            ErrorCode::ServerError => "SERVER_ERROR",
            ErrorCode::StatusError => "STATUS_ERROR",
            ErrorCode::WebhookError => "WEBHOOK_ERROR",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::JobNotFound => "JOB_NOT_FOUND",
        }
    }

    /// HTTP status for a failure of this class when it terminates a request
    /// outside of skill execution (skill-reported failures are always 400).
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::MissingToken
            | ErrorCode::InvalidToken
            | ErrorCode::TokenInactive
            | ErrorCode::TokenExpired
            | ErrorCode::IpNotAllowed
            | ErrorCode::SkillNotAllowed
            | ErrorCode::InvalidSignature => StatusCode::UNAUTHORIZED,
            ErrorCode::JobNotFound => StatusCode::NOT_FOUND,
            ErrorCode::ServerError
            | ErrorCode::StatusError
            | ErrorCode::WebhookError
            | ErrorCode::ExecutionError
            | ErrorCode::BulkError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_name_matches_as_str() {
        for code in [
            ErrorCode::MissingToken,
            ErrorCode::IpNotAllowed,
            ErrorCode::InvalidJson,
            ErrorCode::DuplicateFound,
            ErrorCode::ExecutorNotFound,
            ErrorCode::JobNotFound,
        ] {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, serde_json::Value::String(code.as_str().to_string()));
        }
    }

    #[test]
    fn status_classes() {
        assert_eq!(ErrorCode::TokenExpired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::InvalidJson.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::JobNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::ExecutionError.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
