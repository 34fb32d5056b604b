use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::error::ErrorCode;

/// Uniform `{success, data | error + message}` result shape returned by every
/// executor and by the HTTP surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
    /// Failure-specific context such as `duplicate_id` or `required_roles`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
            query_time_ms: None,
            skill: None,
            extra: Map::new(),
        }
    }

    pub fn fail(error: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            message: Some(message.into()),
            query_time_ms: None,
            skill: None,
            extra: Map::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    /// Stamp the skill code and elapsed time; applied on success and failure alike.
    pub fn timed(mut self, skill: &str, elapsed_ms: u64) -> Self {
        self.skill = Some(skill.to_string());
        self.query_time_ms = Some(elapsed_ms);
        self
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({
                "success": false,
                "error": ErrorCode::ServerError,
                "message": format!("Failed to serialize response: {}", e),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope_omits_error_fields() {
        let v = Envelope::ok(json!({"message": "pong"})).to_value();
        assert_eq!(v["success"], true);
        assert_eq!(v["data"]["message"], "pong");
        assert!(v.get("error").is_none());
        assert!(v.get("message").is_none());
    }

    #[test]
    fn failure_envelope_flattens_extra_keys() {
        let v = Envelope::fail(ErrorCode::DuplicateFound, "exists")
            .with_extra("duplicate_id", json!(7))
            .timed("advanced_lead", 3)
            .to_value();
        assert_eq!(v["success"], false);
        assert_eq!(v["error"], "DUPLICATE_FOUND");
        assert_eq!(v["duplicate_id"], 7);
        assert_eq!(v["skill"], "advanced_lead");
        assert_eq!(v["query_time_ms"], 3);
        assert!(v.get("data").is_none());
    }
}
