pub mod bulk;
pub mod health;
pub mod skills;
pub mod webhooks;
pub mod workflow;

use serde_json::Value;

use crate::skills::executors::Payload;

/// Reads a gateway request body. Blank means `{}`; anything but a JSON
/// object is refused with a human-readable reason.
pub(crate) fn parse_payload(body: &[u8]) -> Result<Payload, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Payload::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("Invalid JSON payload: expected a JSON object".to_string()),
        Err(e) => Err(format!("Invalid JSON payload: {}", e)),
    }
}
