use async_trait::async_trait;
use serde_json::json;

use super::{Payload, SkillExecutor};
use crate::core::store::Store;
use crate::skills::envelope::Envelope;

pub struct PingExecutor;

#[async_trait]
impl SkillExecutor for PingExecutor {
    async fn execute(&self, _store: &Store, _payload: &Payload) -> Envelope {
        Envelope::ok(json!({
            "message": "pong",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION"),
        }))
    }
}
