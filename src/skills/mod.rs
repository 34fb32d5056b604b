pub mod envelope;
pub mod executors;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use std::time::Instant;
use tracing::{error, info};

use crate::core::diagnostics::Diagnostics;
use crate::core::error::ErrorCode;
use crate::core::store::Store;
use crate::core::store::types::{SkillRecord, TokenRecord};
use envelope::Envelope;
use executors::{ExecutorKind, Payload};

/// Public projection of a skill; schema documentation stays internal.
#[derive(Debug, Clone, Serialize)]
pub struct SkillSummary {
    pub code: String,
    pub name: String,
    pub description: String,
    pub executor: String,
    pub max_limit: i64,
}

impl From<SkillRecord> for SkillSummary {
    fn from(skill: SkillRecord) -> Self {
        Self {
            code: skill.code,
            name: skill.name,
            description: skill.description,
            executor: skill.executor,
            max_limit: skill.max_limit,
        }
    }
}

/// Resolves skill codes to executors and runs them under the skill's
/// role and limit constraints.
#[derive(Clone)]
pub struct SkillRegistry {
    store: Store,
    diagnostics: Diagnostics,
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "executor panicked".to_string()
    }
}

impl SkillRegistry {
    pub fn new(store: Store, diagnostics: Diagnostics) -> Self {
        Self { store, diagnostics }
    }

    pub async fn resolve(&self, code: &str) -> Result<Option<SkillRecord>> {
        self.store.get_active_skill(code).await
    }

    /// Skills a token may see: its explicit allow-list if it has one, else
    /// every active skill. Catalogue order either way.
    pub async fn visible_skills(&self, token: &TokenRecord) -> Result<Vec<SkillSummary>> {
        let skills = if token.allowed_skills.is_empty() {
            self.store.list_active_skills().await?
        } else {
            self.store
                .list_active_skills_by_codes(&token.allowed_skills)
                .await?
        };
        Ok(skills.into_iter().map(SkillSummary::from).collect())
    }

    /// Runs `code` for a caller holding `caller_roles`. Skill-level failures
    /// come back as failed envelopes; `Err` is reserved for store failures
    /// while resolving the skill.
    pub async fn run(&self, code: &str, payload: Payload, caller_roles: &[String]) -> Result<Envelope> {
        let Some(skill) = self.resolve(code).await? else {
            return Ok(Envelope::fail(
                ErrorCode::SkillNotFound,
                format!("Skill with code \"{}\" not found or inactive", code),
            ));
        };

        if !skill.allowed_roles.is_empty()
            && !caller_roles.is_empty()
            && !caller_roles.iter().any(|r| skill.allowed_roles.contains(r))
        {
            return Ok(Envelope::fail(
                ErrorCode::PermissionDenied,
                format!(
                    "You do not have permission to execute skill \"{}\" (requires one of: {})",
                    code,
                    skill.allowed_roles.join(", ")
                ),
            )
            .with_extra("required_roles", json!(skill.allowed_roles)));
        }

        if let Some(limit) = executors::requested_limit(&payload)
            && limit > skill.max_limit
        {
            return Ok(Envelope::fail(
                ErrorCode::LimitExceeded,
                format!(
                    "Requested limit {} exceeds maximum allowed {}",
                    limit, skill.max_limit
                ),
            ));
        }
        // Executors only ever see a limit already bounded by the skill.
        let bounded = executors::clamp_limit(&payload, skill.max_limit);
        let mut payload = payload;
        payload.insert("limit".to_string(), json!(bounded));

        let Some(kind) = ExecutorKind::parse(&skill.executor) else {
            return Ok(Envelope::fail(
                ErrorCode::ExecutorNotFound,
                format!("Executor '{}' is not registered", skill.executor),
            ));
        };

        let executor = kind.executor();
        let store = self.store.clone();
        let started = Instant::now();
        let handle = tokio::spawn(async move { executor.execute(&store, &payload).await });
        let envelope = match handle.await {
            Ok(envelope) => envelope,
            Err(e) => {
                let message = panic_message(e);
                error!("Skill {} failed: {}", code, message);
                self.diagnostics
                    .note("skills", format!("executor for {} aborted: {}", code, message));
                Envelope::fail(
                    ErrorCode::ExecutionError,
                    format!("Error executing skill: {}", message),
                )
            }
        };
        let elapsed = started.elapsed().as_millis() as u64;
        info!(skill = code, success = envelope.success, elapsed_ms = elapsed, "Skill executed");
        Ok(envelope.timed(code, elapsed))
    }
}
