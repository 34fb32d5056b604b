use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use serde_json::{Value, json};
use std::sync::LazyLock;

use super::{Payload, SkillExecutor, record_id, text, truthy};
use crate::core::error::ErrorCode;
use crate::core::store::Store;
use crate::core::store::records::{FieldMap, Table};
use crate::skills::envelope::Envelope;

static EMAIL_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+$"));
static NON_PHONE_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"[^\d+\-()\s]"));

fn pattern(re: &'static LazyLock<Result<Regex, regex::Error>>) -> Result<&'static Regex> {
    re.as_ref().map_err(|e| anyhow::anyhow!("invalid built-in pattern: {}", e))
}

async fn created_lead(store: &Store, id: i64) -> Result<Value> {
    let summary = store
        .lead_summary(id)
        .await?
        .with_context(|| format!("lead {} vanished after insert", id))?;
    Ok(serde_json::to_value(summary)?)
}

/// Plain lead creation with a fixed set of optional fields.
pub struct LeadCreatorExecutor;

impl LeadCreatorExecutor {
    async fn create(store: &Store, payload: &Payload, name: &str) -> Result<Value> {
        let mut fields: FieldMap = vec![
            ("name", SqlValue::Text(name.to_string())),
            ("type", SqlValue::Text("opportunity".to_string())),
        ];
        for column in [
            "partner_name",
            "contact_name",
            "email_from",
            "phone",
            "description",
        ] {
            if let Some(v) = text(payload, column) {
                fields.push((column, SqlValue::Text(v.to_string())));
            }
        }
        if let Some(user) = record_id(payload, "user_id")? {
            fields.push(("user_id", SqlValue::Integer(user)));
        }
        if let Some(team) = record_id(payload, "team_id")? {
            fields.push(("team_id", SqlValue::Integer(team)));
        }
        let id = store.create_record(Table::Leads, &fields).await?;
        let lead = created_lead(store, id).await?;
        Ok(json!({
            "lead_id": id,
            "name": lead["name"],
            "stage": lead["stage"],
        }))
    }
}

#[async_trait]
impl SkillExecutor for LeadCreatorExecutor {
    async fn execute(&self, store: &Store, payload: &Payload) -> Envelope {
        let Some(name) = text(payload, "name") else {
            return Envelope::fail(ErrorCode::MissingField, "Field \"name\" is required");
        };
        match Self::create(store, payload, name).await {
            Ok(data) => Envelope::ok(data),
            Err(e) => Envelope::fail(
                ErrorCode::CreateError,
                format!("Failed to create lead: {}", e),
            ),
        }
    }
}

/// Lead creation with normalisation, e-mail validation and a duplicate check.
pub struct AdvancedLeadExecutor;

struct LeadDraft {
    fields: FieldMap,
    email: Option<String>,
}

fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn trimmed(payload: &Payload, key: &str) -> Option<String> {
    scalar_string(payload.get(key))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn priority_rank(word: &str) -> i64 {
    match word.to_lowercase().as_str() {
        "low" => 1,
        "high" => 3,
        _ => 2,
    }
}

/// Loose integer: ids given as numbers or numeric strings; anything else is dropped.
fn loose_id(payload: &Payload, key: &str) -> Option<i64> {
    record_id(payload, key).ok().flatten()
}

fn draft_lead(payload: &Payload) -> std::result::Result<LeadDraft, Envelope> {
    let Some(name) = trimmed(payload, "name") else {
        return Err(Envelope::fail(ErrorCode::NameRequired, "Name is required"));
    };
    let mut fields: FieldMap = vec![
        ("name", SqlValue::Text(name)),
        ("type", SqlValue::Text("opportunity".to_string())),
    ];
    if let Some(contact) = trimmed(payload, "contact_name") {
        fields.push(("contact_name", SqlValue::Text(contact)));
    }
    let partner_name = trimmed(payload, "partner_name").or_else(|| trimmed(payload, "company"));
    if let Some(partner) = partner_name {
        fields.push(("partner_name", SqlValue::Text(partner)));
    }

    let mut email = None;
    if let Some(raw) = scalar_string(payload.get("email_from")).filter(|s| !s.is_empty()) {
        let normalized = raw.trim().to_lowercase();
        let re = pattern(&EMAIL_RE)
            .map_err(|e| Envelope::fail(ErrorCode::CreationError, e.to_string()))?;
        if !re.is_match(&normalized) {
            return Err(Envelope::fail(ErrorCode::InvalidEmail, "Invalid email format"));
        }
        fields.push(("email_from", SqlValue::Text(normalized.clone())));
        email = Some(normalized);
    }

    if let Some(raw) = scalar_string(payload.get("phone")).filter(|s| !s.is_empty()) {
        let re = pattern(&NON_PHONE_RE)
            .map_err(|e| Envelope::fail(ErrorCode::CreationError, e.to_string()))?;
        fields.push(("phone", SqlValue::Text(re.replace_all(&raw, "").into_owned())));
    }
    for column in ["description", "website"] {
        if let Some(v) = trimmed(payload, column) {
            fields.push((column, SqlValue::Text(v)));
        }
    }
    if let Some(word) = scalar_string(payload.get("priority")).filter(|s| !s.is_empty()) {
        fields.push(("priority", SqlValue::Integer(priority_rank(&word))));
    }
    if let Some(user) = loose_id(payload, "user_id") {
        fields.push(("user_id", SqlValue::Integer(user)));
    }
    if let Some(team) = loose_id(payload, "team_id") {
        fields.push(("team_id", SqlValue::Integer(team)));
    }
    Ok(LeadDraft { fields, email })
}

impl AdvancedLeadExecutor {
    async fn create(store: &Store, draft: LeadDraft, allow_duplicates: bool) -> Result<Envelope> {
        if let Some(email) = draft.email.as_deref()
            && !allow_duplicates
            && let Some(existing) = store.find_id_by(Table::Leads, "email_from", email).await?
        {
            return Ok(Envelope::fail(
                ErrorCode::DuplicateFound,
                format!("Lead with email {} already exists", email),
            )
            .with_extra("duplicate_id", json!(existing)));
        }
        let id = store.create_record(Table::Leads, &draft.fields).await?;
        Ok(Envelope::ok(created_lead(store, id).await?))
    }
}

#[async_trait]
impl SkillExecutor for AdvancedLeadExecutor {
    async fn execute(&self, store: &Store, payload: &Payload) -> Envelope {
        let draft = match draft_lead(payload) {
            Ok(draft) => draft,
            Err(rejected) => return rejected,
        };
        let allow_duplicates = truthy(payload, "allow_duplicates");
        match Self::create(store, draft, allow_duplicates).await {
            Ok(envelope) => envelope,
            Err(e) => Envelope::fail(ErrorCode::CreationError, e.to_string()),
        }
    }
}
