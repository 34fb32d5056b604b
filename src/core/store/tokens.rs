use anyhow::Result;
use rusqlite::{OptionalExtension, params};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::types::{NewToken, TokenRecord};
use super::{Store, now_rfc3339};
use crate::core::error::ErrorCode;

/// Why a presented credential was refused. Checked in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Token not found")]
    Invalid,
    #[error("Token is inactive")]
    Inactive,
    #[error("Token expired on {0}")]
    Expired(String),
    #[error("IP address {0} is not in allowlist")]
    IpNotAllowed(String),
    #[error("Token does not have permission for skill \"{0}\"")]
    SkillNotAllowed(String),
}

impl AuthError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AuthError::Invalid => ErrorCode::InvalidToken,
            AuthError::Inactive => ErrorCode::TokenInactive,
            AuthError::Expired(_) => ErrorCode::TokenExpired,
            AuthError::IpNotAllowed(_) => ErrorCode::IpNotAllowed,
            AuthError::SkillNotAllowed(_) => ErrorCode::SkillNotAllowed,
        }
    }
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn generate_raw_token() -> String {
    let bytes: [u8; 32] = rand::random();
    format!("ocg_{}", hex::encode(bytes))
}

fn decode_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn ip_allowed(allowed_ips: &str, remote_ip: &str) -> bool {
    if allowed_ips.trim().is_empty() {
        return true;
    }
    allowed_ips
        .split(',')
        .map(str::trim)
        .any(|ip| ip == remote_ip)
}

const TOKEN_COLUMNS: &str = "id, name, active, allowed_skills, allowed_ips, roles, \
     expires_at, last_used_at, use_count, created_at";

fn map_token(row: &rusqlite::Row<'_>) -> rusqlite::Result<TokenRecord> {
    let allowed_skills: String = row.get(3)?;
    let roles: String = row.get(5)?;
    Ok(TokenRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        active: row.get::<_, i64>(2)? != 0,
        allowed_skills: decode_list(&allowed_skills),
        allowed_ips: row.get(4)?,
        roles: decode_list(&roles),
        expires_at: row.get(6)?,
        last_used_at: row.get(7)?,
        use_count: row.get(8)?,
        created_at: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
    })
}

impl Store {
    /// Inserts a token and returns the raw secret alongside the stored record.
    /// The secret cannot be recovered afterwards.
    pub async fn create_api_token(&self, new: &NewToken) -> Result<(String, TokenRecord)> {
        let raw_token = match new.secret.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => generate_raw_token(),
        };
        let token_hash = hash_token(&raw_token);
        let allowed_ips = new
            .allowed_ips
            .iter()
            .map(|ip| ip.trim())
            .filter(|ip| !ip.is_empty())
            .collect::<Vec<_>>()
            .join(",");

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO api_tokens (name, token_hash, allowed_skills, allowed_ips, roles, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.name,
                token_hash,
                encode_list(&new.allowed_skills),
                allowed_ips,
                encode_list(&new.roles),
                new.expires_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        let id = db.last_insert_rowid();
        let record = db.query_row(
            &format!("SELECT {} FROM api_tokens WHERE id = ?1", TOKEN_COLUMNS),
            params![id],
            map_token,
        )?;
        Ok((raw_token, record))
    }

    pub async fn list_api_tokens(&self) -> Result<Vec<TokenRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM api_tokens ORDER BY id ASC",
            TOKEN_COLUMNS
        ))?;
        let rows = stmt.query_map([], map_token)?;
        let mut tokens = Vec::new();
        for row in rows {
            tokens.push(row?);
        }
        Ok(tokens)
    }

    /// Tokens are never deleted; this flips every token with `name` to inactive.
    pub async fn deactivate_api_token(&self, name: &str) -> Result<usize> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE api_tokens SET active = 0 WHERE name = ?1",
            params![name],
        )?;
        Ok(rows)
    }

    /// Validates a presented secret without side effects. The outer `Result`
    /// carries store failures, the inner one the refusal reason.
    pub async fn validate_api_token(
        &self,
        raw_token: &str,
        skill_code: Option<&str>,
        remote_ip: Option<&str>,
    ) -> Result<std::result::Result<TokenRecord, AuthError>> {
        let token_hash = hash_token(raw_token);
        let db = self.db.lock().await;
        let token = db
            .query_row(
                &format!(
                    "SELECT {} FROM api_tokens WHERE token_hash = ?1",
                    TOKEN_COLUMNS
                ),
                params![token_hash],
                map_token,
            )
            .optional()?;

        let Some(token) = token else {
            return Ok(Err(AuthError::Invalid));
        };
        if !token.active {
            return Ok(Err(AuthError::Inactive));
        }
        if let Some(expiry) = token.expires_at.as_deref() {
            match chrono::DateTime::parse_from_rfc3339(expiry) {
                Ok(at) if chrono::Utc::now() > at => {
                    return Ok(Err(AuthError::Expired(expiry.to_string())));
                }
                Ok(_) => {}
                // An unreadable expiry is treated as already passed.
                Err(_) => return Ok(Err(AuthError::Expired(expiry.to_string()))),
            }
        }
        if let Some(ip) = remote_ip
            && !ip_allowed(&token.allowed_ips, ip)
        {
            return Ok(Err(AuthError::IpNotAllowed(ip.to_string())));
        }
        if let Some(code) = skill_code
            && !token.allowed_skills.is_empty()
            && !token.allowed_skills.iter().any(|s| s == code)
        {
            let exists: bool = db.query_row(
                "SELECT EXISTS(SELECT 1 FROM skills WHERE code = ?1 AND active = 1)",
                params![code],
                |row| row.get(0),
            )?;
            if exists {
                return Ok(Err(AuthError::SkillNotAllowed(code.to_string())));
            }
        }
        Ok(Ok(token))
    }

    /// Records one successful authorized use. Concurrent callers race; the
    /// last timestamp written wins.
    pub async fn update_token_usage(&self, token_id: i64) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE api_tokens SET last_used_at = ?1, use_count = use_count + 1 WHERE id = ?2",
            params![now_rfc3339(), token_id],
        )?;
        Ok(())
    }
}
