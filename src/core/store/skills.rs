use anyhow::{Result, bail};
use rusqlite::{OptionalExtension, params};
use tracing::info;

use super::Store;
use super::types::{NewSkill, SkillRecord};

const SKILL_COLUMNS: &str = "id, code, name, description, executor, active, sequence, \
     max_limit, allowed_roles, input_schema, output_schema";

fn map_skill(row: &rusqlite::Row<'_>) -> rusqlite::Result<SkillRecord> {
    let roles: String = row.get(8)?;
    Ok(SkillRecord {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        executor: row.get(4)?,
        active: row.get::<_, i64>(5)? != 0,
        sequence: row.get(6)?,
        max_limit: row.get(7)?,
        allowed_roles: serde_json::from_str(&roles).unwrap_or_default(),
        input_schema: row.get(9)?,
        output_schema: row.get(10)?,
    })
}

/// Skill codes appear in URLs, so only `[A-Za-z0-9_-]` is accepted.
pub fn is_valid_skill_code(code: &str) -> bool {
    !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[allow(clippy::too_many_arguments)]
fn skill(
    code: &str,
    name: &str,
    executor: &str,
    sequence: i64,
    max_limit: i64,
    description: &str,
    input_schema: &str,
    output_schema: &str,
) -> NewSkill {
    NewSkill {
        code: code.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        executor: executor.to_string(),
        sequence,
        max_limit,
        allowed_roles: Vec::new(),
        input_schema: input_schema.to_string(),
        output_schema: output_schema.to_string(),
    }
}

pub fn default_skills() -> Vec<NewSkill> {
    vec![
        skill(
            "ping",
            "Ping",
            "ping",
            1,
            1,
            "Health check. Returns pong with a server timestamp.",
            "{}",
            r#"{"message": "string", "timestamp": "datetime", "version": "string"}"#,
        ),
        skill(
            "sales",
            "Sales Orders",
            "sales_orders",
            10,
            100,
            "Query sales orders. Payload: limit, state, partner_id.",
            r#"{"limit": "int", "state": "string", "partner_id": "int"}"#,
            r#"{"orders": "array", "count": "int", "total_available": "int"}"#,
        ),
        skill(
            "invoices",
            "Invoices",
            "invoices",
            20,
            100,
            "Query invoices and refunds. Payload: limit, state, move_type, partner_id.",
            r#"{"limit": "int", "state": "string", "move_type": "string", "partner_id": "int"}"#,
            r#"{"invoices": "array", "count": "int", "total_available": "int"}"#,
        ),
        skill(
            "customers",
            "Customers",
            "customers",
            30,
            100,
            "Query customers. Payload: limit, is_company, country_id, search.",
            r#"{"limit": "int", "is_company": "bool", "country_id": "int", "search": "string"}"#,
            r#"{"customers": "array", "count": "int", "total_available": "int"}"#,
        ),
        skill(
            "employees",
            "Employees",
            "employees",
            40,
            100,
            "Query employees. Payload: limit, department_id, active.",
            r#"{"limit": "int", "department_id": "int", "active": "bool"}"#,
            r#"{"employees": "array", "count": "int", "total_available": "int"}"#,
        ),
        skill(
            "products",
            "Products",
            "products",
            50,
            100,
            "Query products. Payload: limit, active, sale_ok, search.",
            r#"{"limit": "int", "active": "bool", "sale_ok": "bool", "search": "string"}"#,
            r#"{"products": "array", "count": "int", "total_available": "int"}"#,
        ),
        skill(
            "users",
            "Users",
            "users",
            60,
            100,
            "Query users. Payload: limit, active.",
            r#"{"limit": "int", "active": "bool"}"#,
            r#"{"users": "array", "count": "int", "total_available": "int"}"#,
        ),
        skill(
            "create_lead",
            "Create Lead",
            "create_lead",
            70,
            1,
            "Create a CRM lead. Payload: name (required), contact_name, email_from, phone, description, partner_name.",
            r#"{"name": "string (required)", "contact_name": "string", "email_from": "string", "phone": "string", "description": "string", "partner_name": "string"}"#,
            r#"{"lead_id": "int", "name": "string"}"#,
        ),
        skill(
            "summary",
            "Summary",
            "summary",
            80,
            1,
            "Record counts across sales, invoices, customers, employees, products, users and leads.",
            "{}",
            r#"{"sales_orders": "int", "invoices": "int", "customers": "int", "employees": "int", "products": "int", "users": "int", "leads": "int"}"#,
        ),
        skill(
            "bulk_import",
            "Bulk Import",
            "bulk_import",
            95,
            500,
            "Bulk import records for customers, products, or leads. Payload: type (customers|products|leads), data (list of dicts), validate_only, batch_size (default 50, max 500), update_existing.",
            r#"{"type": "string (required: customers|products|leads)", "data": "array of records (required)", "validate_only": "bool", "batch_size": "int (1-500)", "update_existing": "bool"}"#,
            r#"{"total_records": "int", "processed": "int", "created": "int", "updated": "int", "skipped": "int", "errors": "array"}"#,
        ),
        skill(
            "advanced_lead",
            "Advanced Lead",
            "advanced_lead",
            96,
            1,
            "Create a CRM lead with validation (email format, duplicate check). Payload: name (required), email_from, phone, partner_name, description, priority (low|medium|high), allow_duplicates.",
            r#"{"name": "string (required)", "email_from": "string", "phone": "string", "partner_name": "string", "description": "string", "priority": "low|medium|high", "allow_duplicates": "bool"}"#,
            r#"{"lead_id": "int", "name": "string", "stage": "string", "assigned_to": "string", "team": "string", "probability": "float"}"#,
        ),
    ]
}

impl Store {
    /// Inserts or replaces the skill with `new.code`. Codes must be URL-safe.
    pub async fn upsert_skill(&self, new: &NewSkill) -> Result<()> {
        if !is_valid_skill_code(&new.code) {
            bail!("Skill code '{}' must match [A-Za-z0-9_-]+", new.code);
        }
        let roles = serde_json::to_string(&new.allowed_roles)?;
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO skills (code, name, description, executor, sequence, max_limit,
                                 allowed_roles, input_schema, output_schema)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(code) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                executor = excluded.executor,
                sequence = excluded.sequence,
                max_limit = excluded.max_limit,
                allowed_roles = excluded.allowed_roles,
                input_schema = excluded.input_schema,
                output_schema = excluded.output_schema",
            params![
                new.code,
                new.name,
                new.description,
                new.executor,
                new.sequence,
                new.max_limit,
                roles,
                new.input_schema,
                new.output_schema,
            ],
        )?;
        Ok(())
    }

    pub async fn set_skill_active(&self, code: &str, active: bool) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE skills SET active = ?1 WHERE code = ?2",
            params![active as i64, code],
        )?;
        Ok(rows > 0)
    }

    /// Only active skills resolve.
    pub async fn get_active_skill(&self, code: &str) -> Result<Option<SkillRecord>> {
        let db = self.db.lock().await;
        let skill = db
            .query_row(
                &format!(
                    "SELECT {} FROM skills WHERE code = ?1 AND active = 1",
                    SKILL_COLUMNS
                ),
                params![code],
                map_skill,
            )
            .optional()?;
        Ok(skill)
    }

    pub async fn list_active_skills(&self) -> Result<Vec<SkillRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM skills WHERE active = 1 ORDER BY sequence ASC, name ASC",
            SKILL_COLUMNS
        ))?;
        let rows = stmt.query_map([], map_skill)?;
        let mut skills = Vec::new();
        for row in rows {
            skills.push(row?);
        }
        Ok(skills)
    }

    /// Active skills restricted to `codes`, in catalogue order.
    pub async fn list_active_skills_by_codes(&self, codes: &[String]) -> Result<Vec<SkillRecord>> {
        let all = self.list_active_skills().await?;
        Ok(all
            .into_iter()
            .filter(|s| codes.iter().any(|c| c == &s.code))
            .collect())
    }

    pub async fn list_all_skills(&self) -> Result<Vec<SkillRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM skills ORDER BY sequence ASC, name ASC",
            SKILL_COLUMNS
        ))?;
        let rows = stmt.query_map([], map_skill)?;
        let mut skills = Vec::new();
        for row in rows {
            skills.push(row?);
        }
        Ok(skills)
    }

    /// Installs the built-in catalogue, leaving codes that already exist
    /// untouched. Returns the number of skills inserted.
    pub async fn seed_default_skills(&self) -> Result<usize> {
        let mut inserted = 0;
        for new in default_skills() {
            let exists = {
                let db = self.db.lock().await;
                db.query_row(
                    "SELECT EXISTS(SELECT 1 FROM skills WHERE code = ?1)",
                    params![new.code],
                    |row| row.get::<_, bool>(0),
                )?
            };
            if !exists {
                self.upsert_skill(&new).await?;
                inserted += 1;
            }
        }
        if inserted > 0 {
            info!("Seeded {} default skills", inserted);
        }
        Ok(inserted)
    }
}
