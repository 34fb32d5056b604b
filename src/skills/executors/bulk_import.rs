use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{Payload, SkillExecutor, flag, truthy};
use crate::core::error::ErrorCode;
use crate::core::store::Store;
use crate::core::store::query::json_to_sql;
use crate::core::store::records::{FieldMap, Table};
use crate::skills::envelope::Envelope;

pub const DEFAULT_BATCH_SIZE: i64 = 50;
pub const MAX_BATCH_SIZE: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImportKind {
    Customers,
    Products,
    Leads,
}

impl ImportKind {
    fn parse(value: &Value) -> Option<Self> {
        match value.as_str()? {
            "customers" => Some(ImportKind::Customers),
            "products" => Some(ImportKind::Products),
            "leads" => Some(ImportKind::Leads),
            _ => None,
        }
    }

    fn table(self) -> Table {
        match self {
            ImportKind::Customers => Table::Partners,
            ImportKind::Products => Table::Products,
            ImportKind::Leads => Table::Leads,
        }
    }

    /// Column used to find an existing row for the same real-world record.
    fn natural_key(self) -> &'static str {
        match self {
            ImportKind::Customers => "email",
            ImportKind::Products => "default_code",
            ImportKind::Leads => "email_from",
        }
    }

    /// Only these keys are copied from an input record.
    fn allowed_fields(self) -> &'static [&'static str] {
        match self {
            ImportKind::Customers => &[
                "name",
                "email",
                "phone",
                "mobile",
                "street",
                "city",
                "zip",
                "website",
                "vat",
                "is_company",
                "customer_rank",
                "country_id",
                "comment",
            ],
            ImportKind::Products => &[
                "name",
                "default_code",
                "list_price",
                "standard_price",
                "type",
                "description",
                "description_sale",
            ],
            ImportKind::Leads => &[
                "name",
                "partner_name",
                "email_from",
                "phone",
                "description",
                "type",
                "user_id",
                "team_id",
            ],
        }
    }

    fn default_field(self) -> Option<(&'static str, Value)> {
        match self {
            ImportKind::Customers => Some(("customer_rank", Value::from(1))),
            ImportKind::Products => None,
            ImportKind::Leads => Some(("type", Value::from("opportunity"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LineError {
    pub line: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub total_records: usize,
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<LineError>,
}

enum Outcome {
    Created,
    Updated,
    Skipped,
}

fn batch_size(payload: &Payload) -> usize {
    let requested = match payload.get("batch_size") {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    requested
        .unwrap_or(DEFAULT_BATCH_SIZE)
        .clamp(1, MAX_BATCH_SIZE) as usize
}

fn natural_key_value(record: &Payload, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn allowed_values(kind: ImportKind, record: &Payload) -> FieldMap {
    let mut fields: FieldMap = kind
        .allowed_fields()
        .iter()
        .filter_map(|column| record.get(*column).map(|v| (*column, json_to_sql(v))))
        .collect();
    if let Some((column, value)) = kind.default_field()
        && !record.contains_key(column)
    {
        fields.push((column, json_to_sql(&value)));
    }
    fields
}

async fn import_one(
    store: &Store,
    kind: ImportKind,
    record: &Payload,
    update_existing: bool,
) -> Result<Outcome> {
    let existing = match natural_key_value(record, kind.natural_key()) {
        Some(key) => store.find_id_by(kind.table(), kind.natural_key(), &key).await?,
        None => None,
    };
    let fields = allowed_values(kind, record);
    match existing {
        Some(id) if update_existing => {
            store.write_record(kind.table(), id, &fields).await?;
            Ok(Outcome::Updated)
        }
        Some(_) => Ok(Outcome::Skipped),
        None => {
            store.create_record(kind.table(), &fields).await?;
            Ok(Outcome::Created)
        }
    }
}

/// Processes the first `batch_size` records; the rest are ignored. A bad
/// record becomes a line error and never aborts the batch.
async fn import(
    store: &Store,
    kind: ImportKind,
    data: &[Value],
    validate_only: bool,
    batch_size: usize,
    update_existing: bool,
) -> ImportReport {
    let mut report = ImportReport {
        total_records: data.len(),
        ..Default::default()
    };
    for (i, item) in data.iter().take(batch_size).enumerate() {
        let line = i + 1;
        let Some(record) = item.as_object() else {
            report.errors.push(LineError {
                line,
                error: "Record must be a dict".to_string(),
            });
            continue;
        };
        if !truthy(record, "name") {
            report.errors.push(LineError {
                line,
                error: "Name is required".to_string(),
            });
            continue;
        }
        if validate_only {
            report.processed += 1;
            continue;
        }
        match import_one(store, kind, record, update_existing).await {
            Ok(outcome) => {
                match outcome {
                    Outcome::Created => report.created += 1,
                    Outcome::Updated => report.updated += 1,
                    Outcome::Skipped => report.skipped += 1,
                }
                report.processed += 1;
            }
            Err(e) => report.errors.push(LineError {
                line,
                error: e.to_string(),
            }),
        }
    }
    report
}

/// Imports customers, products or leads from a list of records.
pub struct BulkImportExecutor;

#[async_trait]
impl SkillExecutor for BulkImportExecutor {
    async fn execute(&self, store: &Store, payload: &Payload) -> Envelope {
        if !truthy(payload, "type") {
            return Envelope::fail(ErrorCode::TypeRequired, "Payload \"type\" is required");
        }
        if !truthy(payload, "data") {
            return Envelope::fail(
                ErrorCode::DataRequired,
                "Payload \"data\" (list of records) is required",
            );
        }
        let Some(data) = payload.get("data").and_then(Value::as_array) else {
            return Envelope::fail(
                ErrorCode::DataInvalid,
                "\"data\" must be a list of records",
            );
        };
        let type_value = payload.get("type").cloned().unwrap_or(Value::Null);
        let Some(kind) = ImportKind::parse(&type_value) else {
            return Envelope::fail(
                ErrorCode::InvalidType,
                format!(
                    "type must be customers, products, or leads; got {}",
                    type_value
                ),
            );
        };

        let validate_only = flag(payload, "validate_only").unwrap_or(false);
        let update_existing = truthy(payload, "update_existing");
        let report = import(
            store,
            kind,
            data,
            validate_only,
            batch_size(payload),
            update_existing,
        )
        .await;
        match serde_json::to_value(&report) {
            Ok(data) => Envelope::ok(data),
            Err(e) => Envelope::fail(ErrorCode::ImportError, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(v: Value) -> Payload {
        v.as_object().cloned().unwrap()
    }

    async fn run(store: &Store, v: Value) -> Envelope {
        BulkImportExecutor.execute(store, &payload(v)).await
    }

    #[tokio::test]
    async fn input_validation_order() {
        let store = Store::open_in_memory().unwrap();
        let env = run(&store, json!({"data": [{"name": "x"}]})).await;
        assert_eq!(env.error, Some(ErrorCode::TypeRequired));
        let env = run(&store, json!({"type": "customers", "data": []})).await;
        assert_eq!(env.error, Some(ErrorCode::DataRequired));
        let env = run(&store, json!({"type": "customers", "data": {"name": "x"}})).await;
        assert_eq!(env.error, Some(ErrorCode::DataInvalid));
        let env = run(&store, json!({"type": "invoices", "data": [{"name": "x"}]})).await;
        assert_eq!(env.error, Some(ErrorCode::InvalidType));
    }

    #[tokio::test]
    async fn bad_lines_are_reported_without_aborting() {
        let store = Store::open_in_memory().unwrap();
        let env = run(
            &store,
            json!({
                "type": "customers",
                "data": [
                    {"name": "Good One", "email": "one@example.com"},
                    "not a record",
                    {"email": "nameless@example.com"},
                    {"name": "Good Two"},
                ],
            }),
        )
        .await;
        assert!(env.success);
        let data = env.data.unwrap();
        assert_eq!(data["total_records"], 4);
        assert_eq!(data["processed"], 2);
        assert_eq!(data["created"], 2);
        assert_eq!(data["errors"][0], json!({"line": 2, "error": "Record must be a dict"}));
        assert_eq!(data["errors"][1], json!({"line": 3, "error": "Name is required"}));
    }

    #[tokio::test]
    async fn validate_only_then_import_creates_the_same_count() {
        let store = Store::open_in_memory().unwrap();
        let records = json!([
            {"name": "Desk", "default_code": "D-1", "list_price": 100.5},
            {"name": "Chair", "default_code": "C-1"},
            {"default_code": "X-1"},
        ]);
        let dry = run(
            &store,
            json!({"type": "products", "data": records, "validate_only": true}),
        )
        .await
        .data
        .unwrap();
        assert_eq!(dry["processed"], 2);
        assert_eq!(dry["created"], 0);

        let wet = run(&store, json!({"type": "products", "data": records}))
            .await
            .data
            .unwrap();
        assert_eq!(wet["created"], dry["processed"]);
    }

    #[tokio::test]
    async fn existing_records_are_skipped_or_updated() {
        let store = Store::open_in_memory().unwrap();
        let first = json!([{"name": "Lead A", "email_from": "a@example.com"}]);
        run(&store, json!({"type": "leads", "data": first})).await;

        let again = json!([{"name": "Lead A v2", "email_from": "a@example.com"}]);
        let skipped = run(&store, json!({"type": "leads", "data": again}))
            .await
            .data
            .unwrap();
        assert_eq!(skipped["skipped"], 1);
        assert_eq!(skipped["processed"], 1);

        let updated = run(
            &store,
            json!({"type": "leads", "data": again, "update_existing": true}),
        )
        .await
        .data
        .unwrap();
        assert_eq!(updated["updated"], 1);
        let name: String = store
            .get_db()
            .lock()
            .await
            .query_row("SELECT name FROM leads", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "Lead A v2");
    }

    #[tokio::test]
    async fn only_allow_listed_fields_are_written() {
        let store = Store::open_in_memory().unwrap();
        let env = run(
            &store,
            json!({
                "type": "customers",
                "data": [{"name": "Sneaky", "id": 999, "token_hash": "x", "city": "Ghent"}],
            }),
        )
        .await;
        assert_eq!(env.data.unwrap()["created"], 1);
        let (id, rank, city): (i64, i64, String) = store
            .get_db()
            .lock()
            .await
            .query_row(
                "SELECT id, customer_rank, city FROM partners",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_ne!(id, 999);
        assert_eq!(rank, 1);
        assert_eq!(city, "Ghent");
    }

    #[tokio::test]
    async fn batch_size_caps_processed_records() {
        let store = Store::open_in_memory().unwrap();
        let data: Vec<Value> = (0..5).map(|i| json!({"name": format!("P{}", i)})).collect();
        let env = run(
            &store,
            json!({"type": "products", "data": data, "batch_size": 2}),
        )
        .await;
        let data = env.data.unwrap();
        assert_eq!(data["total_records"], 5);
        assert_eq!(data["processed"], 2);
        assert!(data["errors"].as_array().unwrap().is_empty());
    }

    #[test]
    fn batch_size_is_clamped() {
        assert_eq!(batch_size(&payload(json!({}))), 50);
        assert_eq!(batch_size(&payload(json!({"batch_size": 0}))), 1);
        assert_eq!(batch_size(&payload(json!({"batch_size": 9000}))), 500);
    }

    #[tokio::test]
    async fn store_errors_become_line_errors() {
        let store = Store::open_in_memory().unwrap();
        store
            .get_db()
            .lock()
            .await
            .execute_batch("DROP TABLE products")
            .unwrap();
        let env = run(&store, json!({"type": "products", "data": [{"name": "x"}]})).await;
        assert!(env.success);
        let data = env.data.unwrap();
        assert_eq!(data["processed"], 0);
        assert_eq!(data["errors"][0]["line"], 1);
    }
}
