mod bulk_import;
mod leads;
mod ping;
mod queries;
mod summary;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::store::Store;
use crate::skills::envelope::Envelope;

pub use bulk_import::BulkImportExecutor;

/// Decoded JSON object body handed to every executor.
pub type Payload = Map<String, Value>;

/// Executors never fail with `Err`; every outcome is an envelope.
#[async_trait]
pub trait SkillExecutor: Send + Sync {
    async fn execute(&self, store: &Store, payload: &Payload) -> Envelope;
}

/// Closed set of executor implementations a skill can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    Ping,
    SalesOrders,
    Invoices,
    Customers,
    Employees,
    Products,
    Users,
    CreateLead,
    Summary,
    BulkImport,
    AdvancedLead,
}

impl ExecutorKind {
    pub const ALL: [ExecutorKind; 11] = [
        ExecutorKind::Ping,
        ExecutorKind::SalesOrders,
        ExecutorKind::Invoices,
        ExecutorKind::Customers,
        ExecutorKind::Employees,
        ExecutorKind::Products,
        ExecutorKind::Users,
        ExecutorKind::CreateLead,
        ExecutorKind::Summary,
        ExecutorKind::BulkImport,
        ExecutorKind::AdvancedLead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutorKind::Ping => "ping",
            ExecutorKind::SalesOrders => "sales_orders",
            ExecutorKind::Invoices => "invoices",
            ExecutorKind::Customers => "customers",
            ExecutorKind::Employees => "employees",
            ExecutorKind::Products => "products",
            ExecutorKind::Users => "users",
            ExecutorKind::CreateLead => "create_lead",
            ExecutorKind::Summary => "summary",
            ExecutorKind::BulkImport => "bulk_import",
            ExecutorKind::AdvancedLead => "advanced_lead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub fn executor(self) -> &'static dyn SkillExecutor {
        match self {
            ExecutorKind::Ping => &ping::PingExecutor,
            ExecutorKind::SalesOrders => &queries::SalesOrdersExecutor,
            ExecutorKind::Invoices => &queries::InvoicesExecutor,
            ExecutorKind::Customers => &queries::CustomersExecutor,
            ExecutorKind::Employees => &queries::EmployeesExecutor,
            ExecutorKind::Products => &queries::ProductsExecutor,
            ExecutorKind::Users => &queries::UsersExecutor,
            ExecutorKind::CreateLead => &leads::LeadCreatorExecutor,
            ExecutorKind::Summary => &summary::SummaryExecutor,
            ExecutorKind::BulkImport => &BulkImportExecutor,
            ExecutorKind::AdvancedLead => &leads::AdvancedLeadExecutor,
        }
    }
}

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_QUERY_LIMIT: i64 = 100;

/// The caller's `limit` as an integer: whole numbers, floats truncated
/// toward zero, or numeric strings. Anything else counts as absent.
pub fn requested_limit(payload: &Payload) -> Option<i64> {
    match payload.get("limit") {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}

/// Requested page size clamped to `[1, min(ceiling, MAX_QUERY_LIMIT)]`.
/// A missing or unparseable limit falls back to `DEFAULT_LIMIT`.
pub fn clamp_limit(payload: &Payload, ceiling: i64) -> i64 {
    let ceiling = ceiling.clamp(1, MAX_QUERY_LIMIT);
    requested_limit(payload)
        .unwrap_or(DEFAULT_LIMIT)
        .clamp(1, ceiling)
}

/// Non-empty string field.
pub fn text<'a>(payload: &'a Payload, key: &str) -> Option<&'a str> {
    match payload.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
        _ => None,
    }
}

/// Optional record id. Zero, null and absent all mean "no filter"; anything
/// that is not an integer is an error.
pub fn record_id(payload: &Payload, key: &str) -> Result<Option<i64>> {
    let id = match payload.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Some(i),
            None => bail!("{} must be an integer", key),
        },
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(i) => Some(i),
            Err(_) => bail!("{} must be an integer, got {:?}", key, s),
        },
        Some(Value::Bool(false)) => None,
        Some(other) => bail!("{} must be an integer, got {}", key, other),
    };
    Ok(id.filter(|i| *i != 0))
}

/// Truthiness of a present, non-null field.
pub fn flag(payload: &Payload, key: &str) -> Option<bool> {
    match payload.get(key)? {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::String(s) => Some(!s.is_empty()),
        Value::Array(a) => Some(!a.is_empty()),
        Value::Object(o) => Some(!o.is_empty()),
    }
}

pub fn truthy(payload: &Payload, key: &str) -> bool {
    flag(payload, key).unwrap_or(false)
}
