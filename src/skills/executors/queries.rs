//! Read-only query executors. They all clamp `limit`, build a conjunctive
//! domain from the recognised payload fields and return
//! `{<records>: [...], count, total_available}`.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{MAX_QUERY_LIMIT, Payload, SkillExecutor, clamp_limit, flag, record_id, text};
use crate::core::error::ErrorCode;
use crate::core::store::Store;
use crate::core::store::query::Domain;
use crate::core::store::records::{
    CustomerRow, EmployeeRow, InvoiceRow, ProductRow, Projection, SaleOrderRow, UserRow,
};
use crate::skills::envelope::Envelope;

pub const INVOICE_MOVE_TYPES: [&str; 4] = ["out_invoice", "in_invoice", "out_refund", "in_refund"];

async fn page<T: Projection>(store: &Store, domain: &Domain, limit: i64, key: &str) -> Result<Value> {
    let rows: Vec<T> = store.search(domain, limit).await?;
    let total = store.search_count(T::SET, domain).await?;
    let mut data = Map::new();
    data.insert("count".to_string(), json!(rows.len()));
    data.insert(key.to_string(), serde_json::to_value(&rows)?);
    data.insert("total_available".to_string(), json!(total));
    Ok(Value::Object(data))
}

async fn run_query<T: Projection>(
    store: &Store,
    payload: &Payload,
    domain: Result<Domain>,
    key: &str,
    what: &str,
) -> Envelope {
    let limit = clamp_limit(payload, MAX_QUERY_LIMIT);
    let result = match domain {
        Ok(domain) => page::<T>(store, &domain, limit, key).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(data) => Envelope::ok(data),
        Err(e) => Envelope::fail(
            ErrorCode::QueryError,
            format!("Failed to query {}: {}", what, e),
        ),
    }
}

/// Entities with an `active` column only show active rows unless asked.
fn active_filter(domain: Domain, payload: &Payload, column: &'static str) -> Domain {
    let active = flag(payload, "active").unwrap_or(true);
    domain.eq(column, active as i64)
}

fn sales_domain(payload: &Payload) -> Result<Domain> {
    let mut domain = Domain::new();
    if let Some(state) = text(payload, "state") {
        domain = domain.eq("o.state", state.to_string());
    }
    if let Some(partner) = record_id(payload, "partner_id")? {
        domain = domain.eq("o.partner_id", partner);
    }
    Ok(domain)
}

fn invoices_domain(payload: &Payload) -> Result<Domain> {
    let mut domain = match text(payload, "move_type") {
        Some(move_type) => Domain::new().eq("i.move_type", move_type.to_string()),
        None => Domain::new().any_of("i.move_type", &INVOICE_MOVE_TYPES),
    };
    if let Some(state) = text(payload, "state") {
        domain = domain.eq("i.state", state.to_string());
    }
    if let Some(partner) = record_id(payload, "partner_id")? {
        domain = domain.eq("i.partner_id", partner);
    }
    Ok(domain)
}

fn customers_domain(payload: &Payload) -> Result<Domain> {
    let mut domain = Domain::new().positive("p.customer_rank");
    if let Some(is_company) = flag(payload, "is_company") {
        domain = domain.eq("p.is_company", is_company as i64);
    }
    if let Some(country) = record_id(payload, "country_id")? {
        domain = domain.eq("p.country_id", country);
    }
    if let Some(term) = text(payload, "search") {
        domain = domain.ilike_any(&["p.name", "p.email"], term);
    }
    Ok(domain)
}

fn employees_domain(payload: &Payload) -> Result<Domain> {
    let mut domain = active_filter(Domain::new(), payload, "e.active");
    if let Some(department) = record_id(payload, "department_id")? {
        domain = domain.eq("e.department_id", department);
    }
    Ok(domain)
}

fn products_domain(payload: &Payload) -> Result<Domain> {
    let mut domain = active_filter(Domain::new(), payload, "pr.active");
    if let Some(sale_ok) = flag(payload, "sale_ok") {
        domain = domain.eq("pr.sale_ok", sale_ok as i64);
    }
    if let Some(term) = text(payload, "search") {
        domain = domain.ilike_any(&["pr.name", "pr.default_code"], term);
    }
    Ok(domain)
}

fn users_domain(payload: &Payload) -> Result<Domain> {
    Ok(active_filter(Domain::new(), payload, "u.active"))
}

pub struct SalesOrdersExecutor;

#[async_trait]
impl SkillExecutor for SalesOrdersExecutor {
    async fn execute(&self, store: &Store, payload: &Payload) -> Envelope {
        run_query::<SaleOrderRow>(store, payload, sales_domain(payload), "orders", "sales orders")
            .await
    }
}

pub struct InvoicesExecutor;

#[async_trait]
impl SkillExecutor for InvoicesExecutor {
    async fn execute(&self, store: &Store, payload: &Payload) -> Envelope {
        run_query::<InvoiceRow>(store, payload, invoices_domain(payload), "invoices", "invoices")
            .await
    }
}

pub struct CustomersExecutor;

#[async_trait]
impl SkillExecutor for CustomersExecutor {
    async fn execute(&self, store: &Store, payload: &Payload) -> Envelope {
        run_query::<CustomerRow>(
            store,
            payload,
            customers_domain(payload),
            "customers",
            "customers",
        )
        .await
    }
}

pub struct EmployeesExecutor;

#[async_trait]
impl SkillExecutor for EmployeesExecutor {
    async fn execute(&self, store: &Store, payload: &Payload) -> Envelope {
        run_query::<EmployeeRow>(
            store,
            payload,
            employees_domain(payload),
            "employees",
            "employees",
        )
        .await
    }
}

pub struct ProductsExecutor;

#[async_trait]
impl SkillExecutor for ProductsExecutor {
    async fn execute(&self, store: &Store, payload: &Payload) -> Envelope {
        run_query::<ProductRow>(store, payload, products_domain(payload), "products", "products")
            .await
    }
}

pub struct UsersExecutor;

#[async_trait]
impl SkillExecutor for UsersExecutor {
    async fn execute(&self, store: &Store, payload: &Payload) -> Envelope {
        run_query::<UserRow>(store, payload, users_domain(payload), "users", "users").await
    }
}
