use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use super::queries::INVOICE_MOVE_TYPES;
use super::{Payload, SkillExecutor};
use crate::core::error::ErrorCode;
use crate::core::store::Store;
use crate::core::store::query::Domain;
use crate::core::store::records::RecordSet;
use crate::skills::envelope::Envelope;

/// Row counts across the business tables. One failing count fails the call.
pub struct SummaryExecutor;

async fn counts(store: &Store) -> Result<Value> {
    Ok(json!({
        "sales_orders": store.search_count(RecordSet::SaleOrders, &Domain::new()).await?,
        "invoices": store
            .search_count(
                RecordSet::Invoices,
                &Domain::new().any_of("i.move_type", &INVOICE_MOVE_TYPES),
            )
            .await?,
        "customers": store
            .search_count(RecordSet::Customers, &Domain::new().positive("p.customer_rank"))
            .await?,
        "employees": store
            .search_count(RecordSet::Employees, &Domain::new().eq("e.active", 1))
            .await?,
        "products": store
            .search_count(RecordSet::Products, &Domain::new().eq("pr.active", 1))
            .await?,
        "users": store
            .search_count(RecordSet::Users, &Domain::new().eq("u.active", 1))
            .await?,
        "leads": store.search_count(RecordSet::Leads, &Domain::new()).await?,
    }))
}

#[async_trait]
impl SkillExecutor for SummaryExecutor {
    async fn execute(&self, store: &Store, _payload: &Payload) -> Envelope {
        match counts(store).await {
            Ok(counts) => Envelope::ok(json!({ "counts": counts })),
            Err(e) => Envelope::fail(
                ErrorCode::QueryError,
                format!("Failed to get summary: {}", e),
            ),
        }
    }
}
