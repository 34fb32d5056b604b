//! Business records queried and written by the skill executors.
//!
//! Each read shape is a `Projection`: a DTO with explicit optional fields for
//! every relation, so a dangling foreign key projects to `null` instead of
//! failing the row.

use anyhow::{Result, bail};
use rusqlite::types::Value as SqlValue;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use serde::Serialize;

use super::Store;
use super::query::Domain;

/// Source tables (with the joins their projections need). Search and count
/// share the FROM clause so a `Domain` means the same thing in both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSet {
    SaleOrders,
    Invoices,
    Customers,
    Employees,
    Products,
    Users,
    Leads,
}

impl RecordSet {
    fn from_clause(self) -> &'static str {
        match self {
            RecordSet::SaleOrders => {
                "sale_orders o \
                 LEFT JOIN partners p ON p.id = o.partner_id \
                 LEFT JOIN users u ON u.id = o.user_id"
            }
            RecordSet::Invoices => "invoices i LEFT JOIN partners p ON p.id = i.partner_id",
            RecordSet::Customers => "partners p LEFT JOIN countries c ON c.id = p.country_id",
            RecordSet::Employees => {
                "employees e \
                 LEFT JOIN departments d ON d.id = e.department_id \
                 LEFT JOIN employees m ON m.id = e.parent_id"
            }
            RecordSet::Products => "products pr",
            RecordSet::Users => "users u",
            RecordSet::Leads => "leads l",
        }
    }
}

pub trait Projection: Serialize + Sized {
    const SET: RecordSet;
    const COLUMNS: &'static str;
    const ORDER_BY: &'static str;
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

#[derive(Debug, Clone, Serialize)]
pub struct SaleOrderRow {
    pub id: i64,
    pub name: String,
    pub partner_id: Option<i64>,
    pub partner_name: Option<String>,
    pub date_order: Option<String>,
    pub state: String,
    pub amount_total: f64,
    pub currency: Option<String>,
    pub salesperson: Option<String>,
}

impl Projection for SaleOrderRow {
    const SET: RecordSet = RecordSet::SaleOrders;
    const COLUMNS: &'static str = "o.id, o.name, p.id, p.name, o.date_order, o.state, \
         o.amount_total, o.currency, u.name";
    const ORDER_BY: &'static str = "o.date_order DESC, o.id DESC";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            partner_id: row.get(2)?,
            partner_name: row.get(3)?,
            date_order: row.get(4)?,
            state: row.get(5)?,
            amount_total: row.get(6)?,
            currency: row.get(7)?,
            salesperson: row.get(8)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceRow {
    pub id: i64,
    pub name: String,
    pub partner_id: Option<i64>,
    pub partner_name: Option<String>,
    pub invoice_date: Option<String>,
    pub invoice_date_due: Option<String>,
    pub state: String,
    pub move_type: String,
    pub amount_total: f64,
    pub amount_residual: f64,
    pub currency: Option<String>,
    pub payment_state: String,
}

impl Projection for InvoiceRow {
    const SET: RecordSet = RecordSet::Invoices;
    const COLUMNS: &'static str = "i.id, i.name, p.id, p.name, i.invoice_date, \
         i.invoice_date_due, i.state, i.move_type, i.amount_total, i.amount_residual, \
         i.currency, i.payment_state";
    const ORDER_BY: &'static str = "i.invoice_date DESC, i.id DESC";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            partner_id: row.get(2)?,
            partner_name: row.get(3)?,
            invoice_date: row.get(4)?,
            invoice_date_due: row.get(5)?,
            state: row.get(6)?,
            move_type: row.get(7)?,
            amount_total: row.get(8)?,
            amount_residual: row.get(9)?,
            currency: row.get(10)?,
            payment_state: row.get(11)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerRow {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub is_company: bool,
    pub street: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub vat: Option<String>,
    pub customer_rank: i64,
}

impl Projection for CustomerRow {
    const SET: RecordSet = RecordSet::Customers;
    const COLUMNS: &'static str = "p.id, p.name, p.email, p.phone, p.mobile, p.is_company, \
         p.street, p.city, c.name, p.vat, p.customer_rank";
    const ORDER_BY: &'static str = "p.name ASC, p.id ASC";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            mobile: row.get(4)?,
            is_company: row.get::<_, i64>(5)? != 0,
            street: row.get(6)?,
            city: row.get(7)?,
            country: row.get(8)?,
            vat: row.get(9)?,
            customer_rank: row.get(10)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmployeeRow {
    pub id: i64,
    pub name: String,
    pub work_email: Option<String>,
    pub work_phone: Option<String>,
    pub mobile_phone: Option<String>,
    pub job_title: Option<String>,
    pub department: Option<String>,
    pub manager: Option<String>,
    pub active: bool,
}

impl Projection for EmployeeRow {
    const SET: RecordSet = RecordSet::Employees;
    const COLUMNS: &'static str = "e.id, e.name, e.work_email, e.work_phone, e.mobile_phone, \
         e.job_title, d.name, m.name, e.active";
    const ORDER_BY: &'static str = "e.name ASC, e.id ASC";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            work_email: row.get(2)?,
            work_phone: row.get(3)?,
            mobile_phone: row.get(4)?,
            job_title: row.get(5)?,
            department: row.get(6)?,
            manager: row.get(7)?,
            active: row.get::<_, i64>(8)? != 0,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductRow {
    pub id: i64,
    pub name: String,
    pub default_code: Option<String>,
    pub barcode: Option<String>,
    pub list_price: f64,
    pub standard_price: f64,
    pub uom: Option<String>,
    pub categ: Option<String>,
    #[serde(rename = "type")]
    pub product_type: String,
    pub sale_ok: bool,
    pub purchase_ok: bool,
    pub active: bool,
}

impl Projection for ProductRow {
    const SET: RecordSet = RecordSet::Products;
    const COLUMNS: &'static str = "pr.id, pr.name, pr.default_code, pr.barcode, pr.list_price, \
         pr.standard_price, pr.uom, pr.category, pr.type, pr.sale_ok, pr.purchase_ok, pr.active";
    const ORDER_BY: &'static str = "pr.name ASC, pr.id ASC";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            default_code: row.get(2)?,
            barcode: row.get(3)?,
            list_price: row.get(4)?,
            standard_price: row.get(5)?,
            uom: row.get(6)?,
            categ: row.get(7)?,
            product_type: row.get(8)?,
            sale_ok: row.get::<_, i64>(9)? != 0,
            purchase_ok: row.get::<_, i64>(10)? != 0,
            active: row.get::<_, i64>(11)? != 0,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub login: String,
    pub email: Option<String>,
    pub active: bool,
    pub company: Option<String>,
    pub lang: Option<String>,
    pub tz: Option<String>,
}

impl Projection for UserRow {
    const SET: RecordSet = RecordSet::Users;
    const COLUMNS: &'static str = "u.id, u.name, u.login, u.email, u.active, u.company, u.lang, u.tz";
    const ORDER_BY: &'static str = "u.name ASC, u.id ASC";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            login: row.get(2)?,
            email: row.get(3)?,
            active: row.get::<_, i64>(4)? != 0,
            company: row.get(5)?,
            lang: row.get(6)?,
            tz: row.get(7)?,
        })
    }
}

/// Tables the write executors may create rows in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Partners,
    Products,
    Leads,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Partners => "partners",
            Table::Products => "products",
            Table::Leads => "leads",
        }
    }
}

/// Column/value pairs for a create or write. Columns come from allow-lists.
pub type FieldMap = Vec<(&'static str, SqlValue)>;

/// Post-create view of a lead with its relations resolved to display names.
#[derive(Debug, Clone, Serialize)]
pub struct LeadSummary {
    pub lead_id: i64,
    pub name: String,
    pub stage: String,
    pub assigned_to: Option<String>,
    pub team: Option<String>,
    pub probability: f64,
}

impl Store {
    pub async fn search<T: Projection>(&self, domain: &Domain, limit: i64) -> Result<Vec<T>> {
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {} LIMIT {}",
            T::COLUMNS,
            T::SET.from_clause(),
            domain.where_sql(),
            T::ORDER_BY,
            limit.max(0)
        );
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(domain.params().iter()), T::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Unlimited count under the same domain as `search`.
    pub async fn search_count(&self, set: RecordSet, domain: &Domain) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            set.from_clause(),
            domain.where_sql()
        );
        let db = self.db.lock().await;
        let count = db.query_row(&sql, params_from_iter(domain.params().iter()), |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    pub async fn create_record(&self, table: Table, fields: &[(&'static str, SqlValue)]) -> Result<i64> {
        if fields.is_empty() {
            bail!("Cannot create an empty {} record", table.name());
        }
        let columns: Vec<&str> = fields.iter().map(|(c, _)| *c).collect();
        let marks = vec!["?"; fields.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.name(),
            columns.join(", "),
            marks
        );
        let db = self.db.lock().await;
        db.execute(&sql, params_from_iter(fields.iter().map(|(_, v)| v)))?;
        Ok(db.last_insert_rowid())
    }

    pub async fn write_record(
        &self,
        table: Table,
        id: i64,
        fields: &[(&'static str, SqlValue)],
    ) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let sets: Vec<String> = fields.iter().map(|(c, _)| format!("{} = ?", c)).collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            table.name(),
            sets.join(", ")
        );
        let mut values: Vec<SqlValue> = fields.iter().map(|(_, v)| v.clone()).collect();
        values.push(SqlValue::Integer(id));
        let db = self.db.lock().await;
        db.execute(&sql, params_from_iter(values.iter()))?;
        Ok(())
    }

    /// First row (lowest id) whose `column` equals `value` exactly.
    pub async fn find_id_by(
        &self,
        table: Table,
        column: &'static str,
        value: &str,
    ) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT id FROM {} WHERE {} = ?1 ORDER BY id ASC LIMIT 1",
            table.name(),
            column
        );
        let db = self.db.lock().await;
        let id = db.query_row(&sql, params![value], |row| row.get(0)).optional()?;
        Ok(id)
    }

    pub async fn lead_summary(&self, id: i64) -> Result<Option<LeadSummary>> {
        let db = self.db.lock().await;
        let summary = db
            .query_row(
                "SELECT l.id, l.name, l.stage, u.name, t.name, l.probability
                 FROM leads l
                 LEFT JOIN users u ON u.id = l.user_id
                 LEFT JOIN sales_teams t ON t.id = l.team_id
                 WHERE l.id = ?1",
                params![id],
                |row| {
                    Ok(LeadSummary {
                        lead_id: row.get(0)?,
                        name: row.get(1)?,
                        stage: row.get(2)?,
                        assigned_to: row.get(3)?,
                        team: row.get(4)?,
                        probability: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(summary)
    }
}
