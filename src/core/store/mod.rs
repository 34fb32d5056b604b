mod audit;
mod jobs;
pub mod query;
pub mod records;
mod skills;
mod tokens;
pub mod types;

use anyhow::Result;
use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub use tokens::AuthError;

/// Shared handle to the gateway's SQLite database. Cheap to clone; every
/// operation takes the connection lock for the duration of one statement
/// batch and auto-commits.
#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Connection>>,
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS api_tokens (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        token_hash TEXT NOT NULL UNIQUE,
        active INTEGER NOT NULL DEFAULT 1,
        allowed_skills TEXT NOT NULL DEFAULT '[]',
        allowed_ips TEXT NOT NULL DEFAULT '',
        roles TEXT NOT NULL DEFAULT '[]',
        expires_at TEXT,
        last_used_at TEXT,
        use_count INTEGER NOT NULL DEFAULT 0,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS skills (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        executor TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        sequence INTEGER NOT NULL DEFAULT 10,
        max_limit INTEGER NOT NULL DEFAULT 100,
        allowed_roles TEXT NOT NULL DEFAULT '[]',
        input_schema TEXT NOT NULL DEFAULT '{}',
        output_schema TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS request_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        token_name TEXT NOT NULL,
        endpoint TEXT NOT NULL,
        method TEXT NOT NULL,
        skill_code TEXT,
        request_json TEXT NOT NULL DEFAULT '{}',
        response_json TEXT NOT NULL DEFAULT '{}',
        status TEXT NOT NULL,
        error TEXT,
        duration_ms INTEGER NOT NULL DEFAULT 0,
        remote_addr TEXT,
        user_agent TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_request_log_skill ON request_log(skill_code)",
    "CREATE TABLE IF NOT EXISTS webhook_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        webhook_id TEXT NOT NULL,
        payload_json TEXT,
        response_json TEXT,
        status_code INTEGER NOT NULL,
        execution_time_ms REAL NOT NULL DEFAULT 0,
        source_ip TEXT,
        n8n_workflow_id TEXT,
        success INTEGER NOT NULL,
        error_message TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS workflow_jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id TEXT NOT NULL UNIQUE,
        workflow_type TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        progress_percent REAL NOT NULL DEFAULT 0,
        result_json TEXT,
        error_message TEXT,
        n8n_execution_id TEXT,
        estimated_completion TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS countries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        code TEXT
    )",
    "CREATE TABLE IF NOT EXISTS departments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sales_teams (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        login TEXT NOT NULL UNIQUE,
        email TEXT,
        active INTEGER NOT NULL DEFAULT 1,
        company TEXT,
        lang TEXT,
        tz TEXT
    )",
    "CREATE TABLE IF NOT EXISTS partners (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT,
        phone TEXT,
        mobile TEXT,
        street TEXT,
        city TEXT,
        zip TEXT,
        website TEXT,
        country_id INTEGER REFERENCES countries(id),
        vat TEXT,
        is_company INTEGER NOT NULL DEFAULT 0,
        customer_rank INTEGER NOT NULL DEFAULT 0,
        comment TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_partners_email ON partners(email)",
    "CREATE TABLE IF NOT EXISTS products (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        default_code TEXT,
        barcode TEXT,
        list_price REAL NOT NULL DEFAULT 0,
        standard_price REAL NOT NULL DEFAULT 0,
        uom TEXT DEFAULT 'Units',
        category TEXT DEFAULT 'All',
        type TEXT NOT NULL DEFAULT 'consu',
        sale_ok INTEGER NOT NULL DEFAULT 1,
        purchase_ok INTEGER NOT NULL DEFAULT 1,
        active INTEGER NOT NULL DEFAULT 1,
        description TEXT,
        description_sale TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_products_code ON products(default_code)",
    "CREATE TABLE IF NOT EXISTS sale_orders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        partner_id INTEGER REFERENCES partners(id),
        date_order TEXT,
        state TEXT NOT NULL DEFAULT 'draft',
        amount_total REAL NOT NULL DEFAULT 0,
        currency TEXT,
        user_id INTEGER REFERENCES users(id)
    )",
    "CREATE TABLE IF NOT EXISTS invoices (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        partner_id INTEGER REFERENCES partners(id),
        invoice_date TEXT,
        invoice_date_due TEXT,
        state TEXT NOT NULL DEFAULT 'draft',
        move_type TEXT NOT NULL DEFAULT 'out_invoice',
        amount_total REAL NOT NULL DEFAULT 0,
        amount_residual REAL NOT NULL DEFAULT 0,
        currency TEXT,
        payment_state TEXT NOT NULL DEFAULT 'not_paid'
    )",
    "CREATE TABLE IF NOT EXISTS employees (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        work_email TEXT,
        work_phone TEXT,
        mobile_phone TEXT,
        job_title TEXT,
        department_id INTEGER REFERENCES departments(id),
        parent_id INTEGER REFERENCES employees(id),
        active INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS leads (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        type TEXT NOT NULL DEFAULT 'opportunity',
        partner_name TEXT,
        contact_name TEXT,
        email_from TEXT,
        phone TEXT,
        description TEXT,
        website TEXT,
        priority INTEGER NOT NULL DEFAULT 2,
        user_id INTEGER REFERENCES users(id),
        team_id INTEGER REFERENCES sales_teams(id),
        stage TEXT NOT NULL DEFAULT 'New',
        probability REAL NOT NULL DEFAULT 10.0,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE INDEX IF NOT EXISTS idx_leads_email ON leads(email_from)",
];

impl Store {
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = Connection::open(db_path)?;
        info!("Opened gateway database at {:?}", db_path);
        Self::with_connection(conn)
    }

    /// Private in-memory database; used by tests and throwaway runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = OFF; PRAGMA journal_mode = WAL;")
            .or_else(|_| conn.execute_batch("PRAGMA foreign_keys = OFF;"))?;
        register_functions(&conn)?;
        for stmt in SCHEMA {
            conn.execute(stmt, [])?;
        }
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn get_db(&self) -> Arc<Mutex<Connection>> {
        self.db.clone()
    }
}
/// Name of the SQL function that lowercases with full Unicode rules.
/// SQLite's built-in `lower()` only folds ASCII.
pub(crate) const UNICODE_LOWER: &str = "unicode_lower";

fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        UNICODE_LOWER,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let lowered = match ctx.get_raw(0) {
                ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).to_lowercase()),
                ValueRef::Integer(i) => Some(i.to_string()),
                ValueRef::Real(f) => Some(f.to_string()),
                _ => None,
            };
            Ok(lowered)
        },
    )
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
