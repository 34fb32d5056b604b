use rusqlite::types::Value as SqlValue;

use super::UNICODE_LOWER;

/// Conjunctive WHERE clause with positional parameters. Column names are
/// always compile-time constants; only values travel as parameters.
#[derive(Debug, Clone, Default)]
pub struct Domain {
    clauses: Vec<String>,
    params: Vec<SqlValue>,
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.clauses.push(format!("{} = ?", column));
        self.params.push(value.into());
        self
    }

    pub fn any_of(mut self, column: &'static str, values: &[&str]) -> Self {
        if values.is_empty() {
            self.clauses.push("0".to_string());
            return self;
        }
        let marks = vec!["?"; values.len()].join(", ");
        self.clauses.push(format!("{} IN ({})", column, marks));
        self.params
            .extend(values.iter().map(|v| SqlValue::Text(v.to_string())));
        self
    }

    pub fn positive(mut self, column: &'static str) -> Self {
        self.clauses.push(format!("{} > 0", column));
        self
    }

    /// Case-insensitive substring match on any of `columns`.
    pub fn ilike_any(mut self, columns: &[&'static str], term: &str) -> Self {
        if columns.is_empty() {
            return self;
        }
        let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
        let ors: Vec<String> = columns
            .iter()
            .map(|c| format!("{}(COALESCE({}, '')) LIKE ? ESCAPE '\\'", UNICODE_LOWER, c))
            .collect();
        self.clauses.push(format!("({})", ors.join(" OR ")));
        for _ in columns {
            self.params.push(SqlValue::Text(pattern.clone()));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// `""` or `" WHERE a AND b"`, ready to append after a FROM clause.
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Loose JSON scalar to SQL conversion used when copying allow-listed
/// payload fields into a row. Objects and arrays are stored as JSON text.
pub fn json_to_sql(value: &serde_json::Value) -> SqlValue {
    use serde_json::Value;
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else {
                SqlValue::Real(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
