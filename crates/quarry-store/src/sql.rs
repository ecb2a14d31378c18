//! SQL text builders
//!
//! Every builder quotes identifiers and leaves values as `?` placeholders;
//! only DDL defaults are rendered as literals. Raw filter, order, group
//! and join text is passed through as written.

use quarry_core::driver::DeleteTarget;
use quarry_core::query::{Aggregate, Filter, QueryParams};
use quarry_core::schema::{FieldDefinition, FieldSet};
use quarry_core::value::{Row, Value};

/// SQL text plus its positional arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    fn new(sql: String, params: Vec<Value>) -> Self {
        Self { sql, params }
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_text(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Literal form of a column default; `None` for null
pub fn literal(value: &Value, date_format: &str) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(i64::from(*b).to_string()),
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Text(s) => Some(quote_text(s)),
        Value::Date(d) => Some(quote_text(&d.format(date_format).to_string())),
        Value::Json(j) => Some(quote_text(&j.to_string())),
    }
}

/// Column clause for DDL
pub fn column_definition(name: &str, field: &FieldDefinition, date_format: &str) -> String {
    if field.primary_key {
        let column_type = field
            .storage_type
            .clone()
            .unwrap_or_else(|| "INTEGER".to_string());
        return format!("{} {} PRIMARY KEY", quote_ident(name), column_type);
    }
    let mut column = format!("{} {}", quote_ident(name), field.column_type());
    if let Some(default) = literal(&field.default, date_format) {
        column.push_str(" DEFAULT ");
        column.push_str(&default);
    }
    column
}

/// `CREATE TABLE IF NOT EXISTS`, primary key column first
pub fn create_table(collection: &str, primary_key: &str, fields: &FieldSet, date_format: &str) -> String {
    let mut columns = Vec::with_capacity(fields.len() + 1);
    let pk = fields
        .get(primary_key)
        .cloned()
        .unwrap_or_else(FieldDefinition::primary_key);
    columns.push(column_definition(primary_key, &pk, date_format));
    for (name, field) in fields {
        if name != primary_key {
            columns.push(column_definition(name, field, date_format));
        }
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(collection),
        columns.join(", ")
    )
}

pub fn drop_table(collection: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(collection))
}

pub fn rename_table(from: &str, to: &str) -> String {
    format!("ALTER TABLE {} RENAME TO {}", quote_ident(from), quote_ident(to))
}

pub fn add_column(collection: &str, column: &str, field: &FieldDefinition, date_format: &str) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {}",
        quote_ident(collection),
        column_definition(column, field, date_format)
    )
}

pub fn drop_column(collection: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {}",
        quote_ident(collection),
        quote_ident(column)
    )
}

pub fn add_index(collection: &str, columns: &[String], name: &str) -> String {
    let columns: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        quote_ident(name),
        quote_ident(collection),
        columns.join(", ")
    )
}

pub fn remove_index(name: &str) -> String {
    format!("DROP INDEX IF EXISTS {}", quote_ident(name))
}

/// ` WHERE ...` (with leading space) or an empty string
pub fn where_clause(filter: &Filter) -> (String, Vec<Value>) {
    match filter {
        Filter::Raw(source) if !source.trim().is_empty() => {
            (format!(" WHERE {}", source.trim()), Vec::new())
        }
        Filter::Equality(conditions) if !conditions.is_empty() => {
            let mut terms = Vec::with_capacity(conditions.len());
            let mut params = Vec::with_capacity(conditions.len());
            for (column, value) in conditions {
                if value.is_null() {
                    terms.push(format!("{} IS NULL", quote_ident(column)));
                } else {
                    terms.push(format!("{} = ?", quote_ident(column)));
                    params.push(value.clone());
                }
            }
            (format!(" WHERE {}", terms.join(" AND ")), params)
        }
        _ => (String::new(), Vec::new()),
    }
}

pub fn insert(collection: &str, row: &Row) -> Statement {
    if row.is_empty() {
        return Statement::new(
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(collection)),
            Vec::new(),
        );
    }
    let columns: Vec<String> = row.keys().map(|c| quote_ident(c)).collect();
    let placeholders = vec!["?"; row.len()].join(", ");
    Statement::new(
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(collection),
            columns.join(", "),
            placeholders
        ),
        row.values().cloned().collect(),
    )
}

fn assignments(updates: &Row, skip: Option<&str>) -> (Vec<String>, Vec<Value>) {
    updates
        .iter()
        .filter(|(column, _)| Some(column.as_str()) != skip)
        .map(|(column, value)| (format!("{} = ?", quote_ident(column)), value.clone()))
        .unzip()
}

/// `None` when there is nothing to set
pub fn update(collection: &str, primary_key: &str, id: &Value, row: &Row) -> Option<Statement> {
    let (sets, mut params) = assignments(row, Some(primary_key));
    if sets.is_empty() {
        return None;
    }
    params.push(id.clone());
    Some(Statement::new(
        format!(
            "UPDATE {} SET {} WHERE {} = ?",
            quote_ident(collection),
            sets.join(", "),
            quote_ident(primary_key)
        ),
        params,
    ))
}

pub fn update_all(collection: &str, updates: &Row, filter: &Filter) -> Option<Statement> {
    let (sets, mut params) = assignments(updates, None);
    if sets.is_empty() {
        return None;
    }
    let (clause, filter_params) = where_clause(filter);
    params.extend(filter_params);
    Some(Statement::new(
        format!(
            "UPDATE {} SET {}{}",
            quote_ident(collection),
            sets.join(", "),
            clause
        ),
        params,
    ))
}

fn target_clause(primary_key: &str, target: &DeleteTarget) -> (String, Vec<Value>) {
    match target {
        DeleteTarget::Id(id) => (
            format!(" WHERE {} = ?", quote_ident(primary_key)),
            vec![id.clone()],
        ),
        DeleteTarget::All => (String::new(), Vec::new()),
    }
}

/// Primary keys a delete would remove
pub fn delete_keys(collection: &str, primary_key: &str, target: &DeleteTarget) -> Statement {
    let (clause, params) = target_clause(primary_key, target);
    Statement::new(
        format!(
            "SELECT {} FROM {}{}",
            quote_ident(primary_key),
            quote_ident(collection),
            clause
        ),
        params,
    )
}

pub fn delete(collection: &str, primary_key: &str, target: &DeleteTarget) -> Statement {
    let (clause, params) = target_clause(primary_key, target);
    Statement::new(
        format!("DELETE FROM {}{}", quote_ident(collection), clause),
        params,
    )
}

pub fn find_by_ids(collection: &str, primary_key: &str, ids: &[Value]) -> Statement {
    let placeholders = vec!["?"; ids.len()].join(", ");
    Statement::new(
        format!(
            "SELECT * FROM {} WHERE {} IN ({})",
            quote_ident(collection),
            quote_ident(primary_key),
            placeholders
        ),
        ids.to_vec(),
    )
}

pub fn select(collection: &str, params: &QueryParams) -> Statement {
    let columns = match &params.select {
        Some(columns) if !columns.is_empty() => columns.join(", "),
        _ => "*".to_string(),
    };
    let mut sql = format!("SELECT {} FROM {}", columns, quote_ident(collection));
    if let Some(joins) = params.joins.as_deref().filter(|j| !j.trim().is_empty()) {
        sql.push(' ');
        sql.push_str(joins.trim());
    }
    let (clause, values) = where_clause(&params.filter);
    sql.push_str(&clause);
    if let Some(group) = params.group.as_deref().filter(|g| !g.trim().is_empty()) {
        sql.push_str(" GROUP BY ");
        sql.push_str(group.trim());
    }
    if let Some(order) = params.order.as_deref().filter(|o| !o.trim().is_empty()) {
        sql.push_str(" ORDER BY ");
        sql.push_str(order.trim());
    }
    match (params.limit, params.offset) {
        (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
        (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
        (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
        (None, None) => {}
    }
    Statement::new(sql, values)
}

/// Aggregate over the rows `select` would return
pub fn calculate(collection: &str, params: &QueryParams, aggregate: &Aggregate) -> Statement {
    let inner = select(collection, params);
    Statement::new(
        format!(
            "SELECT {} AS value FROM ({}) AS q",
            aggregate.sql_expression(),
            inner.sql
        ),
        inner.params,
    )
}
