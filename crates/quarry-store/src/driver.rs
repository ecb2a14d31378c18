//! SQLite implementation of the engine's driver interface

use crate::db;
use crate::errors::{from_rusqlite, Result};
use crate::sql::{self, Statement};
use chrono::NaiveDateTime;
use quarry_core::config::EngineConfig;
use quarry_core::driver::{index_name, DeleteTarget, Driver};
use quarry_core::errors::QuarryError;
use quarry_core::query::{Aggregate, Filter, QueryParams};
use quarry_core::schema::{FieldDefinition, FieldSet, FieldType};
use quarry_core::value::{Row, Value, DATE_FORMAT};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::collections::HashMap;
use std::path::Path;

/// Driver over a single `rusqlite` connection
///
/// Transactions are SQLite savepoints, so `begin` may nest.
///
/// ```
/// use quarry_core::{row, Engine, EngineConfig, ModelDefinition};
/// use quarry_store::SqliteDriver;
///
/// let engine = Engine::new(EngineConfig::default());
/// engine.connect(SqliteDriver::open_in_memory().unwrap());
/// let users = engine.define_model(ModelDefinition::new("users").field("name", "")).unwrap();
/// users.create(row! { "name" => "ada" }).unwrap();
/// assert_eq!(users.count("name = 'ada'").unwrap(), 1);
/// ```
pub struct SqliteDriver {
    conn: Connection,
    date_format: String,
    last_insert_id: Option<Value>,
    savepoints: usize,
}

impl SqliteDriver {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            date_format: DATE_FORMAT.to_string(),
            last_insert_id: None,
            savepoints: 0,
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(db::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(db::open_in_memory()?))
    }

    /// Layout for dates stored as text; connecting to an engine replaces it
    /// with the engine's `date_format`
    pub fn with_date_format(mut self, date_format: impl Into<String>) -> Self {
        self.date_format = date_format.into();
        self
    }

    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Open savepoints
    pub fn transaction_depth(&self) -> usize {
        self.savepoints
    }

    pub fn table_names(&self) -> Result<Vec<String>> {
        let rows = self.query(&Statement {
            sql: "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
                .to_string(),
            params: Vec::new(),
        })?;
        Ok(rows.iter().filter_map(|r| r.get("name").map(Value::to_string)).collect())
    }

    pub fn column_names(&self, table: &str) -> Result<Vec<String>> {
        let rows = self.query(&Statement {
            sql: format!("PRAGMA table_info({})", sql::quote_ident(table)),
            params: Vec::new(),
        })?;
        Ok(rows.iter().filter_map(|r| r.get("name").map(Value::to_string)).collect())
    }

    pub fn index_names(&self, table: &str) -> Result<Vec<String>> {
        let rows = self.query(&Statement {
            sql: "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ? ORDER BY name"
                .to_string(),
            params: vec![Value::from(table)],
        })?;
        Ok(rows.iter().filter_map(|r| r.get("name").map(Value::to_string)).collect())
    }

    fn bind(&self, values: &[Value]) -> Vec<SqlValue> {
        values.iter().map(|v| to_sql(v, &self.date_format)).collect()
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        tracing::trace!(sql, "sqlite batch");
        self.conn.execute_batch(sql).map_err(from_rusqlite)
    }

    fn execute(&self, stmt: &Statement) -> Result<usize> {
        tracing::trace!(sql = %stmt.sql, params = stmt.params.len(), "sqlite execute");
        let params = self.bind(&stmt.params);
        self.conn
            .execute(&stmt.sql, params_from_iter(params.iter()))
            .map_err(from_rusqlite)
    }

    fn query(&self, stmt: &Statement) -> Result<Vec<Row>> {
        tracing::trace!(sql = %stmt.sql, params = stmt.params.len(), "sqlite query");
        let params = self.bind(&stmt.params);
        let mut prepared = self.conn.prepare(&stmt.sql).map_err(from_rusqlite)?;
        let columns: Vec<String> = prepared
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let mut rows = prepared
            .query(params_from_iter(params.iter()))
            .map_err(from_rusqlite)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(from_rusqlite)? {
            let mut values = Row::with_capacity(columns.len());
            for (i, column) in columns.iter().enumerate() {
                let value = row.get_ref(i).map_err(from_rusqlite)?;
                values.insert(column.clone(), from_sql(value));
            }
            out.push(values);
        }
        Ok(out)
    }

    fn parse_date(&self, text: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(text, &self.date_format)
            .or_else(|_| NaiveDateTime::parse_from_str(text, DATE_FORMAT))
            .ok()
    }

    fn savepoint_name(depth: usize) -> String {
        format!("quarry_sp_{}", depth)
    }
}

impl std::fmt::Debug for SqliteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDriver")
            .field("date_format", &self.date_format)
            .field("savepoints", &self.savepoints)
            .finish()
    }
}

fn to_sql(value: &Value, date_format: &str) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Date(d) => SqlValue::Text(d.format(date_format).to_string()),
        Value::Json(j) => SqlValue::Text(j.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Json(serde_json::Value::Array(
            b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
        )),
    }
}

fn parse_number(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    trimmed
        .parse::<i64>()
        .map(Value::Int)
        .or_else(|_| trimmed.parse::<f64>().map(Value::Float))
        .ok()
}

impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn configure(&mut self, config: &EngineConfig) {
        self.date_format = config.date_format.clone();
    }

    fn insert(&mut self, collection: &str, primary_key: &str, row: &Row) -> Result<Value> {
        self.execute(&sql::insert(collection, row))?;
        let id = match row.get(primary_key) {
            Some(id) if !id.is_null() => id.clone(),
            _ => Value::Int(self.conn.last_insert_rowid()),
        };
        self.last_insert_id = Some(id.clone());
        Ok(id)
    }

    fn last_insert_id(&self) -> Option<Value> {
        self.last_insert_id.clone()
    }

    fn update(&mut self, collection: &str, primary_key: &str, id: &Value, row: &Row) -> Result<()> {
        if let Some(stmt) = sql::update(collection, primary_key, id, row) {
            self.execute(&stmt)?;
        }
        Ok(())
    }

    fn update_all(&mut self, collection: &str, updates: &Row, filter: &Filter) -> Result<usize> {
        match sql::update_all(collection, updates, filter) {
            Some(stmt) => self.execute(&stmt),
            None => Ok(0),
        }
    }

    fn delete(&mut self, collection: &str, primary_key: &str, target: &DeleteTarget) -> Result<Vec<Value>> {
        let removed: Vec<Value> = self
            .query(&sql::delete_keys(collection, primary_key, target))?
            .into_iter()
            .filter_map(|mut row| row.shift_remove(primary_key))
            .collect();
        self.execute(&sql::delete(collection, primary_key, target))?;
        Ok(removed)
    }

    fn find_by_ids(&mut self, collection: &str, primary_key: &str, ids: &[Value]) -> Result<Vec<Row>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut by_key: HashMap<String, Row> = self
            .query(&sql::find_by_ids(collection, primary_key, ids))?
            .into_iter()
            .map(|row| {
                let key = row.get(primary_key).map(Value::key).unwrap_or_default();
                (key, row)
            })
            .collect();
        Ok(ids.iter().filter_map(|id| by_key.remove(&id.key())).collect())
    }

    fn find(&mut self, collection: &str, params: &QueryParams) -> Result<Vec<Row>> {
        self.query(&sql::select(collection, params))
    }

    fn find_by_sql(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        self.query(&Statement {
            sql: sql.to_string(),
            params: args.to_vec(),
        })
    }

    fn calculate(&mut self, collection: &str, params: &QueryParams, aggregate: &Aggregate) -> Result<Value> {
        let value = self
            .query(&sql::calculate(collection, params, aggregate))?
            .into_iter()
            .next()
            .and_then(|mut row| row.shift_remove("value"))
            .unwrap_or_default();
        Ok(match (aggregate, value) {
            (Aggregate::Count | Aggregate::Sum(_), Value::Null) => Value::Int(0),
            (_, value) => value,
        })
    }

    fn create_table(&mut self, collection: &str, primary_key: &str, fields: &FieldSet) -> Result<()> {
        tracing::debug!(collection, "create table");
        self.execute_batch(&sql::create_table(collection, primary_key, fields, &self.date_format))
    }

    fn drop_table(&mut self, collection: &str) -> Result<()> {
        self.execute_batch(&sql::drop_table(collection))
    }

    fn rename_table(&mut self, from: &str, to: &str) -> Result<()> {
        self.execute_batch(&sql::rename_table(from, to))
    }

    fn add_column(&mut self, collection: &str, column: &str, field: &FieldDefinition) -> Result<()> {
        self.execute_batch(&sql::add_column(collection, column, field, &self.date_format))
    }

    fn drop_column(&mut self, collection: &str, column: &str) -> Result<()> {
        self.execute_batch(&sql::drop_column(collection, column))
    }

    fn add_index(&mut self, collection: &str, columns: &[String], name: Option<&str>) -> Result<()> {
        if columns.is_empty() {
            return Err(QuarryError::invalid_input("an index needs at least one column"));
        }
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| index_name(collection, columns));
        self.execute_batch(&sql::add_index(collection, columns, &name))
    }

    fn remove_index(&mut self, _collection: &str, name: &str) -> Result<()> {
        self.execute_batch(&sql::remove_index(name))
    }

    fn field_in(&self, field: &FieldDefinition, value: &Value) -> Result<Value> {
        if field.primary_key {
            return Ok(value.clone());
        }
        let value = field.value_or_default(value);
        if value.is_null() {
            return Ok(Value::Null);
        }
        Ok(match field.field_type {
            FieldType::Date => match value {
                Value::Date(d) => Value::Text(d.format(&self.date_format).to_string()),
                other => other,
            },
            FieldType::Boolean => Value::Int(i64::from(value.is_truthy())),
            FieldType::Number => match value {
                Value::Text(s) => parse_number(&s).unwrap_or(Value::Text(s)),
                Value::Bool(b) => Value::Int(i64::from(b)),
                other => other,
            },
            FieldType::String => match value {
                Value::Text(s) => Value::Text(s),
                Value::Date(d) => Value::Text(d.format(&self.date_format).to_string()),
                other => Value::Text(other.to_string()),
            },
            FieldType::Structured => Value::Text(value.to_json().to_string()),
        })
    }

    fn field_out(&self, field: &FieldDefinition, value: &Value) -> Result<Value> {
        if field.primary_key {
            return Ok(value.clone());
        }
        if value.is_null() {
            return Ok(field.default.clone());
        }
        Ok(match (field.field_type, value) {
            (FieldType::Date, Value::Text(s)) => self
                .parse_date(s)
                .map(Value::Date)
                .unwrap_or_else(|| value.clone()),
            (FieldType::Boolean, Value::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Value::Bool(true),
                "false" | "0" | "" => Value::Bool(false),
                _ => Value::Bool(true),
            },
            (FieldType::Boolean, other) => Value::Bool(other.is_truthy()),
            (FieldType::Number, Value::Text(s)) => parse_number(s).unwrap_or_else(|| value.clone()),
            (FieldType::String, Value::Int(_) | Value::Float(_)) => Value::Text(value.to_string()),
            (FieldType::Structured, Value::Text(s)) => serde_json::from_str::<serde_json::Value>(s)
                .map(Value::from_json)
                .unwrap_or_else(|_| value.clone()),
            _ => value.clone(),
        })
    }

    fn begin(&mut self) -> Result<()> {
        self.execute_batch(&format!("SAVEPOINT {}", Self::savepoint_name(self.savepoints)))?;
        self.savepoints += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.savepoints == 0 {
            return Err(QuarryError::storage("commit", "no transaction in progress"));
        }
        self.savepoints -= 1;
        self.execute_batch(&format!(
            "RELEASE SAVEPOINT {}",
            Self::savepoint_name(self.savepoints)
        ))
    }

    fn rollback(&mut self) -> Result<()> {
        if self.savepoints == 0 {
            return Err(QuarryError::storage("rollback", "no transaction in progress"));
        }
        self.savepoints -= 1;
        let name = Self::savepoint_name(self.savepoints);
        self.execute_batch(&format!(
            "ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}"
        ))
    }
}
