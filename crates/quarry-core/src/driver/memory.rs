//! In-memory driver
//!
//! Rows live in ordered maps keyed by primary key, so unordered queries
//! come back in key order. Raw filters are evaluated with the expression
//! engine. Transactions snapshot the whole store.

use super::{parse_order, DeleteTarget, Driver};
use crate::errors::{QuarryError, Result};
use crate::expr::{parse, MathFunctions};
use crate::query::{Aggregate, Filter, QueryParams};
use crate::schema::{FieldDefinition, FieldSet};
use crate::value::{row_from_json, row_to_json, Row, Value, DATE_FORMAT};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum StorageKey {
    Int(i64),
    Text(String),
}

impl StorageKey {
    fn from_value(value: &Value) -> StorageKey {
        match value.as_i64() {
            Some(i) if !matches!(value, Value::Bool(_)) => StorageKey::Int(i),
            _ => StorageKey::Text(value.key()),
        }
    }

    fn parse(text: &str) -> StorageKey {
        text.parse()
            .map(StorageKey::Int)
            .unwrap_or_else(|_| StorageKey::Text(text.to_string()))
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            StorageKey::Int(i) => Some(*i),
            StorageKey::Text(_) => None,
        }
    }

    fn to_text(&self) -> String {
        match self {
            StorageKey::Int(i) => i.to_string(),
            StorageKey::Text(s) => s.clone(),
        }
    }
}

type Table = BTreeMap<StorageKey, Row>;
type Store = BTreeMap<String, Table>;

#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    store: Store,
    last_insert_id: Option<Value>,
    snapshots: Vec<Store>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collections(&self) -> Vec<String> {
        self.store.keys().cloned().collect()
    }

    pub fn has_collection(&self, collection: &str) -> bool {
        self.store.contains_key(collection)
    }

    pub fn row_count(&self, collection: &str) -> usize {
        self.store.get(collection).map_or(0, BTreeMap::len)
    }

    pub fn in_transaction(&self) -> bool {
        !self.snapshots.is_empty()
    }

    /// `{ collection: { key: row } }`
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.store
                .iter()
                .map(|(collection, table)| {
                    let rows = table
                        .iter()
                        .map(|(key, row)| (key.to_text(), row_to_json(row)))
                        .collect();
                    (collection.clone(), serde_json::Value::Object(rows))
                })
                .collect(),
        )
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_json())?)
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        let parsed: serde_json::Value = serde_json::from_str(source)?;
        let serde_json::Value::Object(collections) = parsed else {
            return Err(QuarryError::Serialization {
                message: "memory store must be a JSON object".to_string(),
            });
        };
        let mut store = Store::new();
        for (collection, rows) in collections {
            let serde_json::Value::Object(rows) = rows else {
                return Err(QuarryError::Serialization {
                    message: format!("collection {} must be a JSON object", collection),
                });
            };
            let table = rows
                .into_iter()
                .map(|(key, row)| (StorageKey::parse(&key), row_from_json(row)))
                .collect();
            store.insert(collection, table);
        }
        Ok(Self {
            store,
            ..Self::default()
        })
    }

    fn table_mut(&mut self, collection: &str) -> &mut Table {
        self.store.entry(collection.to_string()).or_default()
    }

    fn select_rows(&self, collection: &str, filter: &Filter) -> Result<Vec<(StorageKey, Row)>> {
        let Some(table) = self.store.get(collection) else {
            return Ok(Vec::new());
        };
        let rows = table.iter().map(|(k, r)| (k.clone(), r.clone()));
        match filter {
            f if f.is_none() => Ok(rows.collect()),
            Filter::Raw(source) => {
                let expression = parse(source)?;
                let mut matched = Vec::new();
                for (key, row) in rows {
                    if expression.matches(&row, &MathFunctions)? {
                        matched.push((key, row));
                    }
                }
                Ok(matched)
            }
            Filter::Equality(conditions) => Ok(rows
                .filter(|(_, row)| {
                    conditions
                        .iter()
                        .all(|(field, expected)| equality_matches(row.get(field), expected))
                })
                .collect()),
            Filter::None => Ok(rows.collect()),
        }
    }

    fn query(&self, collection: &str, params: &QueryParams) -> Result<Vec<Row>> {
        let mut rows: Vec<Row> = self
            .select_rows(collection, &params.filter)?
            .into_iter()
            .map(|(_, row)| row)
            .collect();

        if let Some(group) = params.group.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
            let mut seen = HashSet::new();
            rows.retain(|row| seen.insert(row.get(group).map(Value::key)));
        }

        if let Some(order) = &params.order {
            let terms = parse_order(order);
            rows.sort_by(|a, b| compare_rows(a, b, &terms));
        }

        let rows = rows
            .into_iter()
            .skip(params.offset.unwrap_or(0))
            .take(params.limit.unwrap_or(usize::MAX));

        Ok(match &params.select {
            Some(columns) if !columns.iter().any(|c| c.trim() == "*") => rows
                .map(|row| {
                    columns
                        .iter()
                        .map(|c| {
                            let c = c.trim();
                            (c.to_string(), row.get(c).cloned().unwrap_or_default())
                        })
                        .collect()
                })
                .collect(),
            _ => rows.collect(),
        })
    }
}

/// Equality compares string forms; null never matches
fn equality_matches(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        Some(actual) if !actual.is_null() && !expected.is_null() => actual.key() == expected.key(),
        _ => false,
    }
}

fn compare_rows(a: &Row, b: &Row, terms: &[(String, bool)]) -> Ordering {
    for (column, descending) in terms {
        let null = Value::Null;
        let ordering = a
            .get(column)
            .unwrap_or(&null)
            .sort_cmp(b.get(column).unwrap_or(&null));
        let ordering = if *descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Fold rows into an aggregate value
///
/// `sum` of nothing is 0; `average`, `minimum` and `maximum` of nothing are null.
pub fn reduce(rows: &[Row], aggregate: &Aggregate) -> Value {
    let Some(column) = aggregate.column() else {
        return Value::from(rows.len());
    };
    let numbers: Vec<&Value> = rows
        .iter()
        .filter_map(|row| row.get(column))
        .filter(|v| !v.is_null() && v.as_f64().is_some())
        .collect();
    let all_ints = numbers.iter().all(|v| v.as_i64().is_some());
    let floats = numbers.iter().filter_map(|v| v.as_f64());
    let narrow = |x: f64| {
        if all_ints {
            Value::Int(x as i64)
        } else {
            Value::Float(x)
        }
    };

    match aggregate {
        Aggregate::Count => Value::from(rows.len()),
        Aggregate::Sum(_) => narrow(floats.sum()),
        Aggregate::Average(_) if numbers.is_empty() => Value::Null,
        Aggregate::Average(_) => Value::Float(floats.sum::<f64>() / numbers.len() as f64),
        Aggregate::Min(_) => floats.reduce(f64::min).map_or(Value::Null, narrow),
        Aggregate::Max(_) => floats.reduce(f64::max).map_or(Value::Null, narrow),
    }
}

struct SelectStatement {
    collection: String,
    params: QueryParams,
}

fn select_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?is)^\s*SELECT\s+(?P<columns>.+?)\s+FROM\s+(?P<table>[A-Za-z_][A-Za-z0-9_]*)(?:\s+WHERE\s+(?P<where>.+?))?(?:\s+GROUP\s+BY\s+(?P<group>.+?))?(?:\s+ORDER\s+BY\s+(?P<order>.+?))?(?:\s+LIMIT\s+(?P<first>\d+)(?:\s*,\s*(?P<second>\d+))?)?\s*;?\s*$",
            )
            .ok()
        })
        .as_ref()
}

/// Inline `?` placeholders as filter-language literals
fn bind_placeholders(sql: &str, args: &[Value]) -> Result<String> {
    let mut bound = String::with_capacity(sql.len());
    let mut args = args.iter();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in sql.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                bound.push(c);
            }
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                bound.push(c);
            }
            None if c == '?' => {
                let arg = args
                    .next()
                    .ok_or_else(|| QuarryError::invalid_input("not enough arguments for placeholders"))?;
                bound.push_str(&literal(arg)?);
            }
            None => bound.push(c),
        }
    }
    Ok(bound)
}

fn quoted(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn literal(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => {
            return Err(QuarryError::invalid_input(
                "null arguments cannot be bound by the memory driver",
            ))
        }
        Value::Bool(b) => b.to_string(),
        Value::Int(_) | Value::Float(_) => value.to_string(),
        Value::Text(s) => quoted(s),
        Value::Date(d) => quoted(&d.format(DATE_FORMAT).to_string()),
        Value::Json(j) => quoted(&j.to_string()),
    })
}

fn parse_select(sql: &str) -> Result<SelectStatement> {
    let pattern = select_pattern()
        .ok_or_else(|| QuarryError::Internal {
            message: "select pattern failed to compile".to_string(),
        })?;
    let captures = pattern
        .captures(sql)
        .ok_or_else(|| QuarryError::invalid_input(format!("unsupported SQL: {}", sql)))?;
    let text = |name: &str| captures.name(name).map(|m| m.as_str().trim().to_string());
    let number = |name: &str| text(name).and_then(|n| n.parse::<usize>().ok());

    let mut params = QueryParams::new();
    if let Some(columns) = text("columns") {
        if columns != "*" {
            params = params.select(columns.split(',').map(|c| c.trim().to_string()));
        }
    }
    if let Some(filter) = text("where") {
        params = params.filter(filter);
    }
    params.group = text("group");
    params.order = text("order");
    // LIMIT n | LIMIT offset, n
    match (number("first"), number("second")) {
        (Some(offset), Some(limit)) => params = params.offset(offset).limit(limit),
        (Some(limit), None) => params = params.limit(limit),
        _ => {}
    }

    Ok(SelectStatement {
        collection: text("table").unwrap_or_default(),
        params,
    })
}

impl Driver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn insert(&mut self, collection: &str, primary_key: &str, row: &Row) -> Result<Value> {
        let table = self.table_mut(collection);
        let id = match row.get(primary_key) {
            Some(id) if !id.is_null() => id.clone(),
            _ => Value::Int(table.keys().filter_map(StorageKey::as_int).max().unwrap_or(0) + 1),
        };
        let key = StorageKey::from_value(&id);
        if table.contains_key(&key) {
            return Err(QuarryError::storage(
                "insert",
                format!("duplicate primary key {} in {}", id, collection),
            ));
        }

        let mut stored = Row::with_capacity(row.len() + 1);
        stored.insert(primary_key.to_string(), id.clone());
        for (field, value) in row {
            if field != primary_key {
                stored.insert(field.clone(), value.clone());
            }
        }
        table.insert(key, stored);
        self.last_insert_id = Some(id.clone());
        tracing::trace!(collection, id = %id, "memory insert");
        Ok(id)
    }

    fn last_insert_id(&self) -> Option<Value> {
        self.last_insert_id.clone()
    }

    fn update(&mut self, collection: &str, primary_key: &str, id: &Value, row: &Row) -> Result<()> {
        let table = self.table_mut(collection);
        let Some(stored) = table.get_mut(&StorageKey::from_value(id)) else {
            // same as an UPDATE matching no row
            tracing::trace!(collection, id = %id, "update skipped missing row");
            return Ok(());
        };
        for (field, value) in row {
            if field != primary_key {
                stored.insert(field.clone(), value.clone());
            }
        }
        Ok(())
    }

    fn update_all(&mut self, collection: &str, updates: &Row, filter: &Filter) -> Result<usize> {
        let keys: Vec<StorageKey> = self
            .select_rows(collection, filter)?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        let table = self.table_mut(collection);
        for key in &keys {
            if let Some(row) = table.get_mut(key) {
                for (field, value) in updates {
                    row.insert(field.clone(), value.clone());
                }
            }
        }
        Ok(keys.len())
    }

    fn delete(&mut self, collection: &str, primary_key: &str, target: &DeleteTarget) -> Result<Vec<Value>> {
        let Some(table) = self.store.get_mut(collection) else {
            return Ok(Vec::new());
        };
        let removed = match target {
            DeleteTarget::Id(id) => table
                .remove(&StorageKey::from_value(id))
                .map(|_| vec![id.clone()])
                .unwrap_or_default(),
            DeleteTarget::All => std::mem::take(table)
                .into_values()
                .map(|row| row.get(primary_key).cloned().unwrap_or_default())
                .collect(),
        };
        Ok(removed)
    }

    fn find_by_ids(&mut self, collection: &str, _primary_key: &str, ids: &[Value]) -> Result<Vec<Row>> {
        let Some(table) = self.store.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| table.get(&StorageKey::from_value(id)).cloned())
            .collect())
    }

    fn find(&mut self, collection: &str, params: &QueryParams) -> Result<Vec<Row>> {
        self.query(collection, params)
    }

    fn find_by_sql(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        let bound = bind_placeholders(sql, args)?;
        let statement = parse_select(&bound)?;
        self.query(&statement.collection, &statement.params)
    }

    fn calculate(&mut self, collection: &str, params: &QueryParams, aggregate: &Aggregate) -> Result<Value> {
        let rows = self.query(collection, params)?;
        Ok(reduce(&rows, aggregate))
    }

    fn create_table(&mut self, collection: &str, _primary_key: &str, _fields: &FieldSet) -> Result<()> {
        self.table_mut(collection);
        Ok(())
    }

    fn drop_table(&mut self, collection: &str) -> Result<()> {
        self.store.remove(collection);
        Ok(())
    }

    fn rename_table(&mut self, from: &str, to: &str) -> Result<()> {
        let table = self.store.remove(from).ok_or_else(|| {
            QuarryError::storage("rename_table", format!("no such collection: {}", from))
        })?;
        self.store.insert(to.to_string(), table);
        Ok(())
    }

    fn add_column(&mut self, collection: &str, column: &str, field: &FieldDefinition) -> Result<()> {
        for row in self.table_mut(collection).values_mut() {
            row.entry(column.to_string())
                .or_insert_with(|| field.default.clone());
        }
        Ok(())
    }

    fn drop_column(&mut self, collection: &str, column: &str) -> Result<()> {
        for row in self.table_mut(collection).values_mut() {
            row.shift_remove(column);
        }
        Ok(())
    }

    fn add_index(&mut self, collection: &str, columns: &[String], name: Option<&str>) -> Result<()> {
        tracing::trace!(collection, ?columns, ?name, "memory driver ignores indexes");
        Ok(())
    }

    fn remove_index(&mut self, _collection: &str, _name: &str) -> Result<()> {
        Ok(())
    }

    fn field_in(&self, field: &FieldDefinition, value: &Value) -> Result<Value> {
        Ok(field.value_or_default(value))
    }

    fn field_out(&self, field: &FieldDefinition, value: &Value) -> Result<Value> {
        Ok(field.value_or_default(value))
    }

    fn begin(&mut self) -> Result<()> {
        self.snapshots.push(self.store.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.snapshots.pop();
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let snapshot = self
            .snapshots
            .pop()
            .ok_or_else(|| QuarryError::storage("rollback", "no transaction in progress"))?;
        self.store = snapshot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    fn seeded() -> MemoryDriver {
        let mut driver = MemoryDriver::new();
        for (name, age) in [("ann", 31), ("bob", 25), ("cy", 25), ("dee", 40)] {
            driver
                .insert("users", "id", &row! { "name" => name, "age" => age })
                .unwrap();
        }
        driver
    }

    fn names(rows: &[Row]) -> Vec<String> {
        rows.iter().map(|r| r["name"].to_string()).collect()
    }

    #[test]
    fn test_insert_generates_sequential_ids() {
        let mut driver = seeded();
        assert_eq!(driver.last_insert_id(), Some(Value::Int(4)));
        let id = driver.insert("users", "id", &row! { "name" => "eve" }).unwrap();
        assert_eq!(id, Value::Int(5));
        let rows = driver.find_by_ids("users", "id", &[Value::Int(5)]).unwrap();
        assert_eq!(rows[0].get_index(0).map(|(k, _)| k.as_str()), Some("id"));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut driver = seeded();
        let err = driver.insert("users", "id", &row! { "id" => 1 }).unwrap_err();
        assert!(matches!(err, QuarryError::Storage { .. }));
    }

    #[test]
    fn test_raw_filter_order_limit_offset() {
        let mut driver = seeded();
        let params = QueryParams::new()
            .filter("age < 35")
            .order("age DESC, name DESC")
            .offset(1)
            .limit(2);
        let rows = driver.find("users", &params).unwrap();
        assert_eq!(names(&rows), vec!["cy", "bob"]);
    }

    #[test]
    fn test_equality_compares_string_forms() {
        let mut driver = seeded();
        let rows = driver
            .find("users", &QueryParams::new().where_eq("age", "25"))
            .unwrap();
        assert_eq!(rows.len(), 2);
        let rows = driver
            .find("users", &QueryParams::new().where_eq("age", Value::Null))
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_group_keeps_first_row_per_value() {
        let mut driver = seeded();
        let rows = driver
            .find("users", &QueryParams::new().group("age"))
            .unwrap();
        assert_eq!(names(&rows), vec!["ann", "bob", "dee"]);
    }

    #[test]
    fn test_select_projects_columns() {
        let mut driver = seeded();
        let rows = driver
            .find("users", &QueryParams::new().select(["name"]).limit(1))
            .unwrap();
        assert_eq!(rows[0].len(), 1);
        assert!(rows[0].contains_key("name"));
    }

    #[test]
    fn test_find_by_sql_binds_arguments() {
        let mut driver = seeded();
        let rows = driver
            .find_by_sql(
                "SELECT * FROM users WHERE age = ? or name = ? ORDER BY name DESC LIMIT 2",
                &[Value::Int(25), Value::from("it's")],
            )
            .unwrap();
        assert_eq!(names(&rows), vec!["cy", "bob"]);
        assert!(driver.find_by_sql("DELETE FROM users", &[]).is_err());
        assert!(driver
            .find_by_sql("SELECT * FROM users WHERE age = ?", &[])
            .is_err());
    }

    #[test]
    fn test_calculations() {
        let mut driver = seeded();
        let all = QueryParams::new();
        assert_eq!(driver.calculate("users", &all, &Aggregate::Count).unwrap(), Value::Int(4));
        assert_eq!(
            driver.calculate("users", &all, &Aggregate::Sum("age".into())).unwrap(),
            Value::Int(121)
        );
        assert_eq!(
            driver.calculate("users", &all, &Aggregate::Max("age".into())).unwrap(),
            Value::Int(40)
        );
        let none = QueryParams::new().filter("age > 100");
        assert_eq!(
            driver.calculate("users", &none, &Aggregate::Sum("age".into())).unwrap(),
            Value::Int(0)
        );
        assert_eq!(
            driver.calculate("users", &none, &Aggregate::Average("age".into())).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_update_all_and_delete() {
        let mut driver = seeded();
        let touched = driver
            .update_all("users", &row! { "age" => 26 }, &Filter::equality("age", 25))
            .unwrap();
        assert_eq!(touched, 2);
        let removed = driver
            .delete("users", "id", &DeleteTarget::Id(Value::Int(1)))
            .unwrap();
        assert_eq!(removed, vec![Value::Int(1)]);
        let removed = driver.delete("users", "id", &DeleteTarget::All).unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(driver.row_count("users"), 0);
    }

    #[test]
    fn test_update_skips_missing_row() {
        let mut driver = seeded();
        driver
            .update("users", "id", &Value::Int(99), &row! { "name" => "ghost" })
            .unwrap();
        assert_eq!(driver.row_count("users"), 4);
        assert!(driver
            .find_by_ids("users", "id", &[Value::Int(99)])
            .unwrap()
            .is_empty());

        driver
            .update("users", "id", &Value::Int(2), &row! { "name" => "bobby" })
            .unwrap();
        let rows = driver.find_by_ids("users", "id", &[Value::Int(2)]).unwrap();
        assert_eq!(rows[0]["name"], Value::from("bobby"));
    }

    #[test]
    fn test_rollback_restores_snapshot() {
        let mut driver = seeded();
        driver.begin().unwrap();
        driver.delete("users", "id", &DeleteTarget::All).unwrap();
        driver.rollback().unwrap();
        assert_eq!(driver.row_count("users"), 4);
        assert!(driver.rollback().is_err());
    }

    #[test]
    fn test_json_persistence() {
        let driver = seeded();
        let json = driver.to_json_string().unwrap();
        let mut restored = MemoryDriver::from_json_str(&json).unwrap();
        let rows = restored
            .find_by_ids("users", "id", &[Value::Int(2)])
            .unwrap();
        assert_eq!(rows[0]["name"], Value::from("bob"));
    }
}
