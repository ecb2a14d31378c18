//! Storage driver abstraction
//!
//! The engine talks to storage only through [`Driver`]. Drivers work on
//! plain rows; records, events and synchronization live above this layer.

pub mod memory;

pub use memory::MemoryDriver;

use crate::config::EngineConfig;
use crate::errors::Result;
use crate::query::{Aggregate, Filter, QueryParams};
use crate::schema::{FieldDefinition, FieldSet};
use crate::value::{Row, Value};

/// Rows to remove in `Driver::delete`
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteTarget {
    Id(Value),
    All,
}

/// A storage backend
pub trait Driver {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Adopt engine-wide settings; called by `Engine::connect`
    fn configure(&mut self, _config: &EngineConfig) {}

    // ----- rows -----

    /// Insert a row and return its primary key; a null key is generated
    fn insert(&mut self, collection: &str, primary_key: &str, row: &Row) -> Result<Value>;

    /// Key generated by the most recent insert
    fn last_insert_id(&self) -> Option<Value>;

    fn update(&mut self, collection: &str, primary_key: &str, id: &Value, row: &Row) -> Result<()>;

    /// Apply `updates` to every row matching `filter`; returns rows touched
    fn update_all(&mut self, collection: &str, updates: &Row, filter: &Filter) -> Result<usize>;

    /// Returns the primary keys of removed rows
    fn delete(&mut self, collection: &str, primary_key: &str, target: &DeleteTarget) -> Result<Vec<Value>>;

    /// Rows for `ids`, in the order given; unknown ids are skipped
    fn find_by_ids(&mut self, collection: &str, primary_key: &str, ids: &[Value]) -> Result<Vec<Row>>;

    fn find(&mut self, collection: &str, params: &QueryParams) -> Result<Vec<Row>>;

    /// Run a raw SELECT with `?` placeholders bound to `args`
    fn find_by_sql(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>>;

    fn calculate(&mut self, collection: &str, params: &QueryParams, aggregate: &Aggregate) -> Result<Value>;

    // ----- schema -----

    /// Create the collection if it does not exist
    fn create_table(&mut self, collection: &str, primary_key: &str, fields: &FieldSet) -> Result<()>;
    fn drop_table(&mut self, collection: &str) -> Result<()>;
    fn rename_table(&mut self, from: &str, to: &str) -> Result<()>;
    fn add_column(&mut self, collection: &str, column: &str, field: &FieldDefinition) -> Result<()>;
    fn drop_column(&mut self, collection: &str, column: &str) -> Result<()>;
    fn add_index(&mut self, collection: &str, columns: &[String], name: Option<&str>) -> Result<()>;
    fn remove_index(&mut self, collection: &str, name: &str) -> Result<()>;

    // ----- coercion -----

    /// Record value to storage value
    fn field_in(&self, field: &FieldDefinition, value: &Value) -> Result<Value>;

    /// Storage value to record value; null becomes the field default
    fn field_out(&self, field: &FieldDefinition, value: &Value) -> Result<Value>;

    // ----- transactions -----

    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
}

/// Default index name: `idx_<collection>_<col>_<col>`
pub fn index_name(collection: &str, columns: &[String]) -> String {
    format!("idx_{}_{}", collection, columns.join("_"))
}

/// Split `a ASC, b desc` into `(column, descending)` pairs
pub fn parse_order(order: &str) -> Vec<(String, bool)> {
    order
        .split(',')
        .filter_map(|term| {
            let mut parts = term.split_whitespace();
            let column = parts.next()?.to_string();
            let descending = parts
                .next()
                .map(|dir| dir.eq_ignore_ascii_case("desc"))
                .unwrap_or(false);
            Some((column, descending))
        })
        .collect()
}
