//! Versioned schema migrations
//!
//! Applied versions are recorded in the configured migrations table. A
//! migration run happens inside one engine transaction: if any step fails
//! the whole run rolls back.
//!
//! ```
//! use quarry_core::{Engine, FieldSpec, Migrations};
//!
//! let engine = Engine::in_memory();
//! let mut migrations = Migrations::new();
//! migrations.add_fn(
//!     1,
//!     |schema| schema.create_table("posts", [("title", FieldSpec::from(""))]),
//!     |schema| schema.drop_table("posts"),
//! );
//! let report = migrations.migrate(&engine, None).unwrap();
//! assert_eq!(report.applied, vec![1]);
//! assert_eq!(migrations.current(&engine).unwrap(), 1);
//! ```

use crate::engine::Engine;
use crate::errors::{QuarryError, Result};
use crate::query::QueryParams;
use crate::schema::{FieldSpec, ModelDefinition};
use crate::{log_op_end, log_op_error, log_op_start, row};
use std::collections::BTreeMap;
use std::time::Instant;

/// DDL facade handed to migrations
pub struct Schema<'a> {
    engine: &'a Engine,
}

impl<'a> Schema<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        self.engine
    }

    /// Create a table; fields use the same declarations as model definitions
    pub fn create_table<I, S>(&self, name: &str, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, FieldSpec)>,
        S: Into<String>,
    {
        let definition = fields
            .into_iter()
            .fold(ModelDefinition::new(name), |def, (field, spec)| def.field(field, spec));
        let (primary_key, fields) = definition.resolve_fields()?;
        self.engine
            .with_driver(|d| d.create_table(name, &primary_key, &fields))
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.engine.with_driver(|d| d.drop_table(name))
    }

    pub fn rename_table(&self, from: &str, to: &str) -> Result<()> {
        self.engine.with_driver(|d| d.rename_table(from, to))
    }

    pub fn add_column(&self, table: &str, column: &str, spec: impl Into<FieldSpec>) -> Result<()> {
        let field = spec.into().resolve(column)?;
        self.engine
            .with_driver(|d| d.add_column(table, column, &field))
    }

    pub fn drop_column(&self, table: &str, column: &str) -> Result<()> {
        self.engine.with_driver(|d| d.drop_column(table, column))
    }

    pub fn add_index(&self, table: &str, columns: &[&str], name: Option<&str>) -> Result<()> {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        self.engine
            .with_driver(|d| d.add_index(table, &columns, name))
    }

    pub fn remove_index(&self, table: &str, name: &str) -> Result<()> {
        self.engine.with_driver(|d| d.remove_index(table, name))
    }
}

pub trait Migration {
    fn up(&self, schema: &Schema<'_>) -> Result<()>;
    fn down(&self, schema: &Schema<'_>) -> Result<()>;
}

/// A migration made of two closures
pub struct FnMigration<U, D> {
    up: U,
    down: D,
}

impl<U, D> FnMigration<U, D>
where
    U: Fn(&Schema<'_>) -> Result<()>,
    D: Fn(&Schema<'_>) -> Result<()>,
{
    pub fn new(up: U, down: D) -> Self {
        Self { up, down }
    }
}

impl<U, D> Migration for FnMigration<U, D>
where
    U: Fn(&Schema<'_>) -> Result<()>,
    D: Fn(&Schema<'_>) -> Result<()>,
{
    fn up(&self, schema: &Schema<'_>) -> Result<()> {
        (self.up)(schema)
    }

    fn down(&self, schema: &Schema<'_>) -> Result<()> {
        (self.down)(schema)
    }
}

/// What a `migrate` call changed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MigrationReport {
    pub from: i64,
    pub to: i64,
    /// Versions run up, ascending
    pub applied: Vec<i64>,
    /// Versions run down, descending
    pub reverted: Vec<i64>,
}

/// Ordered set of migrations keyed by version
#[derive(Default)]
pub struct Migrations {
    steps: BTreeMap<i64, Box<dyn Migration>>,
}

impl Migrations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a migration; re-adding a version replaces it
    pub fn add(&mut self, version: i64, migration: impl Migration + 'static) -> &mut Self {
        self.steps.insert(version, Box::new(migration));
        self
    }

    pub fn add_fn<U, D>(&mut self, version: i64, up: U, down: D) -> &mut Self
    where
        U: Fn(&Schema<'_>) -> Result<()> + 'static,
        D: Fn(&Schema<'_>) -> Result<()> + 'static,
    {
        self.add(version, FnMigration::new(up, down))
    }

    pub fn versions(&self) -> Vec<i64> {
        self.steps.keys().copied().collect()
    }

    /// Highest registered version, 0 when empty
    pub fn max(&self) -> i64 {
        self.steps.keys().next_back().copied().unwrap_or(0).max(0)
    }

    /// Highest applied version, 0 when none
    pub fn current(&self, engine: &Engine) -> Result<i64> {
        let versions = engine.version_model()?;
        Ok(versions.maximum("version", QueryParams::new())?.as_i64().unwrap_or(0))
    }

    /// Migrate up or down to `target`, or to `max()` when `None`
    pub fn migrate(&self, engine: &Engine, target: Option<i64>) -> Result<MigrationReport> {
        let target = target.unwrap_or_else(|| self.max());
        log_op_start!("migrate", version = target);
        let start = Instant::now();

        let report = self.migrate_impl(engine, target).map_err(|e| {
            log_op_error!(
                "migrate",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                version = target
            );
            e
        })?;

        log_op_end!(
            "migrate",
            duration_ms = start.elapsed().as_millis() as u64,
            version = report.to,
            applied = report.applied.len(),
            reverted = report.reverted.len()
        );
        Ok(report)
    }

    fn migrate_impl(&self, engine: &Engine, target: i64) -> Result<MigrationReport> {
        let versions = engine.version_model()?;
        let from = self.current(engine)?;
        let schema = Schema::new(engine);
        let mut report = MigrationReport {
            from,
            to: target,
            ..MigrationReport::default()
        };
        if target == from {
            tracing::debug!(version = from, "schema is current");
            return Ok(report);
        }

        engine.transaction(|| {
            if target > from {
                for (version, migration) in self.steps.range(from + 1..=target) {
                    tracing::debug!(version = *version, "migrating up");
                    migration.up(&schema).map_err(|e| failed(*version, e))?;
                    versions.create(row! { "version" => *version })?;
                    report.applied.push(*version);
                }
            } else {
                for (version, migration) in self.steps.range(target + 1..=from).rev() {
                    tracing::debug!(version = *version, "migrating down");
                    migration.down(&schema).map_err(|e| failed(*version, e))?;
                    report.reverted.push(*version);
                }
                for record in versions.find_all(QueryParams::new())?.records() {
                    if record.get("version").as_i64().is_some_and(|v| v > target) {
                        record.destroy()?;
                    }
                }
            }
            Ok(())
        })?;
        Ok(report)
    }
}

fn failed(version: i64, error: QuarryError) -> QuarryError {
    match error {
        QuarryError::Migration { .. } => error,
        other => QuarryError::Migration {
            version,
            message: other.to_string(),
        },
    }
}

impl std::fmt::Debug for Migrations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrations")
            .field("versions", &self.versions())
            .finish()
    }
}

/// Recorded version rows, for diagnostics
pub fn applied_versions(engine: &Engine) -> Result<Vec<i64>> {
    let versions = engine.version_model()?;
    let set = versions.find_all(QueryParams::new().order("version ASC"))?;
    Ok(set
        .records()
        .iter()
        .filter_map(|r| r.get("version").as_i64())
        .collect())
}
