//! Model handles
//!
//! A [`Model`] pairs an engine with one resolved schema. Handles are cheap
//! to clone and every clone sees the same validators, observers and
//! relationships.

use crate::engine::Engine;
use crate::errors::{QuarryError, Result};
use crate::events::{LifecycleEvent, ObserverId, Outcome};
use crate::query::{Filter, QueryParams};
use crate::record::Record;
use crate::result_set::ResultSet;
use crate::schema::{FieldDefinition, FieldSet, ModelSchema};
use crate::validation::{length_of, presence_of, LengthOptions, Validator};
use crate::value::{Row, Value};
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub struct Model {
    engine: Engine,
    schema: Rc<ModelSchema>,
}

impl Model {
    pub(crate) fn new(engine: Engine, schema: Rc<ModelSchema>) -> Self {
        Self { engine, schema }
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn collection(&self) -> &str {
        self.schema.collection()
    }

    pub fn primary_key(&self) -> &str {
        self.schema.primary_key()
    }

    pub fn fields(&self) -> &FieldSet {
        self.schema.fields()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.schema.fields().get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.schema.fields().contains_key(name)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn schema(&self) -> &Rc<ModelSchema> {
        &self.schema
    }

    /// Whether two handles share one schema
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.schema, &other.schema)
    }

    pub(crate) fn unknown_field(&self, field: &str) -> QuarryError {
        QuarryError::UnknownField {
            model: self.name().to_string(),
            field: field.to_string(),
        }
    }

    // ----- construction -----

    /// Build an unsaved record; missing or null fields take their defaults
    pub fn build(&self, values: Row) -> Result<Record> {
        let record = Record::new(self.clone(), self.with_defaults(values)?);
        record.notify(LifecycleEvent::AfterInitialize)?;
        Ok(record)
    }

    /// Build and save; the record is returned even when the save was refused
    pub fn create(&self, values: Row) -> Result<Record> {
        let record = self.build(values)?;
        record.save()?;
        Ok(record)
    }

    /// Schema order first, then undeclared keys in the order given
    fn with_defaults(&self, mut values: Row) -> Result<Row> {
        let mut row = Row::with_capacity(self.fields().len() + values.len());
        self.engine.with_driver(|driver| {
            for (name, field) in self.fields() {
                let value = values.shift_remove(name).unwrap_or_default();
                let value = if field.primary_key {
                    value
                } else {
                    driver.field_out(field, &value)?
                };
                row.insert(name.clone(), value);
            }
            Ok(())
        })?;
        row.extend(values);
        Ok(row)
    }

    /// Record values to storage values; null primary keys are left out
    pub(crate) fn coerce_in(&self, values: &Row) -> Result<Row> {
        self.engine.with_driver(|driver| {
            let mut stored = Row::with_capacity(values.len());
            for (name, value) in values {
                match self.field(name) {
                    Some(field) if field.primary_key => {
                        if !value.is_null() {
                            stored.insert(name.clone(), value.clone());
                        }
                    }
                    Some(field) => {
                        stored.insert(name.clone(), driver.field_in(field, value)?);
                    }
                    None => {
                        stored.insert(name.clone(), value.clone());
                    }
                }
            }
            Ok(stored)
        })
    }

    /// Storage values to record values
    pub(crate) fn coerce_out(&self, stored: &Row) -> Result<Row> {
        self.engine.with_driver(|driver| {
            let mut values = Row::with_capacity(stored.len());
            for (name, value) in stored {
                let value = match self.field(name) {
                    Some(field) if !field.primary_key => driver.field_out(field, value)?,
                    _ => value.clone(),
                };
                values.insert(name.clone(), value);
            }
            Ok(values)
        })
    }

    /// Turn a stored row into a record and fire `afterInitialize`
    pub(crate) fn instantiate(&self, stored: Row) -> Result<Record> {
        self.build(stored)
    }

    // ----- mutation -----

    /// Find by id, assign `values` and save. `None` when no row has that id.
    pub fn update(&self, id: impl Into<Value>, values: Row) -> Result<Option<Record>> {
        let Some(record) = self.find_id(id)? else {
            return Ok(None);
        };
        record.update_attributes(values)?;
        Ok(Some(record))
    }

    /// Bulk update without loading records; no events fire
    pub fn update_all(&self, updates: Row, filter: impl Into<Filter>) -> Result<usize> {
        for name in updates.keys() {
            if !self.has_field(name) {
                return Err(self.unknown_field(name));
            }
        }
        let stored = self.coerce_in(&updates)?;
        let filter = filter.into();
        self.engine
            .with_driver(|d| d.update_all(self.collection(), &stored, &filter))
    }

    /// Destroy the record with this id; `false` when there is none
    pub fn destroy(&self, id: impl Into<Value>) -> Result<bool> {
        match self.find_id(id)? {
            Some(record) => record.destroy(),
            None => Ok(false),
        }
    }

    /// Destroy every record one by one so observers fire
    pub fn destroy_all(&self) -> Result<usize> {
        let mut destroyed = 0;
        for record in self.fetch(&QueryParams::new())? {
            if record.destroy()? {
                destroyed += 1;
            }
        }
        Ok(destroyed)
    }

    pub fn transaction<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        self.engine.transaction(f)
    }

    // ----- validation -----

    pub fn add_validator<F>(&self, validator: F)
    where
        F: Fn(&Record) -> Result<()> + 'static,
    {
        self.schema.validators.borrow_mut().push(Rc::new(validator));
    }

    /// Runs after the validators on every save
    pub fn set_validity_hook<F>(&self, hook: F)
    where
        F: Fn(&Record) -> Result<()> + 'static,
    {
        let hook: Validator = Rc::new(hook);
        *self.schema.validity_hook.borrow_mut() = Some(hook);
    }

    pub fn validates_presence_of(&self, field: &str, message: Option<&str>) {
        self.schema
            .validators
            .borrow_mut()
            .push(presence_of(field, message));
    }

    pub fn validates_length_of(&self, field: &str, options: LengthOptions) {
        self.schema
            .validators
            .borrow_mut()
            .push(length_of(field, options));
    }

    // ----- events -----

    /// Observe every record of this model
    pub fn observe<F>(&self, event: LifecycleEvent, observer: F) -> ObserverId
    where
        F: Fn(&Record) -> Result<Outcome> + 'static,
    {
        self.schema.events.observe(event, observer)
    }

    pub fn observe_once<F>(&self, event: LifecycleEvent, observer: F) -> ObserverId
    where
        F: Fn(&Record) -> Result<Outcome> + 'static,
    {
        self.schema.events.observe_once(event, observer)
    }

    pub fn stop_observing(&self, event: LifecycleEvent, id: Option<ObserverId>) -> usize {
        self.schema.events.stop_observing(event, id)
    }

    /// Observe `afterFind` on multi-row finds
    pub fn observe_find<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&ResultSet) -> Result<Outcome> + 'static,
    {
        self.schema.find_events.observe(LifecycleEvent::AfterFind, observer)
    }

    pub fn stop_observing_find(&self, id: Option<ObserverId>) -> usize {
        self.schema
            .find_events
            .stop_observing(LifecycleEvent::AfterFind, id)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name())
            .field("collection", &self.collection())
            .field("primary_key", &self.primary_key())
            .finish()
    }
}
