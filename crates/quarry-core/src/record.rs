//! Record instances and their lifecycle
//!
//! A [`Record`] is a cheap handle; clones share the same values, errors
//! and observers. Saving runs the pipeline:
//!
//! 1. validators, then the validity hook (errors abort with `Ok(false)`)
//! 2. `beforeSave`, and `beforeCreate` for new records (a veto aborts)
//! 3. timestamp stamping and outbound coercion
//! 4. insert or update through the driver
//! 5. inbound coercion back onto the record
//! 6. synchronization, then `afterCreate` and `afterSave`

use crate::engine::Engine;
use crate::errors::{QuarryError, Result};
use crate::events::{EventHub, LifecycleEvent, ObserverId, Outcome};
use crate::model::Model;
use crate::sync;
use crate::value::{row_to_json, Row, Value};
use crate::{log_op_end, log_op_error, log_op_start};
use chrono::Timelike;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Instant;

pub(crate) struct RecordInner {
    model: Model,
    identity: u64,
    values: RefCell<Row>,
    errors: RefCell<Vec<String>>,
    events: EventHub<Record>,
    destroyed: Cell<bool>,
    synchronized: Cell<bool>,
}

#[derive(Clone)]
pub struct Record {
    inner: Rc<RecordInner>,
}

impl Record {
    pub(crate) fn new(model: Model, values: Row) -> Self {
        let identity = model.engine().next_identity();
        Self {
            inner: Rc::new(RecordInner {
                model,
                identity,
                values: RefCell::new(values),
                errors: RefCell::new(Vec::new()),
                events: EventHub::new(),
                destroyed: Cell::new(false),
                synchronized: Cell::new(false),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<RecordInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<RecordInner>) -> Option<Record> {
        weak.upgrade().map(|inner| Record { inner })
    }

    pub fn model(&self) -> &Model {
        &self.inner.model
    }

    pub fn engine(&self) -> &Engine {
        self.inner.model.engine()
    }

    /// Process-unique instance number; distinct for two handles on one row
    pub fn identity(&self) -> u64 {
        self.inner.identity
    }

    /// Whether two handles share one instance
    pub fn ptr_eq(&self, other: &Record) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ----- values -----

    /// Field value; missing fields read as null
    pub fn get(&self, key: &str) -> Value {
        self.inner
            .values
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner
            .values
            .borrow_mut()
            .insert(key.into(), value.into());
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.values.borrow().contains_key(key)
    }

    /// Primary key value, `None` until the record is persisted
    pub fn id(&self) -> Option<Value> {
        let id = self.get(self.model().primary_key());
        (!id.is_null()).then_some(id)
    }

    pub fn is_new(&self) -> bool {
        self.id().is_none()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    pub fn is_synchronized(&self) -> bool {
        self.inner.synchronized.get()
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.values.borrow().keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.inner.values.borrow().values().cloned().collect()
    }

    pub fn to_row(&self) -> Row {
        self.inner.values.borrow().clone()
    }

    pub fn to_json(&self) -> serde_json::Value {
        row_to_json(&self.inner.values.borrow())
    }

    pub(crate) fn replace_values(&self, values: Row) {
        *self.inner.values.borrow_mut() = values;
    }

    pub(crate) fn mark_destroyed(&self) {
        self.inner.destroyed.set(true);
    }

    // ----- validation -----

    pub fn errors(&self) -> Vec<String> {
        self.inner.errors.borrow().clone()
    }

    pub fn add_error(&self, message: impl Into<String>) {
        self.inner.errors.borrow_mut().push(message.into());
    }

    /// Run validators and the validity hook against the current values
    pub fn is_valid(&self) -> Result<bool> {
        self.inner.errors.borrow_mut().clear();
        let schema = self.model().schema();
        let validators = schema.validators.borrow().clone();
        for validator in validators {
            validator(self)?;
        }
        let hook = schema.validity_hook.borrow().clone();
        if let Some(hook) = hook {
            hook(self)?;
        }
        Ok(self.inner.errors.borrow().is_empty())
    }

    // ----- events -----

    pub fn observe<F>(&self, event: LifecycleEvent, observer: F) -> ObserverId
    where
        F: Fn(&Record) -> Result<Outcome> + 'static,
    {
        self.inner.events.observe(event, observer)
    }

    pub fn observe_once<F>(&self, event: LifecycleEvent, observer: F) -> ObserverId
    where
        F: Fn(&Record) -> Result<Outcome> + 'static,
    {
        self.inner.events.observe_once(event, observer)
    }

    pub fn stop_observing(&self, event: LifecycleEvent, id: Option<ObserverId>) -> usize {
        self.inner.events.stop_observing(event, id)
    }

    /// Model-level observers run before this instance's observers
    pub(crate) fn notify(&self, event: LifecycleEvent) -> Result<Outcome> {
        if self.model().schema().events.notify(event, self)?.is_veto() {
            return Ok(Outcome::Veto);
        }
        self.inner.events.notify(event, self)
    }

    // ----- persistence -----

    /// Save the record; `Ok(false)` when validation or an observer stopped it
    pub fn save(&self) -> Result<bool> {
        let model = self.model().name().to_string();
        log_op_start!("save", model = model.as_str());
        let start = Instant::now();

        let saved = self.save_impl().map_err(|e| {
            log_op_error!(
                "save",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                model = model.as_str()
            );
            e
        })?;

        log_op_end!(
            "save",
            duration_ms = start.elapsed().as_millis() as u64,
            model = model.as_str(),
            saved = saved
        );
        Ok(saved)
    }

    fn save_impl(&self) -> Result<bool> {
        if self.is_destroyed() {
            return Err(QuarryError::invalid_input("cannot save a destroyed record"));
        }
        if !self.is_valid()? {
            tracing::debug!(errors = ?self.errors(), "validation failed");
            return Ok(false);
        }
        if self.notify(LifecycleEvent::BeforeSave)?.is_veto() {
            return Ok(false);
        }

        let model = self.model().clone();
        let config = model.engine().config();
        let creating = self.is_new();
        let now = now();
        if creating {
            if self.notify(LifecycleEvent::BeforeCreate)?.is_veto() {
                return Ok(false);
            }
            if model.has_field(&config.created_field) {
                self.set(config.created_field.clone(), now.clone());
            }
        }
        if model.has_field(&config.updated_field) {
            self.set(config.updated_field.clone(), now);
        }

        let mut stored = model.coerce_in(&self.to_row())?;
        let (collection, primary_key) = (model.collection(), model.primary_key());
        if creating {
            let id = model
                .engine()
                .with_driver(|d| d.insert(collection, primary_key, &stored))?;
            stored.insert(primary_key.to_string(), id);
        } else {
            let id = self.get(primary_key);
            model
                .engine()
                .with_driver(|d| d.update(collection, primary_key, &id, &stored))?;
            stored.insert(primary_key.to_string(), id);
        }
        self.replace_values(model.coerce_out(&stored)?);

        if creating {
            sync::after_create(self)?;
            self.notify(LifecycleEvent::AfterCreate)?;
        }
        sync::after_save(self)?;
        self.notify(LifecycleEvent::AfterSave)?;
        Ok(true)
    }

    /// Delete the row; `Ok(false)` for unsaved records or a `beforeDestroy` veto
    pub fn destroy(&self) -> Result<bool> {
        let model = self.model().name().to_string();
        log_op_start!("destroy", model = model.as_str());
        let start = Instant::now();

        let destroyed = self.destroy_impl().map_err(|e| {
            log_op_error!(
                "destroy",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                model = model.as_str()
            );
            e
        })?;

        log_op_end!(
            "destroy",
            duration_ms = start.elapsed().as_millis() as u64,
            model = model.as_str(),
            destroyed = destroyed
        );
        Ok(destroyed)
    }

    fn destroy_impl(&self) -> Result<bool> {
        let Some(id) = self.id() else {
            return Ok(false);
        };
        if self.is_destroyed() {
            return Ok(false);
        }
        if self.notify(LifecycleEvent::BeforeDestroy)?.is_veto() {
            return Ok(false);
        }
        let model = self.model();
        let target = crate::driver::DeleteTarget::Id(id);
        model
            .engine()
            .with_driver(|d| d.delete(model.collection(), model.primary_key(), &target))?;
        self.mark_destroyed();

        sync::after_destroy(self)?;
        self.notify(LifecycleEvent::AfterDestroy)?;
        Ok(true)
    }

    /// Re-read the row; `Ok(false)` when it is unsaved or no longer stored
    pub fn reload(&self) -> Result<bool> {
        let Some(id) = self.id() else {
            return Ok(false);
        };
        let model = self.model();
        let mut rows = model.engine().with_driver(|d| {
            d.find_by_ids(model.collection(), model.primary_key(), std::slice::from_ref(&id))
        })?;
        if rows.is_empty() {
            return Ok(false);
        }
        let row = rows.swap_remove(0);
        self.replace_values(model.coerce_out(&row)?);
        Ok(true)
    }

    pub fn update_attribute(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<bool> {
        self.set(key, value);
        self.save()
    }

    pub fn update_attributes(&self, values: Row) -> Result<bool> {
        for (key, value) in values {
            self.set(key, value);
        }
        self.save()
    }

    // ----- synchronization -----

    /// Mirror saves and destroys made through other instances of this row;
    /// `false` when the record has no primary key
    pub fn synchronize(&self) -> bool {
        let Some(id) = self.id() else {
            return false;
        };
        if !self.is_synchronized() {
            self.engine().sync_registry().borrow_mut().register_record(
                self.model().collection(),
                &id.key(),
                self.identity(),
                self.downgrade(),
            );
            self.inner.synchronized.set(true);
        }
        true
    }

    pub fn stop_synchronizing(&self) {
        if let Some(id) = self.id() {
            self.engine().sync_registry().borrow_mut().unregister_record(
                self.model().collection(),
                &id.key(),
                self.identity(),
            );
        }
        self.inner.synchronized.set(false);
    }
}

/// Second-precision timestamp
fn now() -> Value {
    let now = chrono::Utc::now().naive_utc();
    Value::Date(now.with_nanosecond(0).unwrap_or(now))
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.model().name())
            .field("identity", &self.identity())
            .field("values", &*self.inner.values.borrow())
            .finish()
    }
}
