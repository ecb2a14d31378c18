//! The engine: driver connection, model registry and synchronization state
//!
//! Engines are single-threaded handles; clones share one state. Several
//! engines may live in one process without sharing anything.

use crate::config::EngineConfig;
use crate::driver::{Driver, MemoryDriver};
use crate::errors::{QuarryError, Result};
use crate::model::Model;
use crate::schema::{ModelDefinition, ModelRegistry, ModelSchema};
use crate::sync::SyncRegistry;
use crate::{log_op_end, log_op_error, log_op_start};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

struct EngineInner {
    config: EngineConfig,
    driver: RefCell<Option<Box<dyn Driver>>>,
    registry: RefCell<ModelRegistry>,
    sync: RefCell<SyncRegistry>,
    identities: Cell<u64>,
    versions: RefCell<Option<Rc<ModelSchema>>>,
}

#[derive(Clone)]
pub struct Engine {
    inner: Rc<EngineInner>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    /// An engine with no driver; connect one before defining models
    pub fn new(config: EngineConfig) -> Self {
        Self {
            inner: Rc::new(EngineInner {
                config,
                driver: RefCell::new(None),
                registry: RefCell::new(ModelRegistry::new()),
                sync: RefCell::new(SyncRegistry::default()),
                identities: Cell::new(0),
                versions: RefCell::new(None),
            }),
        }
    }

    /// Default configuration over a fresh `MemoryDriver`
    pub fn in_memory() -> Self {
        let engine = Self::default();
        engine.connect(MemoryDriver::new());
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Attach a driver, replacing any previous one
    pub fn connect(&self, driver: impl Driver + 'static) {
        self.connect_boxed(Box::new(driver));
    }

    /// Attach a driver after handing it this engine's configuration
    pub fn connect_boxed(&self, mut driver: Box<dyn Driver>) {
        driver.configure(self.config());
        tracing::debug!(driver = driver.name(), "driver connected");
        *self.inner.driver.borrow_mut() = Some(driver);
    }

    /// Detach and return the driver
    pub fn disconnect(&self) -> Option<Box<dyn Driver>> {
        self.inner.driver.borrow_mut().take()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.driver.borrow().is_some()
    }

    pub fn driver_name(&self) -> Option<&'static str> {
        self.inner.driver.borrow().as_ref().map(|d| d.name())
    }

    /// Run `f` against the connected driver
    pub fn with_driver<R>(&self, f: impl FnOnce(&mut dyn Driver) -> Result<R>) -> Result<R> {
        let mut slot = self
            .inner
            .driver
            .try_borrow_mut()
            .map_err(|_| QuarryError::Internal {
                message: "driver is already in use".to_string(),
            })?;
        let driver = slot.as_mut().ok_or(QuarryError::ConnectionNotEstablished)?;
        f(driver.as_mut())
    }

    pub(crate) fn sync_registry(&self) -> &RefCell<SyncRegistry> {
        &self.inner.sync
    }

    pub(crate) fn next_identity(&self) -> u64 {
        let next = self.inner.identities.get() + 1;
        self.inner.identities.set(next);
        next
    }

    /// Live synchronized instances in a collection
    pub fn synchronized_count(&self, collection: &str) -> usize {
        self.inner
            .sync
            .borrow()
            .synchronized_record_count(collection)
    }

    // ----- models -----

    /// Resolve, register and (with `auto_migrate`) create the table for a model
    pub fn define_model(&self, definition: ModelDefinition) -> Result<Model> {
        log_op_start!("define_model", collection = definition.collection());
        let start = Instant::now();

        let model = self.define_model_impl(&definition).map_err(|e| {
            log_op_error!(
                "define_model",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                collection = definition.collection()
            );
            e
        })?;

        log_op_end!(
            "define_model",
            duration_ms = start.elapsed().as_millis() as u64,
            model = model.name(),
            collection = model.collection()
        );
        Ok(model)
    }

    fn define_model_impl(&self, definition: &ModelDefinition) -> Result<Model> {
        if !self.is_connected() {
            return Err(QuarryError::ConnectionNotEstablished);
        }
        let schema = Rc::new(ModelSchema::from_definition(definition)?);
        if self.config().auto_migrate {
            self.with_driver(|d| {
                d.create_table(schema.collection(), schema.primary_key(), schema.fields())
            })?;
        }
        if self
            .inner
            .registry
            .borrow_mut()
            .register(schema.clone())
            .is_some()
        {
            tracing::warn!(model = schema.name(), "model redefined");
        }
        Ok(Model::new(self.clone(), schema))
    }

    /// Look up a defined model by model or collection name
    pub fn model(&self, name: &str) -> Result<Model> {
        let schema = self
            .inner
            .registry
            .borrow()
            .get(name)
            .ok_or_else(|| QuarryError::UnknownModel {
                model: name.to_string(),
            })?;
        Ok(Model::new(self.clone(), schema))
    }

    pub fn model_names(&self) -> Vec<String> {
        self.inner.registry.borrow().names()
    }

    /// Unregistered model over the migrations table; its table is always created
    pub(crate) fn version_model(&self) -> Result<Model> {
        if let Some(schema) = self.inner.versions.borrow().clone() {
            return Ok(Model::new(self.clone(), schema));
        }
        let definition = ModelDefinition::new(self.config().migrations_table.clone())
            .field("version", 0);
        let schema = Rc::new(ModelSchema::from_definition(&definition)?);
        self.with_driver(|d| {
            d.create_table(schema.collection(), schema.primary_key(), schema.fields())
        })?;
        *self.inner.versions.borrow_mut() = Some(schema.clone());
        Ok(Model::new(self.clone(), schema))
    }

    // ----- transactions -----

    /// Run `f` in a driver transaction; an `Err` rolls back and is returned
    pub fn transaction<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        log_op_start!("transaction");
        let start = Instant::now();
        self.with_driver(|d| d.begin())?;

        match f() {
            Ok(value) => {
                self.with_driver(|d| d.commit())?;
                log_op_end!("transaction", duration_ms = start.elapsed().as_millis() as u64);
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.with_driver(|d| d.rollback()) {
                    tracing::error!(error = %rollback, "rollback failed");
                }
                log_op_error!(
                    "transaction",
                    e.clone(),
                    duration_ms = start.elapsed().as_millis() as u64
                );
                Err(e)
            }
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("driver", &self.driver_name())
            .field("models", &self.model_names())
            .finish()
    }
}
