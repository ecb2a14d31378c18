//! Ordered query results

use crate::errors::Result;
use crate::model::Model;
use crate::query::QueryParams;
use crate::record::Record;
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

pub(crate) struct ResultSetInner {
    model: Model,
    params: QueryParams,
    records: RefCell<Vec<Record>>,
    sync_id: Cell<Option<u64>>,
}

/// Records returned by a multi-row find, with the params that produced them
#[derive(Clone)]
pub struct ResultSet {
    inner: Rc<ResultSetInner>,
}

impl ResultSet {
    pub(crate) fn new(model: Model, params: QueryParams, records: Vec<Record>) -> Self {
        Self {
            inner: Rc::new(ResultSetInner {
                model,
                params,
                records: RefCell::new(records),
                sync_id: Cell::new(None),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<ResultSetInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<ResultSetInner>) -> Option<ResultSet> {
        weak.upgrade().map(|inner| ResultSet { inner })
    }

    pub fn model(&self) -> &Model {
        &self.inner.model
    }

    pub fn params(&self) -> &QueryParams {
        &self.inner.params
    }

    pub fn records(&self) -> Vec<Record> {
        self.inner.records.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Record> {
        self.inner.records.borrow().get(index).cloned()
    }

    pub fn first(&self) -> Option<Record> {
        self.get(0)
    }

    pub fn ids(&self) -> Vec<Value> {
        self.inner
            .records
            .borrow()
            .iter()
            .filter_map(Record::id)
            .collect()
    }

    /// Re-run the query and replace the records in place
    pub fn reload(&self) -> Result<()> {
        let records = self.model().fetch(self.params())?;
        if self.is_synchronized() {
            for record in &records {
                record.synchronize();
            }
        }
        *self.inner.records.borrow_mut() = records;
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.inner
                .records
                .borrow()
                .iter()
                .map(Record::to_json)
                .collect(),
        )
    }

    pub fn is_synchronized(&self) -> bool {
        self.inner.sync_id.get().is_some()
    }

    pub(crate) fn set_sync_id(&self, id: Option<u64>) {
        self.inner.sync_id.set(id);
    }

    /// Stop synchronizing the set and its records
    pub fn stop(&self) {
        if let Some(id) = self.inner.sync_id.take() {
            self.model()
                .engine()
                .sync_registry()
                .borrow_mut()
                .unregister_result_set(self.model().collection(), id);
        }
        for record in self.records() {
            record.stop_synchronizing();
        }
    }

    pub(crate) fn insert(&self, index: usize, record: Record) {
        let mut records = self.inner.records.borrow_mut();
        let index = index.min(records.len());
        records.insert(index, record);
    }

    pub(crate) fn remove(&self, index: usize) -> Option<Record> {
        let mut records = self.inner.records.borrow_mut();
        (index < records.len()).then(|| records.remove(index))
    }
}

impl IntoIterator for &ResultSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records().into_iter()
    }
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("model", &self.model().name())
            .field("params", self.params())
            .field("len", &self.len())
            .field("synchronized", &self.is_synchronized())
            .finish()
    }
}
