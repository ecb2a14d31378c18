//! Finders and calculations on `Model`

use crate::errors::Result;
use crate::events::LifecycleEvent;
use crate::model::Model;
use crate::query::{Aggregate, Found, Lookup, QueryParams};
use crate::record::Record;
use crate::result_set::ResultSet;
use crate::sync::{subscribe_calculation, CalculationSubscription};
use crate::value::Value;
use crate::{log_op_end, log_op_error, log_op_start};
use std::rc::Rc;
use std::time::Instant;

impl Model {
    /// Find by id, by ids, or by query
    ///
    /// ```
    /// # use quarry_core::{row, Engine, Found, ModelDefinition};
    /// let engine = Engine::in_memory();
    /// let users = engine.define_model(ModelDefinition::new("users").field("name", "")).unwrap();
    /// users.create(row! { "name" => "ada" }).unwrap();
    ///
    /// assert!(matches!(users.find(1).unwrap(), Found::One(Some(_))));
    /// assert!(matches!(users.find("1").unwrap(), Found::One(Some(_))));
    /// assert_eq!(users.find("name = 'ada'").unwrap().many().len(), 1);
    /// ```
    pub fn find(&self, lookup: impl Into<Lookup>) -> Result<Found> {
        match lookup.into() {
            Lookup::Id(id) => Ok(Found::One(self.find_id(id)?)),
            Lookup::Ids(ids) => Ok(Found::Many(self.find_ids(&ids)?)),
            Lookup::Params(params) => Ok(Found::Many(self.find_all(params)?)),
        }
    }

    pub fn find_id(&self, id: impl Into<Value>) -> Result<Option<Record>> {
        let id = id.into();
        let rows = self.engine().with_driver(|d| {
            d.find_by_ids(self.collection(), self.primary_key(), std::slice::from_ref(&id))
        })?;
        rows.into_iter()
            .next()
            .map(|row| self.instantiate(row))
            .transpose()
    }

    /// Records for `ids`, in the order given; unknown ids are skipped
    pub fn find_ids(&self, ids: &[Value]) -> Result<ResultSet> {
        let rows = self
            .engine()
            .with_driver(|d| d.find_by_ids(self.collection(), self.primary_key(), ids))?;
        let records = rows
            .into_iter()
            .map(|row| self.instantiate(row))
            .collect::<Result<Vec<_>>>()?;
        self.finish_find(QueryParams::new(), records)
    }

    pub fn find_all(&self, params: impl Into<QueryParams>) -> Result<ResultSet> {
        let params = params.into();
        log_op_start!("find", model = self.name());
        let start = Instant::now();

        let set = self
            .fetch(&params)
            .and_then(|records| self.finish_find(params, records))
            .map_err(|e| {
                log_op_error!(
                    "find",
                    e.clone(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    model = self.name()
                );
                e
            })?;

        log_op_end!(
            "find",
            duration_ms = start.elapsed().as_millis() as u64,
            model = self.name(),
            row_count = set.len()
        );
        Ok(set)
    }

    /// Run a query and instantiate the rows, without events or registration
    pub(crate) fn fetch(&self, params: &QueryParams) -> Result<Vec<Record>> {
        let rows = self
            .engine()
            .with_driver(|d| d.find(self.collection(), params))?;
        rows.into_iter().map(|row| self.instantiate(row)).collect()
    }

    /// Wrap fetched records: register for synchronization when asked, then
    /// notify `afterFind` observers
    pub(crate) fn finish_find(&self, params: QueryParams, records: Vec<Record>) -> Result<ResultSet> {
        let synchronize = params.synchronize;
        let set = ResultSet::new(self.clone(), params, records);
        if synchronize {
            let id = self
                .engine()
                .sync_registry()
                .borrow_mut()
                .register_result_set(self.collection(), set.downgrade());
            set.set_sync_id(Some(id));
            for record in set.records() {
                record.synchronize();
            }
        }
        self.schema()
            .find_events
            .notify(LifecycleEvent::AfterFind, &set)?;
        Ok(set)
    }

    /// First match of a query
    pub fn find_first(&self, params: impl Into<QueryParams>) -> Result<Option<Record>> {
        Ok(self.find_all(params.into().limit(1))?.first())
    }

    /// Lowest primary key
    pub fn first(&self) -> Result<Option<Record>> {
        self.find_first(QueryParams::new().order(format!("{} ASC", self.primary_key())))
    }

    /// Highest primary key
    pub fn last(&self) -> Result<Option<Record>> {
        self.find_first(QueryParams::new().order(format!("{} DESC", self.primary_key())))
    }

    /// Raw SELECT with `?` placeholders
    pub fn find_by_sql(&self, sql: &str, args: &[Value]) -> Result<ResultSet> {
        let rows = self.engine().with_driver(|d| d.find_by_sql(sql, args))?;
        let records = rows
            .into_iter()
            .map(|row| self.instantiate(row))
            .collect::<Result<Vec<_>>>()?;
        self.finish_find(QueryParams::new(), records)
    }

    fn finder_params(&self, field: &str, value: Value, extra: QueryParams) -> Result<QueryParams> {
        if !self.has_field(field) {
            return Err(self.unknown_field(field));
        }
        let mut params = extra;
        params.filter = params.filter.merge_equality(field, value)?;
        Ok(params)
    }

    /// First record whose `field` equals `value`
    pub fn find_by(&self, field: &str, value: impl Into<Value>) -> Result<Option<Record>> {
        self.find_by_with(field, value, QueryParams::new())
    }

    pub fn find_by_with(
        &self,
        field: &str,
        value: impl Into<Value>,
        extra: QueryParams,
    ) -> Result<Option<Record>> {
        let params = self.finder_params(field, value.into(), extra)?;
        self.find_first(params)
    }

    /// Every record whose `field` equals `value`
    pub fn find_all_by(&self, field: &str, value: impl Into<Value>) -> Result<ResultSet> {
        self.find_all_by_with(field, value, QueryParams::new())
    }

    pub fn find_all_by_with(
        &self,
        field: &str,
        value: impl Into<Value>,
        extra: QueryParams,
    ) -> Result<ResultSet> {
        let params = self.finder_params(field, value.into(), extra)?;
        self.find_all(params)
    }

    // ----- calculations -----

    pub fn calculate(&self, aggregate: Aggregate, params: impl Into<QueryParams>) -> Result<Value> {
        let params = params.into();
        self.engine()
            .with_driver(|d| d.calculate(self.collection(), &params, &aggregate))
    }

    pub fn count(&self, params: impl Into<QueryParams>) -> Result<u64> {
        let value = self.calculate(Aggregate::Count, params)?;
        Ok(value.as_i64().unwrap_or(0).max(0) as u64)
    }

    pub fn sum(&self, column: &str, params: impl Into<QueryParams>) -> Result<Value> {
        self.calculate(Aggregate::Sum(column.to_string()), params)
    }

    pub fn average(&self, column: &str, params: impl Into<QueryParams>) -> Result<Value> {
        self.calculate(Aggregate::Average(column.to_string()), params)
    }

    pub fn minimum(&self, column: &str, params: impl Into<QueryParams>) -> Result<Value> {
        self.calculate(Aggregate::Min(column.to_string()), params)
    }

    pub fn maximum(&self, column: &str, params: impl Into<QueryParams>) -> Result<Value> {
        self.calculate(Aggregate::Max(column.to_string()), params)
    }

    /// Compute an aggregate now and again after every create or destroy in
    /// this collection, passing each value to `callback`
    pub fn synchronize_calculation<F>(
        &self,
        aggregate: Aggregate,
        params: impl Into<QueryParams>,
        callback: F,
    ) -> Result<CalculationSubscription>
    where
        F: Fn(&Value) + 'static,
    {
        let mut params = params.into();
        params.synchronize = false;
        let initial = self.calculate(aggregate.clone(), params.clone())?;
        callback(&initial);
        Ok(subscribe_calculation(
            self.engine(),
            self.collection(),
            aggregate,
            params,
            Rc::new(callback),
        ))
    }
}
