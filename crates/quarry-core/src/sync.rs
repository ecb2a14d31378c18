//! Live synchronization between instances, result sets and calculations
//!
//! The registry holds weak references only; dropping the last handle of a
//! synchronized record or result set unregisters it on the next pass.

use crate::engine::Engine;
use crate::errors::Result;
use crate::events::LifecycleEvent;
use crate::query::{Aggregate, QueryParams};
use crate::record::{Record, RecordInner};
use crate::result_set::{ResultSet, ResultSetInner};
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

pub type CalculationCallback = Rc<dyn Fn(&Value)>;

#[derive(Clone)]
struct CalculationEntry {
    aggregate: Aggregate,
    params: QueryParams,
    callback: CalculationCallback,
}

#[derive(Default)]
pub(crate) struct SyncRegistry {
    /// collection -> primary key -> record identity -> record
    records: HashMap<String, HashMap<String, BTreeMap<u64, Weak<RecordInner>>>>,
    result_sets: HashMap<String, BTreeMap<u64, Weak<ResultSetInner>>>,
    calculations: HashMap<String, BTreeMap<u64, CalculationEntry>>,
    next_id: u64,
}

impl SyncRegistry {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn register_record(
        &mut self,
        collection: &str,
        key: &str,
        identity: u64,
        record: Weak<RecordInner>,
    ) {
        self.records
            .entry(collection.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .insert(identity, record);
    }

    pub(crate) fn unregister_record(&mut self, collection: &str, key: &str, identity: u64) {
        if let Some(by_key) = self.records.get_mut(collection) {
            if let Some(instances) = by_key.get_mut(key) {
                instances.remove(&identity);
                if instances.is_empty() {
                    by_key.remove(key);
                }
            }
        }
    }

    /// Live synchronized instances of one row, except `identity`
    fn peers(&mut self, collection: &str, key: &str, identity: u64) -> Vec<Record> {
        let Some(instances) = self
            .records
            .get_mut(collection)
            .and_then(|by_key| by_key.get_mut(key))
        else {
            return Vec::new();
        };
        instances.retain(|_, weak| weak.strong_count() > 0);
        instances
            .iter()
            .filter(|(id, _)| **id != identity)
            .filter_map(|(_, weak)| Record::upgrade(weak))
            .collect()
    }

    pub(crate) fn register_result_set(&mut self, collection: &str, set: Weak<ResultSetInner>) -> u64 {
        let id = self.allocate_id();
        self.result_sets
            .entry(collection.to_string())
            .or_default()
            .insert(id, set);
        id
    }

    pub(crate) fn unregister_result_set(&mut self, collection: &str, id: u64) {
        if let Some(sets) = self.result_sets.get_mut(collection) {
            sets.remove(&id);
        }
    }

    fn result_sets(&mut self, collection: &str) -> Vec<ResultSet> {
        let Some(sets) = self.result_sets.get_mut(collection) else {
            return Vec::new();
        };
        sets.retain(|_, weak| weak.strong_count() > 0);
        sets.values().filter_map(ResultSet::upgrade).collect()
    }

    fn register_calculation(&mut self, collection: &str, entry: CalculationEntry) -> u64 {
        let id = self.allocate_id();
        self.calculations
            .entry(collection.to_string())
            .or_default()
            .insert(id, entry);
        id
    }

    fn unregister_calculation(&mut self, collection: &str, id: u64) -> bool {
        self.calculations
            .get_mut(collection)
            .is_some_and(|entries| entries.remove(&id).is_some())
    }

    fn calculations(&self, collection: &str) -> Vec<CalculationEntry> {
        self.calculations
            .get(collection)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn synchronized_record_count(&self, collection: &str) -> usize {
        self.records.get(collection).map_or(0, |by_key| {
            by_key
                .values()
                .flat_map(|instances| instances.values())
                .filter(|weak| weak.strong_count() > 0)
                .count()
        })
    }
}

/// Handle for a live calculation registered with `Model::synchronize_calculation`
#[derive(Debug)]
pub struct CalculationSubscription {
    engine: Engine,
    collection: String,
    id: u64,
}

impl CalculationSubscription {
    /// Stop recomputing; returns `false` if already stopped
    pub fn stop(&self) -> bool {
        self.engine
            .sync_registry()
            .borrow_mut()
            .unregister_calculation(&self.collection, self.id)
    }
}

pub(crate) fn subscribe_calculation(
    engine: &Engine,
    collection: &str,
    aggregate: Aggregate,
    params: QueryParams,
    callback: CalculationCallback,
) -> CalculationSubscription {
    let id = engine.sync_registry().borrow_mut().register_calculation(
        collection,
        CalculationEntry {
            aggregate,
            params,
            callback,
        },
    );
    CalculationSubscription {
        engine: engine.clone(),
        collection: collection.to_string(),
        id,
    }
}

/// Copy a saved record's values into its synchronized peers
pub(crate) fn after_save(writer: &Record) -> Result<()> {
    let Some(id) = writer.id() else {
        return Ok(());
    };
    let model = writer.model();
    let peers = model.engine().sync_registry().borrow_mut().peers(
        model.collection(),
        &id.key(),
        writer.identity(),
    );
    if peers.is_empty() {
        return Ok(());
    }
    tracing::debug!(
        collection = model.collection(),
        id = %id,
        peers = peers.len(),
        "synchronizing saved record"
    );
    let values = writer.to_row();
    for peer in peers {
        peer.replace_values(values.clone());
        peer.notify(LifecycleEvent::SynchronizedSave)?;
    }
    Ok(())
}

pub(crate) fn after_create(created: &Record) -> Result<()> {
    refresh_collection(created, Change::Created)
}

pub(crate) fn after_destroy(destroyed: &Record) -> Result<()> {
    refresh_collection(destroyed, Change::Destroyed)?;

    let Some(id) = destroyed.id() else {
        return Ok(());
    };
    let model = destroyed.model();
    let key = id.key();
    let peers = model.engine().sync_registry().borrow_mut().peers(
        model.collection(),
        &key,
        destroyed.identity(),
    );
    for peer in peers {
        peer.notify(LifecycleEvent::SynchronizedDestroy)?;
        peer.mark_destroyed();
        model.engine().sync_registry().borrow_mut().unregister_record(
            model.collection(),
            &key,
            peer.identity(),
        );
    }
    if destroyed.is_synchronized() {
        destroyed.stop_synchronizing();
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Created,
    Destroyed,
}

fn refresh_collection(changed: &Record, change: Change) -> Result<()> {
    let model = changed.model();
    let collection = model.collection();
    let engine = model.engine();

    let calculations = engine.sync_registry().borrow().calculations(collection);
    for entry in calculations {
        let value = model.calculate(entry.aggregate.clone(), entry.params.clone())?;
        (entry.callback)(&value);
    }

    let sets = engine.sync_registry().borrow_mut().result_sets(collection);
    for set in sets {
        splice(&set, change)?;
    }
    Ok(())
}

/// Re-run the set's query and apply the first difference
fn splice(set: &ResultSet, change: Change) -> Result<()> {
    let fresh = set.model().fetch(set.params())?;
    let current = set.records();
    let key_at = |records: &[Record], i: usize| records.get(i).and_then(Record::id).map(|v| v.key());

    match change {
        Change::Created => {
            if let Some(i) = (0..fresh.len()).find(|&i| key_at(current.as_slice(), i) != key_at(fresh.as_slice(), i)) {
                let record = fresh[i].clone();
                record.synchronize();
                set.insert(i, record);
            }
        }
        Change::Destroyed => {
            if let Some(i) = (0..current.len()).find(|&i| key_at(fresh.as_slice(), i) != key_at(current.as_slice(), i)) {
                set.remove(i);
            }
        }
    }
    Ok(())
}
