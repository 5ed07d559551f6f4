//! In-process reference backend.
//!
//! Holds every partition in one map behind a `parking_lot` lock, which makes
//! per-key atomicity trivial. Used by tests, demos, and single-node workers;
//! real deployments implement [`KvBackend`] against an external store.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;

use super::{KeyType, KvBackend, PartitionSpec, Predicates};
use crate::error::{GraphError, Result};
use crate::model::{Key, Record, Value};

/// Tuning knobs for [`MemoryBackend`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryOptions {
    /// When set, operations against a freshly created partition fail as
    /// unavailable until `await_ready` is called, mimicking a backend whose
    /// schema changes propagate asynchronously. Tests use this to exercise
    /// the stabilization retry path.
    pub settle_before_ready: bool,
}

struct Partition {
    spec: PartitionSpec,
    rows: BTreeMap<Key, Record>,
    ready: bool,
}

/// In-memory [`KvBackend`] implementation.
pub struct MemoryBackend {
    partitions: RwLock<BTreeMap<String, Partition>>,
    opts: MemoryOptions,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Creates a backend whose partitions are ready as soon as created.
    pub fn new() -> Self {
        Self::with_options(MemoryOptions::default())
    }

    /// Creates a backend with explicit options.
    pub fn with_options(opts: MemoryOptions) -> Self {
        Self {
            partitions: RwLock::new(BTreeMap::new()),
            opts,
        }
    }

    fn read_partition<T>(
        &self,
        name: &str,
        f: impl FnOnce(&Partition) -> Result<T>,
    ) -> Result<T> {
        let guard = self.partitions.read();
        let part = guard
            .get(name)
            .ok_or_else(|| GraphError::unavailable(format!("unknown partition: {name}")))?;
        if !part.ready {
            return Err(GraphError::unavailable(format!(
                "partition not yet stable: {name}"
            )));
        }
        f(part)
    }

    fn write_partition<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Partition) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.partitions.write();
        let part = guard
            .get_mut(name)
            .ok_or_else(|| GraphError::unavailable(format!("unknown partition: {name}")))?;
        if !part.ready {
            return Err(GraphError::unavailable(format!(
                "partition not yet stable: {name}"
            )));
        }
        f(part)
    }
}

fn check_key(part: &Partition, key: &Key) -> Result<()> {
    let ok = matches!(
        (part.spec.key, key),
        (KeyType::Int, Key::Int(_)) | (KeyType::Str, Key::Str(_))
    );
    if ok {
        Ok(())
    } else {
        Err(GraphError::invalid_argument(format!(
            "key {key} does not match the key type of partition {}",
            part.spec.name
        )))
    }
}

fn missing_record(partition: &str, key: &Key) -> GraphError {
    match key.as_int() {
        Some(uid) => GraphError::element_not_found(uid, partition),
        None => GraphError::invalid_argument(format!("no record {key} in {partition}")),
    }
}

fn record_mut<'a>(part: &'a mut Partition, partition: &str, key: &Key) -> Result<&'a mut Record> {
    part.rows
        .get_mut(key)
        .ok_or_else(|| missing_record(partition, key))
}

fn matches(record: &Record, predicates: &Predicates) -> bool {
    predicates
        .iter()
        .all(|(field, expected)| record.get(field) == Some(expected))
}

impl KvBackend for MemoryBackend {
    fn get(&self, partition: &str, key: &Key) -> Result<Option<Record>> {
        self.read_partition(partition, |part| Ok(part.rows.get(key).cloned()))
    }

    fn put(&self, partition: &str, key: &Key, record: Record) -> Result<()> {
        self.write_partition(partition, |part| {
            check_key(part, key)?;
            part.rows.insert(key.clone(), record);
            Ok(())
        })
    }

    fn delete(&self, partition: &str, key: &Key) -> Result<bool> {
        self.write_partition(partition, |part| Ok(part.rows.remove(key).is_some()))
    }

    fn map_add(
        &self,
        partition: &str,
        key: &Key,
        field: &str,
        entries: &BTreeMap<i64, String>,
    ) -> Result<()> {
        self.write_partition(partition, |part| {
            let record = record_mut(part, partition, key)?;
            let slot = record
                .entry(field.to_string())
                .or_insert_with(|| Value::IntStrMap(BTreeMap::new()));
            match slot {
                Value::IntStrMap(map) => {
                    for (k, v) in entries {
                        map.insert(*k, v.clone());
                    }
                    Ok(())
                }
                _ => Err(GraphError::invalid_argument(format!(
                    "field {field} in {partition} is not a map"
                ))),
            }
        })
    }

    fn map_remove(&self, partition: &str, key: &Key, field: &str, map_keys: &[i64]) -> Result<()> {
        self.write_partition(partition, |part| {
            let record = record_mut(part, partition, key)?;
            match record.get_mut(field) {
                Some(Value::IntStrMap(map)) => {
                    for k in map_keys {
                        map.remove(k);
                    }
                    Ok(())
                }
                Some(_) => Err(GraphError::invalid_argument(format!(
                    "field {field} in {partition} is not a map"
                ))),
                None => Ok(()),
            }
        })
    }

    fn set_add(&self, partition: &str, key: &Key, field: &str, value: &Value) -> Result<()> {
        self.write_partition(partition, |part| {
            let record = record_mut(part, partition, key)?;
            let slot = record.entry(field.to_string()).or_insert_with(|| match value {
                Value::Int(_) => Value::IntSet(Default::default()),
                _ => Value::StrSet(Default::default()),
            });
            match (slot, value) {
                (Value::IntSet(set), Value::Int(v)) => {
                    set.insert(*v);
                    Ok(())
                }
                (Value::StrSet(set), Value::Str(v)) => {
                    set.insert(v.clone());
                    Ok(())
                }
                _ => Err(GraphError::invalid_argument(format!(
                    "field {field} in {partition} is not a compatible set"
                ))),
            }
        })
    }

    fn set_remove(&self, partition: &str, key: &Key, field: &str, value: &Value) -> Result<()> {
        self.write_partition(partition, |part| {
            let record = record_mut(part, partition, key)?;
            match (record.get_mut(field), value) {
                (Some(Value::IntSet(set)), Value::Int(v)) => {
                    set.remove(v);
                    Ok(())
                }
                (Some(Value::StrSet(set)), Value::Str(v)) => {
                    set.remove(v);
                    Ok(())
                }
                (None, _) => Ok(()),
                _ => Err(GraphError::invalid_argument(format!(
                    "field {field} in {partition} is not a compatible set"
                ))),
            }
        })
    }

    fn atomic_increment(
        &self,
        partition: &str,
        key: &Key,
        field: &str,
        delta: i64,
    ) -> Result<i64> {
        self.write_partition(partition, |part| {
            let record = record_mut(part, partition, key)?;
            match record.get_mut(field) {
                Some(Value::Int(v)) => {
                    *v += delta;
                    Ok(*v)
                }
                _ => Err(GraphError::invalid_argument(format!(
                    "field {field} in {partition} is not an integer"
                ))),
            }
        })
    }

    fn put_if_absent(&self, partition: &str, key: &Key, record: Record) -> Result<bool> {
        self.write_partition(partition, |part| {
            check_key(part, key)?;
            if part.rows.contains_key(key) {
                return Ok(false);
            }
            part.rows.insert(key.clone(), record);
            Ok(true)
        })
    }

    fn create_partition(&self, spec: PartitionSpec) -> Result<()> {
        let mut guard = self.partitions.write();
        if guard.contains_key(&spec.name) {
            return Ok(());
        }
        debug!(partition = %spec.name, "memory.partition.create");
        let name = spec.name.clone();
        guard.insert(
            name,
            Partition {
                spec,
                rows: BTreeMap::new(),
                ready: !self.opts.settle_before_ready,
            },
        );
        Ok(())
    }

    fn drop_partition(&self, partition: &str) -> Result<()> {
        let mut guard = self.partitions.write();
        guard.remove(partition).ok_or_else(|| {
            GraphError::unavailable(format!("unknown partition: {partition}"))
        })?;
        debug!(partition, "memory.partition.drop");
        Ok(())
    }

    fn scan(&self, partition: &str, predicates: &Predicates) -> Result<Vec<(Key, Record)>> {
        self.read_partition(partition, |part| {
            Ok(part
                .rows
                .iter()
                .filter(|(_, record)| matches(record, predicates))
                .map(|(key, record)| (key.clone(), record.clone()))
                .collect())
        })
    }

    fn count(&self, partition: &str, predicates: &Predicates) -> Result<u64> {
        self.read_partition(partition, |part| {
            Ok(part
                .rows
                .values()
                .filter(|record| matches(record, predicates))
                .count() as u64)
        })
    }

    fn await_ready(&self, partition: &str) -> Result<()> {
        let mut guard = self.partitions.write();
        let part = guard.get_mut(partition).ok_or_else(|| {
            GraphError::unavailable(format!("unknown partition: {partition}"))
        })?;
        part.ready = true;
        Ok(())
    }
}
