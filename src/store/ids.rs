//! Globally unique element identifiers.
//!
//! One shared counter record per graph, advanced with the backend's atomic
//! increment so allocation is safe under concurrent callers from any number
//! of worker processes. Identifiers of removed elements are parked in an
//! obsolete-id pool; consuming the pool is opt-in, the default path is pure
//! increment so uniqueness stays trivially provable.

use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{ensure_partition, FieldType, KeyType, KvBackend, PartitionSpec};
use crate::error::Result;
use crate::model::{Key, Record, Value, COUNTER_SEED};
use crate::store::with_stabilize;

const COUNTER_FIELD: &str = "value";
const POOL_FIELD: &str = "value";
const OBSOLETE_KEY: &str = "obsolete_ids";

/// Issues globally unique, monotonically increasing element identifiers.
pub struct IdAllocator {
    backend: Arc<dyn KvBackend>,
    graph: String,
    counter_partition: String,
    pool_partition: String,
    recycle: bool,
}

impl IdAllocator {
    /// Opens the allocator for a graph, creating its backing partitions and
    /// seeding the obsolete-id pool record on first use.
    pub fn open(backend: Arc<dyn KvBackend>, graph: &str, recycle: bool) -> Result<Self> {
        let allocator = Self {
            counter_partition: format!("{graph}_id"),
            pool_partition: format!("{graph}_id_sys"),
            graph: graph.to_string(),
            backend,
            recycle,
        };
        ensure_partition(
            allocator.backend.as_ref(),
            PartitionSpec::new(allocator.counter_partition.as_str(), KeyType::Str)
                .field(COUNTER_FIELD, FieldType::Int),
        )?;
        ensure_partition(
            allocator.backend.as_ref(),
            PartitionSpec::new(allocator.pool_partition.as_str(), KeyType::Str)
                .field(POOL_FIELD, FieldType::IntSet),
        )?;
        let seed: Record = [(POOL_FIELD.to_string(), Value::IntSet(Default::default()))].into();
        with_stabilize(allocator.backend.as_ref(), &allocator.pool_partition, || {
            allocator
                .backend
                .put_if_absent(&allocator.pool_partition, &OBSOLETE_KEY.into(), seed.clone())
        })?;
        Ok(allocator)
    }

    /// Returns a fresh identifier.
    ///
    /// The counter record is lazily created exactly once: on the very first
    /// allocation the seeding `put_if_absent` may be raced by another worker,
    /// in which case the loser simply retries the increment against the
    /// winner's record.
    pub fn next_id(&self) -> Result<i64> {
        if self.recycle {
            if let Some(uid) = self.pop_obsolete()? {
                debug!(uid, "ids.next.recycled");
                return Ok(uid);
            }
        }
        let key = Key::Str(self.graph.clone());
        with_stabilize(self.backend.as_ref(), &self.counter_partition, || {
            if self.backend.get(&self.counter_partition, &key)?.is_none() {
                let seed: Record = [(COUNTER_FIELD.to_string(), Value::Int(COUNTER_SEED))].into();
                if self
                    .backend
                    .put_if_absent(&self.counter_partition, &key, seed)?
                {
                    info!(graph = %self.graph, "ids.counter.seeded");
                }
            }
            self.backend
                .atomic_increment(&self.counter_partition, &key, COUNTER_FIELD, 1)
        })
    }

    /// Parks the identifier of a removed element in the obsolete pool.
    pub fn recycle(&self, uid: i64) -> Result<()> {
        self.backend.set_add(
            &self.pool_partition,
            &OBSOLETE_KEY.into(),
            POOL_FIELD,
            &Value::Int(uid),
        )
    }

    /// Best-effort pop of the smallest pooled identifier. Two concurrent
    /// poppers can observe the same element; callers opting into recycling
    /// accept that the pool is advisory.
    fn pop_obsolete(&self) -> Result<Option<i64>> {
        let record = self
            .backend
            .get(&self.pool_partition, &OBSOLETE_KEY.into())?;
        let Some(record) = record else {
            return Ok(None);
        };
        let uid = match record.get(POOL_FIELD) {
            Some(Value::IntSet(set)) => set.iter().next().copied(),
            _ => None,
        };
        if let Some(uid) = uid {
            self.backend.set_remove(
                &self.pool_partition,
                &OBSOLETE_KEY.into(),
                POOL_FIELD,
                &Value::Int(uid),
            )?;
            return Ok(Some(uid));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::backend::{MemoryBackend, MemoryOptions};
    use crate::model::FIRST_UID;

    #[test]
    fn first_id_is_the_fresh_graph_sentinel() {
        let backend = Arc::new(MemoryBackend::new());
        let ids = IdAllocator::open(backend, "g", false).unwrap();
        assert_eq!(ids.next_id().unwrap(), FIRST_UID);
        assert_eq!(ids.next_id().unwrap(), FIRST_UID + 1);
    }

    #[test]
    fn concurrent_allocations_are_pairwise_distinct() {
        let backend = Arc::new(MemoryBackend::new());
        let ids = Arc::new(IdAllocator::open(backend, "g", false).unwrap());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ids = Arc::clone(&ids);
            handles.push(thread::spawn(move || {
                (0..250).map(|_| ids.next_id().unwrap()).collect::<Vec<_>>()
            }));
        }
        let mut seen = HashSet::new();
        for handle in handles {
            for uid in handle.join().unwrap() {
                assert!(seen.insert(uid), "uid {uid} issued twice");
            }
        }
        assert_eq!(seen.len(), 8 * 250);
    }

    #[test]
    fn recycling_consumes_the_pool_before_the_counter() {
        let backend = Arc::new(MemoryBackend::new());
        let ids = IdAllocator::open(backend, "g", true).unwrap();
        let first = ids.next_id().unwrap();
        ids.recycle(first).unwrap();
        assert_eq!(ids.next_id().unwrap(), first);
        assert_eq!(ids.next_id().unwrap(), first + 1);
    }

    #[test]
    fn allocation_rides_out_partition_stabilization() {
        let backend = Arc::new(MemoryBackend::with_options(MemoryOptions {
            settle_before_ready: true,
        }));
        let ids = IdAllocator::open(backend, "g", false).unwrap();
        assert_eq!(ids.next_id().unwrap(), FIRST_UID);
    }
}
