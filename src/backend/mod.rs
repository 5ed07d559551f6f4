//! Key-value backend capability set.
//!
//! The graph layer never talks to a concrete store; it is written against
//! [`KvBackend`], the exact operation set the engine relies on: per-key
//! reads/writes, per-key atomic collection mutation, an atomic counter
//! primitive, conditional create, partition lifecycle, and equality-filtered
//! scans. Correctness under concurrent multi-process access rests entirely
//! on the backend's per-key atomicity; the graph layer takes no locks of its
//! own across keys.

mod memory;

pub use memory::{MemoryBackend, MemoryOptions};

use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::{Key, Record, Value};

/// Key type of a partition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KeyType {
    /// Integer-keyed (element partitions).
    Int,
    /// String-keyed (system partitions).
    Str,
}

/// Declared type of a partition field.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
    /// 64-bit signed integer.
    Int,
    /// UTF-8 string.
    Str,
    /// Opaque byte blob.
    Bytes,
    /// Set of integers.
    IntSet,
    /// Set of strings.
    StrSet,
    /// Map of int to string.
    IntStrMap,
    /// Map of string to string.
    StrStrMap,
}

/// Schema of a storage partition: name, key type, declared fields.
#[derive(Clone, Debug)]
pub struct PartitionSpec {
    /// Partition name, unique per backend.
    pub name: String,
    /// Key type for every record in the partition.
    pub key: KeyType,
    /// Declared fields. Schema-light: backends may ignore the types.
    pub fields: Vec<(String, FieldType)>,
}

impl PartitionSpec {
    /// Starts a spec with no fields.
    pub fn new(name: impl Into<String>, key: KeyType) -> Self {
        Self {
            name: name.into(),
            key,
            fields: Vec::new(),
        }
    }

    /// Adds a declared field.
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push((name.into(), ty));
        self
    }
}

/// Equality predicates for scans: field name → required value.
pub type Predicates = BTreeMap<String, Value>;

/// The capability set the graph engine requires of its store.
///
/// Every operation is atomic per key. Partition creation is eventually
/// consistent from the caller's point of view: operations against a freshly
/// created partition may fail with [`BackendUnavailable`] until
/// [`await_ready`] has been observed to succeed.
///
/// [`BackendUnavailable`]: crate::error::GraphError::BackendUnavailable
/// [`await_ready`]: KvBackend::await_ready
pub trait KvBackend: Send + Sync + 'static {
    /// Reads a record, `None` if absent.
    fn get(&self, partition: &str, key: &Key) -> Result<Option<Record>>;

    /// Writes a record, replacing any previous value wholesale.
    fn put(&self, partition: &str, key: &Key, record: Record) -> Result<()>;

    /// Deletes a record. Returns whether it existed.
    fn delete(&self, partition: &str, key: &Key) -> Result<bool>;

    /// Atomically merges entries into a map field of an existing record.
    fn map_add(
        &self,
        partition: &str,
        key: &Key,
        field: &str,
        entries: &BTreeMap<i64, String>,
    ) -> Result<()>;

    /// Atomically removes map keys from a map field of an existing record.
    fn map_remove(&self, partition: &str, key: &Key, field: &str, map_keys: &[i64]) -> Result<()>;

    /// Atomically inserts a value into a set field of an existing record.
    fn set_add(&self, partition: &str, key: &Key, field: &str, value: &Value) -> Result<()>;

    /// Atomically removes a value from a set field of an existing record.
    fn set_remove(&self, partition: &str, key: &Key, field: &str, value: &Value) -> Result<()>;

    /// Atomically adds `delta` to an integer field of an existing record and
    /// returns the post-increment value.
    fn atomic_increment(&self, partition: &str, key: &Key, field: &str, delta: i64)
        -> Result<i64>;

    /// Writes the record only if the key is absent. Returns whether the
    /// write happened.
    fn put_if_absent(&self, partition: &str, key: &Key, record: Record) -> Result<bool>;

    /// Creates a partition. Idempotent: re-creating an existing partition
    /// with the same name is a no-op, so racing initializers converge.
    fn create_partition(&self, spec: PartitionSpec) -> Result<()>;

    /// Drops a partition and every record in it.
    fn drop_partition(&self, partition: &str) -> Result<()>;

    /// Returns all records whose fields equal every predicate value.
    fn scan(&self, partition: &str, predicates: &Predicates) -> Result<Vec<(Key, Record)>>;

    /// Counts records matching every predicate value.
    fn count(&self, partition: &str, predicates: &Predicates) -> Result<u64>;

    /// Blocks until the partition's schema has propagated and operations
    /// against it will no longer fail as unavailable.
    fn await_ready(&self, partition: &str) -> Result<()>;
}

/// Creates a partition (if needed) and waits for it to stabilize.
pub fn ensure_partition(backend: &dyn KvBackend, spec: PartitionSpec) -> Result<()> {
    let name = spec.name.clone();
    backend.create_partition(spec)?;
    backend.await_ready(&name)
}
