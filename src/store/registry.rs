//! Durable bookkeeping of vertex and edge types.
//!
//! Registration must be visible to every worker process, so the registry
//! keeps no authoritative in-memory state: the set of known names lives in
//! string-set records in the graph's system partition, and each type's
//! schema in a description record keyed `kind:name`. Every type owns one
//! backing partition for its elements.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::info;

use crate::backend::{
    ensure_partition, FieldType, KeyType, KvBackend, PartitionSpec,
};
use crate::error::{GraphError, Result};
use crate::model::{
    qualify, AttrType, ElementKind, Key, Record, TypeHandle, TypeSchema, Value, ATTR_INCOMING,
    ATTR_OUTGOING, ATTR_PAYLOAD, ATTR_SOURCE_TYPE, ATTR_SOURCE_UID, ATTR_TARGETS, RESERVED_ATTRS,
};
use crate::store::with_stabilize;

const VERTEX_TYPES_KEY: &str = "vertex_types";
const EDGE_TYPES_KEY: &str = "edge_types";
const TYPES_FIELD: &str = "value";
const DESC_FIELD: &str = "attr";

/// Tracks which element types exist and allocates their storage partitions.
pub struct TypeRegistry {
    backend: Arc<dyn KvBackend>,
    graph: String,
    system_partition: String,
    desc_partition: String,
}

impl TypeRegistry {
    /// Opens the registry for a graph, performing first-use initialization
    /// of the system and description partitions.
    pub fn open(backend: Arc<dyn KvBackend>, graph: &str) -> Result<Self> {
        let registry = Self {
            system_partition: format!("{graph}_system"),
            desc_partition: format!("{graph}_space_description"),
            graph: graph.to_string(),
            backend,
        };
        ensure_partition(
            registry.backend.as_ref(),
            PartitionSpec::new(registry.system_partition.as_str(), KeyType::Str)
                .field(TYPES_FIELD, FieldType::StrSet),
        )?;
        ensure_partition(
            registry.backend.as_ref(),
            PartitionSpec::new(registry.desc_partition.as_str(), KeyType::Str)
                .field(DESC_FIELD, FieldType::StrStrMap),
        )?;
        for key in [VERTEX_TYPES_KEY, EDGE_TYPES_KEY] {
            let seed: Record =
                [(TYPES_FIELD.to_string(), Value::StrSet(Default::default()))].into();
            with_stabilize(registry.backend.as_ref(), &registry.system_partition, || {
                registry
                    .backend
                    .put_if_absent(&registry.system_partition, &key.into(), seed.clone())
            })?;
        }
        Ok(registry)
    }

    /// Registers a new type and creates its storage partition. The stored
    /// schema is the caller's, extended with the reserved attributes of the
    /// kind; declaring a reserved name is a caller error.
    pub fn register_type(
        &self,
        kind: ElementKind,
        name: &str,
        schema: &TypeSchema,
    ) -> Result<TypeHandle> {
        validate_user_schema(schema)?;
        if self.type_exists(kind, name)? {
            return Err(GraphError::DuplicateType {
                kind,
                name: name.to_string(),
            });
        }
        let full = full_schema(kind, schema);
        let partition = self.partition(kind, name);
        ensure_partition(
            self.backend.as_ref(),
            element_partition_spec(&partition, &full),
        )?;
        let description: BTreeMap<String, String> = full
            .iter()
            .map(|(ty, attr)| (attr.clone(), ty.as_str().to_string()))
            .collect();
        let record: Record = [(DESC_FIELD.to_string(), Value::StrStrMap(description))].into();
        let desc_key = Key::Str(qualify(kind, name));
        with_stabilize(self.backend.as_ref(), &self.desc_partition, || {
            self.backend.put(&self.desc_partition, &desc_key, record.clone())
        })?;
        self.backend.set_add(
            &self.system_partition,
            &self.types_key(kind).into(),
            TYPES_FIELD,
            &Value::Str(name.to_string()),
        )?;
        info!(graph = %self.graph, %kind, name, "registry.type.registered");
        Ok(TypeHandle {
            kind,
            name: name.to_string(),
            schema: full,
        })
    }

    /// Resolves a registered type to a handle with its full schema.
    pub fn get_type(&self, kind: ElementKind, name: &str) -> Result<TypeHandle> {
        if !self.type_exists(kind, name)? {
            return Err(GraphError::type_not_found(kind, name));
        }
        let desc_key = Key::Str(qualify(kind, name));
        let record = self
            .backend
            .get(&self.desc_partition, &desc_key)?
            .ok_or_else(|| GraphError::type_not_found(kind, name))?;
        let description = record
            .get(DESC_FIELD)
            .and_then(Value::as_str_str_map)
            .ok_or_else(|| {
                GraphError::unavailable(format!(
                    "description record for {} is malformed",
                    qualify(kind, name)
                ))
            })?;
        let mut schema = TypeSchema::new();
        for (attr, ty) in description {
            schema.push((AttrType::parse(ty)?, attr.clone()));
        }
        Ok(TypeHandle {
            kind,
            name: name.to_string(),
            schema,
        })
    }

    /// Removes a type: drops its partition (and with it every element of
    /// the type), deletes its description, and unregisters the name. Not
    /// transactional with concurrent inserts into the same type; racing
    /// creators either fail with a not-found error or leave orphans.
    pub fn remove_type(&self, kind: ElementKind, name: &str) -> Result<()> {
        if !self.type_exists(kind, name)? {
            return Err(GraphError::type_not_found(kind, name));
        }
        self.backend.drop_partition(&self.partition(kind, name))?;
        self.backend
            .delete(&self.desc_partition, &Key::Str(qualify(kind, name)))?;
        self.backend.set_remove(
            &self.system_partition,
            &self.types_key(kind).into(),
            TYPES_FIELD,
            &Value::Str(name.to_string()),
        )?;
        info!(graph = %self.graph, %kind, name, "registry.type.removed");
        Ok(())
    }

    /// Names of every registered type of a kind.
    pub fn list_types(&self, kind: ElementKind) -> Result<BTreeSet<String>> {
        let record = self
            .backend
            .get(&self.system_partition, &self.types_key(kind).into())?;
        Ok(record
            .as_ref()
            .and_then(|r| r.get(TYPES_FIELD))
            .and_then(Value::as_str_set)
            .cloned()
            .unwrap_or_default())
    }

    /// Whether a kind/name pair is registered.
    pub fn type_exists(&self, kind: ElementKind, name: &str) -> Result<bool> {
        Ok(self.list_types(kind)?.contains(name))
    }

    /// The storage partition backing a type.
    pub fn partition(&self, kind: ElementKind, name: &str) -> String {
        format!("{}_{}_{}", self.graph, kind.as_str(), name)
    }

    fn types_key(&self, kind: ElementKind) -> &'static str {
        match kind {
            ElementKind::Vertex => VERTEX_TYPES_KEY,
            ElementKind::Edge => EDGE_TYPES_KEY,
        }
    }
}

fn validate_user_schema(schema: &TypeSchema) -> Result<()> {
    let mut seen = BTreeSet::new();
    for (_, attr) in schema {
        if RESERVED_ATTRS.contains(&attr.as_str()) {
            return Err(GraphError::invalid_argument(format!(
                "attribute name {attr} is reserved"
            )));
        }
        if !seen.insert(attr.as_str()) {
            return Err(GraphError::invalid_argument(format!(
                "duplicate attribute name {attr}"
            )));
        }
    }
    Ok(())
}

/// Extends a user schema with the reserved attributes of the kind.
pub(crate) fn full_schema(kind: ElementKind, user: &TypeSchema) -> TypeSchema {
    let mut schema = user.clone();
    match kind {
        ElementKind::Vertex => {
            schema.push((AttrType::IntStrMap, ATTR_INCOMING.to_string()));
            schema.push((AttrType::IntStrMap, ATTR_OUTGOING.to_string()));
        }
        ElementKind::Edge => {
            schema.push((AttrType::Int, ATTR_SOURCE_UID.to_string()));
            schema.push((AttrType::Str, ATTR_SOURCE_TYPE.to_string()));
            schema.push((AttrType::IntStrMap, ATTR_TARGETS.to_string()));
        }
    }
    schema
}

/// Partition spec for an element partition: the schema's fields plus the
/// unstructured payload blob.
pub(crate) fn element_partition_spec(partition: &str, schema: &TypeSchema) -> PartitionSpec {
    let mut spec = PartitionSpec::new(partition, KeyType::Int);
    for (ty, attr) in schema {
        let field_ty = match ty {
            AttrType::Int => FieldType::Int,
            AttrType::Str => FieldType::Str,
            AttrType::IntStrMap => FieldType::IntStrMap,
        };
        spec = spec.field(attr.as_str(), field_ty);
    }
    spec.field(ATTR_PAYLOAD, FieldType::Bytes)
}
