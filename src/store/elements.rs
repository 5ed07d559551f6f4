//! Element CRUD on top of the type registry, id allocator and backend.
//!
//! One record per element, keyed by uid, in the partition of its type.
//! Vertices carry their adjacency index inline (`incoming_edges` /
//! `outgoing_edges` map fields); edges embed their source and target maps.
//! Multi-key updates are sequential and non-transactional: a crash between
//! steps leaves the adjacency index inconsistent until reconciled, and the
//! store never papers over a partial failure.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::backend::{ensure_partition, KvBackend, Predicates};
use crate::codec::{AttrMap, BlobCodec};
use crate::error::{GraphError, Result};
use crate::model::{
    ElementKind, Record, Value, ATTR_INCOMING, ATTR_OUTGOING, ATTR_PAYLOAD, GENERIC_VERTEX,
};
use crate::store::registry::{element_partition_spec, full_schema};
use crate::store::{IdAllocator, TypeRegistry};

/// Vertex/edge CRUD and adjacency-index maintenance for one graph.
pub struct ElementStore {
    backend: Arc<dyn KvBackend>,
    graph: String,
    registry: TypeRegistry,
    ids: IdAllocator,
    codec: Arc<dyn BlobCodec>,
    generic_partition: String,
}

impl ElementStore {
    /// Opens the store, initializing the registry, the allocator, and the
    /// reserved partition for generic (untyped) vertices.
    pub fn open(
        backend: Arc<dyn KvBackend>,
        graph: &str,
        codec: Arc<dyn BlobCodec>,
        recycle_ids: bool,
    ) -> Result<Self> {
        let registry = TypeRegistry::open(Arc::clone(&backend), graph)?;
        let ids = IdAllocator::open(Arc::clone(&backend), graph, recycle_ids)?;
        let generic_partition = format!("{graph}_{GENERIC_VERTEX}");
        let generic_schema = full_schema(ElementKind::Vertex, &Vec::new());
        ensure_partition(
            backend.as_ref(),
            element_partition_spec(&generic_partition, &generic_schema),
        )?;
        Ok(Self {
            graph: graph.to_string(),
            registry,
            ids,
            codec: Arc::clone(&codec),
            generic_partition,
            backend,
        })
    }

    /// The type registry this store reads from.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// The identifier allocator of this graph.
    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    /// Name of the graph this store is bound to.
    pub fn graph_name(&self) -> &str {
        &self.graph
    }

    pub(crate) fn backend(&self) -> &dyn KvBackend {
        self.backend.as_ref()
    }

    pub(crate) fn codec(&self) -> &dyn BlobCodec {
        self.codec.as_ref()
    }

    /// Resolves the partition of a vertex type, validating that the type is
    /// registered. `None` and the generic pseudo-type map to the reserved
    /// fallback partition.
    pub(crate) fn vertex_partition(&self, vertex_type: Option<&str>) -> Result<String> {
        match vertex_type {
            None => Ok(self.generic_partition.clone()),
            Some(GENERIC_VERTEX) => Ok(self.generic_partition.clone()),
            Some(name) => {
                if self.registry.type_exists(ElementKind::Vertex, name)? {
                    Ok(self.registry.partition(ElementKind::Vertex, name))
                } else {
                    Err(GraphError::type_not_found(ElementKind::Vertex, name))
                }
            }
        }
    }

    /// Partition of a vertex type without the registry round-trip, for the
    /// adjacency-update legs that are best-effort by contract.
    pub(crate) fn vertex_partition_raw(&self, vertex_type: &str) -> String {
        if vertex_type == GENERIC_VERTEX {
            self.generic_partition.clone()
        } else {
            self.registry.partition(ElementKind::Vertex, vertex_type)
        }
    }

    /// Resolves and validates the partition of any element type.
    pub(crate) fn element_partition(&self, kind: ElementKind, name: &str) -> Result<String> {
        match kind {
            ElementKind::Vertex => self.vertex_partition(Some(name)),
            ElementKind::Edge => {
                if self.registry.type_exists(ElementKind::Edge, name)? {
                    Ok(self.registry.partition(ElementKind::Edge, name))
                } else {
                    Err(GraphError::type_not_found(ElementKind::Edge, name))
                }
            }
        }
    }

    /// Inserts a vertex. With no type the vertex lands in the generic
    /// partition and may carry only unstructured attributes.
    pub fn add_vertex(
        &self,
        vertex_type: Option<&str>,
        mut structured: Record,
        unstructured: &AttrMap,
    ) -> Result<i64> {
        let partition = self.vertex_partition(vertex_type)?;
        if vertex_type.is_none() && !structured.is_empty() {
            return Err(GraphError::invalid_argument(
                "a generic vertex has no schema for structured attributes".to_string(),
            ));
        }
        let uid = self.ids.next_id()?;
        structured.insert(
            ATTR_INCOMING.to_string(),
            Value::IntStrMap(BTreeMap::new()),
        );
        structured.insert(
            ATTR_OUTGOING.to_string(),
            Value::IntStrMap(BTreeMap::new()),
        );
        structured.insert(
            ATTR_PAYLOAD.to_string(),
            Value::Bytes(self.codec.encode(unstructured)?),
        );
        self.backend.put(&partition, &uid.into(), structured)?;
        debug!(graph = %self.graph, uid, ?vertex_type, "store.vertex.insert");
        Ok(uid)
    }

    /// Fetches the raw record of an element.
    pub fn get_element(&self, uid: i64, kind: ElementKind, type_name: &str) -> Result<Record> {
        let partition = self.element_partition(kind, type_name)?;
        self.backend
            .get(&partition, &uid.into())?
            .ok_or_else(|| GraphError::element_not_found(uid, type_name))
    }

    /// Overwrites the record of an element wholesale.
    pub fn put_element(
        &self,
        uid: i64,
        kind: ElementKind,
        type_name: &str,
        record: Record,
    ) -> Result<()> {
        let partition = self.element_partition(kind, type_name)?;
        self.backend.put(&partition, &uid.into(), record)
    }

    /// Removes a vertex, cascading to every incident edge first. Deleting
    /// the record before the edges are cleaned up would leave dangling
    /// edge→vertex references, so edge cleanup strictly precedes the delete.
    pub fn remove_vertex(&self, uid: i64, vertex_type: &str) -> Result<()> {
        let record = self.get_element(uid, ElementKind::Vertex, vertex_type)?;
        for (edge_uid, edge_type) in map_field(&record, ATTR_INCOMING) {
            let (src_uid, src_type) = self.edge_source(edge_uid, &edge_type)?;
            self.remove_edge(src_uid, &src_type, edge_uid, &edge_type)?;
        }
        // a self-loop removed above has already vanished from the outgoing
        // map, so the map is re-read rather than reused
        let record = self.get_element(uid, ElementKind::Vertex, vertex_type)?;
        for (edge_uid, edge_type) in map_field(&record, ATTR_OUTGOING) {
            self.remove_edge(uid, vertex_type, edge_uid, &edge_type)?;
        }
        let partition = self.vertex_partition(Some(vertex_type))?;
        self.backend.delete(&partition, &uid.into())?;
        self.ids.recycle(uid)?;
        debug!(graph = %self.graph, uid, vertex_type, "store.vertex.remove");
        Ok(())
    }

    /// Removes any element by uid and type, cascading appropriately.
    pub fn remove_element(&self, uid: i64, kind: ElementKind, type_name: &str) -> Result<()> {
        match kind {
            ElementKind::Vertex => self.remove_vertex(uid, type_name),
            ElementKind::Edge => {
                let (src_uid, src_type) = self.edge_source(uid, type_name)?;
                self.remove_edge(src_uid, &src_type, uid, type_name)
            }
        }
    }

    /// Equality search within one type's partition. Range and pattern
    /// predicates are out of scope.
    pub fn search(
        &self,
        kind: ElementKind,
        type_name: &str,
        predicates: &Predicates,
    ) -> Result<Vec<i64>> {
        let partition = self.element_partition(kind, type_name)?;
        let rows = self.backend.scan(&partition, predicates)?;
        Ok(rows
            .into_iter()
            .filter_map(|(key, _)| key.as_int())
            .collect())
    }

    /// Number of stored elements of a type.
    pub fn count(&self, kind: ElementKind, type_name: &str) -> Result<u64> {
        let partition = self.element_partition(kind, type_name)?;
        self.backend.count(&partition, &Predicates::new())
    }

    /// Uids of every element of a type.
    pub fn elements_of_type(&self, kind: ElementKind, type_name: &str) -> Result<Vec<i64>> {
        self.search(kind, type_name, &Predicates::new())
    }
}

/// Clones an int→string map field out of a record, empty if absent.
pub(crate) fn map_field(record: &Record, field: &str) -> BTreeMap<i64, String> {
    record
        .get(field)
        .and_then(Value::as_int_str_map)
        .cloned()
        .unwrap_or_default()
}
