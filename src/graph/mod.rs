//! Graph API facade.
//!
//! Thin orchestration over the type registry, identifier allocator and
//! element store: type creation and lookup, vertex insertion and retrieval,
//! attribute-equality search. Returns handle objects bound to the store so
//! callers can keep operating on what they fetched.

mod element;
mod request;

pub use element::{Edge, EdgeTypeHandle, Vertex, VertexTypeHandle};
pub use request::{EdgeTypeSpec, VertexSpec, VertexTypeSpec};

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::backend::{KvBackend, Predicates};
use crate::codec::{AttrMap, BlobCodec, JsonCodec};
use crate::error::{GraphError, Result};
use crate::model::{value_from_json, ElementKind, TypeRef, GENERIC_VERTEX, RESERVED_ATTRS};
use crate::store::ElementStore;

pub(crate) use request::split_properties;

/// Facade-level options.
#[derive(Clone, Copy, Debug, Default)]
pub struct GraphOptions {
    /// Consume the obsolete-id pool before advancing the counter. Off by
    /// default: identifiers are then never reused.
    pub recycle_ids: bool,
}

/// One named graph over a key-value backend.
///
/// Cloning is cheap; clones share the same store. Workers keep one `Graph`
/// per graph name they have touched.
#[derive(Clone)]
pub struct Graph {
    store: Arc<ElementStore>,
}

impl Graph {
    /// Opens a graph with the default JSON blob codec and default options,
    /// performing first-use initialization of its system partitions.
    pub fn open(backend: Arc<dyn KvBackend>, name: &str) -> Result<Self> {
        Self::open_with(backend, name, Arc::new(JsonCodec), GraphOptions::default())
    }

    /// Opens a graph with an explicit blob codec and options.
    pub fn open_with(
        backend: Arc<dyn KvBackend>,
        name: &str,
        codec: Arc<dyn BlobCodec>,
        options: GraphOptions,
    ) -> Result<Self> {
        let store = ElementStore::open(backend, name, codec, options.recycle_ids)?;
        Ok(Self {
            store: Arc::new(store),
        })
    }

    /// The graph's name.
    pub fn name(&self) -> &str {
        self.store.graph_name()
    }

    /// Direct access to the element store (the cluster worker drives raw
    /// uid/type operations through this).
    pub fn store(&self) -> &Arc<ElementStore> {
        &self.store
    }

    /// Registers a new vertex type.
    pub fn create_vertex_type(&self, spec: VertexTypeSpec) -> Result<VertexTypeHandle> {
        self.store
            .registry()
            .register_type(ElementKind::Vertex, &spec.name, &spec.schema)?;
        Ok(VertexTypeHandle::new(spec.name, Arc::clone(&self.store)))
    }

    /// Registers a new edge type.
    pub fn create_edge_type(&self, spec: EdgeTypeSpec) -> Result<EdgeTypeHandle> {
        self.store
            .registry()
            .register_type(ElementKind::Edge, &spec.name, &spec.schema)?;
        Ok(EdgeTypeHandle::new(spec.name, Arc::clone(&self.store)))
    }

    /// Looks up a registered vertex type.
    pub fn get_vertex_type(&self, name: &str) -> Result<VertexTypeHandle> {
        let handle = self.store.registry().get_type(ElementKind::Vertex, name)?;
        Ok(VertexTypeHandle::new(handle.name, Arc::clone(&self.store)))
    }

    /// Looks up a registered edge type.
    pub fn get_edge_type(&self, name: &str) -> Result<EdgeTypeHandle> {
        let handle = self.store.registry().get_type(ElementKind::Edge, name)?;
        Ok(EdgeTypeHandle::new(handle.name, Arc::clone(&self.store)))
    }

    /// Inserts a vertex, splitting its properties against the type schema.
    pub fn insert_vertex(&self, spec: VertexSpec) -> Result<Vertex> {
        match &spec.vertex_type {
            Some(type_ref) => {
                let handle = self
                    .store
                    .registry()
                    .get_type(ElementKind::Vertex, type_ref.name())?;
                let (structured, unstructured) = split_properties(&handle, &spec.properties)?;
                let uid =
                    self.store
                        .add_vertex(Some(&handle.name), structured, &unstructured)?;
                Ok(Vertex::new(uid, handle.name, Arc::clone(&self.store)))
            }
            None => {
                for key in spec.properties.keys() {
                    if RESERVED_ATTRS.contains(&key.as_str()) {
                        return Err(GraphError::invalid_argument(format!(
                            "attribute {key} is reserved and maintained by the store"
                        )));
                    }
                }
                let uid = self
                    .store
                    .add_vertex(None, Default::default(), &spec.properties)?;
                Ok(Vertex::new(
                    uid,
                    GENERIC_VERTEX.to_string(),
                    Arc::clone(&self.store),
                ))
            }
        }
    }

    /// Fetches a vertex, failing if the uid/type pair is absent.
    pub fn get_vertex(&self, uid: i64, vertex_type: impl Into<TypeRef>) -> Result<Vertex> {
        let type_ref = vertex_type.into();
        self.store
            .get_element(uid, ElementKind::Vertex, type_ref.name())?;
        Ok(Vertex::new(
            uid,
            type_ref.name().to_string(),
            Arc::clone(&self.store),
        ))
    }

    /// Attribute-equality search over one vertex type. Only structured
    /// attributes are searchable; range and pattern predicates are out of
    /// scope.
    pub fn search_vertex(
        &self,
        vertex_type: impl Into<TypeRef>,
        predicates: &AttrMap,
    ) -> Result<Vec<Vertex>> {
        let type_ref = vertex_type.into();
        let handle = self
            .store
            .registry()
            .get_type(ElementKind::Vertex, type_ref.name())?;
        let mut converted = Predicates::new();
        for (key, value) in predicates {
            let ty = handle.attr_type(key).ok_or_else(|| {
                GraphError::invalid_argument(format!(
                    "search predicate {key} is not a structured attribute of {}",
                    handle.name
                ))
            })?;
            converted.insert(key.clone(), value_from_json(ty, key, value)?);
        }
        let uids = self
            .store
            .search(ElementKind::Vertex, &handle.name, &converted)?;
        Ok(uids
            .into_iter()
            .map(|uid| Vertex::new(uid, handle.name.clone(), Arc::clone(&self.store)))
            .collect())
    }

    /// Fetches a property by raw uid and qualified type.
    pub fn get_property(
        &self,
        uid: i64,
        kind: ElementKind,
        type_name: &str,
        key: &str,
    ) -> Result<Option<JsonValue>> {
        self.store.get_property(uid, kind, type_name, key)
    }
}
