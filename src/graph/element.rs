//! Handles on stored elements and their types.
//!
//! A handle is a uid/type pair plus a shared reference to the element
//! store; it holds no element state of its own, every accessor reads live.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::codec::AttrMap;
use crate::error::Result;
use crate::graph::request::split_properties;
use crate::model::{ElementKind, TypeRef, TypeSchema};
use crate::store::{EdgeDirection, ElementStore};

/// Handle on a stored vertex.
#[derive(Clone)]
pub struct Vertex {
    uid: i64,
    type_name: String,
    store: Arc<ElementStore>,
}

impl Vertex {
    pub(crate) fn new(uid: i64, type_name: String, store: Arc<ElementStore>) -> Self {
        Self {
            uid,
            type_name,
            store,
        }
    }

    /// The vertex's globally unique identifier.
    pub fn uid(&self) -> i64 {
        self.uid
    }

    /// The vertex's type name (the generic pseudo-type for untyped ones).
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Reads a property, structured fields first, then the unstructured map.
    pub fn get_property(&self, key: &str) -> Result<Option<JsonValue>> {
        self.store
            .get_property(self.uid, ElementKind::Vertex, &self.type_name, key)
    }

    /// Writes a property through the structured/unstructured split.
    pub fn set_property(&self, key: &str, value: impl Into<JsonValue>) -> Result<()> {
        self.store
            .set_property(self.uid, ElementKind::Vertex, &self.type_name, key, &value.into())
    }

    /// All property keys present on the vertex.
    pub fn property_keys(&self) -> Result<BTreeSet<String>> {
        self.store
            .property_keys(self.uid, ElementKind::Vertex, &self.type_name)
    }

    /// Creates an edge from this vertex to one or more targets, splitting
    /// the property map against the edge type's schema.
    pub fn add_edge(
        &self,
        targets: &[&Vertex],
        edge_type: impl Into<TypeRef>,
        properties: AttrMap,
    ) -> Result<Edge> {
        let edge_type = edge_type.into();
        let handle = self
            .store
            .registry()
            .get_type(ElementKind::Edge, edge_type.name())?;
        let (structured, unstructured) = split_properties(&handle, &properties)?;
        let target_map: BTreeMap<i64, String> = targets
            .iter()
            .map(|v| (v.uid, v.type_name.clone()))
            .collect();
        let uid = self.store.add_edge(
            self.uid,
            &self.type_name,
            &target_map,
            &handle.name,
            structured,
            &unstructured,
        )?;
        Ok(Edge::new(uid, handle.name, Arc::clone(&self.store)))
    }

    /// Removes an edge sourced at this vertex.
    pub fn remove_edge(&self, edge: &Edge) -> Result<()> {
        self.store
            .remove_edge(self.uid, &self.type_name, edge.uid, &edge.type_name)
    }

    /// Edges sourced at this vertex, optionally filtered by edge type.
    pub fn outgoing_edges(&self, edge_type: Option<TypeRef>) -> Result<Vec<Edge>> {
        self.adjacent(EdgeDirection::Outgoing, edge_type)
    }

    /// Edges pointing at this vertex, optionally filtered by edge type.
    pub fn incoming_edges(&self, edge_type: Option<TypeRef>) -> Result<Vec<Edge>> {
        self.adjacent(EdgeDirection::Incoming, edge_type)
    }

    fn adjacent(&self, direction: EdgeDirection, edge_type: Option<TypeRef>) -> Result<Vec<Edge>> {
        let edges = self.store.vertex_adjacency(
            self.uid,
            &self.type_name,
            direction,
            edge_type.as_ref().map(TypeRef::name),
        )?;
        Ok(edges
            .into_iter()
            .map(|(uid, ty)| Edge::new(uid, ty, Arc::clone(&self.store)))
            .collect())
    }

    /// Removes the vertex, cascading to every incident edge first.
    pub fn remove(self) -> Result<()> {
        self.store.remove_vertex(self.uid, &self.type_name)
    }
}

impl fmt::Debug for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vertex")
            .field("uid", &self.uid)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Handle on a stored hyperedge.
#[derive(Clone)]
pub struct Edge {
    uid: i64,
    type_name: String,
    store: Arc<ElementStore>,
}

impl Edge {
    pub(crate) fn new(uid: i64, type_name: String, store: Arc<ElementStore>) -> Self {
        Self {
            uid,
            type_name,
            store,
        }
    }

    /// The edge's globally unique identifier.
    pub fn uid(&self) -> i64 {
        self.uid
    }

    /// The edge's type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The single source vertex of the edge.
    pub fn source(&self) -> Result<Vertex> {
        let (uid, ty) = self.store.edge_source(self.uid, &self.type_name)?;
        Ok(Vertex::new(uid, ty, Arc::clone(&self.store)))
    }

    /// The target vertices of the edge (one or more).
    pub fn targets(&self) -> Result<Vec<Vertex>> {
        let targets = self.store.edge_targets(self.uid, &self.type_name)?;
        Ok(targets
            .into_iter()
            .map(|(uid, ty)| Vertex::new(uid, ty, Arc::clone(&self.store)))
            .collect())
    }

    /// Points the edge at an additional target vertex.
    pub fn add_target(&self, target: &Vertex) -> Result<()> {
        self.store
            .add_target(target.uid, &target.type_name, self.uid, &self.type_name)
    }

    /// Detaches a target vertex from the edge.
    pub fn remove_target(&self, target: &Vertex) -> Result<()> {
        self.store
            .remove_target(target.uid, &target.type_name, self.uid, &self.type_name)
    }

    /// Reads a property, structured fields first, then the unstructured map.
    pub fn get_property(&self, key: &str) -> Result<Option<JsonValue>> {
        self.store
            .get_property(self.uid, ElementKind::Edge, &self.type_name, key)
    }

    /// Writes a property through the structured/unstructured split.
    pub fn set_property(&self, key: &str, value: impl Into<JsonValue>) -> Result<()> {
        self.store
            .set_property(self.uid, ElementKind::Edge, &self.type_name, key, &value.into())
    }

    /// All property keys present on the edge.
    pub fn property_keys(&self) -> Result<BTreeSet<String>> {
        self.store
            .property_keys(self.uid, ElementKind::Edge, &self.type_name)
    }

    /// Removes the edge, scrubbing both endpoints' adjacency maps.
    pub fn remove(self) -> Result<()> {
        let (src_uid, src_type) = self.store.edge_source(self.uid, &self.type_name)?;
        self.store
            .remove_edge(src_uid, &src_type, self.uid, &self.type_name)
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("uid", &self.uid)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Handle on a registered vertex type.
#[derive(Clone)]
pub struct VertexTypeHandle {
    name: String,
    store: Arc<ElementStore>,
}

impl VertexTypeHandle {
    pub(crate) fn new(name: String, store: Arc<ElementStore>) -> Self {
        Self { name, store }
    }

    /// The type's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full schema, reserved attributes included.
    pub fn definition(&self) -> Result<TypeSchema> {
        Ok(self
            .store
            .registry()
            .get_type(ElementKind::Vertex, &self.name)?
            .schema)
    }

    /// Number of stored vertices of this type.
    pub fn count(&self) -> Result<u64> {
        self.store.count(ElementKind::Vertex, &self.name)
    }

    /// Handles on every vertex of this type.
    pub fn vertices(&self) -> Result<Vec<Vertex>> {
        let uids = self.store.elements_of_type(ElementKind::Vertex, &self.name)?;
        Ok(uids
            .into_iter()
            .map(|uid| Vertex::new(uid, self.name.clone(), Arc::clone(&self.store)))
            .collect())
    }

    /// Removes the type and every vertex of it. Irreversible.
    pub fn remove(self) -> Result<()> {
        self.store
            .registry()
            .remove_type(ElementKind::Vertex, &self.name)
    }
}

impl From<&VertexTypeHandle> for TypeRef {
    fn from(handle: &VertexTypeHandle) -> Self {
        TypeRef::Named(handle.name.clone())
    }
}

impl fmt::Debug for VertexTypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexTypeHandle")
            .field("name", &self.name)
            .finish()
    }
}

/// Handle on a registered edge type.
#[derive(Clone)]
pub struct EdgeTypeHandle {
    name: String,
    store: Arc<ElementStore>,
}

impl EdgeTypeHandle {
    pub(crate) fn new(name: String, store: Arc<ElementStore>) -> Self {
        Self { name, store }
    }

    /// The type's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full schema, reserved attributes included.
    pub fn definition(&self) -> Result<TypeSchema> {
        Ok(self
            .store
            .registry()
            .get_type(ElementKind::Edge, &self.name)?
            .schema)
    }

    /// Number of stored edges of this type.
    pub fn count(&self) -> Result<u64> {
        self.store.count(ElementKind::Edge, &self.name)
    }

    /// Handles on every edge of this type.
    pub fn edges(&self) -> Result<Vec<Edge>> {
        let uids = self.store.elements_of_type(ElementKind::Edge, &self.name)?;
        Ok(uids
            .into_iter()
            .map(|uid| Edge::new(uid, self.name.clone(), Arc::clone(&self.store)))
            .collect())
    }

    /// Edges of this type sourced at the given vertex.
    pub fn edges_from(&self, source: &Vertex) -> Result<Vec<Edge>> {
        let uids = self.store.edges_by_source(source.uid(), &self.name)?;
        Ok(uids
            .into_iter()
            .map(|uid| Edge::new(uid, self.name.clone(), Arc::clone(&self.store)))
            .collect())
    }

    /// Removes the type and every edge of it. Irreversible.
    pub fn remove(self) -> Result<()> {
        self.store
            .registry()
            .remove_type(ElementKind::Edge, &self.name)
    }
}

impl From<&EdgeTypeHandle> for TypeRef {
    fn from(handle: &EdgeTypeHandle) -> Self {
        TypeRef::Named(handle.name.clone())
    }
}

impl fmt::Debug for EdgeTypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeTypeHandle")
            .field("name", &self.name)
            .finish()
    }
}
