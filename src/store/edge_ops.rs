//! Edge creation/removal and adjacency-index maintenance.

use std::collections::BTreeMap;

use tracing::debug;

use crate::backend::Predicates;
use crate::codec::AttrMap;
use crate::error::{GraphError, Result};
use crate::model::{
    ElementKind, Record, Value, ATTR_INCOMING, ATTR_OUTGOING, ATTR_PAYLOAD, ATTR_SOURCE_TYPE,
    ATTR_SOURCE_UID, ATTR_TARGETS,
};
use crate::store::elements::{map_field, ElementStore};

/// Which adjacency map of a vertex to read.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EdgeDirection {
    /// Edges pointing at the vertex.
    Incoming,
    /// Edges sourced at the vertex.
    Outgoing,
}

impl EdgeDirection {
    fn field(self) -> &'static str {
        match self {
            EdgeDirection::Incoming => ATTR_INCOMING,
            EdgeDirection::Outgoing => ATTR_OUTGOING,
        }
    }
}

impl ElementStore {
    /// Creates a hyperedge from one source to one or more targets.
    ///
    /// Three write groups run in sequence with no cross-key transaction:
    /// the edge record, the source's outgoing map, each target's incoming
    /// map. A failure mid-sequence propagates to the caller and leaves the
    /// index partially updated for operator-level reconciliation.
    pub fn add_edge(
        &self,
        src_uid: i64,
        src_type: &str,
        targets: &BTreeMap<i64, String>,
        edge_type: &str,
        mut structured: Record,
        unstructured: &AttrMap,
    ) -> Result<i64> {
        if targets.is_empty() {
            return Err(GraphError::invalid_argument(
                "an edge requires at least one target vertex".to_string(),
            ));
        }
        let partition = self.element_partition(ElementKind::Edge, edge_type)?;
        let uid = self.ids().next_id()?;
        structured.insert(ATTR_SOURCE_UID.to_string(), Value::Int(src_uid));
        structured.insert(
            ATTR_SOURCE_TYPE.to_string(),
            Value::Str(src_type.to_string()),
        );
        structured.insert(ATTR_TARGETS.to_string(), Value::IntStrMap(targets.clone()));
        structured.insert(
            ATTR_PAYLOAD.to_string(),
            Value::Bytes(self.codec().encode(unstructured)?),
        );
        self.backend().put(&partition, &uid.into(), structured)?;

        let entry: BTreeMap<i64, String> = [(uid, edge_type.to_string())].into();
        self.backend().map_add(
            &self.vertex_partition_raw(src_type),
            &src_uid.into(),
            ATTR_OUTGOING,
            &entry,
        )?;
        for (t_uid, t_type) in targets {
            self.backend().map_add(
                &self.vertex_partition_raw(t_type),
                &(*t_uid).into(),
                ATTR_INCOMING,
                &entry,
            )?;
        }
        debug!(
            graph = %self.graph_name(),
            uid,
            src_uid,
            edge_type,
            targets = targets.len(),
            "store.edge.insert"
        );
        Ok(uid)
    }

    /// Removes an edge and scrubs it from both endpoints' adjacency maps.
    pub fn remove_edge(
        &self,
        src_uid: i64,
        src_type: &str,
        edge_uid: i64,
        edge_type: &str,
    ) -> Result<()> {
        self.backend().map_remove(
            &self.vertex_partition_raw(src_type),
            &src_uid.into(),
            ATTR_OUTGOING,
            &[edge_uid],
        )?;
        let record = self.get_element(edge_uid, ElementKind::Edge, edge_type)?;
        for (t_uid, t_type) in map_field(&record, ATTR_TARGETS) {
            self.backend().map_remove(
                &self.vertex_partition_raw(&t_type),
                &t_uid.into(),
                ATTR_INCOMING,
                &[edge_uid],
            )?;
        }
        self.ids().recycle(edge_uid)?;
        let partition = self.element_partition(ElementKind::Edge, edge_type)?;
        self.backend().delete(&partition, &edge_uid.into())?;
        debug!(graph = %self.graph_name(), edge_uid, edge_type, "store.edge.remove");
        Ok(())
    }

    /// Adds a target vertex to an existing edge, updating the vertex's
    /// incoming map symmetrically.
    pub fn add_target(
        &self,
        tar_uid: i64,
        tar_type: &str,
        edge_uid: i64,
        edge_type: &str,
    ) -> Result<()> {
        let partition = self.element_partition(ElementKind::Edge, edge_type)?;
        let target_entry: BTreeMap<i64, String> = [(tar_uid, tar_type.to_string())].into();
        self.backend()
            .map_add(&partition, &edge_uid.into(), ATTR_TARGETS, &target_entry)?;
        let edge_entry: BTreeMap<i64, String> = [(edge_uid, edge_type.to_string())].into();
        self.backend().map_add(
            &self.vertex_partition_raw(tar_type),
            &tar_uid.into(),
            ATTR_INCOMING,
            &edge_entry,
        )
    }

    /// Removes a target vertex from an existing edge.
    // TODO: removing the final target leaves a targetless edge behind;
    // decide whether that should cascade into removing the edge itself.
    pub fn remove_target(
        &self,
        tar_uid: i64,
        tar_type: &str,
        edge_uid: i64,
        edge_type: &str,
    ) -> Result<()> {
        let partition = self.element_partition(ElementKind::Edge, edge_type)?;
        self.backend()
            .map_remove(&partition, &edge_uid.into(), ATTR_TARGETS, &[tar_uid])?;
        self.backend().map_remove(
            &self.vertex_partition_raw(tar_type),
            &tar_uid.into(),
            ATTR_INCOMING,
            &[edge_uid],
        )
    }

    /// The source vertex (uid, type) of an edge.
    pub fn edge_source(&self, edge_uid: i64, edge_type: &str) -> Result<(i64, String)> {
        let record = self.get_element(edge_uid, ElementKind::Edge, edge_type)?;
        let uid = record
            .get(ATTR_SOURCE_UID)
            .and_then(Value::as_int)
            .ok_or_else(|| corrupt_edge(edge_uid, edge_type, ATTR_SOURCE_UID))?;
        let ty = record
            .get(ATTR_SOURCE_TYPE)
            .and_then(Value::as_str)
            .ok_or_else(|| corrupt_edge(edge_uid, edge_type, ATTR_SOURCE_TYPE))?;
        Ok((uid, ty.to_string()))
    }

    /// The target map (vertex uid → vertex type) of an edge.
    pub fn edge_targets(&self, edge_uid: i64, edge_type: &str) -> Result<BTreeMap<i64, String>> {
        let record = self.get_element(edge_uid, ElementKind::Edge, edge_type)?;
        Ok(map_field(&record, ATTR_TARGETS))
    }

    /// One adjacency map of a vertex, optionally filtered by edge type.
    pub fn vertex_adjacency(
        &self,
        uid: i64,
        vertex_type: &str,
        direction: EdgeDirection,
        edge_type: Option<&str>,
    ) -> Result<BTreeMap<i64, String>> {
        let record = self.get_element(uid, ElementKind::Vertex, vertex_type)?;
        let mut edges = map_field(&record, direction.field());
        if let Some(filter) = edge_type {
            edges.retain(|_, ty| ty == filter);
        }
        Ok(edges)
    }

    /// Uids of every edge of a type sourced at the given vertex.
    pub fn edges_by_source(&self, source_uid: i64, edge_type: &str) -> Result<Vec<i64>> {
        let predicates: Predicates =
            [(ATTR_SOURCE_UID.to_string(), Value::Int(source_uid))].into();
        self.search(ElementKind::Edge, edge_type, &predicates)
    }
}

fn corrupt_edge(edge_uid: i64, edge_type: &str, field: &str) -> GraphError {
    GraphError::invalid_argument(format!(
        "edge {edge_type}/{edge_uid} is missing its {field} attribute"
    ))
}
