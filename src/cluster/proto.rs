//! Wire types for the graph operation RPC surface.
//!
//! One tagged variant per operation; every request names its graph, and
//! uid/type pairs travel as `kind:name` qualified type strings. Errors
//! cross the wire as the serialized [`GraphError`] itself, so the client
//! side rebuilds the exact typed failure.

use std::collections::{BTreeMap, BTreeSet};

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::codec::AttrMap;
use crate::error::GraphError;
use crate::model::{ElementKind, TypeSchema};

/// A client-facing graph operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GraphRequest {
    /// Register a vertex type.
    CreateVertexType {
        graph: String,
        /// Type name to register.
        name: String,
        /// User schema (reserved attributes are added server-side).
        schema: TypeSchema,
    },
    /// Register an edge type.
    CreateEdgeType {
        graph: String,
        /// Type name to register.
        name: String,
        /// User schema (reserved attributes are added server-side).
        schema: TypeSchema,
    },
    /// Fetch the full schema of a type.
    GetTypeDefinition {
        graph: String,
        type_ref: String,
    },
    /// Remove a type and every element of it.
    RemoveType {
        graph: String,
        type_ref: String,
    },
    /// List registered type names of one kind.
    ListTypes {
        graph: String,
        /// Which namespace to list.
        kind: ElementKind,
    },
    /// Count stored elements of a type.
    CountElements {
        graph: String,
        type_ref: String,
    },
    /// Uids of every element of a type.
    ElementsOfType {
        graph: String,
        type_ref: String,
    },
    /// Insert a vertex.
    InsertVertex {
        graph: String,
        /// Vertex type name; absent means a generic vertex.
        vertex_type: Option<String>,
        /// Flat property map, split against the schema server-side.
        properties: AttrMap,
    },
    /// Verify a vertex exists.
    GetVertex {
        graph: String,
        /// Vertex identifier.
        uid: i64,
        /// Vertex type name.
        vertex_type: String,
    },
    /// Attribute-equality search over a vertex type.
    SearchVertex {
        graph: String,
        /// Vertex type name.
        vertex_type: String,
        /// Structured-attribute equality predicates.
        predicates: AttrMap,
    },
    /// Read one property of an element.
    GetProperty {
        graph: String,
        /// Element identifier.
        uid: i64,
        type_ref: String,
        /// Property key.
        key: String,
    },
    /// Write one property of an element.
    SetProperty {
        graph: String,
        /// Element identifier.
        uid: i64,
        type_ref: String,
        /// Property key.
        key: String,
        /// Property value.
        value: JsonValue,
    },
    /// All property keys of an element.
    PropertyKeys {
        graph: String,
        /// Element identifier.
        uid: i64,
        type_ref: String,
    },
    /// Create a hyperedge.
    AddEdge {
        graph: String,
        /// Source vertex uid.
        source_uid: i64,
        /// Source vertex type name.
        source_type: String,
        /// Target vertex uid → vertex type name.
        targets: BTreeMap<i64, String>,
        /// Edge type name.
        edge_type: String,
        /// Flat property map, split against the schema server-side.
        properties: AttrMap,
    },
    /// Remove an edge.
    RemoveEdge {
        graph: String,
        /// Source vertex uid.
        source_uid: i64,
        /// Source vertex type name.
        source_type: String,
        /// Edge uid.
        edge_uid: i64,
        /// Edge type name.
        edge_type: String,
    },
    /// Point an existing edge at another target.
    AddTarget {
        graph: String,
        /// Edge uid.
        edge_uid: i64,
        /// Edge type name.
        edge_type: String,
        /// Target vertex uid.
        vertex_uid: i64,
        /// Target vertex type name.
        vertex_type: String,
    },
    /// Detach a target from an existing edge.
    RemoveTarget {
        graph: String,
        /// Edge uid.
        edge_uid: i64,
        /// Edge type name.
        edge_type: String,
        /// Target vertex uid.
        vertex_uid: i64,
        /// Target vertex type name.
        vertex_type: String,
    },
    /// Outgoing adjacency of a vertex.
    OutgoingEdges {
        graph: String,
        /// Vertex uid.
        uid: i64,
        /// Vertex type name.
        vertex_type: String,
        /// Optional edge-type filter.
        edge_type: Option<String>,
    },
    /// Incoming adjacency of a vertex.
    IncomingEdges {
        graph: String,
        /// Vertex uid.
        uid: i64,
        /// Vertex type name.
        vertex_type: String,
        /// Optional edge-type filter.
        edge_type: Option<String>,
    },
    /// Source vertex of an edge.
    EdgeSource {
        graph: String,
        /// Edge uid.
        uid: i64,
        /// Edge type name.
        edge_type: String,
    },
    /// Target map of an edge.
    EdgeTargets {
        graph: String,
        /// Edge uid.
        uid: i64,
        /// Edge type name.
        edge_type: String,
    },
    /// Remove any element by uid and qualified type, cascading.
    RemoveElement {
        graph: String,
        /// Element identifier.
        uid: i64,
        type_ref: String,
    },
}

impl GraphRequest {
    /// Name of the graph the request targets.
    pub fn graph(&self) -> &str {
        use GraphRequest::*;
        match self {
            CreateVertexType { graph, .. }
            | CreateEdgeType { graph, .. }
            | GetTypeDefinition { graph, .. }
            | RemoveType { graph, .. }
            | ListTypes { graph, .. }
            | CountElements { graph, .. }
            | ElementsOfType { graph, .. }
            | InsertVertex { graph, .. }
            | GetVertex { graph, .. }
            | SearchVertex { graph, .. }
            | GetProperty { graph, .. }
            | SetProperty { graph, .. }
            | PropertyKeys { graph, .. }
            | AddEdge { graph, .. }
            | RemoveEdge { graph, .. }
            | AddTarget { graph, .. }
            | RemoveTarget { graph, .. }
            | OutgoingEdges { graph, .. }
            | IncomingEdges { graph, .. }
            | EdgeSource { graph, .. }
            | EdgeTargets { graph, .. }
            | RemoveElement { graph, .. } => graph,
        }
    }
}

/// Result payload of a graph operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum GraphResponse {
    /// The operation completed with nothing to return.
    Done,
    /// A single element identifier.
    Uid {
        /// The identifier.
        uid: i64,
    },
    /// A list of element identifiers.
    Uids {
        /// The identifiers.
        uids: Vec<i64>,
    },
    /// An element count.
    Count {
        /// The count.
        count: u64,
    },
    /// A type's full schema.
    Definition {
        /// Declared attributes, reserved ones included.
        schema: TypeSchema,
    },
    /// A set of type names.
    Names {
        /// The names.
        names: BTreeSet<String>,
    },
    /// A property value, absent if not found anywhere.
    Property {
        /// The value.
        value: Option<JsonValue>,
    },
    /// A set of property keys.
    Keys {
        /// The keys.
        keys: BTreeSet<String>,
    },
    /// An adjacency or target map: uid → type name.
    Adjacency {
        /// The entries.
        edges: BTreeMap<i64, String>,
    },
    /// A reference to a vertex (edge-source lookups).
    SourceRef {
        /// Vertex uid.
        uid: i64,
        /// Vertex type name.
        vertex_type: String,
    },
}

/// HTTP status a graph error maps to on the wire.
pub fn error_status(err: &GraphError) -> StatusCode {
    match err {
        GraphError::TypeNotFound { .. } | GraphError::ElementNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        GraphError::DuplicateType { .. } => StatusCode::CONFLICT,
        GraphError::InvalidArgument { .. } | GraphError::Codec { .. } => StatusCode::BAD_REQUEST,
        GraphError::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        GraphError::WorkerUnreachable { .. } => StatusCode::BAD_GATEWAY,
        GraphError::Transport { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Serializes a graph error into its wire response.
pub fn error_response(err: GraphError) -> (StatusCode, Json<GraphError>) {
    (error_status(&err), Json(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_round_trip_through_json() {
        let req = GraphRequest::AddEdge {
            graph: "default".into(),
            source_uid: -100_001,
            source_type: "User".into(),
            targets: [(-100_000, "Movie".to_string())].into(),
            edge_type: "rates".into(),
            properties: [("stars".to_string(), serde_json::json!(5))].into(),
        };
        let text = serde_json::to_string(&req).unwrap();
        assert!(text.contains("\"op\":\"add_edge\""));
        let back: GraphRequest = serde_json::from_str(&text).unwrap();
        assert_eq!(back.graph(), "default");
    }

    #[test]
    fn typed_errors_survive_the_wire() {
        let err = GraphError::type_not_found(ElementKind::Edge, "rates");
        let text = serde_json::to_string(&err).unwrap();
        let back: GraphError = serde_json::from_str(&text).unwrap();
        assert_eq!(back, err);
        assert_eq!(error_status(&back), StatusCode::NOT_FOUND);
    }
}
