//! Trellis layers a property-graph data model over a generic, schema-light
//! key-value backend and serves it to many client processes through a pool of
//! stateless workers coordinated by a cluster dispatcher.
//!
//! The crate splits into two halves:
//!
//! - the storage engine ([`store`], [`graph`], [`backend`]): how vertices,
//!   edges, types and properties map onto key-value records, how global
//!   identifiers are allocated, and how adjacency indices are maintained
//!   without cross-key transactions;
//! - the cluster layer ([`cluster`]): worker discovery and retirement, FIFO
//!   dispatch of client operations across the live worker set, and orderly
//!   startup/shutdown of the coordinator services.

#![forbid(unsafe_code)]

pub mod backend;
pub mod cluster;
pub mod codec;
pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod store;

pub use error::{GraphError, Result};
pub use graph::{Edge, EdgeTypeSpec, Graph, GraphOptions, Vertex, VertexSpec, VertexTypeSpec};
pub use model::{AttrType, ElementKind, TypeHandle, TypeRef};
