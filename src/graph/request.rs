//! Request objects for type creation and vertex insertion.
//!
//! Callers hand the facade one flat property map; the boundary splits it
//! against the type's schema into structured fields (type-checked) and the
//! unstructured remainder.

use serde_json::Value as JsonValue;

use crate::codec::AttrMap;
use crate::error::{GraphError, Result};
use crate::model::{
    value_from_json, AttrType, Record, TypeHandle, TypeRef, TypeSchema, RESERVED_ATTRS,
};

/// Definition of a new vertex type.
#[derive(Clone, Debug)]
pub struct VertexTypeSpec {
    pub(crate) name: String,
    pub(crate) schema: TypeSchema,
}

impl VertexTypeSpec {
    /// Starts a vertex type definition with an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: TypeSchema::new(),
        }
    }

    /// Declares a structured attribute.
    pub fn attr(mut self, ty: AttrType, name: impl Into<String>) -> Self {
        self.schema.push((ty, name.into()));
        self
    }
}

/// Definition of a new edge type.
#[derive(Clone, Debug)]
pub struct EdgeTypeSpec {
    pub(crate) name: String,
    pub(crate) schema: TypeSchema,
}

impl EdgeTypeSpec {
    /// Starts an edge type definition with an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: TypeSchema::new(),
        }
    }

    /// Declares a structured attribute.
    pub fn attr(mut self, ty: AttrType, name: impl Into<String>) -> Self {
        self.schema.push((ty, name.into()));
        self
    }
}

/// A vertex waiting to be inserted.
#[derive(Clone, Debug)]
pub struct VertexSpec {
    pub(crate) vertex_type: Option<TypeRef>,
    pub(crate) properties: AttrMap,
}

impl VertexSpec {
    /// A vertex of a declared type.
    pub fn of_type(vertex_type: impl Into<TypeRef>) -> Self {
        Self {
            vertex_type: Some(vertex_type.into()),
            properties: AttrMap::new(),
        }
    }

    /// An untyped vertex for the generic partition. It may only carry
    /// unstructured properties.
    pub fn generic() -> Self {
        Self {
            vertex_type: None,
            properties: AttrMap::new(),
        }
    }

    /// Attaches a property. Whether it lands structured or unstructured is
    /// decided against the type schema at insertion.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Splits a flat property map against a type's schema.
pub(crate) fn split_properties(
    handle: &TypeHandle,
    properties: &AttrMap,
) -> Result<(Record, AttrMap)> {
    let mut structured = Record::new();
    let mut unstructured = AttrMap::new();
    for (key, value) in properties {
        if RESERVED_ATTRS.contains(&key.as_str()) {
            return Err(GraphError::invalid_argument(format!(
                "attribute {key} is reserved and maintained by the store"
            )));
        }
        match handle.attr_type(key) {
            Some(ty) => {
                structured.insert(key.clone(), value_from_json(ty, key, value)?);
            }
            None => {
                unstructured.insert(key.clone(), value.clone());
            }
        }
    }
    Ok((structured, unstructured))
}
