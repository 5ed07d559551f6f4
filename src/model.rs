//! Core vocabulary: element kinds, attribute types, schemas, keys, records.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{GraphError, Result};

/// Pseudo-type for vertices created without a declared type. Elements of
/// this type live in a reserved fallback partition.
pub const GENERIC_VERTEX: &str = "generic_vertex";

/// The first identifier ever issued by a fresh graph. Seeing this value in
/// the wild distinguishes "graph in use" from "graph never used".
pub const FIRST_UID: i64 = -100_001;

/// Seed written into the counter record so the first atomic increment
/// yields [`FIRST_UID`]. Ids ascend from there and are never reused unless
/// recycling is switched on.
pub const COUNTER_SEED: i64 = FIRST_UID - 1;

/// Reserved vertex attribute: map of incoming edge uid to edge type name.
pub const ATTR_INCOMING: &str = "incoming_edges";
/// Reserved vertex attribute: map of outgoing edge uid to edge type name.
pub const ATTR_OUTGOING: &str = "outgoing_edges";
/// Reserved edge attribute: uid of the single source vertex.
pub const ATTR_SOURCE_UID: &str = "source_uid";
/// Reserved edge attribute: type name of the source vertex.
pub const ATTR_SOURCE_TYPE: &str = "source_vertex_type";
/// Reserved edge attribute: map of target vertex uid to vertex type name.
pub const ATTR_TARGETS: &str = "targets";
/// Reserved blob field carrying the serialized unstructured attribute map.
pub const ATTR_PAYLOAD: &str = "payload";

/// Attribute names callers may not declare in a schema or set directly.
pub const RESERVED_ATTRS: [&str; 6] = [
    ATTR_INCOMING,
    ATTR_OUTGOING,
    ATTR_SOURCE_UID,
    ATTR_SOURCE_TYPE,
    ATTR_TARGETS,
    ATTR_PAYLOAD,
];

/// Namespace of a type name: a vertex type and an edge type may share one.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// Vertex types and vertices.
    Vertex,
    /// Edge types and edges.
    Edge,
}

impl ElementKind {
    /// Lowercase name used in partition names and qualified type strings.
    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::Vertex => "vertex",
            ElementKind::Edge => "edge",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primitive types available to structured (schema-declared) attributes.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrType {
    /// 64-bit signed integer.
    Int,
    /// UTF-8 string.
    Str,
    /// Map of int to string (the adjacency/target map shape).
    IntStrMap,
}

impl AttrType {
    /// Stable name used in type-description records.
    pub fn as_str(self) -> &'static str {
        match self {
            AttrType::Int => "int",
            AttrType::Str => "string",
            AttrType::IntStrMap => "map(int,string)",
        }
    }

    /// Inverse of [`AttrType::as_str`].
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "int" => Ok(AttrType::Int),
            "string" => Ok(AttrType::Str),
            "map(int,string)" => Ok(AttrType::IntStrMap),
            other => Err(GraphError::invalid_argument(format!(
                "unknown attribute type: {other}"
            ))),
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered list of `(type, name)` attribute declarations.
pub type TypeSchema = Vec<(AttrType, String)>;

/// A resolved element type: kind, name, and its full schema (reserved
/// attributes included).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeHandle {
    /// Namespace the type lives in.
    pub kind: ElementKind,
    /// Unique name within the kind.
    pub name: String,
    /// Declared attributes, reserved ones included.
    pub schema: TypeSchema,
}

impl TypeHandle {
    /// Looks up the declared type of an attribute, if any.
    pub fn attr_type(&self, attr: &str) -> Option<AttrType> {
        self.schema
            .iter()
            .find(|(_, name)| name == attr)
            .map(|(ty, _)| *ty)
    }
}

/// A type argument at an API boundary: either a bare name or an already
/// resolved handle. Normalized to the name before it reaches the store.
#[derive(Clone, Debug)]
pub enum TypeRef {
    /// Refer to a type by name only.
    Named(String),
    /// Carry a resolved handle (avoids a registry round-trip on the name).
    Resolved(TypeHandle),
}

impl TypeRef {
    /// The type name this reference denotes.
    pub fn name(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::Resolved(handle) => &handle.name,
        }
    }
}

impl From<&str> for TypeRef {
    fn from(name: &str) -> Self {
        TypeRef::Named(name.to_string())
    }
}

impl From<String> for TypeRef {
    fn from(name: String) -> Self {
        TypeRef::Named(name)
    }
}

impl From<TypeHandle> for TypeRef {
    fn from(handle: TypeHandle) -> Self {
        TypeRef::Resolved(handle)
    }
}

impl From<&TypeHandle> for TypeRef {
    fn from(handle: &TypeHandle) -> Self {
        TypeRef::Resolved(handle.clone())
    }
}

/// Builds the `kind:name` qualified type string used on the wire.
pub fn qualify(kind: ElementKind, name: &str) -> String {
    format!("{}:{}", kind.as_str(), name)
}

/// Splits a `kind:name` qualified type string.
pub fn parse_qualified(s: &str) -> Result<(ElementKind, &str)> {
    match s.split_once(':') {
        Some(("vertex", name)) => Ok((ElementKind::Vertex, name)),
        Some(("edge", name)) => Ok((ElementKind::Edge, name)),
        _ => Err(GraphError::invalid_argument(format!(
            "malformed qualified type: {s}"
        ))),
    }
}

/// Backend record key. System records use string keys; element records use
/// the element uid.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Integer key (element uids).
    Int(i64),
    /// String key (system records).
    Str(String),
}

impl Key {
    /// The integer form, if this is an integer key.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Key::Int(v) => Some(*v),
            Key::Str(_) => None,
        }
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Str(v.to_string())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(v) => write!(f, "{v}"),
            Key::Str(v) => f.write_str(v),
        }
    }
}

/// A single stored field value. The variant set is exactly what the graph
/// layer needs from the backend: scalars for structured attributes, a bytes
/// blob for the unstructured payload, sets for the system/obsolete-id
/// records, and the two map shapes for adjacency and type descriptions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// 64-bit signed integer.
    Int(i64),
    /// UTF-8 string.
    Str(String),
    /// Opaque byte blob.
    Bytes(Vec<u8>),
    /// Set of integers.
    IntSet(BTreeSet<i64>),
    /// Set of strings.
    StrSet(BTreeSet<String>),
    /// Map of int to string.
    IntStrMap(BTreeMap<i64, String>),
    /// Map of string to string.
    StrStrMap(BTreeMap<String, String>),
}

impl Value {
    /// Integer accessor.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// String accessor.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Byte-blob accessor.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Int→string map accessor.
    pub fn as_int_str_map(&self) -> Option<&BTreeMap<i64, String>> {
        match self {
            Value::IntStrMap(v) => Some(v),
            _ => None,
        }
    }

    /// String-set accessor.
    pub fn as_str_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            Value::StrSet(v) => Some(v),
            _ => None,
        }
    }

    /// String→string map accessor.
    pub fn as_str_str_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Value::StrStrMap(v) => Some(v),
            _ => None,
        }
    }
}

/// A stored record: field name to value.
pub type Record = BTreeMap<String, Value>;

/// Converts a JSON property value into the stored form required by a
/// structured attribute, rejecting type mismatches.
pub fn value_from_json(ty: AttrType, attr: &str, json: &JsonValue) -> Result<Value> {
    match ty {
        AttrType::Int => json
            .as_i64()
            .map(Value::Int)
            .ok_or_else(|| mismatch(attr, ty, json)),
        AttrType::Str => json
            .as_str()
            .map(|s| Value::Str(s.to_string()))
            .ok_or_else(|| mismatch(attr, ty, json)),
        AttrType::IntStrMap => {
            let obj = json.as_object().ok_or_else(|| mismatch(attr, ty, json))?;
            let mut map = BTreeMap::new();
            for (k, v) in obj {
                let key = k
                    .parse::<i64>()
                    .map_err(|_| mismatch(attr, ty, json))?;
                let val = v.as_str().ok_or_else(|| mismatch(attr, ty, json))?;
                map.insert(key, val.to_string());
            }
            Ok(Value::IntStrMap(map))
        }
    }
}

/// Converts a stored value back to its JSON property form.
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Int(v) => JsonValue::from(*v),
        Value::Str(v) => JsonValue::from(v.clone()),
        Value::Bytes(v) => JsonValue::from(v.clone()),
        Value::IntSet(v) => JsonValue::from(v.iter().copied().collect::<Vec<_>>()),
        Value::StrSet(v) => JsonValue::from(v.iter().cloned().collect::<Vec<_>>()),
        Value::IntStrMap(v) => JsonValue::Object(
            v.iter()
                .map(|(k, val)| (k.to_string(), JsonValue::from(val.clone())))
                .collect(),
        ),
        Value::StrStrMap(v) => JsonValue::Object(
            v.iter()
                .map(|(k, val)| (k.clone(), JsonValue::from(val.clone())))
                .collect(),
        ),
    }
}

fn mismatch(attr: &str, ty: AttrType, json: &JsonValue) -> GraphError {
    GraphError::invalid_argument(format!(
        "attribute {attr} expects {ty} but got {json}"
    ))
}
