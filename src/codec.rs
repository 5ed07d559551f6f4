//! Pluggable byte codec for the unstructured attribute blob.
//!
//! Properties outside a type's schema are persisted as one opaque serialized
//! map per element. The codec is a seam, not a design concern: anything that
//! round-trips a JSON-valued map through bytes qualifies.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::error::{GraphError, Result};

/// An element's unstructured attributes: open key→value map.
pub type AttrMap = BTreeMap<String, JsonValue>;

/// Serializes the unstructured attribute map to and from bytes.
pub trait BlobCodec: Send + Sync + 'static {
    /// Encodes the map into the stored blob.
    fn encode(&self, attrs: &AttrMap) -> Result<Vec<u8>>;
    /// Decodes a stored blob. An empty blob decodes to an empty map.
    fn decode(&self, blob: &[u8]) -> Result<AttrMap>;
}

/// Default codec: compact JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl BlobCodec for JsonCodec {
    fn encode(&self, attrs: &AttrMap) -> Result<Vec<u8>> {
        serde_json::to_vec(attrs).map_err(|err| GraphError::codec(err.to_string()))
    }

    fn decode(&self, blob: &[u8]) -> Result<AttrMap> {
        if blob.is_empty() {
            return Ok(AttrMap::new());
        }
        serde_json::from_slice(blob).map_err(|err| GraphError::codec(err.to_string()))
    }
}
