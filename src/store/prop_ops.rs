//! Property access with the structured/unstructured split.
//!
//! Reads check the structured fields first and fall back to the
//! deserialized payload blob. Writes touch a structured field in place when
//! the key is in the schema; anything else goes through a read-modify-write
//! of the whole record, so concurrent unstructured writers can lose updates
//! (per-key last-write-wins, same as the rest of the store).

use std::collections::BTreeSet;

use serde_json::Value as JsonValue;

use crate::error::{GraphError, Result};
use crate::model::{
    value_from_json, value_to_json, AttrType, ElementKind, Value, ATTR_PAYLOAD, RESERVED_ATTRS,
};
use crate::store::elements::ElementStore;

impl ElementStore {
    /// Returns a property value, structured fields first, then the
    /// unstructured map. `None` means absent everywhere.
    pub fn get_property(
        &self,
        uid: i64,
        kind: ElementKind,
        type_name: &str,
        key: &str,
    ) -> Result<Option<JsonValue>> {
        let record = self.get_element(uid, kind, type_name)?;
        if key != ATTR_PAYLOAD {
            if let Some(value) = record.get(key) {
                return Ok(Some(value_to_json(value)));
            }
        }
        let blob = record
            .get(ATTR_PAYLOAD)
            .and_then(Value::as_bytes)
            .unwrap_or_default();
        Ok(self.codec().decode(blob)?.get(key).cloned())
    }

    /// Sets a property. Schema keys are type-checked and written in place;
    /// everything else lands in the unstructured map. Reserved attributes
    /// are managed by the store and cannot be set here.
    pub fn set_property(
        &self,
        uid: i64,
        kind: ElementKind,
        type_name: &str,
        key: &str,
        value: &JsonValue,
    ) -> Result<()> {
        if RESERVED_ATTRS.contains(&key) {
            return Err(GraphError::invalid_argument(format!(
                "attribute {key} is reserved and maintained by the store"
            )));
        }
        let mut record = self.get_element(uid, kind, type_name)?;
        if let Some(existing) = record.get(key) {
            let ty = match existing {
                Value::Int(_) => AttrType::Int,
                Value::Str(_) => AttrType::Str,
                Value::IntStrMap(_) => AttrType::IntStrMap,
                _ => {
                    return Err(GraphError::invalid_argument(format!(
                        "attribute {key} is not settable"
                    )))
                }
            };
            record.insert(key.to_string(), value_from_json(ty, key, value)?);
        } else {
            let blob = record
                .get(ATTR_PAYLOAD)
                .and_then(Value::as_bytes)
                .unwrap_or_default();
            let mut attrs = self.codec().decode(blob)?;
            attrs.insert(key.to_string(), value.clone());
            record.insert(
                ATTR_PAYLOAD.to_string(),
                Value::Bytes(self.codec().encode(&attrs)?),
            );
        }
        self.put_element(uid, kind, type_name, record)
    }

    /// Every property key present on the element: structured field names
    /// plus the keys inside the unstructured map.
    pub fn property_keys(
        &self,
        uid: i64,
        kind: ElementKind,
        type_name: &str,
    ) -> Result<BTreeSet<String>> {
        let record = self.get_element(uid, kind, type_name)?;
        let mut keys = BTreeSet::new();
        for (field, value) in &record {
            if field == ATTR_PAYLOAD {
                let blob = value.as_bytes().unwrap_or_default();
                keys.extend(self.codec().decode(blob)?.into_keys());
            } else {
                keys.insert(field.clone());
            }
        }
        Ok(keys)
    }
}
