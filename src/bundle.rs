use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{
    error::{FlowError, FlowErrorLocation, Result},
    model::FlowDoc,
};

/// A processed flow definition in canonical form, ready to hand to the publishing collaborator.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlowBundle {
    pub name: String,
    pub json: Value,
    pub hash_blake3: String,
}

impl FlowBundle {
    pub fn from_flow(name: impl Into<String>, flow: &FlowDoc) -> Result<Self> {
        let name = name.into();
        let flow_json = flow.to_value().map_err(|e| FlowError::Internal {
            message: format!("flow serialization: {e}"),
            location: FlowErrorLocation::at_path(name.clone()),
        })?;
        let canonical = canonicalize_json(&flow_json);
        let bytes = serde_json::to_vec(&canonical).map_err(|e| FlowError::Internal {
            message: format!("canonical json encode: {e}"),
            location: FlowErrorLocation::at_path(name.clone()),
        })?;
        Ok(FlowBundle {
            name,
            hash_blake3: blake3_hex(&bytes),
            json: canonical,
        })
    }
}

/// Sort object keys recursively; array order is significant and kept.
pub fn canonicalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(key, item)| (key.clone(), canonicalize_json(item)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize_json).collect()),
        scalar => scalar.clone(),
    }
}

/// Lowercase hex BLAKE3 digest.
pub fn blake3_hex(bytes: impl AsRef<[u8]>) -> String {
    blake3::hash(bytes.as_ref()).to_hex().to_string()
}
