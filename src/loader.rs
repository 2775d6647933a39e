//! Flow document loading: JSON text, embedded schema, typed decode, graph invariants.

use crate::{
    error::{FlowError, FlowErrorLocation, Result, SchemaErrorDetail},
    model::{ENTRY_STATE_NAME, FlowDoc},
};
use jsonschema::{Draft, Validator};
use serde_json::Value;
use std::{collections::HashSet, fs, path::Path};

const INLINE_SOURCE: &str = "<inline>";
const SCHEMA_LABEL: &str = "studio-flow.schema.json";

lazy_static::lazy_static! {
    /// Compiled once; a broken embedded schema surfaces as an `Internal` error on every load.
    static ref FLOW_SCHEMA: std::result::Result<Validator, String> = compile_schema(
        include_str!("../schemas/studio-flow.schema.json")
    );
}

fn compile_schema(text: &str) -> std::result::Result<Validator, String> {
    let schema: Value =
        serde_json::from_str(text).map_err(|e| format!("schema parse for {SCHEMA_LABEL}: {e}"))?;
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|e| format!("schema compile for {SCHEMA_LABEL}: {e}"))
}

/// Load a flow definition from JSON text.
pub fn load_flow_from_str(json: &str) -> Result<FlowDoc> {
    load_flow_from_str_with_source(json, INLINE_SOURCE)
}

/// Same as [`load_flow_from_str`] but lets callers label the source for diagnostics.
pub fn load_flow_from_str_with_source(
    json: &str,
    source_label: impl Into<String>,
) -> Result<FlowDoc> {
    parse_and_decode(json, &source_label.into(), None)
}

pub fn load_flow_from_path(path: &Path) -> Result<FlowDoc> {
    let label = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|e| FlowError::Internal {
        message: format!("failed to read {label}: {e}"),
        location: FlowErrorLocation::at_path(label.clone()).with_source_path(Some(path)),
    })?;
    parse_and_decode(&text, &label, Some(path))
}

/// Load a flow definition that has already been decoded into a JSON value.
pub fn load_flow_from_value(value: Value, source_label: impl Into<String>) -> Result<FlowDoc> {
    decode_value(value, &source_label.into(), None)
}

fn parse_and_decode(json: &str, source_label: &str, source_path: Option<&Path>) -> Result<FlowDoc> {
    let value: Value = serde_json::from_str(json).map_err(|e| FlowError::Json {
        message: e.to_string(),
        location: FlowErrorLocation::at_path(format!("{source_label}:{}:{}", e.line(), e.column()))
            .with_source_path(source_path),
    })?;
    decode_value(value, source_label, source_path)
}

fn decode_value(value: Value, source_label: &str, source_path: Option<&Path>) -> Result<FlowDoc> {
    check_schema(&value, source_label, source_path)?;
    let flow: FlowDoc = serde_json::from_value(value).map_err(|e| FlowError::Internal {
        message: format!("flow decode: {e}"),
        location: FlowErrorLocation::at_path(source_label).with_source_path(source_path),
    })?;
    check_graph_invariants(&flow, source_label, source_path)?;
    Ok(flow)
}

/// Entry node, concurrency flag and node-name uniqueness. Any failure aborts the whole flow.
pub fn check_graph_invariants(
    flow: &FlowDoc,
    source_label: &str,
    source_path: Option<&Path>,
) -> Result<()> {
    let violation = |message: String, field: &str, pointer: String| FlowError::GraphInvariant {
        message,
        location: FlowErrorLocation::at_path(format!("{source_label}::{field}"))
            .with_source_path(source_path)
            .with_json_pointer(Some(pointer)),
    };

    if flow.initial_state != ENTRY_STATE_NAME {
        return Err(violation(
            format!(
                "initial_state must be '{ENTRY_STATE_NAME}', found '{}'",
                flow.initial_state
            ),
            "initial_state",
            "/initial_state".to_string(),
        ));
    }
    if !flow.flags.allow_concurrent_calls {
        return Err(violation(
            "flags.allow_concurrent_calls must be true".to_string(),
            "flags.allow_concurrent_calls",
            "/flags/allow_concurrent_calls".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    if let Some((idx, state)) = flow
        .states
        .iter()
        .enumerate()
        .find(|(_, state)| !seen.insert(state.name.as_str()))
    {
        return Err(violation(
            format!("duplicate state name '{}'", state.name),
            &format!("states.{idx}"),
            format!("/states/{idx}/name"),
        ));
    }
    Ok(())
}

fn check_schema(doc: &Value, source_label: &str, source_path: Option<&Path>) -> Result<()> {
    let validator = FLOW_SCHEMA.as_ref().map_err(|message| FlowError::Internal {
        message: message.clone(),
        location: FlowErrorLocation::at_path(SCHEMA_LABEL),
    })?;
    let details: Vec<SchemaErrorDetail> = validator
        .iter_errors(doc)
        .map(|err| {
            let pointer = match err.instance_path().to_string() {
                root if root.is_empty() => "/".to_string(),
                pointer => pointer,
            };
            SchemaErrorDetail {
                message: err.to_string(),
                location: FlowErrorLocation::at_path(format!("{source_label}{pointer}"))
                    .with_source_path(source_path)
                    .with_json_pointer(Some(pointer)),
            }
        })
        .collect();
    if details.is_empty() {
        return Ok(());
    }

    let message = details
        .iter()
        .map(|d| format!("{}: {}", d.location.path.as_deref().unwrap_or(source_label), d.message))
        .collect::<Vec<_>>()
        .join("\n");
    Err(FlowError::Schema {
        message,
        details,
        location: FlowErrorLocation::at_path(source_label).with_source_path(source_path),
    })
}
