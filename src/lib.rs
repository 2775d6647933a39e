//! Validation, identifier resolution and diff diagrams for Studio call-flow definitions.
//!
//! Reading flows, fetching directory contents and publishing results belong to the
//! caller; see [`batch::FlowSource`], [`directories::DirectorySnapshot`] and
//! [`batch::FlowPublisher`].
#![forbid(unsafe_code)]

pub mod batch;
pub mod bundle;
pub mod config;
pub mod diagram;
pub mod directories;
pub mod error;
pub mod json_output;
pub mod lint;
pub mod loader;
pub mod model;
pub mod path_safety;
pub mod replace;
pub mod util;
pub mod validate;
pub mod widget;

pub use bundle::FlowBundle;
pub use config::DeployConfig;
pub use diagram::{Diagram, render_diff, render_flow};
pub use directories::{DirectorySnapshot, ResourceDirectories};
pub use model::FlowDoc;
pub use validate::{FlowValidation, ValidationContext};

use crate::{
    error::Result, json_output::ValidationReport, lint::lint_builtin_rules,
    loader::load_flow_from_str_with_source, validate::validate_flow,
};

/// Offline check of one flow: document shape, graph invariants and managed widget shape.
pub fn check_flow(json: &str) -> Result<FlowValidation> {
    check_flow_with_source(json, "<inline>")
}

/// Same as [`check_flow`] but lets callers label the source for diagnostics.
pub fn check_flow_with_source(
    json: &str,
    source_label: impl Into<String>,
) -> Result<FlowValidation> {
    let flow = load_flow_from_str_with_source(json, source_label)?;
    Ok(validate_flow(&flow, ValidationContext::offline()))
}

/// Offline check rendered as a JSON report, including graph lint findings.
pub fn check_flow_to_json(json: &str, source_label: &str) -> String {
    match load_flow_from_str_with_source(json, source_label) {
        Ok(flow) => {
            let validation = validate_flow(&flow, ValidationContext::offline());
            ValidationReport::from_validation(
                Some(source_label.to_string()),
                &validation,
                lint_builtin_rules(&flow),
            )
            .into_string()
        }
        Err(err) => ValidationReport::error(Some(source_label.to_string()), err).into_string(),
    }
}
