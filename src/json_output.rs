use crate::{
    error::{FlowError, FlowErrorLocation},
    validate::{FlowValidation, WidgetIssue},
};
use serde::Serialize;

/// One finding in a [`ValidationReport`]: either document-level (location fields) or
/// node-scoped (`node` + `path`).
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct JsonDiagnostic {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_pointer: Option<String>,
}

impl JsonDiagnostic {
    pub fn at(message: impl Into<String>, location: &FlowErrorLocation) -> Self {
        JsonDiagnostic {
            message: message.into(),
            node: None,
            path: location.path.clone(),
            source_path: location
                .source_path
                .as_ref()
                .map(|p| p.display().to_string()),
            json_pointer: location.json_pointer.clone(),
        }
    }

    pub fn for_issue(node: &str, issue: &WidgetIssue) -> Self {
        JsonDiagnostic {
            message: issue.message.clone(),
            node: Some(node.to_string()),
            path: Some(issue.path.clone()),
            source_path: None,
            json_pointer: None,
        }
    }
}

/// Machine-readable result of checking one flow.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ValidationReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<JsonDiagnostic>,
    /// Graph lint findings; informational, they never clear `ok`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lint: Vec<String>,
}

impl ValidationReport {
    pub fn from_validation(
        flow: Option<String>,
        validation: &FlowValidation,
        lint: Vec<String>,
    ) -> Self {
        let errors: Vec<JsonDiagnostic> = validation
            .failures()
            .flat_map(|w| {
                w.issues
                    .iter()
                    .map(move |issue| JsonDiagnostic::for_issue(&w.name, issue))
            })
            .collect();
        ValidationReport {
            ok: errors.is_empty(),
            flow,
            errors,
            lint,
        }
    }

    pub fn error(flow: Option<String>, err: FlowError) -> Self {
        ValidationReport {
            ok: false,
            flow,
            errors: flow_error_to_reports(&err),
            lint: Vec::new(),
        }
    }

    pub fn into_string(self) -> String {
        serde_json::to_string(&self).expect("validation report serialization")
    }
}

/// Schema failures expand to one diagnostic per violation; everything else is a single entry.
pub fn flow_error_to_reports(err: &FlowError) -> Vec<JsonDiagnostic> {
    if let FlowError::Schema { details, .. } = err
        && !details.is_empty()
    {
        return details
            .iter()
            .map(|detail| JsonDiagnostic::at(detail.message.clone(), &detail.location))
            .collect();
    }
    vec![JsonDiagnostic::at(err.to_string(), err.location())]
}
