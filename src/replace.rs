//! Rewrites environment-bound widget fields to the identifiers of the target environment.
//!
//! Replacement never does I/O: every lookup is a read from [`ResourceDirectories`]. It
//! expects widgets that already passed validation and mutates the state's property object
//! in place, recording one [`ChangeRecord`] per field written.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    config::DeployConfig,
    directories::{ResourceDirectories, SubflowRef},
    model::{FlowDoc, StateDoc},
    validate::FlowValidation,
    widget::{
        ManagedWidget, RunFunctionWidget, RunSubflowWidget, SendToFlexWidget, WidgetType,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    pub node: String,
    pub widget_type: String,
    pub field: String,
    pub value: String,
    /// Value before the write, if the field held a string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
}

impl ChangeRecord {
    /// Whether the write actually changed the stored value.
    pub fn is_effective(&self) -> bool {
        self.previous.as_deref() != Some(self.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{widget_type} widget '{node}': {message}")]
pub struct ReplacementError {
    pub node: String,
    pub widget_type: String,
    pub message: String,
}

/// A run-subflow widget whose target will only exist once another flow of this run is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingSubflow {
    pub node: String,
    pub subflow_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplacementReport {
    pub changes: Vec<ChangeRecord>,
    pub errors: Vec<ReplacementError>,
    pub pending: Vec<PendingSubflow>,
}

impl ReplacementReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn effective_changes(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.changes.iter().filter(|c| c.is_effective())
    }
}

struct FieldWriter<'s> {
    state: &'s mut StateDoc,
    widget_type: WidgetType,
    changes: Vec<ChangeRecord>,
}

impl<'s> FieldWriter<'s> {
    fn new(state: &'s mut StateDoc, widget_type: WidgetType) -> Self {
        FieldWriter {
            state,
            widget_type,
            changes: Vec::new(),
        }
    }

    fn set(&mut self, field: &str, value: &str) {
        let previous = self
            .state
            .properties_mut()
            .insert(field.to_string(), Value::String(value.to_string()));
        self.record(field, value, previous);
    }

    fn record(&mut self, field: &str, value: &str, previous: Option<Value>) {
        debug!(
            node = %self.state.name,
            widget_type = %self.widget_type,
            field,
            value,
            "replaced widget field"
        );
        self.changes.push(ChangeRecord {
            node: self.state.name.clone(),
            widget_type: self.widget_type.to_string(),
            field: field.to_string(),
            value: value.to_string(),
            previous: previous.and_then(|v| v.as_str().map(str::to_string)),
        });
    }

    fn error(&self, message: String) -> ReplacementError {
        ReplacementError {
            node: self.state.name.clone(),
            widget_type: self.widget_type.to_string(),
            message,
        }
    }
}

/// Point a run-function widget at the configured service environment.
pub fn replace_run_function(
    state: &mut StateDoc,
    widget: &RunFunctionWidget,
    directories: &ResourceDirectories,
    config: Option<&DeployConfig>,
) -> Result<Vec<ChangeRecord>, ReplacementError> {
    let mut writer = FieldWriter::new(state, WidgetType::RunFunction);
    let Some(service) = directories.function_service(&widget.url.service_name, config) else {
        return Err(writer.error(format!(
            "Unknown Service '{}'. (Are you missing a 'functionServices' entry in your config file?)",
            widget.url.service_name
        )));
    };
    let Some(function_sid) = service.functions.get(&widget.url.function_path) else {
        return Err(writer.error(format!(
            "Unknown Function Path '{}'",
            widget.url.function_path
        )));
    };

    writer.set("service_sid", &service.service_sid);
    writer.set("environment_sid", &service.environment_sid);
    writer.set("function_sid", function_sid);
    writer.set("url", &widget.url.on_domain(&service.domain_name));
    Ok(writer.changes)
}

/// Point a send-to-flex widget at the task channel and workflow named in its attributes.
pub fn replace_send_to_flex(
    state: &mut StateDoc,
    widget: &SendToFlexWidget,
    directories: &ResourceDirectories,
) -> Result<Vec<ChangeRecord>, ReplacementError> {
    let mut writer = FieldWriter::new(state, WidgetType::SendToFlex);
    let Some(channel_sid) = directories.channel(&widget.channel_name) else {
        return Err(writer.error(format!(
            "Unknown channelName '{}'. (Must match the uniqueName of an existing TaskChannel)",
            widget.channel_name
        )));
    };
    let Some(workflow_sid) = directories.workflow(&widget.workflow_name) else {
        return Err(writer.error(format!(
            "Unknown workflowName '{}'. (Are you missing a 'workflowMap' entry in your config file?)",
            widget.workflow_name
        )));
    };
    writer.set("channel", channel_sid);
    writer.set("workflow", workflow_sid);
    Ok(writer.changes)
}

/// Overwrite variables whose key appears in `replacements`. Keys the widget does not
/// declare are ignored.
pub fn replace_set_variables(
    state: &mut StateDoc,
    replacements: &IndexMap<String, String>,
) -> Vec<ChangeRecord> {
    let mut writer = FieldWriter::new(state, WidgetType::SetVariables);
    for (key, value) in replacements {
        let previous = writer
            .state
            .properties_mut()
            .get_mut("variables")
            .and_then(Value::as_array_mut)
            .and_then(|vars| {
                vars.iter_mut()
                    .find(|v| v.get("key").and_then(Value::as_str) == Some(key.as_str()))
            })
            .and_then(Value::as_object_mut)
            .map(|var| var.insert("value".to_string(), Value::String(value.clone())));
        if let Some(previous) = previous {
            writer.record(&format!("variables.{key}.value"), value, previous);
        }
    }
    writer.changes
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubflowReplacement {
    Replaced(Vec<ChangeRecord>),
    Pending(PendingSubflow),
}

/// Point a run-subflow widget at the sid of its `subflowName`. Sub-flows that have not
/// been created yet are reported as pending and `flow_sid` is left untouched.
pub fn replace_run_subflow(
    state: &mut StateDoc,
    widget: &RunSubflowWidget,
    directories: &ResourceDirectories,
) -> Result<SubflowReplacement, ReplacementError> {
    let mut writer = FieldWriter::new(state, WidgetType::RunSubflow);
    match directories.subflow(&widget.subflow_name) {
        Some(SubflowRef::Resolved(sid)) => {
            writer.set("flow_sid", sid);
            Ok(SubflowReplacement::Replaced(writer.changes))
        }
        Some(SubflowRef::Pending(_)) => {
            warn!(
                node = %writer.state.name,
                subflow = %widget.subflow_name,
                "sub-flow not created yet; flow_sid left pending"
            );
            Ok(SubflowReplacement::Pending(PendingSubflow {
                node: writer.state.name.clone(),
                subflow_name: widget.subflow_name.clone(),
            }))
        }
        None => Err(writer.error(format!(
            "Unknown subflowName '{}'",
            widget.subflow_name
        ))),
    }
}

/// Set `properties.<key>` on the named widget to a literal value. Unknown widget names
/// produce no change.
pub fn set_widget_property(
    flow: &mut FlowDoc,
    widget_name: &str,
    property_key: &str,
    property_value: &str,
) -> Vec<ChangeRecord> {
    let Some(state) = flow.state_mut(widget_name) else {
        return Vec::new();
    };
    let previous = state.properties_mut().insert(
        property_key.to_string(),
        Value::String(property_value.to_string()),
    );
    debug!(
        node = widget_name,
        field = property_key,
        "applied custom property replacement"
    );
    vec![ChangeRecord {
        node: widget_name.to_string(),
        widget_type: state.state_type.clone(),
        field: property_key.to_string(),
        value: property_value.to_string(),
        previous: previous.and_then(|v| v.as_str().map(str::to_string)),
    }]
}

/// One pass over the flow's states: rewrite every validated widget whose type is listed in
/// `replaceWidgetTypes`, then apply the custom property replacements for `flow_name`.
pub fn replace_widgets(
    flow: &mut FlowDoc,
    flow_name: &str,
    validation: &FlowValidation,
    config: &DeployConfig,
    directories: &ResourceDirectories,
) -> ReplacementReport {
    let mut report = ReplacementReport::default();
    for state in &mut flow.states {
        let Some(widget) = validation.widget(&state.name) else {
            continue;
        };
        if !config.replaces(widget.widget_type()) {
            continue;
        }
        let outcome = match widget {
            ManagedWidget::RunFunction(w) => {
                replace_run_function(state, w, directories, Some(config))
            }
            ManagedWidget::SendToFlex(w) => replace_send_to_flex(state, w, directories),
            ManagedWidget::SetVariables(_) => {
                Ok(replace_set_variables(state, &config.variable_replacements))
            }
            ManagedWidget::RunSubflow(w) => match replace_run_subflow(state, w, directories) {
                Ok(SubflowReplacement::Replaced(changes)) => Ok(changes),
                Ok(SubflowReplacement::Pending(pending)) => {
                    report.pending.push(pending);
                    Ok(Vec::new())
                }
                Err(err) => Err(err),
            },
        };
        match outcome {
            Ok(changes) => report.changes.extend(changes),
            Err(err) => {
                warn!(error = %err, "widget replacement failed");
                report.errors.push(err);
            }
        }
    }

    for custom in config.custom_replacements_for(flow_name) {
        report.changes.extend(set_widget_property(
            flow,
            &custom.widget_name,
            &custom.property_key,
            &custom.property_value,
        ));
    }
    report
}

/// Resolve sub-flow references that were pending during [`replace_widgets`], once the
/// sub-flows exist in `directories`.
pub fn finalize_pending_subflows(
    flow: &mut FlowDoc,
    pending: &[PendingSubflow],
    directories: &ResourceDirectories,
) -> ReplacementReport {
    let mut report = ReplacementReport::default();
    for entry in pending {
        let Some(state) = flow.state_mut(&entry.node) else {
            report.errors.push(ReplacementError {
                node: entry.node.clone(),
                widget_type: WidgetType::RunSubflow.to_string(),
                message: "widget no longer present in flow".to_string(),
            });
            continue;
        };
        let mut writer = FieldWriter::new(state, WidgetType::RunSubflow);
        match directories.subflow(&entry.subflow_name).and_then(SubflowRef::sid) {
            Some(sid) => {
                writer.set("flow_sid", sid);
                report.changes.extend(writer.changes);
            }
            None => {
                let err = writer.error(format!(
                    "sub-flow '{}' has still not been created",
                    entry.subflow_name
                ));
                warn!(error = %err, "pending sub-flow unresolved");
                report.errors.push(err);
                report.pending.push(entry.clone());
            }
        }
    }
    report
}

