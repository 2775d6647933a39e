//! Two-phase validation of managed widgets.
//!
//! Phase 1 checks the property shape and always runs. Phase 2 resolves names against the
//! resource directories and only runs when directories are supplied ("online" mode).
//! Issues are accumulated per node; a check that depends on a field already reported as
//! missing or malformed is skipped instead of producing a second issue.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use tracing::error;

use crate::{
    config::DeployConfig,
    directories::ResourceDirectories,
    model::{FlowDoc, StateDoc},
    widget::{
        AttributeError, FlexAttributes, FunctionUrl, KeyValue, ManagedWidget, NodeKind,
        RunFunctionWidget, RunSubflowWidget, SendToFlexWidget, SetVariablesWidget, WidgetType,
        classify_state_type,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Shape,
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidgetIssue {
    pub kind: IssueKind,
    pub path: String,
    pub message: String,
}

impl fmt::Display for WidgetIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.path, self.message)
    }
}

/// Outcome for one managed node: `widget` is `Some` exactly when `issues` is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetValidation {
    pub name: String,
    pub widget_type: WidgetType,
    pub widget: Option<ManagedWidget>,
    pub issues: Vec<WidgetIssue>,
}

impl WidgetValidation {
    pub fn is_valid(&self) -> bool {
        self.widget.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowValidation {
    pub widgets: Vec<WidgetValidation>,
}

impl FlowValidation {
    pub fn passed(&self) -> bool {
        self.widgets.iter().all(WidgetValidation::is_valid)
    }

    pub fn failures(&self) -> impl Iterator<Item = &WidgetValidation> {
        self.widgets.iter().filter(|w| !w.is_valid())
    }

    pub fn widget(&self, name: &str) -> Option<&ManagedWidget> {
        self.widgets
            .iter()
            .find(|w| w.name == name)
            .and_then(|w| w.widget.as_ref())
    }

    pub fn valid_widgets(&self) -> impl Iterator<Item = (&str, &ManagedWidget)> {
        self.widgets
            .iter()
            .filter_map(|w| w.widget.as_ref().map(|widget| (w.name.as_str(), widget)))
    }
}

/// What the validator may consult beyond the flow itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationContext<'a> {
    pub config: Option<&'a DeployConfig>,
    pub directories: Option<&'a ResourceDirectories>,
}

impl<'a> ValidationContext<'a> {
    /// Shape checks only.
    pub fn offline() -> Self {
        ValidationContext::default()
    }

    /// Shape checks plus the configured-service check.
    pub fn configured(config: &'a DeployConfig) -> Self {
        ValidationContext {
            config: Some(config),
            directories: None,
        }
    }

    pub fn online(config: &'a DeployConfig, directories: &'a ResourceDirectories) -> Self {
        ValidationContext {
            config: Some(config),
            directories: Some(directories),
        }
    }
}

/// Validate every managed widget of `flow`. Other state types are skipped.
pub fn validate_flow(flow: &FlowDoc, ctx: ValidationContext<'_>) -> FlowValidation {
    let widgets = flow
        .states
        .iter()
        .filter_map(|state| match classify_state_type(&state.state_type) {
            NodeKind::Managed(kind) => Some(validate_state(state, kind, ctx)),
            NodeKind::Other(_) => None,
        })
        .collect();
    FlowValidation { widgets }
}

/// Validate one state as the given managed widget type.
pub fn validate_state(
    state: &StateDoc,
    widget_type: WidgetType,
    ctx: ValidationContext<'_>,
) -> WidgetValidation {
    let mut issues = Issues::default();
    let widget = match state.properties() {
        None => {
            let message = match state.properties {
                Value::Null => "Required",
                _ => "Expected object",
            };
            issues.0.push(WidgetIssue {
                kind: IssueKind::Shape,
                path: "properties".to_string(),
                message: message.to_string(),
            });
            None
        }
        Some(props) => match widget_type {
            WidgetType::RunFunction => {
                check_run_function(props, ctx, &mut issues).map(ManagedWidget::RunFunction)
            }
            WidgetType::SendToFlex => {
                check_send_to_flex(props, ctx, &mut issues).map(ManagedWidget::SendToFlex)
            }
            WidgetType::SetVariables => {
                check_set_variables(props, &mut issues).map(ManagedWidget::SetVariables)
            }
            WidgetType::RunSubflow => {
                check_run_subflow(props, ctx, &mut issues).map(ManagedWidget::RunSubflow)
            }
        },
    };

    let issues = issues.0;
    let widget = if issues.is_empty() { widget } else { None };
    if !issues.is_empty() {
        let rendered = issues
            .iter()
            .map(|i| format!("    {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        error!(
            node = %state.name,
            widget_type = %widget_type,
            "- {}\n{rendered}",
            state.name
        );
    }
    WidgetValidation {
        name: state.name.clone(),
        widget_type,
        widget,
        issues,
    }
}

#[derive(Default)]
struct Issues(Vec<WidgetIssue>);

impl Issues {
    fn shape(&mut self, path: &str, message: impl Into<String>) {
        self.push(IssueKind::Shape, path, message);
    }

    fn reference(&mut self, path: &str, message: impl Into<String>) {
        self.push(IssueKind::Reference, path, message);
    }

    fn push(&mut self, kind: IssueKind, path: &str, message: impl Into<String>) {
        self.0.push(WidgetIssue {
            kind,
            path: format!("properties.{path}"),
            message: message.into(),
        });
    }
}

fn required_str<'p>(props: &'p Map<String, Value>, key: &str, issues: &mut Issues) -> Option<&'p str> {
    match props.get(key) {
        None | Some(Value::Null) => {
            issues.shape(key, "Required");
            None
        }
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => {
            issues.shape(key, "Expected string");
            None
        }
    }
}

fn prefixed_sid<'p>(
    props: &'p Map<String, Value>,
    key: &str,
    prefixes: &[&str],
    issues: &mut Issues,
) -> Option<&'p str> {
    let value = required_str(props, key, issues)?;
    if prefixes.iter().any(|p| value.starts_with(p)) {
        return Some(value);
    }
    let expected = prefixes
        .iter()
        .map(|p| format!("\"{p}\""))
        .collect::<Vec<_>>()
        .join(" or ");
    issues.shape(key, format!("Invalid input: must start with {expected}"));
    None
}

fn key_values(value: &Value, path: &str, issues: &mut Issues) -> Option<Vec<KeyValue>> {
    let Value::Array(items) = value else {
        issues.shape(path, "Expected array");
        return None;
    };
    let mut out = Vec::with_capacity(items.len());
    let mut ok = true;
    for (idx, item) in items.iter().enumerate() {
        let key = item.get("key").and_then(Value::as_str);
        let val = item.get("value").and_then(Value::as_str);
        match (key, val) {
            (Some(key), Some(val)) => out.push(KeyValue {
                key: key.to_string(),
                value: val.to_string(),
            }),
            (None, _) => {
                issues.shape(&format!("{path}.{idx}.key"), "Expected string");
                ok = false;
            }
            (_, None) => {
                issues.shape(&format!("{path}.{idx}.value"), "Expected string");
                ok = false;
            }
        }
    }
    ok.then_some(out)
}

fn check_run_function(
    props: &Map<String, Value>,
    ctx: ValidationContext<'_>,
    issues: &mut Issues,
) -> Option<RunFunctionWidget> {
    let service_sid = prefixed_sid(props, "service_sid", &["ZS"], issues);
    let environment_sid = prefixed_sid(props, "environment_sid", &["ZE"], issues);
    let function_sid = prefixed_sid(props, "function_sid", &["ZH", "ZN"], issues);
    let parameters = match props.get("parameters") {
        None | Some(Value::Null) => Some(Vec::new()),
        Some(value) => key_values(value, "parameters", issues),
    };
    let url = required_str(props, "url", issues).and_then(|raw| {
        let parsed = FunctionUrl::parse(raw);
        if parsed.is_none() {
            issues.shape("url", "Functions URL must match regex");
        }
        parsed
    });

    if let (Some(url), Some(config)) = (&url, ctx.config) {
        if config.function_service(&url.service_name).is_none() {
            issues.reference(
                "url",
                format!(
                    "Unknown Service '{}'. (Are you missing a 'functionServices' entry in your config file?)",
                    url.service_name
                ),
            );
        } else if let Some(directories) = ctx.directories {
            let known = directories
                .function_service(&url.service_name, Some(config))
                .is_some_and(|s| s.functions.contains_key(&url.function_path));
            if !known {
                issues.reference(
                    "url",
                    format!(
                        "Unknown Function Path '{}'. (Is your Functions Service deployed?)",
                        url.function_path
                    ),
                );
            }
        }
    }

    Some(RunFunctionWidget {
        service_sid: service_sid?.to_string(),
        environment_sid: environment_sid?.to_string(),
        function_sid: function_sid?.to_string(),
        url: url?,
        parameters: parameters?,
    })
}

fn check_send_to_flex(
    props: &Map<String, Value>,
    ctx: ValidationContext<'_>,
    issues: &mut Issues,
) -> Option<SendToFlexWidget> {
    let workflow = prefixed_sid(props, "workflow", &["WW"], issues);
    let channel = prefixed_sid(props, "channel", &["TC"], issues);
    let raw = required_str(props, "attributes", issues)?;

    let attributes = match FlexAttributes::extract(raw) {
        Ok(attributes) => attributes,
        Err(AttributeError::InvalidJson) => {
            issues.shape("attributes", "Invalid JSON");
            return None;
        }
        Err(AttributeError::NotAnObject) => {
            issues.shape("attributes", "Expected object");
            return None;
        }
    };
    if attributes.workflow_name.is_none() {
        issues.shape(
            "attributes.workflowName",
            "send-to-flex attributes must contain 'workflowName' field for deployment purposes",
        );
    }
    if attributes.channel_name.is_none() {
        issues.shape(
            "attributes.channelName",
            "send-to-flex attributes must contain 'channelName' field (corresponding to a TaskChannel uniqueName) for deployment purposes",
        );
    }

    if let Some(directories) = ctx.directories {
        if let Some(name) = &attributes.channel_name
            && directories.channel(name).is_none()
        {
            issues.reference(
                "attributes.channelName",
                format!(
                    "Unknown channelName '{name}'. (Must match the uniqueName of an existing TaskChannel)"
                ),
            );
        }
        if let Some(name) = &attributes.workflow_name
            && directories.workflow(name).is_none()
        {
            issues.reference(
                "attributes.workflowName",
                format!(
                    "Unknown workflowName '{name}'. (Must match either a Friendly Name OR the key of a 'workflowMap' entry in your config file)"
                ),
            );
        }
    }

    Some(SendToFlexWidget {
        workflow: workflow?.to_string(),
        channel: channel?.to_string(),
        attributes: raw.to_string(),
        workflow_name: attributes.workflow_name?,
        channel_name: attributes.channel_name?,
    })
}

fn check_set_variables(props: &Map<String, Value>, issues: &mut Issues) -> Option<SetVariablesWidget> {
    let variables = match props.get("variables") {
        None | Some(Value::Null) => {
            issues.shape("variables", "Required");
            None
        }
        Some(value) => key_values(value, "variables", issues),
    };
    Some(SetVariablesWidget {
        variables: variables?,
    })
}

fn check_run_subflow(
    props: &Map<String, Value>,
    ctx: ValidationContext<'_>,
    issues: &mut Issues,
) -> Option<RunSubflowWidget> {
    let flow_sid = prefixed_sid(props, "flow_sid", &["FW"], issues);
    let parameters = match props.get("parameters") {
        None | Some(Value::Null) => Some(Vec::new()),
        Some(value) => key_values(value, "parameters", issues),
    };
    let subflow_name = parameters.as_ref().and_then(|params| {
        let name = params
            .iter()
            .find(|p| p.key == "subflowName")
            .map(|p| p.value.clone());
        if name.is_none() {
            issues.shape(
                "parameters",
                "run-subflow parameters must contain 'subflowName' field for deployment purposes",
            );
        }
        name
    });

    if let (Some(name), Some(directories)) = (&subflow_name, ctx.directories)
        && directories.subflow(name).is_none()
    {
        issues.reference(
            "parameters.subflowName",
            format!(
                "Unknown subflowName '{name}'. (Must match either a Friendly Name OR the name of a subflow with 'allowCreate' enabled OR the key of a 'subflowMap' entry in your config file)"
            ),
        );
    }

    Some(RunSubflowWidget {
        flow_sid: flow_sid?.to_string(),
        parameters: parameters?,
        subflow_name: subflow_name?,
    })
}
