//! Typed view over the widgets this crate manages.
//!
//! Only the four managed widget types get a typed payload. Every other state type is
//! passed through untouched as [`NodeKind::Other`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::util::{CHANNEL_NAME_RE, FUNCTION_URL_RE, WORKFLOW_NAME_RE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WidgetType {
    RunFunction,
    SendToFlex,
    SetVariables,
    RunSubflow,
}

impl WidgetType {
    pub const ALL: [WidgetType; 4] = [
        WidgetType::RunFunction,
        WidgetType::SendToFlex,
        WidgetType::SetVariables,
        WidgetType::RunSubflow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WidgetType::RunFunction => "run-function",
            WidgetType::SendToFlex => "send-to-flex",
            WidgetType::SetVariables => "set-variables",
            WidgetType::RunSubflow => "run-subflow",
        }
    }

    pub fn from_type_tag(tag: &str) -> Option<Self> {
        WidgetType::ALL.into_iter().find(|t| t.as_str() == tag)
    }
}

impl fmt::Display for WidgetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind<'a> {
    Managed(WidgetType),
    Other(&'a str),
}

/// Split a state's `type` tag into managed and pass-through kinds.
pub fn classify_state_type(tag: &str) -> NodeKind<'_> {
    match WidgetType::from_type_tag(tag) {
        Some(kind) => NodeKind::Managed(kind),
        None => NodeKind::Other(tag),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// Components of a deployed Functions URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionUrl {
    pub service_name: String,
    pub environment_suffix: Option<String>,
    pub function_path: String,
}

impl FunctionUrl {
    pub fn parse(url: &str) -> Option<Self> {
        let caps = FUNCTION_URL_RE.captures(url)?;
        Some(FunctionUrl {
            service_name: caps.get(1)?.as_str().to_string(),
            environment_suffix: caps.get(3).map(|m| m.as_str().to_string()),
            function_path: caps.get(4)?.as_str().to_string(),
        })
    }

    /// URL of the same function path on another deployed domain.
    pub fn on_domain(&self, domain: &str) -> String {
        format!("https://{domain}{}", self.function_path)
    }
}

/// Routing names embedded in a send-to-flex `attributes` string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlexAttributes {
    pub workflow_name: Option<String>,
    pub channel_name: Option<String>,
    /// True when the string was not strict JSON and the names came from the fallback patterns.
    pub templated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeError {
    InvalidJson,
    NotAnObject,
}

impl FlexAttributes {
    /// Strict JSON decode first. Studio lets authors embed Liquid such as
    /// `{{ trigger.x | to_json }}` in the payload, which no JSON parser accepts, so on a
    /// decode failure the names are pulled out with `"workflowName"\s*:\s*"([^"]*)"` and
    /// `"channelName"\s*:\s*"([^"]*)"` (group 1 is the value).
    pub fn extract(raw: &str) -> Result<Self, AttributeError> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(FlexAttributes {
                workflow_name: non_empty(map.get("workflowName").and_then(Value::as_str)),
                channel_name: non_empty(map.get("channelName").and_then(Value::as_str)),
                templated: false,
            }),
            Ok(_) => Err(AttributeError::NotAnObject),
            Err(_) => {
                let workflow_name = WORKFLOW_NAME_RE
                    .captures(raw)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str());
                let channel_name = CHANNEL_NAME_RE
                    .captures(raw)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str());
                if workflow_name.is_none() && channel_name.is_none() {
                    return Err(AttributeError::InvalidJson);
                }
                Ok(FlexAttributes {
                    workflow_name: non_empty(workflow_name),
                    channel_name: non_empty(channel_name),
                    templated: true,
                })
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|s| !s.is_empty()).map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFunctionWidget {
    pub service_sid: String,
    pub environment_sid: String,
    pub function_sid: String,
    pub url: FunctionUrl,
    pub parameters: Vec<KeyValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendToFlexWidget {
    pub workflow: String,
    pub channel: String,
    pub attributes: String,
    pub workflow_name: String,
    pub channel_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetVariablesWidget {
    pub variables: Vec<KeyValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSubflowWidget {
    pub flow_sid: String,
    pub parameters: Vec<KeyValue>,
    pub subflow_name: String,
}

/// A managed widget whose properties passed shape validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedWidget {
    RunFunction(RunFunctionWidget),
    SendToFlex(SendToFlexWidget),
    SetVariables(SetVariablesWidget),
    RunSubflow(RunSubflowWidget),
}

impl ManagedWidget {
    pub fn widget_type(&self) -> WidgetType {
        match self {
            ManagedWidget::RunFunction(_) => WidgetType::RunFunction,
            ManagedWidget::SendToFlex(_) => WidgetType::SendToFlex,
            ManagedWidget::SetVariables(_) => WidgetType::SetVariables,
            ManagedWidget::RunSubflow(_) => WidgetType::RunSubflow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_url_splits_service_suffix_and_path() {
        let url = FunctionUrl::parse("https://my-svc-1234-dev.twil.io/path/to/fn").unwrap();
        assert_eq!(url.service_name, "my-svc");
        assert_eq!(url.environment_suffix.as_deref(), Some("dev"));
        assert_eq!(url.function_path, "/path/to/fn");
        assert_eq!(
            url.on_domain("my-svc-9876-prod.twil.io"),
            "https://my-svc-9876-prod.twil.io/path/to/fn"
        );
    }

    #[test]
    fn function_url_without_suffix() {
        let url = FunctionUrl::parse("https://svc-1234.twil.io/fn").unwrap();
        assert_eq!(url.service_name, "svc");
        assert_eq!(url.environment_suffix, None);
    }

    #[test]
    fn function_url_rejects_foreign_domain() {
        assert!(FunctionUrl::parse("https://svc-1234-dev.example.io/fn").is_none());
        assert!(FunctionUrl::parse("http://svc-1234-dev.twil.io/fn").is_none());
    }

    #[test]
    fn attributes_fall_back_to_patterns_for_templated_json() {
        let raw = r#"{"workflowName":"Support","channelName":"voice","x":{{ flow.data | to_json }}}"#;
        let attrs = FlexAttributes::extract(raw).unwrap();
        assert!(attrs.templated);
        assert_eq!(attrs.workflow_name.as_deref(), Some("Support"));
        assert_eq!(attrs.channel_name.as_deref(), Some("voice"));
    }

    #[test]
    fn attributes_reject_garbage() {
        assert_eq!(
            FlexAttributes::extract("{not json"),
            Err(AttributeError::InvalidJson)
        );
        assert_eq!(
            FlexAttributes::extract("[1,2]"),
            Err(AttributeError::NotAnObject)
        );
    }

    #[test]
    fn empty_names_count_as_missing() {
        let attrs = FlexAttributes::extract(r#"{"workflowName":"","channelName":"voice"}"#).unwrap();
        assert_eq!(attrs.workflow_name, None);
        assert_eq!(attrs.channel_name.as_deref(), Some("voice"));
    }
}
