//! Deploy configuration: which flows to process and how their managed widgets are remapped.

use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use regex::Regex;
use std::{env, fs, path::Path, sync::OnceLock};
use tracing::debug;

use crate::{
    error::{FlowError, FlowErrorLocation, Result},
    path_safety::normalize_under_root,
    util::{SHELL_VAR_RE, anchored_pattern},
    widget::WidgetType,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    pub flows: Vec<FlowEntry>,
    #[serde(default)]
    pub replace_widget_types: Vec<WidgetType>,
    #[serde(default)]
    pub function_services: Vec<FunctionServiceConfig>,
    #[serde(default)]
    pub workflow_map: IndexMap<String, String>,
    #[serde(default)]
    pub subflow_map: IndexMap<String, String>,
    #[serde(default)]
    pub variable_replacements: IndexMap<String, String>,
    #[serde(default)]
    pub custom_property_replacements: Vec<CustomPropertyReplacement>,
    #[serde(default)]
    pub enable_shell_variables: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEntry {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(default)]
    pub subflow: bool,
    #[serde(default)]
    pub allow_create: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionServiceConfig {
    pub name: String,
    #[serde(default)]
    pub environment_suffix: Option<String>,
    /// Treat `name` as a regular expression over remote service unique names.
    #[serde(default)]
    pub pattern: bool,
    #[serde(skip)]
    compiled: CompiledPattern,
}

/// Anchored regex for a pattern entry, compiled on first use. `None` when the pattern is invalid.
#[derive(Clone, Debug, Default)]
struct CompiledPattern(OnceLock<Option<Regex>>);

impl CompiledPattern {
    fn get(&self, pattern: &str) -> Option<&Regex> {
        self.0.get_or_init(|| anchored_pattern(pattern).ok()).as_ref()
    }
}

// Derived from `name`, so it never makes two entries differ.
impl PartialEq for CompiledPattern {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomPropertyReplacement {
    pub flow_name: String,
    pub widget_name: String,
    pub property_key: String,
    pub property_value: String,
}

impl FunctionServiceConfig {
    /// Entry matching exactly one service unique name.
    pub fn exact(name: impl Into<String>) -> Self {
        FunctionServiceConfig {
            name: name.into(),
            environment_suffix: None,
            pattern: false,
            compiled: CompiledPattern::default(),
        }
    }

    /// Entry whose `name` is a regular expression over service unique names.
    pub fn pattern(name: impl Into<String>) -> Self {
        FunctionServiceConfig {
            pattern: true,
            ..Self::exact(name)
        }
    }

    pub fn with_environment_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.environment_suffix = Some(suffix.into());
        self
    }

    /// Exact name match, or a whole-name regex match for pattern entries.
    pub fn matches(&self, service_name: &str) -> bool {
        if !self.pattern {
            return self.name == service_name;
        }
        self.compiled
            .get(&self.name)
            .is_some_and(|re| re.is_match(service_name))
    }
}

impl DeployConfig {
    /// Parse configuration JSON. When the document sets `enableShellVariables`, every
    /// `$NAME` token in the raw text is replaced via `lookup` (missing names become empty)
    /// before the final parse.
    pub fn from_json_str(
        text: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let probe: Value = serde_json::from_str(text).map_err(|e| config_error(e.to_string()))?;
        let substituted;
        let text = if probe
            .get("enableShellVariables")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            substituted = substitute_shell_variables(text, &lookup);
            substituted.as_str()
        } else {
            text
        };
        let config: DeployConfig =
            serde_json::from_str(text).map_err(|e| config_error(e.to_string()))?;
        config.normalized()
    }

    /// Load configuration from a file under the current directory, substituting shell
    /// variables from the process environment when enabled.
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let root = env::current_dir().context("unable to resolve configuration root")?;
        let safe_path = normalize_under_root(&root, path_ref)?;
        let txt = fs::read_to_string(&safe_path)
            .with_context(|| format!("unable to read configuration at {}", safe_path.display()))?;

        #[cfg(feature = "toml")]
        {
            if safe_path.extension().and_then(|e| e.to_str()) == Some("toml") {
                let config: DeployConfig = toml::from_str(&txt).with_context(|| {
                    format!("invalid TOML configuration in {}", path_ref.display())
                })?;
                return Ok(config.normalized()?);
            }
        }

        Self::from_json_str(&txt, |name| env::var(name).ok())
            .with_context(|| format!("invalid configuration in {}", path_ref.display()))
    }

    pub fn flow(&self, name: &str) -> Option<&FlowEntry> {
        self.flows.iter().find(|f| f.name == name)
    }

    pub fn replaces(&self, widget_type: WidgetType) -> bool {
        self.replace_widget_types.contains(&widget_type)
    }

    pub fn function_service(&self, service_name: &str) -> Option<&FunctionServiceConfig> {
        self.function_services
            .iter()
            .find(|s| s.matches(service_name))
    }

    /// Sub-flows that will be created during this run and may be referenced before they exist.
    pub fn future_subflows(&self) -> impl Iterator<Item = &FlowEntry> {
        self.flows.iter().filter(|f| f.subflow && f.allow_create)
    }

    pub fn custom_replacements_for<'a>(
        &'a self,
        flow_name: &'a str,
    ) -> impl Iterator<Item = &'a CustomPropertyReplacement> + 'a {
        self.custom_property_replacements
            .iter()
            .filter(move |r| r.flow_name == flow_name)
    }

    fn normalized(mut self) -> Result<Self> {
        for (idx, flow) in self.flows.iter_mut().enumerate() {
            if flow.path.starts_with("../") {
                return Err(FlowError::Config {
                    message: format!(
                        "flow '{}': path should not point to a parent directory",
                        flow.name
                    ),
                    location: FlowErrorLocation::at_path(format!("flows.{idx}.path")),
                });
            }
            if let Some(stripped) = flow.path.strip_prefix("./") {
                flow.path = stripped.to_string();
            }
        }
        for (idx, service) in self.function_services.iter().enumerate() {
            if !service.pattern {
                continue;
            }
            let re = anchored_pattern(&service.name).map_err(|e| FlowError::Config {
                message: format!("invalid service pattern '{}': {e}", service.name),
                location: FlowErrorLocation::at_path(format!("functionServices.{idx}.name")),
            })?;
            // Already initialised only if `matches` ran first, with the same result.
            let _ = service.compiled.0.set(Some(re));
        }
        Ok(self)
    }
}

fn substitute_shell_variables(text: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    SHELL_VAR_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let value = lookup(name);
            debug!(variable = name, found = value.is_some(), "substituting shell variable");
            value.unwrap_or_default()
        })
        .into_owned()
}

fn config_error(message: String) -> FlowError {
    FlowError::Config {
        message,
        location: FlowErrorLocation::at_path("<config>"),
    }
}
