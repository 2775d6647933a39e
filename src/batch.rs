//! Sequential processing of every flow named in a [`DeployConfig`].
//!
//! Sub-flows go first so flows that call them can resolve the sids of sub-flows created
//! earlier in the same run. A failing flow never stops the batch.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    bundle::FlowBundle,
    config::{DeployConfig, FlowEntry},
    diagram::{Diagram, render_diff},
    directories::ResourceDirectories,
    loader::load_flow_from_str_with_source,
    model::FlowDoc,
    replace::{ChangeRecord, PendingSubflow, replace_widgets},
    validate::{ValidationContext, validate_flow},
};

/// Reads flow definition text by configured path.
pub trait FlowSource {
    fn read_flow(&self, path: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryFlowSource {
    files: IndexMap<String, String>,
}

impl MemoryFlowSource {
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }
}

impl FlowSource for MemoryFlowSource {
    fn read_flow(&self, path: &str) -> anyhow::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("flow file '{path}' not found"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Updated,
    Created { sid: String },
}

/// Pushes a processed definition to the platform.
pub trait FlowPublisher {
    fn publish(&mut self, entry: &FlowEntry, bundle: &FlowBundle) -> anyhow::Result<PublishOutcome>;
}

pub enum RunMode<'p> {
    /// Validate and replace only.
    Dry,
    Deploy(&'p mut dyn FlowPublisher),
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowOutcome {
    pub name: String,
    pub passed: bool,
    pub issues: Vec<String>,
    pub changes: Vec<ChangeRecord>,
    pub pending: Vec<PendingSubflow>,
    #[serde(skip)]
    pub original: Option<FlowDoc>,
    #[serde(skip)]
    pub definition: Option<FlowDoc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle: Option<FlowBundle>,
}

impl FlowOutcome {
    fn failed(name: &str, issues: Vec<String>) -> Self {
        FlowOutcome {
            name: name.to_string(),
            passed: false,
            issues,
            changes: Vec::new(),
            pending: Vec::new(),
            original: None,
            definition: None,
            bundle: None,
        }
    }

    /// Diff diagram between the definition as read and as processed.
    pub fn diagram(&self) -> Option<Diagram> {
        match (&self.original, &self.definition) {
            (Some(original), Some(definition)) => render_diff(original, definition),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub flows: Vec<FlowOutcome>,
}

impl BatchReport {
    pub fn passed(&self) -> bool {
        self.flows.iter().all(|f| f.passed)
    }

    pub fn flow(&self, name: &str) -> Option<&FlowOutcome> {
        self.flows.iter().find(|f| f.name == name)
    }
}

/// Flows in processing order: sub-flows first, otherwise configuration order.
pub fn processing_order(config: &DeployConfig) -> Vec<&FlowEntry> {
    let mut flows: Vec<&FlowEntry> = config.flows.iter().collect();
    flows.sort_by_key(|f| !f.subflow);
    flows
}

pub fn run_batch(
    config: &DeployConfig,
    source: &dyn FlowSource,
    directories: &mut ResourceDirectories,
    mut mode: RunMode<'_>,
) -> BatchReport {
    let mut report = BatchReport::default();
    for entry in processing_order(config) {
        let outcome = process_flow(config, entry, source, directories, &mut mode);
        if outcome.passed {
            info!(flow = %entry.name, changes = outcome.changes.len(), "flow passed");
        } else {
            error!(flow = %entry.name, issues = ?outcome.issues, "flow failed");
        }
        report.flows.push(outcome);
    }
    report
}

fn process_flow(
    config: &DeployConfig,
    entry: &FlowEntry,
    source: &dyn FlowSource,
    directories: &mut ResourceDirectories,
    mode: &mut RunMode<'_>,
) -> FlowOutcome {
    let text = match source.read_flow(&entry.path) {
        Ok(text) => text,
        Err(e) => return FlowOutcome::failed(&entry.name, vec![format!("{e:#}")]),
    };
    let original = match load_flow_from_str_with_source(&text, entry.path.clone()) {
        Ok(flow) => flow,
        Err(e) => return FlowOutcome::failed(&entry.name, vec![e.to_string()]),
    };

    let validation = validate_flow(&original, ValidationContext::online(config, directories));
    if !validation.passed() {
        let issues = validation
            .failures()
            .flat_map(|w| w.issues.iter().map(move |i| format!("{}: {i}", w.name)))
            .collect();
        return FlowOutcome::failed(&entry.name, issues);
    }

    let mut definition = original.clone();
    let replacement = replace_widgets(&mut definition, &entry.name, &validation, config, directories);
    let mut issues: Vec<String> = replacement.errors.iter().map(ToString::to_string).collect();

    let bundle = match FlowBundle::from_flow(&entry.name, &definition) {
        Ok(bundle) => Some(bundle),
        Err(e) => {
            issues.push(e.to_string());
            None
        }
    };

    if let RunMode::Deploy(publisher) = mode
        && let Some(bundle) = &bundle
        && issues.is_empty()
    {
        if replacement.pending.is_empty() {
            match publisher.publish(entry, bundle) {
                Ok(PublishOutcome::Created { sid }) => {
                    info!(flow = %entry.name, sid = %sid, "flow created");
                    directories.register_subflow(entry.name.clone(), sid);
                }
                Ok(PublishOutcome::Updated) => {}
                Err(e) => issues.push(format!("publish failed: {e:#}")),
            }
        } else {
            for pending in &replacement.pending {
                warn!(flow = %entry.name, node = %pending.node, "refusing to publish placeholder sub-flow reference");
                issues.push(format!(
                    "{}: sub-flow '{}' has not been created",
                    pending.node, pending.subflow_name
                ));
            }
        }
    }

    FlowOutcome {
        name: entry.name.clone(),
        passed: issues.is_empty(),
        issues,
        changes: replacement.changes,
        pending: replacement.pending,
        original: Some(original),
        definition: Some(definition),
        bundle,
    }
}
