//! Name to identifier lookups supplied by the platform collaborators.
//!
//! A [`DirectorySnapshot`] is what the collaborators fetch; [`ResourceDirectories`] is the
//! frozen view handed to validation and replacement, with the configuration's local
//! overrides and not-yet-created sub-flows folded in.

use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

use crate::{config::DeployConfig, path_safety::normalize_under_root};

/// A deployed Functions service environment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionService {
    pub service_sid: String,
    pub environment_sid: String,
    pub domain_name: String,
    /// Function path (`/fn`) to function version sid.
    #[serde(default)]
    pub functions: IndexMap<String, String>,
}

/// Raw directory contents as fetched by the collaborators.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorySnapshot {
    /// Keyed by service unique name.
    #[serde(default)]
    pub functions: IndexMap<String, FunctionService>,
    /// Task channel unique name to channel sid.
    #[serde(default)]
    pub channels: IndexMap<String, String>,
    /// Workflow friendly name to workflow sid.
    #[serde(default)]
    pub workflows: IndexMap<String, String>,
    /// Flow friendly name to flow sid.
    #[serde(default)]
    pub subflows: IndexMap<String, String>,
}

impl DirectorySnapshot {
    /// Load a snapshot from disk, accepting JSON by default and TOML when the `toml` feature is enabled.
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let root = env::current_dir().context("unable to resolve snapshot root")?;
        let safe_path = normalize_under_root(&root, path_ref)?;
        let txt = fs::read_to_string(&safe_path).with_context(|| {
            format!("unable to read directory snapshot at {}", safe_path.display())
        })?;
        if let Ok(value) = serde_json::from_str::<Self>(&txt) {
            return Ok(value);
        }

        #[cfg(feature = "toml")]
        {
            if let Ok(value) = toml::from_str::<Self>(&txt) {
                return Ok(value);
            }
            anyhow::bail!(
                "unsupported snapshot format in {}: expected JSON or TOML",
                path_ref.display()
            );
        }

        #[cfg(not(feature = "toml"))]
        {
            anyhow::bail!(
                "unsupported snapshot format in {}: expected JSON (enable `toml` feature for TOML support)",
                path_ref.display()
            );
        }
    }
}

/// Sub-flow reference that is either live or will be created later in the same run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubflowRef {
    Resolved(String),
    /// Holds the flow name; no sid exists yet.
    Pending(String),
}

impl SubflowRef {
    pub fn sid(&self) -> Option<&str> {
        match self {
            SubflowRef::Resolved(sid) => Some(sid),
            SubflowRef::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, SubflowRef::Pending(_))
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResourceDirectories {
    functions: IndexMap<String, FunctionService>,
    channels: IndexMap<String, String>,
    workflows: IndexMap<String, String>,
    subflows: IndexMap<String, SubflowRef>,
}

impl ResourceDirectories {
    /// Merge a snapshot with the configuration. Local `workflowMap`/`subflowMap` entries win
    /// over live names; sub-flows flagged `subflow` + `allowCreate` that are not live yet
    /// become [`SubflowRef::Pending`].
    pub fn new(snapshot: DirectorySnapshot, config: &DeployConfig) -> Self {
        let DirectorySnapshot {
            functions,
            channels,
            mut workflows,
            subflows: live_subflows,
        } = snapshot;

        for (name, sid) in &config.workflow_map {
            workflows.insert(name.clone(), sid.clone());
        }

        let mut subflows: IndexMap<String, SubflowRef> = live_subflows
            .into_iter()
            .map(|(name, sid)| (name, SubflowRef::Resolved(sid)))
            .collect();
        for flow in config.future_subflows() {
            subflows
                .entry(flow.name.clone())
                .or_insert_with(|| SubflowRef::Pending(flow.name.clone()));
        }
        for (name, sid) in &config.subflow_map {
            subflows.insert(name.clone(), SubflowRef::Resolved(sid.clone()));
        }

        ResourceDirectories {
            functions,
            channels,
            workflows,
            subflows,
        }
    }

    /// Resolve a URL service name: an exact directory key first, then the name of a
    /// configured pattern entry matching it.
    pub fn function_service(
        &self,
        service_name: &str,
        config: Option<&DeployConfig>,
    ) -> Option<&FunctionService> {
        if let Some(service) = self.functions.get(service_name) {
            return Some(service);
        }
        let config = config?;
        config
            .function_services
            .iter()
            .filter(|s| s.pattern && s.matches(service_name))
            .find_map(|s| self.functions.get(&s.name))
    }

    pub fn channel(&self, unique_name: &str) -> Option<&str> {
        self.channels.get(unique_name).map(String::as_str)
    }

    pub fn workflow(&self, friendly_name: &str) -> Option<&str> {
        self.workflows.get(friendly_name).map(String::as_str)
    }

    pub fn subflow(&self, friendly_name: &str) -> Option<&SubflowRef> {
        self.subflows.get(friendly_name)
    }

    /// Record a flow created during this run so later flows resolve it to a real sid.
    pub fn register_subflow(&mut self, name: impl Into<String>, sid: impl Into<String>) {
        self.subflows
            .insert(name.into(), SubflowRef::Resolved(sid.into()));
    }

    pub fn pending_subflows(&self) -> impl Iterator<Item = &str> {
        self.subflows
            .iter()
            .filter(|(_, r)| r.is_pending())
            .map(|(name, _)| name.as_str())
    }
}
