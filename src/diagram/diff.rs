use serde_json::Value;
use std::collections::HashSet;

use crate::model::{FlowDoc, StateDoc};

/// Property keys that only describe canvas layout and never count as a change.
const LAYOUT_KEYS: &[&str] = &["offset"];

/// Structural difference between two snapshots of a flow. Nodes are identified by
/// `(name, type)`: a renamed or retyped node is one removal plus one addition.
#[derive(Debug, Clone, Default)]
pub struct FlowDiff<'a> {
    pub added: Vec<&'a StateDoc>,
    pub changed: Vec<&'a StateDoc>,
    pub removed: Vec<&'a StateDoc>,
    /// Nodes of the new snapshot that are neither added nor changed.
    pub unchanged: Vec<&'a StateDoc>,
    /// `(from, to)` pairs present in the old snapshot but not the new one.
    pub removed_transitions: Vec<(&'a str, &'a str)>,
}

impl FlowDiff<'_> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.changed.is_empty()
            && self.removed.is_empty()
            && self.removed_transitions.is_empty()
    }
}

fn same_node(a: &StateDoc, b: &StateDoc) -> bool {
    a.name == b.name && a.state_type == b.state_type
}

fn without_layout(properties: &Value) -> Value {
    match properties {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !LAYOUT_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Deep comparison of properties (layout keys excluded) and transition lists.
pub fn state_changed(old: &StateDoc, new: &StateDoc) -> bool {
    without_layout(&old.properties) != without_layout(&new.properties)
        || old.transitions != new.transitions
}

fn edge_pairs(flow: &FlowDoc) -> Vec<(&str, &str)> {
    flow.states
        .iter()
        .flat_map(|s| s.targets().map(move |t| (s.name.as_str(), t)))
        .collect()
}

pub fn diff_flows<'a>(old: &'a FlowDoc, new: &'a FlowDoc) -> FlowDiff<'a> {
    let mut diff = FlowDiff::default();
    for state in &new.states {
        match old.states.iter().find(|o| same_node(o, state)) {
            None => diff.added.push(state),
            Some(previous) if state_changed(previous, state) => diff.changed.push(state),
            Some(_) => diff.unchanged.push(state),
        }
    }
    diff.removed = old
        .states
        .iter()
        .filter(|o| !new.states.iter().any(|n| same_node(o, n)))
        .collect();

    let new_edges: HashSet<(&str, &str)> = edge_pairs(new).into_iter().collect();
    diff.removed_transitions = edge_pairs(old)
        .into_iter()
        .filter(|pair| !new_edges.contains(pair))
        .collect();
    diff
}
