use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name every flow's entry node must carry.
pub const ENTRY_STATE_NAME: &str = "Trigger";

/// A Studio flow definition as stored on disk. Unknown fields at every level are kept in
/// `extra` so a load/save cycle does not drop data the platform added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDoc {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub states: Vec<StateDoc>,
    pub initial_state: String,
    pub flags: FlagsDoc,
    #[serde(flatten, default)]
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagsDoc {
    pub allow_concurrent_calls: bool,
    #[serde(flatten, default)]
    pub extra: IndexMap<String, Value>,
}

/// One widget of the flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDoc {
    pub name: String,
    #[serde(rename = "type")]
    pub state_type: String,
    #[serde(default)]
    pub transitions: Vec<TransitionDoc>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,
    #[serde(flatten, default)]
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDoc {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ConditionDoc>,
    #[serde(flatten, default)]
    pub extra: IndexMap<String, Value>,
}

/// Guard attached to a transition, e.g. `{ "type": "equal_to", "value": "1" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionDoc {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
    #[serde(flatten, default)]
    pub extra: IndexMap<String, Value>,
}

impl ConditionDoc {
    pub fn describe(&self) -> String {
        match &self.value {
            Value::String(s) => format!("{} {}", self.kind, s),
            Value::Null => self.kind.clone(),
            other => format!("{} {}", self.kind, other),
        }
    }
}

impl FlowDoc {
    pub fn state(&self, name: &str) -> Option<&StateDoc> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn state_mut(&mut self, name: &str) -> Option<&mut StateDoc> {
        self.states.iter_mut().find(|s| s.name == name)
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl StateDoc {
    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.properties.as_object()
    }

    /// Mutable access to the property object, creating it when the state had none.
    pub fn properties_mut(&mut self) -> &mut Map<String, Value> {
        if !self.properties.is_object() {
            self.properties = Value::Object(Map::new());
        }
        match &mut self.properties {
            Value::Object(map) => map,
            _ => unreachable!("properties coerced to an object above"),
        }
    }

    /// Targets of all transitions that lead somewhere.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.transitions.iter().filter_map(|t| t.next.as_deref())
    }
}
