//! Mermaid `flowchart` rendering of a flow, or of the difference between two snapshots.
//!
//! Vertices get compact generated ids (see [`id`]) so large flows stay well below the
//! renderer's text limits. Rendering never fails: an empty vertex set yields `None`, and
//! callers check [`Diagram::edge_count`] / [`Diagram::fits`] before embedding the text.

pub mod diff;
pub mod id;

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;

use crate::model::{FlowDoc, StateDoc, TransitionDoc};
use diff::diff_flows;
use id::CompactIds;

const ADDED_CLASS: &str = "stroke-width:6px,stroke:#00C853";
const CHANGED_CLASS: &str = "stroke-width:4px,stroke:#006DFF";
const REMOVED_CLASS: &str = "stroke-width:2px,stroke:#D50000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffClass {
    Added,
    Changed,
    Removed,
    None,
}

impl DiffClass {
    fn class_name(self) -> Option<&'static str> {
        match self {
            DiffClass::Added => Some("A"),
            DiffClass::Changed => Some("C"),
            DiffClass::Removed => Some("R"),
            DiffClass::None => None,
        }
    }

    fn label_prefix(self) -> &'static str {
        match self {
            DiffClass::Added => "+++<br>",
            DiffClass::Changed => "\\~\\~\\~<br>",
            DiffClass::Removed => "---<br>",
            DiffClass::None => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStyle {
    Solid,
    Dashed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Vertex {
    state_type: String,
    label: String,
    class: DiffClass,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edge {
    from: String,
    to: String,
    label: String,
    style: EdgeStyle,
}

/// Rendered diagram text plus the counts hosts need to decide whether to embed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagram {
    pub content: String,
    pub edge_count: usize,
    pub vertex_count: usize,
}

/// Ceilings of the host the diagram is embedded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedLimits {
    pub max_edges: usize,
    pub max_bytes: usize,
}

impl Default for EmbedLimits {
    fn default() -> Self {
        EmbedLimits {
            max_edges: 500,
            max_bytes: 50_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagramEmbed {
    Full(String),
    /// The diagram exceeded a ceiling; holds a notice to show instead.
    Truncated(String),
}

impl Diagram {
    pub fn fits(&self, limits: &EmbedLimits) -> bool {
        self.edge_count <= limits.max_edges && self.content.len() <= limits.max_bytes
    }

    pub fn embed(&self, limits: &EmbedLimits) -> DiagramEmbed {
        if self.fits(limits) {
            return DiagramEmbed::Full(self.content.clone());
        }
        DiagramEmbed::Truncated(format!(
            "Diagram omitted: {} edges / {} bytes exceeds the limit of {} edges / {} bytes.",
            self.edge_count,
            self.content.len(),
            limits.max_edges,
            limits.max_bytes
        ))
    }
}

#[derive(Debug, Default)]
struct DiagramBuilder {
    vertices: IndexMap<String, Vertex>,
    edges: Vec<Edge>,
}

impl DiagramBuilder {
    fn add_vertex(&mut self, state: &StateDoc, class: DiffClass) {
        if self.vertices.contains_key(&state.name) {
            return;
        }
        let label = format!(
            "{}{}<br>({})",
            class.label_prefix(),
            escape(&state.name),
            escape(&state.state_type)
        );
        self.vertices.insert(
            state.name.clone(),
            Vertex {
                state_type: state.state_type.clone(),
                label,
                class,
            },
        );
    }

    /// First edge between a pair wins.
    fn add_edge(&mut self, from: &str, to: &str, style: EdgeStyle, label: String) {
        if self.edges.iter().any(|e| e.from == from && e.to == to) {
            return;
        }
        self.edges.push(Edge {
            from: from.to_string(),
            to: to.to_string(),
            label,
            style,
        });
    }

    fn add_transition_edges(&mut self, from: &str, transitions: &[TransitionDoc], style: EdgeStyle) {
        for transition in transitions {
            let Some(next) = &transition.next else {
                continue;
            };
            self.add_edge(from, next, style, transition_label(transition));
        }
    }

    fn add_vertex_and_edges(&mut self, state: &StateDoc, class: DiffClass) {
        self.add_vertex(state, class);
        let style = if class == DiffClass::Removed {
            EdgeStyle::Dashed
        } else {
            EdgeStyle::Solid
        };
        self.add_transition_edges(&state.name, &state.transitions, style);
    }

    fn contains_edge_to(&self, name: &str) -> bool {
        self.edges.iter().any(|e| e.to == name)
    }

    fn contains_vertex(&self, name: &str) -> bool {
        self.vertices.contains_key(name)
    }

    fn shape(vertex: &Vertex) -> String {
        let shape = match vertex.state_type.as_str() {
            "trigger" => ">Trigger]".to_string(),
            "split-based-on" => format!("{{{{\"{}\"}}}}", vertex.label),
            "run-subflow" => format!("[[\"{}\"]]", vertex.label),
            _ => format!("(\"{}\")", vertex.label),
        };
        match vertex.class.class_name() {
            Some(class) => format!("{shape}:::{class}"),
            None => shape,
        }
    }

    /// Full vertex definition on first use, bare id afterwards.
    fn reference<'b>(&'b self, name: &'b str, id: &str, defined: &mut HashSet<&'b str>) -> String {
        match self.vertices.get(name) {
            Some(vertex) if defined.insert(name) => format!("{id}{}", Self::shape(vertex)),
            _ => id.to_string(),
        }
    }

    fn finish(self) -> Option<Diagram> {
        if self.vertices.is_empty() {
            return None;
        }
        let ids: IndexMap<&str, String> = self
            .vertices
            .keys()
            .map(String::as_str)
            .zip(CompactIds::default())
            .collect();

        let mut lines = vec![
            "flowchart TD".to_string(),
            format!("classDef A {ADDED_CLASS}"),
            format!("classDef C {CHANGED_CLASS}"),
            format!("classDef R {REMOVED_CLASS}"),
        ];
        let mut defined: HashSet<&str> = HashSet::new();
        let mut edge_count = 0;
        for edge in &self.edges {
            // Transitions into states that do not exist are not drawn.
            let (Some(from_id), Some(to_id)) =
                (ids.get(edge.from.as_str()), ids.get(edge.to.as_str()))
            else {
                continue;
            };
            let from = self.reference(&edge.from, from_id, &mut defined);
            let to = self.reference(&edge.to, to_id, &mut defined);
            edge_count += 1;
            match edge.style {
                EdgeStyle::Solid => lines.push(format!("{from}--{}-->{to}", edge.label)),
                EdgeStyle::Dashed => lines.push(format!("{from}-.-x{to}")),
            }
        }
        for (name, vertex) in &self.vertices {
            if let Some(id) = ids.get(name.as_str())
                && defined.insert(name.as_str())
            {
                lines.push(format!("{id}{}", Self::shape(vertex)));
            }
        }

        Some(Diagram {
            content: lines.join("\n"),
            edge_count,
            vertex_count: defined.len(),
        })
    }
}

fn escape(text: &str) -> String {
    text.replace('"', "#quot;")
}

/// Edge text is unquoted, so every character Mermaid reads as link or shape syntax
/// becomes an entity code.
fn escape_edge_label(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => out.push_str("#quot;"),
            '|' | '(' | ')' | '[' | ']' | '{' | '}' | '<' | '>' | '-' | '=' | '.' | ';' => {
                out.push_str(&format!("#{};", c as u32))
            }
            _ => out.push(c),
        }
    }
    out
}

/// `event` or `event: cond1, cond2` when the transition carries guard conditions.
fn transition_label(transition: &TransitionDoc) -> String {
    let conditions = transition
        .conditions
        .iter()
        .map(|c| c.describe())
        .collect::<Vec<_>>()
        .join(", ");
    let label = if conditions.is_empty() {
        transition.event.clone()
    } else {
        format!("{}: {conditions}", transition.event)
    };
    escape_edge_label(&label)
}

/// Every state and every outgoing transition of one snapshot, without diff styling.
pub fn render_flow(flow: &FlowDoc) -> Option<Diagram> {
    let mut builder = DiagramBuilder::default();
    for state in &flow.states {
        builder.add_vertex_and_edges(state, DiffClass::None);
    }
    builder.finish()
}

/// Highlight added, changed and removed states of `new` relative to `old`, plus the
/// unchanged states directly connected to them and transitions that were dropped.
pub fn render_diff(old: &FlowDoc, new: &FlowDoc) -> Option<Diagram> {
    let diff = diff_flows(old, new);
    let mut builder = DiagramBuilder::default();

    for state in &diff.added {
        builder.add_vertex_and_edges(state, DiffClass::Added);
    }
    for state in &diff.changed {
        builder.add_vertex_and_edges(state, DiffClass::Changed);
    }
    for state in &diff.removed {
        builder.add_vertex_and_edges(state, DiffClass::Removed);
    }

    let neighbours: Vec<&StateDoc> = diff
        .unchanged
        .iter()
        .copied()
        .filter(|s| {
            builder.contains_edge_to(&s.name) || s.targets().any(|t| builder.contains_vertex(t))
        })
        .collect();
    for state in neighbours {
        builder.add_vertex_and_edges(state, DiffClass::None);
    }

    for (from, to) in &diff.removed_transitions {
        if builder.contains_vertex(from) {
            builder.add_edge(from, to, EdgeStyle::Dashed, String::new());
        }
    }

    let leaves: Vec<&StateDoc> = diff
        .unchanged
        .iter()
        .copied()
        .filter(|s| builder.contains_edge_to(&s.name))
        .collect();
    for state in leaves {
        builder.add_vertex(state, DiffClass::None);
    }

    builder.finish()
}
