mod transition_targets;
use crate::model::{ENTRY_STATE_NAME, FlowDoc};

pub use transition_targets::TransitionTargetsRule;

/// Graph-level lint rules. Informational only: they never fail managed widget validation.
pub fn lint_builtin_rules(flow: &FlowDoc) -> Vec<String> {
    let mut errors = Vec::new();
    match flow.state(ENTRY_STATE_NAME) {
        None => errors.push(format!(
            "entry_state_exists: entry state '{ENTRY_STATE_NAME}' not found in states"
        )),
        Some(state) if state.state_type != "trigger" => errors.push(format!(
            "entry_state_exists: entry state '{ENTRY_STATE_NAME}' has type '{}', expected 'trigger'",
            state.state_type
        )),
        Some(_) => {}
    }
    errors.extend(TransitionTargetsRule::check(flow));
    errors
}
