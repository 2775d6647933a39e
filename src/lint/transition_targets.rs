use crate::model::FlowDoc;
use std::collections::HashSet;

#[derive(Clone, Debug, Default)]
pub struct TransitionTargetsRule;

impl TransitionTargetsRule {
    pub fn check(flow: &FlowDoc) -> Vec<String> {
        let names: HashSet<&str> = flow.states.iter().map(|s| s.name.as_str()).collect();
        let mut errors = Vec::new();
        for (idx, state) in flow.states.iter().enumerate() {
            for transition in &state.transitions {
                if let Some(next) = &transition.next
                    && !names.contains(next.as_str())
                {
                    errors.push(format!(
                        "transition_targets: state #{idx} ('{}') event '{}' points to missing state '{next}'",
                        state.name, transition.event
                    ));
                }
            }
        }
        errors
    }
}
