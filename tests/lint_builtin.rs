use serde_json::json;
use studio_flow::{
    lint::lint_builtin_rules,
    loader::{load_flow_from_str, load_flow_from_value},
};

#[test]
fn fixture_has_no_lint_findings() {
    let flow = load_flow_from_str(include_str!("fixtures/ivr_main.json")).unwrap();
    let errors = lint_builtin_rules(&flow);
    assert!(errors.is_empty(), "unexpected lint errors: {errors:?}");
}

#[test]
fn lint_flags_dangling_transition() {
    let flow = load_flow_from_value(
        json!({
            "description": "dangling",
            "states": [{
                "name": "Trigger",
                "type": "trigger",
                "transitions": [{ "event": "incomingCall", "next": "missing" }]
            }],
            "initial_state": "Trigger",
            "flags": { "allow_concurrent_calls": true }
        }),
        "inline",
    )
    .unwrap();
    let errors = lint_builtin_rules(&flow);
    assert!(
        errors
            .iter()
            .any(|e| e.contains("points to missing state 'missing'")),
        "expected dangling transition lint, got {errors:?}"
    );
}

#[test]
fn lint_flags_missing_entry_state() {
    let flow = load_flow_from_value(
        json!({
            "description": "no entry",
            "states": [{ "name": "greet", "type": "say-play" }],
            "initial_state": "Trigger",
            "flags": { "allow_concurrent_calls": true }
        }),
        "inline",
    )
    .unwrap();
    let errors = lint_builtin_rules(&flow);
    assert!(
        errors.iter().any(|e| e.starts_with("entry_state_exists")),
        "expected entry state lint, got {errors:?}"
    );
}
