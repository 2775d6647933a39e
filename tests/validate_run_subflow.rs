use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use studio_flow::{
    config::{DeployConfig, FlowEntry},
    directories::{DirectorySnapshot, ResourceDirectories},
    loader::load_flow_from_value,
    model::StateDoc,
    validate::{ValidationContext, validate_flow, validate_state},
    widget::WidgetType,
};

fn subflow_state(parameters: Value) -> StateDoc {
    serde_json::from_value(json!({
        "name": "survey",
        "type": "run-subflow",
        "transitions": [{ "event": "completed" }, { "event": "failed" }],
        "properties": {
            "flow_sid": "FW00000000000000000000000000000000",
            "flow_revision": "LatestPublished",
            "parameters": parameters
        }
    }))
    .unwrap()
}

fn named(name: &str) -> StateDoc {
    subflow_state(json!([{ "key": "subflowName", "value": name }]))
}

fn survey_entry(allow_create: bool) -> DeployConfig {
    DeployConfig {
        flows: vec![FlowEntry {
            name: "Post Call Survey".into(),
            path: "flows/post_call_survey.json".into(),
            subflow: true,
            allow_create,
            ..Default::default()
        }],
        ..Default::default()
    }
}

#[test]
fn future_subflow_counts_as_present() {
    let config = survey_entry(true);
    let dirs = ResourceDirectories::new(DirectorySnapshot::default(), &config);
    let result = validate_state(
        &named("Post Call Survey"),
        WidgetType::RunSubflow,
        ValidationContext::online(&config, &dirs),
    );
    assert!(result.is_valid(), "{:?}", result.issues);
}

#[test]
fn subflow_without_create_permission_is_unknown() {
    let config = survey_entry(false);
    let dirs = ResourceDirectories::new(DirectorySnapshot::default(), &config);
    let result = validate_state(
        &named("Post Call Survey"),
        WidgetType::RunSubflow,
        ValidationContext::online(&config, &dirs),
    );
    assert!(!result.is_valid());
    assert_eq!(result.issues[0].path, "properties.parameters.subflowName");
    assert!(
        result.issues[0]
            .message
            .starts_with("Unknown subflowName 'Post Call Survey'")
    );
}

#[test]
fn subflow_map_and_live_directory_resolve() {
    let mut config = survey_entry(false);
    config
        .subflow_map
        .insert("Callback".into(), "FW33333333333333333333333333333333".into());
    let snapshot = DirectorySnapshot {
        subflows: [("Post Call Survey".to_string(), "FW44444444444444444444444444444444".to_string())]
            .into_iter()
            .collect(),
        ..Default::default()
    };
    let dirs = ResourceDirectories::new(snapshot, &config);
    for name in ["Callback", "Post Call Survey"] {
        let result = validate_state(
            &named(name),
            WidgetType::RunSubflow,
            ValidationContext::online(&config, &dirs),
        );
        assert!(result.is_valid(), "{name}: {:?}", result.issues);
    }
}

#[test]
fn subflow_name_parameter_is_required() {
    let result = validate_state(
        &subflow_state(json!([{ "key": "language", "value": "en" }])),
        WidgetType::RunSubflow,
        ValidationContext::offline(),
    );
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].path, "properties.parameters");
    assert!(result.issues[0].message.contains("'subflowName'"));
}

#[test]
fn set_variables_shape() {
    let flow = load_flow_from_value(
        json!({
            "description": "vars",
            "states": [
                { "name": "Trigger", "type": "trigger", "transitions": [{ "event": "incomingCall", "next": "vars" }] },
                {
                    "name": "vars",
                    "type": "set-variables",
                    "properties": { "variables": [{ "key": "env" }, { "key": "tier", "value": "gold" }] }
                },
                { "name": "empty_vars", "type": "set-variables", "properties": {} },
                { "name": "greet", "type": "say-play", "properties": { "say": 42 } }
            ],
            "initial_state": "Trigger",
            "flags": { "allow_concurrent_calls": true }
        }),
        "inline",
    )
    .unwrap();
    let validation = validate_flow(&flow, ValidationContext::offline());
    assert!(!validation.passed());
    // Only managed types are validated.
    assert_eq!(validation.widgets.len(), 2);

    let failures: Vec<(String, String)> = validation
        .failures()
        .flat_map(|w| w.issues.iter().map(|i| (w.name.clone(), i.path.clone())))
        .collect();
    assert_eq!(
        failures,
        vec![
            ("vars".to_string(), "properties.variables.0.value".to_string()),
            ("empty_vars".to_string(), "properties.variables".to_string()),
        ]
    );
}

#[test]
fn fixture_passes_offline() {
    let validation = studio_flow::check_flow(include_str!("fixtures/ivr_main.json")).unwrap();
    assert!(validation.passed());
    let types: Vec<WidgetType> = validation.widgets.iter().map(|w| w.widget_type).collect();
    assert_eq!(
        types,
        vec![
            WidgetType::RunFunction,
            WidgetType::SetVariables,
            WidgetType::RunSubflow,
            WidgetType::SendToFlex
        ]
    );
}
