use pretty_assertions::assert_eq;
use serde_json::json;
use studio_flow::{
    config::DeployConfig,
    directories::{DirectorySnapshot, ResourceDirectories},
    loader::{load_flow_from_str, load_flow_from_value},
    model::FlowDoc,
    replace::{
        PendingSubflow, ReplacementReport, finalize_pending_subflows, replace_run_function, replace_widgets,
        set_widget_property,
    },
    validate::{ValidationContext, validate_flow},
    widget::{ManagedWidget, WidgetType},
};

const FLOW_NAME: &str = "IVR Main";

fn config() -> DeployConfig {
    DeployConfig::from_json_str(
        r#"{
            "flows": [
                { "name": "IVR Main", "path": "./flows/ivr_main.json" },
                { "name": "Post Call Survey", "path": "flows/post_call_survey.json", "subflow": true, "allowCreate": true }
            ],
            "replaceWidgetTypes": ["run-function", "send-to-flex", "set-variables", "run-subflow"],
            "functionServices": [{ "name": "ivr-tools", "environmentSuffix": "dev" }],
            "variableReplacements": { "environment": "prod", "not_declared": "x" },
            "customPropertyReplacements": [{
                "flowName": "IVR Main",
                "widgetName": "route_menu",
                "propertyKey": "input",
                "propertyValue": "{{flow.variables.segment}}"
            }]
        }"#,
        |_| None,
    )
    .unwrap()
}

fn snapshot() -> DirectorySnapshot {
    serde_json::from_value(json!({
        "functions": {
            "ivr-tools": {
                "serviceSid": "ZS11111111111111111111111111111111",
                "environmentSid": "ZE11111111111111111111111111111111",
                "domainName": "ivr-tools-5678-prod.twil.io",
                "functions": { "/lookup": "ZH11111111111111111111111111111111" }
            }
        },
        "channels": { "voice": "TC11111111111111111111111111111111" },
        "workflows": { "Support": "WW11111111111111111111111111111111" },
        "subflows": { "Post Call Survey": "FW11111111111111111111111111111111" }
    }))
    .unwrap()
}

fn fixture() -> FlowDoc {
    load_flow_from_str(include_str!("fixtures/ivr_main.json")).unwrap()
}

fn prop<'f>(flow: &'f FlowDoc, node: &str, key: &str) -> Option<&'f str> {
    flow.state(node)?.properties()?.get(key)?.as_str()
}

fn run(
    flow: &mut FlowDoc,
    config: &DeployConfig,
    dirs: &ResourceDirectories,
) -> ReplacementReport {
    let validation = validate_flow(flow, ValidationContext::online(config, dirs));
    assert!(validation.passed(), "{:?}", validation.failures().collect::<Vec<_>>());
    replace_widgets(flow, FLOW_NAME, &validation, config, dirs)
}

#[test]
fn single_run_function_is_remapped() {
    let mut flow = load_flow_from_value(
        json!({
            "description": "one function",
            "states": [
                { "name": "Trigger", "type": "trigger", "transitions": [{ "event": "incomingCall", "next": "run-function-1" }] },
                {
                    "name": "run-function-1",
                    "type": "run-function",
                    "transitions": [{ "event": "success" }, { "event": "fail" }],
                    "properties": {
                        "service_sid": "ZS00000000000000000000000000000000",
                        "environment_sid": "ZE00000000000000000000000000000000",
                        "function_sid": "ZH00000000000000000000000000000000",
                        "url": "https://svc-1234-dev.twil.io/fn"
                    }
                }
            ],
            "initial_state": "Trigger",
            "flags": { "allow_concurrent_calls": true }
        }),
        "inline",
    )
    .unwrap();
    let config = DeployConfig::from_json_str(
        r#"{"flows":[],"functionServices":[{"name":"svc","environmentSuffix":"dev"}]}"#,
        |_| None,
    )
    .unwrap();
    let dirs = ResourceDirectories::new(
        serde_json::from_value(json!({
            "functions": { "svc": {
                "serviceSid": "ZS99", "environmentSid": "ZE99",
                "domainName": "svc-4321-prod.twil.io",
                "functions": { "/fn": "ZN123" }
            }}
        }))
        .unwrap(),
        &config,
    );

    let validation = validate_flow(&flow, ValidationContext::online(&config, &dirs));
    let Some(ManagedWidget::RunFunction(widget)) = validation.widget("run-function-1").cloned()
    else {
        panic!("run-function-1 should validate");
    };
    let state = flow.state_mut("run-function-1").unwrap();
    let changes = replace_run_function(state, &widget, &dirs, Some(&config)).unwrap();

    let fields: Vec<&str> = changes.iter().map(|c| c.field.as_str()).collect();
    assert_eq!(fields, vec!["service_sid", "environment_sid", "function_sid", "url"]);
    assert_eq!(prop(&flow, "run-function-1", "function_sid"), Some("ZN123"));
    assert_eq!(
        prop(&flow, "run-function-1", "url"),
        Some("https://svc-4321-prod.twil.io/fn")
    );
}

#[test]
fn full_pass_records_every_field() {
    let config = config();
    let dirs = ResourceDirectories::new(snapshot(), &config);
    let mut flow = fixture();
    let report = run(&mut flow, &config, &dirs);

    assert!(report.is_clean(), "{:?}", report.errors);
    assert!(report.pending.is_empty());
    let touched: Vec<(&str, &str)> = report
        .changes
        .iter()
        .map(|c| (c.node.as_str(), c.field.as_str()))
        .collect();
    assert_eq!(
        touched,
        vec![
            ("lookup_customer", "service_sid"),
            ("lookup_customer", "environment_sid"),
            ("lookup_customer", "function_sid"),
            ("lookup_customer", "url"),
            ("set_context", "variables.environment.value"),
            ("survey", "flow_sid"),
            ("to_flex", "channel"),
            ("to_flex", "workflow"),
            ("route_menu", "input"),
        ]
    );
    assert_eq!(
        prop(&flow, "lookup_customer", "url"),
        Some("https://ivr-tools-5678-prod.twil.io/lookup")
    );
    assert_eq!(prop(&flow, "to_flex", "channel"), Some("TC11111111111111111111111111111111"));
    assert_eq!(prop(&flow, "survey", "flow_sid"), Some("FW11111111111111111111111111111111"));
    assert_eq!(prop(&flow, "route_menu", "input"), Some("{{flow.variables.segment}}"));

    // Attributes are never rewritten.
    let original = fixture();
    assert_eq!(
        prop(&flow, "to_flex", "attributes"),
        prop(&original, "to_flex", "attributes")
    );
    let variables = &flow.state("set_context").unwrap().properties().unwrap()["variables"];
    assert_eq!(
        variables,
        &json!([
            { "value": "prod", "key": "environment" },
            { "value": "{{widgets.lookup_customer.parsed.tier}}", "key": "tier" }
        ])
    );
}

#[test]
fn second_pass_has_no_effective_changes() {
    let config = config();
    let dirs = ResourceDirectories::new(snapshot(), &config);
    let mut flow = fixture();
    let first = run(&mut flow, &config, &dirs);
    let after_first = flow.clone();
    let second = run(&mut flow, &config, &dirs);

    assert_eq!(flow, after_first);
    assert_eq!(first.changes.len(), second.changes.len());
    assert!(first.effective_changes().count() > 0);
    assert_eq!(second.effective_changes().count(), 0);
}

#[test]
fn only_listed_widget_types_are_replaced() {
    let mut config = config();
    config.replace_widget_types = vec![WidgetType::RunFunction];
    config.custom_property_replacements.clear();
    let dirs = ResourceDirectories::new(snapshot(), &config);
    let mut flow = fixture();
    let report = run(&mut flow, &config, &dirs);

    assert_eq!(report.changes.len(), 4);
    assert!(report.changes.iter().all(|c| c.node == "lookup_customer"));
    assert_eq!(prop(&flow, "to_flex", "channel"), Some("TC00000000000000000000000000000000"));
}

#[test]
fn custom_property_on_unknown_widget_is_noop() {
    let mut flow = fixture();
    assert!(set_widget_property(&mut flow, "nope", "input", "x").is_empty());
    assert_eq!(flow, fixture());

    let changes = set_widget_property(&mut flow, "route_menu", "input", "{{flow.data}}");
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].widget_type, "split-based-on");
    assert_eq!(changes[0].previous.as_deref(), Some("{{flow.variables.tier}}"));
}

#[test]
fn future_subflow_stays_pending_until_finalized() {
    let config = config();
    let mut snapshot = snapshot();
    snapshot.subflows.clear();
    let mut dirs = ResourceDirectories::new(snapshot, &config);
    let mut flow = fixture();
    let report = run(&mut flow, &config, &dirs);

    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(
        report.pending,
        vec![PendingSubflow {
            node: "survey".into(),
            subflow_name: "Post Call Survey".into()
        }]
    );
    assert_eq!(prop(&flow, "survey", "flow_sid"), Some("FW00000000000000000000000000000000"));
    assert!(!report.changes.iter().any(|c| c.node == "survey"));

    let unresolved = finalize_pending_subflows(&mut flow, &report.pending, &dirs);
    assert_eq!(unresolved.errors.len(), 1);
    assert_eq!(unresolved.pending, report.pending);

    dirs.register_subflow("Post Call Survey", "FW22222222222222222222222222222222");
    let finalized = finalize_pending_subflows(&mut flow, &report.pending, &dirs);
    assert!(finalized.is_clean());
    assert!(finalized.pending.is_empty());
    assert_eq!(finalized.changes.len(), 1);
    assert_eq!(prop(&flow, "survey", "flow_sid"), Some("FW22222222222222222222222222222222"));
}

#[test]
fn resolution_failure_is_per_node() {
    let config = config();
    let mut snapshot = snapshot();
    snapshot.channels.clear();
    let dirs = ResourceDirectories::new(snapshot, &config);
    let mut flow = fixture();
    // Shape-only validation lets the unresolvable channel through to replacement.
    let validation = validate_flow(&flow, ValidationContext::configured(&config));
    let report = replace_widgets(&mut flow, FLOW_NAME, &validation, &config, &dirs);

    assert_eq!(report.errors.len(), 1);
    assert_eq!(
        report.errors[0].to_string(),
        "send-to-flex widget 'to_flex': Unknown channelName 'voice'. (Must match the uniqueName of an existing TaskChannel)"
    );
    assert!(report.changes.iter().any(|c| c.node == "lookup_customer"));
    assert!(!report.changes.iter().any(|c| c.node == "to_flex"));
}
