use std::path::PathBuf;

use bpmnguard::model::{parse_all, DocumentFormat};
use bpmnguard::rules::{Category, RuleId};
use bpmnguard::{overall_verdict, validate_file, Repairer, RuleEngine, ValidationReport, Verdict};
use test_case::test_case;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn validate(name: &str) -> Vec<ValidationReport> {
    validate_file(&RuleEngine::builtin(), fixture(name)).expect("fixture should load")
}

fn rule_ids(report: &ValidationReport) -> Vec<RuleId> {
    report.violations.iter().map(|v| v.rule_id).collect()
}

#[test_case("order_process.json", Verdict::Valid; "clean json document")]
#[test_case("order_process.bpmn", Verdict::Valid; "clean xml document")]
#[test_case("llm_generated.json", Verdict::Repairable; "generated document with fixable defects")]
#[test_case("broken_schema.json", Verdict::Invalid; "structurally broken document")]
fn fixture_verdicts(name: &str, expected: Verdict) {
    let reports = validate(name);
    assert_eq!(reports.len(), 1);
    assert_eq!(overall_verdict(&reports), expected);
}

#[test]
fn clean_document_has_no_violations() {
    let reports = validate("order_process.json");
    assert!(reports[0].is_empty(), "{:?}", reports[0].violations);
    assert_eq!(reports[0].applied_rules.len(), RuleId::ALL.len());
}

#[test]
fn generated_document_reports_each_defect() {
    let reports = validate("llm_generated.json");
    let ids = rule_ids(&reports[0]);
    for expected in [
        RuleId::DanglingFlowRef,
        RuleId::SignalReference,
        RuleId::UnusedSignal,
        RuleId::GatewayCondition,
        RuleId::GatewayDirection,
        RuleId::BoundaryCancelFlag,
        RuleId::EventDefinitionPlacement,
        RuleId::DisallowedAttribute,
    ] {
        assert!(ids.contains(&expected), "missing {expected} in {ids:?}");
    }
    assert!(!reports[0].has_schema_violations());
}

#[test]
fn gateway_conditions_are_reported_per_flow() {
    let reports = validate("llm_generated.json");
    let mut flows: Vec<&str> = reports[0]
        .violations
        .iter()
        .filter(|v| v.rule_id == RuleId::GatewayCondition)
        .map(|v| v.element_id.as_str())
        .collect();
    flows.sort_unstable();
    assert_eq!(flows, vec!["f3", "f4"]);
}

#[test]
fn broken_document_reports_schema_violations() {
    let reports = validate("broken_schema.json");
    let report = &reports[0];
    let schema: Vec<RuleId> = report.in_category(Category::Schema).map(|v| v.rule_id).collect();
    assert!(schema.contains(&RuleId::DuplicateId));
    assert!(schema.contains(&RuleId::UnknownElement));
    assert!(schema.contains(&RuleId::MissingFlowRef));
    assert!(schema.contains(&RuleId::MissingEndEvent));
    assert!(!schema.contains(&RuleId::MissingStartEvent));
}

#[test]
fn validation_is_deterministic() {
    let engine = RuleEngine::builtin();
    let first = validate_file(&engine, fixture("llm_generated.json")).expect("first");
    let second = validate_file(&engine, fixture("llm_generated.json")).expect("second");
    assert_eq!(first, second);
}

#[test]
fn strict_mode_reports_uninterpreted_attributes() {
    let relaxed = validate("order_process.json");
    assert_eq!(overall_verdict(&relaxed), Verdict::Valid);

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("annotated.json");
    let raw = r#"{"$type": "bpmn:Process", "id": "P", "flowElements": [
        {"$type": "bpmn:StartEvent", "id": "s", "x-layout": {"x": 10}},
        {"$type": "bpmn:EndEvent", "id": "e"},
        {"$type": "bpmn:SequenceFlow", "id": "f", "sourceRef": "s", "targetRef": "e"}
    ]}"#;
    std::fs::write(&path, raw).expect("write");

    let builtin = validate_file(&RuleEngine::builtin(), &path).expect("builtin");
    assert_eq!(overall_verdict(&builtin), Verdict::Valid);

    let strict = validate_file(&RuleEngine::builtin().strict(true), &path).expect("strict");
    assert_eq!(overall_verdict(&strict), Verdict::Repairable);
    assert_eq!(rule_ids(&strict[0]), vec![RuleId::DisallowedAttribute]);
}

#[test]
fn disabled_rules_are_not_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = dir.path().join("rules.yaml");
    std::fs::write(
        &settings,
        "rules:\n  - id: gateway-condition\n    enabled: false\n  - id: disallowed-attribute\n    enabled: false\n",
    )
    .expect("write");

    let engine = RuleEngine::from_path(&settings).expect("settings");
    let reports = validate_file(&engine, fixture("llm_generated.json")).expect("validate");
    let ids = rule_ids(&reports[0]);
    assert!(!ids.contains(&RuleId::GatewayCondition));
    assert!(!ids.contains(&RuleId::DisallowedAttribute));
    assert!(ids.contains(&RuleId::DanglingFlowRef));
}

#[test]
fn unreadable_document_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").expect("write");
    assert!(validate_file(&RuleEngine::builtin(), &path).is_err());
}

const TRANSACTION_JSON: &str = r#"{"$type": "bpmn:Process", "id": "Checkout", "flowElements": [
    {"$type": "bpmn:StartEvent", "id": "start"},
    {"$type": "bpmn:Transaction", "id": "pay"},
    {"$type": "bpmn:EndEvent", "id": "end"},
    {"$type": "bpmn:SequenceFlow", "id": "f1", "sourceRef": "start", "targetRef": "pay"},
    {"$type": "bpmn:SequenceFlow", "id": "f2", "sourceRef": "pay", "targetRef": "end"}
]}"#;

const TRANSACTION_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<bpmn:definitions xmlns:bpmn="http://www.omg.org/spec/BPMN/20100524/MODEL" id="Defs">
  <bpmn:process id="Checkout">
    <bpmn:startEvent id="start" />
    <bpmn:transaction id="pay">
      <bpmn:task id="charge" />
    </bpmn:transaction>
    <bpmn:endEvent id="end" />
    <bpmn:sequenceFlow id="f1" sourceRef="start" targetRef="pay" />
    <bpmn:sequenceFlow id="f2" sourceRef="pay" targetRef="end" />
  </bpmn:process>
</bpmn:definitions>"#;

#[test_case(TRANSACTION_JSON, DocumentFormat::Json; "json document")]
#[test_case(TRANSACTION_XML, DocumentFormat::Xml; "xml document")]
fn unknown_elements_are_reported_in_both_formats(raw: &str, format: DocumentFormat) {
    let models = parse_all(raw, format).expect("document");
    let engine = RuleEngine::builtin();
    let report = engine.validate(&models[0]);

    let offenders: Vec<(RuleId, &str)> = report
        .violations
        .iter()
        .map(|v| (v.rule_id, v.element_id.as_str()))
        .collect();
    assert_eq!(offenders, vec![(RuleId::UnknownElement, "pay")]);
    assert_eq!(report.verdict, Verdict::Invalid);

    let outcome = Repairer::new(&engine).repair(models[0].clone());
    assert!(!outcome.changed());
    assert_eq!(outcome.model.body.flows.len(), 2);
}
