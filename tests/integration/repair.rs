use std::path::PathBuf;

use bpmnguard::model::{from_json_str, to_json_string, ElementKind, GatewayDirection};
use bpmnguard::rules::{Category, RuleId, Severity};
use bpmnguard::{repair_file, RepairOutcome, Repairer, RuleEngine, Verdict};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn repair(name: &str) -> RepairOutcome {
    let mut outcomes = repair_file(&RuleEngine::builtin(), fixture(name), 5).expect("repair");
    assert_eq!(outcomes.len(), 1);
    outcomes.remove(0)
}

#[test]
fn repairs_generated_document_to_valid() {
    let outcome = repair("llm_generated.json");
    assert!(outcome.changed());
    assert_eq!(outcome.verdict(), Verdict::Valid, "{:?}", outcome.remaining());

    assert!(outcome
        .remaining()
        .iter()
        .all(|v| v.category == Category::Schema || v.severity == Severity::Info));
}

#[test]
fn parallel_gateway_flows_lose_their_conditions() {
    let outcome = repair("llm_generated.json");
    let model = &outcome.model;
    for flow in model.body.flows.iter().filter(|f| f.source() == Some("fork")) {
        assert!(flow.condition.is_none(), "flow {} kept its condition", flow.id);
    }

    let fork = model.find_element("fork").expect("fork");
    let gateway = fork.kind.as_gateway().expect("gateway");
    assert_eq!(gateway.direction, GatewayDirection::Diverging);
}

#[test]
fn repair_rewrites_events_signals_and_attributes() {
    let outcome = repair("llm_generated.json");
    let model = &outcome.model;

    // dangling flow dropped, undeclared signal declared, unused one removed
    assert!(model.body.flows.iter().all(|f| f.id != "f9"));
    assert!(model.signal("Signal_approval").is_some());
    assert!(model.signal("Signal_unused").is_none());

    let check_policy = model.find_element("check_policy").expect("task");
    assert!(!check_policy.extra.contains_key("documentation"));

    let assess = model.find_element("assess_damage").expect("task");
    assert!(assess.event_definitions.is_empty());
    let moved = model
        .find_element("assess_damage_boundary")
        .expect("timer moved to a boundary event");
    let boundary = moved.kind.as_boundary().expect("boundary");
    assert_eq!(boundary.attached_to_ref.as_deref(), Some("assess_damage"));

    let failed = model.find_element("assessment_failed").expect("boundary");
    assert!(matches!(
        &failed.kind,
        ElementKind::BoundaryEvent(b) if b.cancel_activity == Some(true)
    ));

    let rules: Vec<RuleId> = outcome.records.iter().map(|r| r.rule_id).collect();
    assert!(rules.contains(&RuleId::EventDefinitionPlacement));
    assert!(rules.contains(&RuleId::BoundaryCancelFlag));
}

#[test]
fn repair_is_idempotent() {
    let engine = RuleEngine::builtin();
    let repairer = Repairer::new(&engine);
    let first = repair("llm_generated.json");
    let second = repairer.repair(first.model.clone());

    assert!(!second.changed());
    assert_eq!(second.passes, 0);
    assert_eq!(first.model.fingerprint(), second.model.fingerprint());
}

#[test]
fn clean_document_is_left_untouched() {
    let engine = RuleEngine::builtin();
    let original = bpmnguard::model::load(fixture("order_process.json")).expect("load");
    let outcome = Repairer::new(&engine).repair(original.clone());

    assert!(!outcome.changed());
    assert_eq!(outcome.model.fingerprint(), original.fingerprint());
}

#[test]
fn schema_violations_survive_repair() {
    let outcome = repair("broken_schema.json");
    assert_eq!(outcome.verdict(), Verdict::Invalid);

    // the condition on a flow leaving a start event is still fixable
    let f2 = outcome
        .model
        .body
        .flows
        .iter()
        .find(|f| f.id == "f2")
        .expect("f2");
    assert!(f2.condition.is_none());

    // the flow without targetRef is blocked by its schema violation
    assert!(outcome.model.body.flows.iter().any(|f| f.id == "f1"));
    assert!(outcome
        .remaining()
        .iter()
        .any(|v| v.rule_id == RuleId::MissingFlowRef && v.element_id == "f1"));
}

#[test]
fn repaired_model_survives_serialisation() {
    let outcome = repair("llm_generated.json");
    let document = to_json_string(&outcome.model);
    let reloaded = from_json_str(&document).expect("reload");

    let report = RuleEngine::builtin().validate(&reloaded);
    assert_eq!(report.verdict, Verdict::Valid, "{:?}", report.violations);
    assert_eq!(reloaded.fingerprint(), outcome.model.fingerprint());
}

mod mutated_models {
    use std::collections::BTreeSet;

    use bpmnguard::model::{
        ElementKind, EventDefinition, EventDefinitionKind, FlowElement, GatewayDirection,
        GatewayKind, ProcessModel, SequenceFlow, SignalDefinition,
    };
    use bpmnguard::rules::Category;
    use bpmnguard::{Repairer, RuleEngine, Verdict};

    type Mutation = (&'static str, fn(&mut ProcessModel));

    fn parallel(id: &str, direction: GatewayDirection) -> FlowElement {
        let mut element = FlowElement::gateway(id, GatewayKind::Parallel);
        if let ElementKind::Gateway(gateway) = &mut element.kind {
            gateway.direction = direction;
        }
        element
    }

    /// start -> fork -> (review | archive) -> join -> end
    fn base() -> ProcessModel {
        ProcessModel::new("Claims")
            .with_element(FlowElement::new("start", ElementKind::StartEvent))
            .with_element(parallel("fork", GatewayDirection::Diverging))
            .with_element(FlowElement::task("review"))
            .with_element(FlowElement::task("archive"))
            .with_element(parallel("join", GatewayDirection::Converging))
            .with_element(FlowElement::new("end", ElementKind::EndEvent))
            .with_flow(SequenceFlow::new("f1", "start", "fork"))
            .with_flow(SequenceFlow::new("f2", "fork", "review"))
            .with_flow(SequenceFlow::new("f3", "fork", "archive"))
            .with_flow(SequenceFlow::new("f4", "review", "join"))
            .with_flow(SequenceFlow::new("f5", "archive", "join"))
            .with_flow(SequenceFlow::new("f6", "join", "end"))
    }

    fn element<'m>(model: &'m mut ProcessModel, id: &str) -> &'m mut FlowElement {
        model
            .body
            .elements
            .iter_mut()
            .find(|element| element.id == id)
            .expect("element of the base model")
    }

    fn condition_on_parallel_flow(model: &mut ProcessModel) {
        model.body.flows[1].condition = Some(bpmnguard::model::Condition::new("${amount > 100}"));
    }

    fn dangling_flow(model: &mut ProcessModel) {
        model.body.flows.push(SequenceFlow::new("f_ghost", "review", "ghost"));
    }

    fn undeclared_signal(model: &mut ProcessModel) {
        model.body.elements.push(
            FlowElement::new("wait", ElementKind::IntermediateEvent { throwing: false })
                .with_definition(EventDefinition::signal("approve")),
        );
    }

    fn unused_signal(model: &mut ProcessModel) {
        model
            .signals
            .push(SignalDefinition::new("Signal_unused").with_name("approve"));
    }

    fn documentation_attribute(model: &mut ProcessModel) {
        element(model, "archive")
            .extra
            .insert("documentation".into(), "keep for ten years".into());
    }

    fn timer_on_task(model: &mut ProcessModel) {
        element(model, "review")
            .event_definitions
            .push(EventDefinition::new(EventDefinitionKind::Timer));
    }

    fn wrong_gateway_direction(model: &mut ProcessModel) {
        if let ElementKind::Gateway(gateway) = &mut element(model, "fork").kind {
            gateway.direction = GatewayDirection::Converging;
        }
    }

    fn unknown_element(model: &mut ProcessModel) {
        model.body.elements.push(FlowElement::new(
            "pay",
            ElementKind::Unknown {
                type_name: Some("Transaction".into()),
                raw: serde_json::json!({"$type": "bpmn:Transaction", "id": "pay"}),
            },
        ));
    }

    const MUTATIONS: [Mutation; 8] = [
        ("condition on parallel flow", condition_on_parallel_flow),
        ("dangling flow", dangling_flow),
        ("undeclared signal", undeclared_signal),
        ("unused signal", unused_signal),
        ("documentation attribute", documentation_attribute),
        ("timer on task", timer_on_task),
        ("wrong gateway direction", wrong_gateway_direction),
        ("unknown element", unknown_element),
    ];

    #[test]
    fn every_combination_repairs_to_a_fixed_point() {
        let engine = RuleEngine::builtin();
        let repairer = Repairer::new(&engine);

        for mask in 0u32..(1 << MUTATIONS.len()) {
            let mut model = base();
            let mut applied = Vec::new();
            for (bit, (name, mutate)) in MUTATIONS.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    mutate(&mut model);
                    applied.push(*name);
                }
            }

            let first = repairer.repair(model);
            let second = repairer.repair(first.model.clone());
            assert!(!second.changed(), "{applied:?}: {:?}", second.records);
            assert_eq!(
                second.model.fingerprint(),
                first.model.fingerprint(),
                "{applied:?}"
            );

            let schema_offenders: BTreeSet<&str> = first
                .remaining()
                .iter()
                .filter(|v| v.category == Category::Schema)
                .map(|v| v.element_id.as_str())
                .collect();
            for violation in first.remaining() {
                if violation.category.is_repairable() {
                    assert!(
                        schema_offenders.contains(violation.element_id.as_str()),
                        "{applied:?}: {violation}"
                    );
                }
            }

            let has_unknown = applied.contains(&"unknown element");
            let expected = if has_unknown { Verdict::Invalid } else { Verdict::Valid };
            assert_eq!(first.verdict(), expected, "{applied:?}: {:?}", first.remaining());
        }
    }
}
