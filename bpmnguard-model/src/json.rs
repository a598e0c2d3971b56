//! BPMN-JSON (bpmn-moddle shape) reading and writing.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::element::{
    BoundaryEvent, ElementKind, EventDefinition, EventDefinitionKind, FlowElement, Gateway,
    GatewayDirection, GatewayKind, TaskKind,
};
use crate::error::ModelError;
use crate::flow::{Condition, SequenceFlow};
use crate::model::{link_sibling_signals, Attributes, ProcessModel, Scope, SignalDefinition};

const PREFIX: &str = "bpmn:";

/// `$type` of a JSON object without its `bpmn:` prefix.
fn type_of(object: &Map<String, Value>) -> Option<&str> {
    object
        .get("$type")
        .and_then(Value::as_str)
        .map(|raw| raw.strip_prefix(PREFIX).unwrap_or(raw))
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

/// References are plain id strings, or objects carrying an `id` when the
/// generator inlined the referenced element.
fn reference(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(id) => Some(id.clone()),
        Value::Object(object) => string_field(object, "id"),
        _ => None,
    }
}

fn flag(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(flag) => Some(*flag),
        Value::String(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Copies the entries of `object` that are not listed in `known`.
fn remaining(object: &Map<String, Value>, known: &[&str]) -> Attributes {
    object
        .iter()
        .filter(|(key, _)| !known.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Parses a BPMN-JSON document and returns its first process.
pub fn from_json_str(raw: &str) -> Result<ProcessModel, ModelError> {
    let value: Value = serde_json::from_str(raw)?;
    from_json_value(&value)
}

/// Converts an already parsed BPMN-JSON document, returning its first process.
pub fn from_json_value(value: &Value) -> Result<ProcessModel, ModelError> {
    all_from_json_value(value)?
        .into_iter()
        .next()
        .ok_or(ModelError::NoProcess)
}

/// Converts every process of a BPMN-JSON document. Root-level signals and
/// other root elements are shared by all returned models.
pub fn all_from_json_value(value: &Value) -> Result<Vec<ProcessModel>, ModelError> {
    let root = match value {
        Value::Object(object) => object,
        Value::Array(_) => return Err(ModelError::InvalidRoot("an array")),
        Value::String(_) => return Err(ModelError::InvalidRoot("a string")),
        Value::Number(_) => return Err(ModelError::InvalidRoot("a number")),
        Value::Bool(_) => return Err(ModelError::InvalidRoot("a boolean")),
        Value::Null => return Err(ModelError::InvalidRoot("null")),
    };

    let is_process = type_of(root) == Some("Process")
        || (!root.contains_key("rootElements") && root.contains_key("flowElements"));
    if is_process {
        return Ok(vec![process_from_object(root, None, Vec::new(), Vec::new(), Attributes::new())]);
    }

    let root_elements = root
        .get("rootElements")
        .and_then(Value::as_array)
        .ok_or(ModelError::NoProcess)?;

    let mut signals = Vec::new();
    let mut processes = Vec::new();
    let mut others = Vec::new();
    for entry in root_elements {
        let Some(object) = entry.as_object() else {
            others.push(entry.clone());
            continue;
        };
        match type_of(object) {
            Some("Process") => processes.push(object),
            Some("Signal") => signals.push(SignalDefinition {
                id: string_field(object, "id").unwrap_or_default(),
                name: string_field(object, "name"),
                extra: remaining(object, &["$type", "id", "name"]),
            }),
            _ => others.push(entry.clone()),
        }
    }

    if processes.is_empty() {
        return Err(ModelError::NoProcess);
    }

    let definitions_id = string_field(root, "id");
    let definitions_extra = remaining(root, &["$type", "id", "rootElements"]);
    debug!(
        processes = processes.len(),
        signals = signals.len(),
        "loaded BPMN-JSON definitions"
    );

    let mut models: Vec<ProcessModel> = processes
        .into_iter()
        .map(|object| {
            process_from_object(
                object,
                definitions_id.clone(),
                signals.clone(),
                others.clone(),
                definitions_extra.clone(),
            )
        })
        .collect();
    link_sibling_signals(&mut models);
    Ok(models)
}

fn process_from_object(
    object: &Map<String, Value>,
    definitions_id: Option<String>,
    signals: Vec<SignalDefinition>,
    other_root_elements: Vec<Value>,
    definitions_extra: Attributes,
) -> ProcessModel {
    ProcessModel {
        definitions_id,
        id: string_field(object, "id").unwrap_or_default(),
        name: string_field(object, "name"),
        signals,
        body: scope_from_entries(object.get("flowElements")),
        other_root_elements,
        definitions_extra,
        process_extra: remaining(object, &["$type", "id", "name", "flowElements"]),
        ..ProcessModel::default()
    }
}

fn scope_from_entries(entries: Option<&Value>) -> Scope {
    let mut scope = Scope::new();
    let Some(entries) = entries.and_then(Value::as_array) else {
        return scope;
    };

    for entry in entries {
        match entry.as_object() {
            Some(object) if type_of(object) == Some("SequenceFlow") => {
                scope.flows.push(flow_from_object(object));
            }
            Some(object) => scope.elements.push(element_from_object(object, entry)),
            None => scope.elements.push(FlowElement::new(
                "",
                ElementKind::Unknown {
                    type_name: None,
                    raw: entry.clone(),
                },
            )),
        }
    }
    scope
}

fn flow_from_object(object: &Map<String, Value>) -> SequenceFlow {
    let condition = match object.get("conditionExpression") {
        Some(Value::String(body)) => Some(Condition::new(body.clone())),
        Some(Value::Object(expression)) => Some(Condition {
            body: string_field(expression, "body").unwrap_or_default(),
            language: string_field(expression, "language"),
        }),
        _ => None,
    };

    SequenceFlow {
        id: string_field(object, "id").unwrap_or_default(),
        name: string_field(object, "name"),
        source_ref: reference(object.get("sourceRef")),
        target_ref: reference(object.get("targetRef")),
        condition,
        extra: remaining(
            object,
            &[
                "$type",
                "id",
                "name",
                "sourceRef",
                "targetRef",
                "conditionExpression",
            ],
        ),
    }
}

// `incoming`/`outgoing` are derived from the sequence flows; dropped on load.
const ELEMENT_KEYS: &[&str] = &[
    "$type",
    "id",
    "name",
    "eventDefinitions",
    "incoming",
    "outgoing",
];
const NO_KEYS: &[&str] = &[];
const GATEWAY_KEYS: &[&str] = &["gatewayDirection", "default"];
const BOUNDARY_KEYS: &[&str] = &["attachedToRef", "cancelActivity"];
const SUB_PROCESS_KEYS: &[&str] = &["flowElements"];

fn element_from_object(object: &Map<String, Value>, raw: &Value) -> FlowElement {
    let type_name = type_of(object);
    let (kind, kind_keys): (ElementKind, &[&str]) = match type_name {
        Some("StartEvent") => (ElementKind::StartEvent, NO_KEYS),
        Some("EndEvent") => (ElementKind::EndEvent, NO_KEYS),
        Some("IntermediateCatchEvent") => (ElementKind::IntermediateEvent { throwing: false }, NO_KEYS),
        Some("IntermediateThrowEvent") => (ElementKind::IntermediateEvent { throwing: true }, NO_KEYS),
        Some("BoundaryEvent") => (
            ElementKind::BoundaryEvent(BoundaryEvent {
                attached_to_ref: reference(object.get("attachedToRef")),
                cancel_activity: flag(object.get("cancelActivity")),
            }),
            BOUNDARY_KEYS,
        ),
        Some("SubProcess") => (
            ElementKind::SubProcess(scope_from_entries(object.get("flowElements"))),
            SUB_PROCESS_KEYS,
        ),
        Some(name) => {
            if let Some(task) = TaskKind::from_type_name(name) {
                (ElementKind::Task(task), NO_KEYS)
            } else if let Some(gateway) = GatewayKind::from_type_name(name) {
                (
                    ElementKind::Gateway(Gateway {
                        kind: gateway,
                        direction: object
                            .get("gatewayDirection")
                            .and_then(Value::as_str)
                            .map(GatewayDirection::parse)
                            .unwrap_or_default(),
                        default_flow: reference(object.get("default")),
                    }),
                    GATEWAY_KEYS,
                )
            } else {
                return unknown(object, raw, Some(name.to_string()));
            }
        }
        None => return unknown(object, raw, None),
    };

    let event_definitions = object
        .get("eventDefinitions")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().map(definition_from_value).collect())
        .unwrap_or_default();

    let known: Vec<&str> = ELEMENT_KEYS.iter().chain(kind_keys).copied().collect();
    FlowElement {
        id: string_field(object, "id").unwrap_or_default(),
        name: string_field(object, "name"),
        kind,
        event_definitions,
        extra: remaining(object, &known),
    }
}

fn unknown(object: &Map<String, Value>, raw: &Value, type_name: Option<String>) -> FlowElement {
    FlowElement::new(
        string_field(object, "id").unwrap_or_default(),
        ElementKind::Unknown {
            type_name,
            raw: raw.clone(),
        },
    )
}

fn definition_from_value(value: &Value) -> EventDefinition {
    let Some(object) = value.as_object() else {
        return EventDefinition::new(EventDefinitionKind::Other(value.to_string()));
    };
    EventDefinition {
        kind: EventDefinitionKind::from_type_name(type_of(object).unwrap_or_default()),
        id: string_field(object, "id"),
        signal_ref: reference(object.get("signalRef")),
        extra: remaining(object, &["$type", "id", "signalRef"]),
    }
}

fn typed(type_name: &str) -> Map<String, Value> {
    let mut object = Map::new();
    object.insert("$type".into(), Value::String(format!("{PREFIX}{type_name}")));
    object
}

fn put_opt(object: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        object.insert(key.to_string(), Value::String(value.clone()));
    }
}

fn with_extra(mut object: Map<String, Value>, extra: &Attributes) -> Map<String, Value> {
    for (key, value) in extra {
        object.entry(key.clone()).or_insert_with(|| value.clone());
    }
    object
}

/// Writes a model back as a BPMN-JSON definitions document.
pub fn to_json_value(model: &ProcessModel) -> Value {
    document_to_json_value(std::slice::from_ref(model))
}

/// Pretty printed [`to_json_value`].
pub fn to_json_string(model: &ProcessModel) -> String {
    pretty(&to_json_value(model))
}

/// Writes the processes of one document back as a single BPMN-JSON
/// definitions document. The definitions header and the other root elements
/// come from the first process; signals are merged by id in first-seen order.
pub fn document_to_json_value(models: &[ProcessModel]) -> Value {
    let mut signals: Vec<&SignalDefinition> = Vec::new();
    for signal in models.iter().flat_map(|model| &model.signals) {
        if !signals.iter().any(|seen| seen.id == signal.id) {
            signals.push(signal);
        }
    }

    let mut root_elements: Vec<Value> = signals
        .into_iter()
        .map(|signal| {
            let mut object = typed("Signal");
            object.insert("id".into(), Value::String(signal.id.clone()));
            put_opt(&mut object, "name", &signal.name);
            Value::Object(with_extra(object, &signal.extra))
        })
        .collect();
    let header = models.first();
    if let Some(first) = header {
        root_elements.extend(first.other_root_elements.iter().cloned());
    }

    for model in models {
        let mut process = typed("Process");
        process.insert("id".into(), Value::String(model.id.clone()));
        put_opt(&mut process, "name", &model.name);
        process.insert("flowElements".into(), Value::Array(scope_to_entries(&model.body)));
        root_elements.push(Value::Object(with_extra(process, &model.process_extra)));
    }

    let mut definitions = typed("Definitions");
    match header {
        Some(first) => {
            put_opt(&mut definitions, "id", &first.definitions_id);
            definitions.insert("rootElements".into(), Value::Array(root_elements));
            Value::Object(with_extra(definitions, &first.definitions_extra))
        }
        None => {
            definitions.insert("rootElements".into(), Value::Array(root_elements));
            Value::Object(definitions)
        }
    }
}

/// Pretty printed [`document_to_json_value`].
pub fn document_to_json_string(models: &[ProcessModel]) -> String {
    pretty(&document_to_json_value(models))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| json!({}).to_string())
}

fn scope_to_entries(scope: &Scope) -> Vec<Value> {
    let mut entries: Vec<Value> = scope.elements.iter().map(element_to_value).collect();
    entries.extend(scope.flows.iter().map(flow_to_value));
    entries
}

fn element_to_value(element: &FlowElement) -> Value {
    if let ElementKind::Unknown { raw, .. } = &element.kind {
        return raw.clone();
    }

    let mut object = typed(&element.kind.type_name());
    object.insert("id".into(), Value::String(element.id.clone()));
    put_opt(&mut object, "name", &element.name);

    match &element.kind {
        ElementKind::Gateway(gateway) => {
            if gateway.direction != GatewayDirection::Unspecified {
                object.insert(
                    "gatewayDirection".into(),
                    Value::String(gateway.direction.as_str().to_string()),
                );
            }
            put_opt(&mut object, "default", &gateway.default_flow);
        }
        ElementKind::BoundaryEvent(boundary) => {
            put_opt(&mut object, "attachedToRef", &boundary.attached_to_ref);
            if let Some(cancel) = boundary.cancel_activity {
                object.insert("cancelActivity".into(), Value::Bool(cancel));
            }
        }
        ElementKind::SubProcess(scope) => {
            object.insert("flowElements".into(), Value::Array(scope_to_entries(scope)));
        }
        _ => {}
    }

    if !element.event_definitions.is_empty() {
        let definitions = element
            .event_definitions
            .iter()
            .map(definition_to_value)
            .collect();
        object.insert("eventDefinitions".into(), Value::Array(definitions));
    }

    Value::Object(with_extra(object, &element.extra))
}

fn definition_to_value(definition: &EventDefinition) -> Value {
    let mut object = typed(&definition.kind.type_name());
    put_opt(&mut object, "id", &definition.id);
    put_opt(&mut object, "signalRef", &definition.signal_ref);
    Value::Object(with_extra(object, &definition.extra))
}

fn flow_to_value(flow: &SequenceFlow) -> Value {
    let mut object = typed("SequenceFlow");
    object.insert("id".into(), Value::String(flow.id.clone()));
    put_opt(&mut object, "name", &flow.name);
    put_opt(&mut object, "sourceRef", &flow.source_ref);
    put_opt(&mut object, "targetRef", &flow.target_ref);
    if let Some(condition) = &flow.condition {
        let mut expression = typed("FormalExpression");
        expression.insert("body".into(), Value::String(condition.body.clone()));
        put_opt(&mut expression, "language", &condition.language);
        object.insert("conditionExpression".into(), Value::Object(expression));
    }
    Value::Object(with_extra(object, &flow.extra))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        json!({
            "$type": "bpmn:Definitions",
            "id": "Defs_1",
            "rootElements": [
                {"$type": "bpmn:Signal", "id": "Signal_Done", "name": "done"},
                {"$type": "bpmn:Process", "id": "Process_1", "flowElements": [
                    {"$type": "bpmn:StartEvent", "id": "Start"},
                    {"$type": "bpmn:ParallelGateway", "id": "Fork", "gatewayDirection": "Diverging"},
                    {"$type": "bpmn:UserTask", "id": "Review", "name": "Review", "documentation": "notes"},
                    {"$type": "bpmn:BoundaryEvent", "id": "Timeout", "attachedToRef": {"id": "Review"},
                     "cancelActivity": "false",
                     "eventDefinitions": [{"$type": "bpmn:TimerEventDefinition", "timeDuration": "PT1H"}]},
                    {"$type": "bpmn:SequenceFlow", "id": "f1", "sourceRef": "Start", "targetRef": "Fork"},
                    {"$type": "bpmn:SequenceFlow", "id": "f2", "sourceRef": "Fork", "targetRef": "Review",
                     "conditionExpression": {"$type": "bpmn:FormalExpression", "body": "${ok}"}},
                    {"$type": "bpmn:Lane", "id": "Lane_1"}
                ]}
            ]
        })
    }

    #[test]
    fn loads_definitions_document() {
        let model = from_json_value(&sample()).expect("model");
        assert_eq!(model.definitions_id.as_deref(), Some("Defs_1"));
        assert_eq!(model.id, "Process_1");
        assert_eq!(model.signals.len(), 1);
        assert_eq!(model.body.elements.len(), 5);
        assert_eq!(model.body.flows.len(), 2);

        let review = model.find_element("Review").expect("review");
        assert_eq!(review.kind, ElementKind::Task(TaskKind::UserTask));
        assert_eq!(review.extra.get("documentation"), Some(&json!("notes")));

        let timeout = model.find_element("Timeout").expect("timeout");
        let boundary = timeout.kind.as_boundary().expect("boundary");
        assert_eq!(boundary.attached_to_ref.as_deref(), Some("Review"));
        assert_eq!(boundary.cancel_activity, Some(false));
        assert_eq!(timeout.event_definitions[0].kind, EventDefinitionKind::Timer);

        let lane = model.find_element("Lane_1").expect("lane");
        assert!(matches!(lane.kind, ElementKind::Unknown { .. }));

        assert_eq!(
            model.body.flows[1].condition.as_ref().map(|c| c.body.as_str()),
            Some("${ok}")
        );
    }

    #[test]
    fn accepts_bare_process() {
        let raw = r#"{"$type": "Process", "id": "P", "flowElements": [
            {"$type": "Task", "id": "T"},
            {"$type": "SequenceFlow", "id": "f", "sourceRef": "T", "conditionExpression": "x > 1"}
        ]}"#;
        let model = from_json_str(raw).expect("model");
        assert_eq!(model.id, "P");
        assert!(model.definitions_id.is_none());
        assert!(model.body.flows[0].target_ref.is_none());
        assert_eq!(model.body.flows[0].condition, Some(Condition::new("x > 1")));
    }

    #[test]
    fn rejects_unreadable_roots() {
        assert!(matches!(
            from_json_str("[1, 2]"),
            Err(ModelError::InvalidRoot(_))
        ));
        assert!(matches!(
            from_json_str(r#"{"rootElements": []}"#),
            Err(ModelError::NoProcess)
        ));
        assert!(matches!(from_json_str("{"), Err(ModelError::Json(_))));
    }

    #[test]
    fn writing_then_loading_is_stable() {
        let model = from_json_value(&sample()).expect("model");
        let written = to_json_value(&model);
        let reloaded = from_json_value(&written).expect("reload");
        assert_eq!(reloaded, model);
        assert_eq!(reloaded.fingerprint(), model.fingerprint());
    }

    #[test]
    fn loads_every_process() {
        let value = json!({"rootElements": [
            {"$type": "bpmn:Process", "id": "A", "flowElements": []},
            {"$type": "bpmn:Process", "id": "B", "flowElements": []}
        ]});
        let ids: Vec<String> = all_from_json_value(&value)
            .expect("models")
            .into_iter()
            .map(|model| model.id)
            .collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn writes_sibling_processes_into_one_document() {
        let value = json!({"$type": "bpmn:Definitions", "id": "Defs", "rootElements": [
            {"$type": "bpmn:Signal", "id": "Go"},
            {"$type": "bpmn:Message", "id": "Msg"},
            {"$type": "bpmn:Process", "id": "A", "flowElements": [
                {"$type": "bpmn:IntermediateThrowEvent", "id": "throw",
                 "eventDefinitions": [{"$type": "bpmn:SignalEventDefinition", "signalRef": "Go"}]}
            ]},
            {"$type": "bpmn:Process", "id": "B", "flowElements": [
                {"$type": "bpmn:Task", "id": "work"}
            ]}
        ]});
        let models = all_from_json_value(&value).expect("models");
        assert!(models[1].sibling_signal_refs.contains("Go"));

        let written = document_to_json_value(&models);
        let roots = written["rootElements"].as_array().expect("root elements");
        assert_eq!(roots.len(), 4);
        assert_eq!(written["id"], json!("Defs"));

        let reloaded = all_from_json_value(&written).expect("reload");
        assert_eq!(reloaded, models);
    }
}
