//! BPMN 2.0 XML reading.
//!
//! The XML is deserialized into plain serde structs first and then converted
//! into a [`ProcessModel`]. Diagram interchange, lanes and extension elements
//! are ignored. Children of a process or sub-process that the structs below
//! have no field for are picked up by a second event pass and kept as
//! [`ElementKind::Unknown`] elements, so that they are reported the same way
//! as unknown `$type`s in BPMN-JSON.
//! Within a scope, elements are grouped by type in the order of the fields
//! below rather than by document order, followed by the unknown elements.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::element::{
    BoundaryEvent, ElementKind, EventDefinition, EventDefinitionKind, FlowElement, Gateway,
    GatewayDirection, GatewayKind, TaskKind,
};
use crate::error::ModelError;
use crate::flow::{Condition, SequenceFlow};
use crate::model::{link_sibling_signals, Attributes, ProcessModel, Scope, ScopePath, SignalDefinition};

#[derive(Debug, Default, Deserialize)]
struct TextXml {
    #[serde(rename = "$text", default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct DefinitionXml {
    #[serde(rename = "@id", default)]
    id: Option<String>,
    #[serde(rename = "@signalRef", default)]
    signal_ref: Option<String>,
}

/// Events, tasks and gateways share one shape; fields that do not apply to
/// an element type are simply absent.
#[derive(Debug, Default, Deserialize)]
struct NodeXml {
    #[serde(rename = "@id", default)]
    id: Option<String>,
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "@attachedToRef", default)]
    attached_to_ref: Option<String>,
    #[serde(rename = "@cancelActivity", default)]
    cancel_activity: Option<String>,
    #[serde(rename = "@gatewayDirection", default)]
    gateway_direction: Option<String>,
    #[serde(rename = "@default", default)]
    default_flow: Option<String>,
    #[serde(rename = "documentation", default)]
    documentation: Vec<TextXml>,
    #[serde(rename = "timerEventDefinition", default)]
    timer: Vec<DefinitionXml>,
    #[serde(rename = "signalEventDefinition", default)]
    signal: Vec<DefinitionXml>,
    #[serde(rename = "messageEventDefinition", default)]
    message: Vec<DefinitionXml>,
    #[serde(rename = "errorEventDefinition", default)]
    error: Vec<DefinitionXml>,
    #[serde(rename = "escalationEventDefinition", default)]
    escalation: Vec<DefinitionXml>,
    #[serde(rename = "conditionalEventDefinition", default)]
    conditional: Vec<DefinitionXml>,
    #[serde(rename = "terminateEventDefinition", default)]
    terminate: Vec<DefinitionXml>,
    #[serde(rename = "compensateEventDefinition", default)]
    compensate: Vec<DefinitionXml>,
    #[serde(rename = "cancelEventDefinition", default)]
    cancel: Vec<DefinitionXml>,
    #[serde(rename = "linkEventDefinition", default)]
    link: Vec<DefinitionXml>,
}

#[derive(Debug, Default, Deserialize)]
struct ConditionXml {
    #[serde(rename = "$text", default)]
    body: String,
    #[serde(rename = "@language", default)]
    language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FlowXml {
    #[serde(rename = "@id", default)]
    id: Option<String>,
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "@sourceRef", default)]
    source_ref: Option<String>,
    #[serde(rename = "@targetRef", default)]
    target_ref: Option<String>,
    #[serde(rename = "conditionExpression", default)]
    condition: Option<ConditionXml>,
    #[serde(rename = "documentation", default)]
    documentation: Vec<TextXml>,
}

#[derive(Debug, Default, Deserialize)]
struct SignalXml {
    #[serde(rename = "@id", default)]
    id: Option<String>,
    #[serde(rename = "@name", default)]
    name: Option<String>,
}

/// Processes and sub-processes contain the same kinds of children.
/// This macro generates both structs with these fields plus any extra ones.
macro_rules! def_scope_struct {
    ($name:ident { $($extra:tt)* }) => {
        #[derive(Debug, Default, Deserialize)]
        struct $name {
            #[serde(rename = "@id", default)]
            id: Option<String>,
            #[serde(rename = "@name", default)]
            name: Option<String>,
            #[serde(rename = "startEvent", default)]
            start_events: Vec<NodeXml>,
            #[serde(rename = "endEvent", default)]
            end_events: Vec<NodeXml>,
            #[serde(rename = "intermediateCatchEvent", default)]
            catch_events: Vec<NodeXml>,
            #[serde(rename = "intermediateThrowEvent", default)]
            throw_events: Vec<NodeXml>,
            #[serde(rename = "boundaryEvent", default)]
            boundary_events: Vec<NodeXml>,
            #[serde(rename = "task", default)]
            tasks: Vec<NodeXml>,
            #[serde(rename = "userTask", default)]
            user_tasks: Vec<NodeXml>,
            #[serde(rename = "serviceTask", default)]
            service_tasks: Vec<NodeXml>,
            #[serde(rename = "scriptTask", default)]
            script_tasks: Vec<NodeXml>,
            #[serde(rename = "sendTask", default)]
            send_tasks: Vec<NodeXml>,
            #[serde(rename = "receiveTask", default)]
            receive_tasks: Vec<NodeXml>,
            #[serde(rename = "manualTask", default)]
            manual_tasks: Vec<NodeXml>,
            #[serde(rename = "businessRuleTask", default)]
            business_rule_tasks: Vec<NodeXml>,
            #[serde(rename = "callActivity", default)]
            call_activities: Vec<NodeXml>,
            #[serde(rename = "exclusiveGateway", default)]
            exclusive_gateways: Vec<NodeXml>,
            #[serde(rename = "parallelGateway", default)]
            parallel_gateways: Vec<NodeXml>,
            #[serde(rename = "inclusiveGateway", default)]
            inclusive_gateways: Vec<NodeXml>,
            #[serde(rename = "eventBasedGateway", default)]
            event_based_gateways: Vec<NodeXml>,
            #[serde(rename = "complexGateway", default)]
            complex_gateways: Vec<NodeXml>,
            #[serde(rename = "subProcess", default)]
            sub_processes: Vec<SubProcessXml>,
            #[serde(rename = "sequenceFlow", default)]
            sequence_flows: Vec<FlowXml>,
            $($extra)*
        }

        impl $name {
            fn scope(self) -> Scope {
                let mut elements = Vec::new();
                let groups = [
                    (self.start_events, NodeType::Start),
                    (self.end_events, NodeType::End),
                    (self.catch_events, NodeType::Intermediate(false)),
                    (self.throw_events, NodeType::Intermediate(true)),
                    (self.tasks, NodeType::Task(TaskKind::Task)),
                    (self.user_tasks, NodeType::Task(TaskKind::UserTask)),
                    (self.service_tasks, NodeType::Task(TaskKind::ServiceTask)),
                    (self.script_tasks, NodeType::Task(TaskKind::ScriptTask)),
                    (self.send_tasks, NodeType::Task(TaskKind::SendTask)),
                    (self.receive_tasks, NodeType::Task(TaskKind::ReceiveTask)),
                    (self.manual_tasks, NodeType::Task(TaskKind::ManualTask)),
                    (self.business_rule_tasks, NodeType::Task(TaskKind::BusinessRuleTask)),
                    (self.call_activities, NodeType::Task(TaskKind::CallActivity)),
                    (self.exclusive_gateways, NodeType::Gateway(GatewayKind::Exclusive)),
                    (self.parallel_gateways, NodeType::Gateway(GatewayKind::Parallel)),
                    (self.inclusive_gateways, NodeType::Gateway(GatewayKind::Inclusive)),
                    (self.event_based_gateways, NodeType::Gateway(GatewayKind::EventBased)),
                    (self.complex_gateways, NodeType::Gateway(GatewayKind::Complex)),
                ];
                for (nodes, node_type) in groups {
                    elements.extend(nodes.into_iter().map(|node| node.into_element(node_type)));
                }
                elements.extend(self.sub_processes.into_iter().map(SubProcessXml::into_element));
                elements.extend(
                    self.boundary_events
                        .into_iter()
                        .map(|node| node.into_element(NodeType::Boundary)),
                );

                let flows = self.sequence_flows.into_iter().map(FlowXml::into_flow).collect();
                Scope { elements, flows }
            }
        }
    };
}

def_scope_struct!(ProcessXml {});
def_scope_struct!(SubProcessXml {
    #[serde(rename = "documentation", default)]
    documentation: Vec<TextXml>,
});

#[derive(Debug, Default, Deserialize)]
struct DefinitionsXml {
    #[serde(rename = "@id", default)]
    id: Option<String>,
    #[serde(rename = "signal", default)]
    signals: Vec<SignalXml>,
    #[serde(rename = "process", default)]
    processes: Vec<ProcessXml>,
}

#[derive(Debug, Clone, Copy)]
enum NodeType {
    Start,
    End,
    Intermediate(bool),
    Boundary,
    Task(TaskKind),
    Gateway(GatewayKind),
}

fn documentation(entries: Vec<TextXml>) -> Attributes {
    let text: Vec<String> = entries
        .into_iter()
        .map(|entry| entry.text.trim().to_string())
        .collect();
    let mut extra = Attributes::new();
    if !text.is_empty() {
        extra.insert("documentation".into(), Value::String(text.join("\n")));
    }
    extra
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

impl NodeXml {
    fn definitions(&mut self) -> Vec<EventDefinition> {
        let groups = [
            (EventDefinitionKind::Timer, std::mem::take(&mut self.timer)),
            (EventDefinitionKind::Signal, std::mem::take(&mut self.signal)),
            (EventDefinitionKind::Message, std::mem::take(&mut self.message)),
            (EventDefinitionKind::Error, std::mem::take(&mut self.error)),
            (EventDefinitionKind::Escalation, std::mem::take(&mut self.escalation)),
            (EventDefinitionKind::Conditional, std::mem::take(&mut self.conditional)),
            (EventDefinitionKind::Terminate, std::mem::take(&mut self.terminate)),
            (EventDefinitionKind::Compensate, std::mem::take(&mut self.compensate)),
            (EventDefinitionKind::Cancel, std::mem::take(&mut self.cancel)),
            (EventDefinitionKind::Link, std::mem::take(&mut self.link)),
        ];

        groups
            .into_iter()
            .flat_map(|(kind, entries)| {
                entries.into_iter().map(move |entry| EventDefinition {
                    kind: kind.clone(),
                    id: entry.id,
                    signal_ref: entry.signal_ref,
                    extra: Attributes::new(),
                })
            })
            .collect()
    }

    fn into_element(mut self, node_type: NodeType) -> FlowElement {
        let event_definitions = self.definitions();
        let kind = match node_type {
            NodeType::Start => ElementKind::StartEvent,
            NodeType::End => ElementKind::EndEvent,
            NodeType::Intermediate(throwing) => ElementKind::IntermediateEvent { throwing },
            NodeType::Boundary => ElementKind::BoundaryEvent(BoundaryEvent {
                attached_to_ref: self.attached_to_ref.take(),
                cancel_activity: self.cancel_activity.as_deref().and_then(parse_flag),
            }),
            NodeType::Task(task) => ElementKind::Task(task),
            NodeType::Gateway(gateway) => ElementKind::Gateway(Gateway {
                kind: gateway,
                direction: self
                    .gateway_direction
                    .as_deref()
                    .map(GatewayDirection::parse)
                    .unwrap_or_default(),
                default_flow: self.default_flow.take(),
            }),
        };

        FlowElement {
            id: self.id.unwrap_or_default(),
            name: self.name,
            kind,
            event_definitions,
            extra: documentation(self.documentation),
        }
    }
}

impl SubProcessXml {
    fn into_element(mut self) -> FlowElement {
        let id = self.id.take().unwrap_or_default();
        let name = self.name.take();
        let extra = documentation(std::mem::take(&mut self.documentation));
        FlowElement {
            id,
            name,
            kind: ElementKind::SubProcess(self.scope()),
            event_definitions: Vec::new(),
            extra,
        }
    }
}

impl FlowXml {
    fn into_flow(self) -> SequenceFlow {
        SequenceFlow {
            id: self.id.unwrap_or_default(),
            name: self.name,
            source_ref: self.source_ref,
            target_ref: self.target_ref,
            condition: self.condition.map(|condition| Condition {
                body: condition.body.trim().to_string(),
                language: condition.language,
            }),
            extra: documentation(self.documentation),
        }
    }
}

/// Children of a process or sub-process read by the typed structs above.
const TYPED_CHILDREN: &[&str] = &[
    "startEvent",
    "endEvent",
    "intermediateCatchEvent",
    "intermediateThrowEvent",
    "boundaryEvent",
    "task",
    "userTask",
    "serviceTask",
    "scriptTask",
    "sendTask",
    "receiveTask",
    "manualTask",
    "businessRuleTask",
    "callActivity",
    "exclusiveGateway",
    "parallelGateway",
    "inclusiveGateway",
    "eventBasedGateway",
    "complexGateway",
    "subProcess",
    "sequenceFlow",
    "documentation",
];

/// Children of a process that are not flow elements at all.
const NON_FLOW_CHILDREN: &[&str] = &[
    "extensionElements",
    "laneSet",
    "ioSpecification",
    "property",
    "auditing",
    "monitoring",
    "resourceRole",
    "performer",
    "humanPerformer",
    "potentialOwner",
    "correlationSubscription",
    "supportedInterfaceRef",
    "dataInputAssociation",
    "dataOutputAssociation",
    "standardLoopCharacteristics",
    "multiInstanceLoopCharacteristics",
];

/// Position of an open tag during the event pass.
enum Frame {
    Definitions,
    /// A process (by position among the document's processes) or one of its
    /// sub-processes.
    Scope { process: usize, path: ScopePath },
    Other,
}

/// An element found by the event pass, with the scope it belongs to.
#[derive(Debug)]
struct UntypedElement {
    process: usize,
    path: ScopePath,
    element: FlowElement,
}

fn xml_error(err: impl std::fmt::Display) -> ModelError {
    ModelError::Xml(err.to_string())
}

/// Collects the children of processes and sub-processes that have no typed
/// field. Their own content is not descended into.
fn untyped_elements(raw: &str) -> Result<Vec<UntypedElement>, ModelError> {
    let mut reader = Reader::from_str(raw);
    let mut stack: Vec<Frame> = Vec::new();
    let mut processes = 0;
    let mut found = Vec::new();

    loop {
        let (start, empty) = match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => (start, false),
            Event::Empty(start) => (start, true),
            Event::End(_) => {
                stack.pop();
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };
        let name = local_name(&start)?;
        let frame = match stack.last() {
            None if name == "definitions" => Frame::Definitions,
            Some(Frame::Definitions) if name == "process" => {
                processes += 1;
                Frame::Scope {
                    process: processes - 1,
                    path: ScopePath::new(),
                }
            }
            Some(Frame::Scope { process, path }) if name == "subProcess" => {
                let mut path = path.clone();
                path.push(attribute(&start, "id")?.unwrap_or_default());
                Frame::Scope {
                    process: *process,
                    path,
                }
            }
            Some(Frame::Scope { process, path })
                if !TYPED_CHILDREN.contains(&name.as_str())
                    && !NON_FLOW_CHILDREN.contains(&name.as_str()) =>
            {
                found.push(UntypedElement {
                    process: *process,
                    path: path.clone(),
                    element: untyped_element(&name, &start)?,
                });
                Frame::Other
            }
            _ => Frame::Other,
        };
        if !empty {
            stack.push(frame);
        }
    }
    Ok(found)
}

fn local_name(start: &BytesStart<'_>) -> Result<String, ModelError> {
    std::str::from_utf8(start.local_name().as_ref())
        .map(str::to_string)
        .map_err(xml_error)
}

fn attribute(start: &BytesStart<'_>, key: &str) -> Result<Option<String>, ModelError> {
    Ok(attributes(start)?.remove(key).and_then(|value| match value {
        Value::String(value) => Some(value),
        _ => None,
    }))
}

/// Attributes of a tag by local name, without namespace declarations.
fn attributes(start: &BytesStart<'_>) -> Result<Map<String, Value>, ModelError> {
    let mut values = Map::new();
    for attr in start.attributes() {
        let attr = attr.map_err(xml_error)?;
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let key = std::str::from_utf8(attr.key.local_name().as_ref())
            .map_err(xml_error)?
            .to_string();
        let value = attr.unescape_value().map_err(xml_error)?.into_owned();
        values.insert(key, Value::String(value));
    }
    Ok(values)
}

/// Builds the BPMN-JSON shaped stand-in for an element the reader has no
/// struct for, e.g. `<bpmn:transaction id="pay">` becomes
/// `{"$type": "bpmn:Transaction", "id": "pay"}`.
fn untyped_element(name: &str, start: &BytesStart<'_>) -> Result<FlowElement, ModelError> {
    let mut chars = name.chars();
    let type_name: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };

    let mut raw = attributes(start)?;
    let id = raw.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
    raw.insert("$type".into(), Value::String(format!("bpmn:{type_name}")));

    Ok(FlowElement::new(
        id,
        ElementKind::Unknown {
            type_name: Some(type_name),
            raw: Value::Object(raw),
        },
    ))
}

/// Parses a BPMN 2.0 XML document and returns its first process.
pub fn from_xml_str(raw: &str) -> Result<ProcessModel, ModelError> {
    all_from_xml_str(raw)?
        .into_iter()
        .next()
        .ok_or(ModelError::NoProcess)
}

/// Parses every process of a BPMN 2.0 XML document.
pub fn all_from_xml_str(raw: &str) -> Result<Vec<ProcessModel>, ModelError> {
    let definitions: DefinitionsXml = quick_xml::de::from_str(raw)?;
    if definitions.processes.is_empty() {
        return Err(ModelError::NoProcess);
    }
    let untyped = untyped_elements(raw)?;

    let signals: Vec<SignalDefinition> = definitions
        .signals
        .into_iter()
        .map(|signal| SignalDefinition {
            id: signal.id.unwrap_or_default(),
            name: signal.name,
            extra: Attributes::new(),
        })
        .collect();
    debug!(
        processes = definitions.processes.len(),
        signals = signals.len(),
        untyped = untyped.len(),
        "loaded BPMN XML definitions"
    );

    let definitions_id = definitions.id;
    let mut models: Vec<ProcessModel> = definitions
        .processes
        .into_iter()
        .map(|mut process| {
            let id = process.id.take().unwrap_or_default();
            let name = process.name.take();
            ProcessModel {
                definitions_id: definitions_id.clone(),
                id,
                name,
                signals: signals.clone(),
                body: process.scope(),
                ..ProcessModel::default()
            }
        })
        .collect();

    for UntypedElement { process, path, element } in untyped {
        match models.get_mut(process).and_then(|model| model.scope_mut(&path)) {
            Some(scope) => scope.elements.push(element),
            None => warn!(
                element = %element.id,
                ?path,
                "no scope found for untyped XML element, dropping it"
            ),
        }
    }
    link_sibling_signals(&mut models);
    Ok(models)
}
