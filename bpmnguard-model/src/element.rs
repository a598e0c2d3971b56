use std::fmt::{Display, Formatter, Result as FmtResult};

use serde_json::Value;

use crate::model::{Attributes, Scope};

/// Flavour of an activity. All flavours behave the same for validation
/// purposes; the flavour only matters when the model is written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Task,
    UserTask,
    ServiceTask,
    ScriptTask,
    SendTask,
    ReceiveTask,
    ManualTask,
    BusinessRuleTask,
    CallActivity,
}

impl TaskKind {
    pub fn type_name(self) -> &'static str {
        match self {
            TaskKind::Task => "Task",
            TaskKind::UserTask => "UserTask",
            TaskKind::ServiceTask => "ServiceTask",
            TaskKind::ScriptTask => "ScriptTask",
            TaskKind::SendTask => "SendTask",
            TaskKind::ReceiveTask => "ReceiveTask",
            TaskKind::ManualTask => "ManualTask",
            TaskKind::BusinessRuleTask => "BusinessRuleTask",
            TaskKind::CallActivity => "CallActivity",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        let kind = match name {
            "Task" => TaskKind::Task,
            "UserTask" => TaskKind::UserTask,
            "ServiceTask" => TaskKind::ServiceTask,
            "ScriptTask" => TaskKind::ScriptTask,
            "SendTask" => TaskKind::SendTask,
            "ReceiveTask" => TaskKind::ReceiveTask,
            "ManualTask" => TaskKind::ManualTask,
            "BusinessRuleTask" => TaskKind::BusinessRuleTask,
            "CallActivity" => TaskKind::CallActivity,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayKind {
    Exclusive,
    Parallel,
    Inclusive,
    EventBased,
    Complex,
}

impl GatewayKind {
    pub fn type_name(self) -> &'static str {
        match self {
            GatewayKind::Exclusive => "ExclusiveGateway",
            GatewayKind::Parallel => "ParallelGateway",
            GatewayKind::Inclusive => "InclusiveGateway",
            GatewayKind::EventBased => "EventBasedGateway",
            GatewayKind::Complex => "ComplexGateway",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        let kind = match name {
            "ExclusiveGateway" => GatewayKind::Exclusive,
            "ParallelGateway" => GatewayKind::Parallel,
            "InclusiveGateway" => GatewayKind::Inclusive,
            "EventBasedGateway" => GatewayKind::EventBased,
            "ComplexGateway" => GatewayKind::Complex,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether outgoing flows of this gateway may carry a condition expression.
    pub fn allows_conditions(self) -> bool {
        matches!(
            self,
            GatewayKind::Exclusive | GatewayKind::Inclusive | GatewayKind::Complex
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GatewayDirection {
    #[default]
    Unspecified,
    Diverging,
    Converging,
    Mixed,
}

impl GatewayDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            GatewayDirection::Unspecified => "Unspecified",
            GatewayDirection::Diverging => "Diverging",
            GatewayDirection::Converging => "Converging",
            GatewayDirection::Mixed => "Mixed",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "diverging" => GatewayDirection::Diverging,
            "converging" => GatewayDirection::Converging,
            "mixed" => GatewayDirection::Mixed,
            _ => GatewayDirection::Unspecified,
        }
    }

    /// Direction implied by the number of incoming and outgoing flows, or
    /// `None` when the counts do not determine one (a pass-through gateway).
    pub fn from_flow_counts(incoming: usize, outgoing: usize) -> Option<Self> {
        match (incoming > 1, outgoing > 1) {
            (false, true) => Some(GatewayDirection::Diverging),
            (true, false) => Some(GatewayDirection::Converging),
            (true, true) => Some(GatewayDirection::Mixed),
            (false, false) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gateway {
    pub kind: GatewayKind,
    pub direction: GatewayDirection,
    /// Id of the default outgoing flow.
    pub default_flow: Option<String>,
}

impl Gateway {
    pub fn new(kind: GatewayKind) -> Self {
        Self {
            kind,
            direction: GatewayDirection::Unspecified,
            default_flow: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryEvent {
    pub attached_to_ref: Option<String>,
    /// `None` when the document did not declare `cancelActivity`.
    pub cancel_activity: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventDefinitionKind {
    Timer,
    Signal,
    Message,
    Error,
    Escalation,
    Conditional,
    Terminate,
    Compensate,
    Cancel,
    Link,
    Other(String),
}

impl EventDefinitionKind {
    pub fn type_name(&self) -> String {
        let short = match self {
            EventDefinitionKind::Timer => "Timer",
            EventDefinitionKind::Signal => "Signal",
            EventDefinitionKind::Message => "Message",
            EventDefinitionKind::Error => "Error",
            EventDefinitionKind::Escalation => "Escalation",
            EventDefinitionKind::Conditional => "Conditional",
            EventDefinitionKind::Terminate => "Terminate",
            EventDefinitionKind::Compensate => "Compensate",
            EventDefinitionKind::Cancel => "Cancel",
            EventDefinitionKind::Link => "Link",
            EventDefinitionKind::Other(name) => return name.clone(),
        };
        format!("{short}EventDefinition")
    }

    pub fn from_type_name(name: &str) -> Self {
        match name.strip_suffix("EventDefinition").unwrap_or(name) {
            "Timer" => EventDefinitionKind::Timer,
            "Signal" => EventDefinitionKind::Signal,
            "Message" => EventDefinitionKind::Message,
            "Error" => EventDefinitionKind::Error,
            "Escalation" => EventDefinitionKind::Escalation,
            "Conditional" => EventDefinitionKind::Conditional,
            "Terminate" => EventDefinitionKind::Terminate,
            "Compensate" => EventDefinitionKind::Compensate,
            "Cancel" => EventDefinitionKind::Cancel,
            "Link" => EventDefinitionKind::Link,
            _ => EventDefinitionKind::Other(name.to_string()),
        }
    }
}

impl Display for EventDefinitionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.type_name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventDefinition {
    pub kind: EventDefinitionKind,
    pub id: Option<String>,
    pub signal_ref: Option<String>,
    pub extra: Attributes,
}

impl EventDefinition {
    pub fn new(kind: EventDefinitionKind) -> Self {
        Self {
            kind,
            id: None,
            signal_ref: None,
            extra: Attributes::new(),
        }
    }

    pub fn signal(signal_ref: impl Into<String>) -> Self {
        Self {
            signal_ref: Some(signal_ref.into()),
            ..Self::new(EventDefinitionKind::Signal)
        }
    }
}

/// Element-specific part of a [`FlowElement`].
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    StartEvent,
    EndEvent,
    IntermediateEvent { throwing: bool },
    Task(TaskKind),
    Gateway(Gateway),
    SubProcess(Scope),
    BoundaryEvent(BoundaryEvent),
    /// An entry that is not a recognised flow element (unknown `$type`, a
    /// root-level element nested in a process, or a non-object entry).
    /// The raw value is written back untouched.
    Unknown {
        type_name: Option<String>,
        raw: Value,
    },
}

impl ElementKind {
    /// Unprefixed BPMN type name, e.g. `ExclusiveGateway`.
    pub fn type_name(&self) -> String {
        match self {
            ElementKind::StartEvent => "StartEvent".to_string(),
            ElementKind::EndEvent => "EndEvent".to_string(),
            ElementKind::IntermediateEvent { throwing: false } => {
                "IntermediateCatchEvent".to_string()
            }
            ElementKind::IntermediateEvent { throwing: true } => {
                "IntermediateThrowEvent".to_string()
            }
            ElementKind::Task(kind) => kind.type_name().to_string(),
            ElementKind::Gateway(gateway) => gateway.kind.type_name().to_string(),
            ElementKind::SubProcess(_) => "SubProcess".to_string(),
            ElementKind::BoundaryEvent(_) => "BoundaryEvent".to_string(),
            ElementKind::Unknown { type_name, .. } => type_name
                .clone()
                .unwrap_or_else(|| "<untyped>".to_string()),
        }
    }

    /// Tasks and sub-processes: the elements a boundary event may attach to.
    pub fn is_activity(&self) -> bool {
        matches!(self, ElementKind::Task(_) | ElementKind::SubProcess(_))
    }

    pub fn is_event(&self) -> bool {
        matches!(
            self,
            ElementKind::StartEvent
                | ElementKind::EndEvent
                | ElementKind::IntermediateEvent { .. }
                | ElementKind::BoundaryEvent(_)
        )
    }

    pub fn as_gateway(&self) -> Option<&Gateway> {
        match self {
            ElementKind::Gateway(gateway) => Some(gateway),
            _ => None,
        }
    }

    pub fn as_boundary(&self) -> Option<&BoundaryEvent> {
        match self {
            ElementKind::BoundaryEvent(boundary) => Some(boundary),
            _ => None,
        }
    }

    /// Whether this element type may carry event definitions at all.
    pub fn accepts_event_definitions(&self) -> bool {
        self.is_event()
    }

    /// Whether an event definition of `kind` is valid on this element type.
    pub fn allows_definition(&self, kind: &EventDefinitionKind) -> bool {
        use EventDefinitionKind::*;
        match self {
            ElementKind::StartEvent => matches!(
                kind,
                Timer | Signal | Message | Conditional | Error | Escalation | Compensate
            ),
            ElementKind::EndEvent => matches!(
                kind,
                Signal | Message | Error | Escalation | Terminate | Compensate | Cancel
            ),
            ElementKind::IntermediateEvent { throwing: false } => {
                matches!(kind, Timer | Signal | Message | Conditional | Link)
            }
            ElementKind::IntermediateEvent { throwing: true } => {
                matches!(kind, Signal | Message | Escalation | Compensate | Link)
            }
            ElementKind::BoundaryEvent(_) => matches!(
                kind,
                Timer | Signal | Message | Error | Escalation | Conditional | Compensate | Cancel
            ),
            _ => false,
        }
    }
}

/// A node of the process graph: common header plus its [`ElementKind`].
#[derive(Debug, Clone, PartialEq)]
pub struct FlowElement {
    pub id: String,
    pub name: Option<String>,
    pub kind: ElementKind,
    pub event_definitions: Vec<EventDefinition>,
    /// Attributes the model does not interpret, kept for round-tripping.
    pub extra: Attributes,
}

impl FlowElement {
    pub fn new(id: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind,
            event_definitions: Vec::new(),
            extra: Attributes::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_definition(mut self, definition: EventDefinition) -> Self {
        self.event_definitions.push(definition);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn task(id: impl Into<String>) -> Self {
        Self::new(id, ElementKind::Task(TaskKind::Task))
    }

    pub fn gateway(id: impl Into<String>, kind: GatewayKind) -> Self {
        Self::new(id, ElementKind::Gateway(Gateway::new(kind)))
    }

    pub fn boundary(id: impl Into<String>, attached_to: impl Into<String>) -> Self {
        Self::new(
            id,
            ElementKind::BoundaryEvent(BoundaryEvent {
                attached_to_ref: Some(attached_to.into()),
                cancel_activity: Some(true),
            }),
        )
    }

    pub fn sub_process(id: impl Into<String>, scope: Scope) -> Self {
        Self::new(id, ElementKind::SubProcess(scope))
    }
}
