//! Implementations of the built-in rules.
//!
//! Every check walks the [`ModelIndex`] in document order and returns its
//! findings; the engine turns them into [`crate::Violation`]s.

use bpmnguard_model::{
    ElementEntry, ElementKind, EventDefinitionKind, GatewayDirection, ModelIndex, ProcessModel,
    ScopePath,
};

use crate::rule::{CheckOptions, RuleId};
use crate::violation::Category;

/// Element types that may appear among flow elements without being flow
/// nodes. They are tolerated rather than reported as unknown.
const PASSIVE_TYPES: &[&str] = &[
    "DataObject",
    "DataObjectReference",
    "DataStoreReference",
    "TextAnnotation",
    "Association",
    "Group",
];

/// Root-level element types that were nested inside a process by mistake.
const ROOT_TYPES: &[&str] = &[
    "Definitions",
    "Process",
    "Collaboration",
    "Signal",
    "Message",
    "Error",
    "Escalation",
];

pub(crate) struct CheckContext<'a> {
    pub model: &'a ProcessModel,
    pub index: &'a ModelIndex<'a>,
    pub options: &'a CheckOptions,
}

#[derive(Debug)]
pub(crate) struct Finding {
    pub element_id: String,
    pub scope: ScopePath,
    /// Overrides the rule's category for this finding.
    pub category: Option<Category>,
    pub message: String,
}

impl Finding {
    fn at(element_id: &str, scope: &[String], message: String) -> Self {
        Self {
            element_id: element_id.to_string(),
            scope: scope.to_vec(),
            category: None,
            message,
        }
    }

    fn root(element_id: &str, message: String) -> Self {
        Self::at(element_id, &[], message)
    }

    fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|raw| raw.trim().is_empty()).unwrap_or(true)
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|raw| !raw.trim().is_empty())
}

pub(crate) fn run(rule: RuleId, ctx: &CheckContext<'_>) -> Vec<Finding> {
    match rule {
        RuleId::MissingId => missing_id(ctx),
        RuleId::DuplicateId => duplicate_id(ctx),
        RuleId::UnknownElement => unknown_element(ctx),
        RuleId::MissingFlowRef => missing_flow_ref(ctx),
        RuleId::MissingAttachment => missing_attachment(ctx),
        RuleId::MissingSignalRef => missing_signal_ref(ctx),
        RuleId::MissingStartEvent => missing_body_event(ctx, true),
        RuleId::MissingEndEvent => missing_body_event(ctx, false),
        RuleId::DanglingFlowRef => dangling_flow_ref(ctx),
        RuleId::CrossScopeFlow => cross_scope_flow(ctx),
        RuleId::BoundaryAttachment => boundary_attachment(ctx),
        RuleId::BoundaryCancelFlag => boundary_cancel_flag(ctx),
        RuleId::BoundaryDefinition => boundary_definition(ctx),
        RuleId::SignalReference => signal_reference(ctx),
        RuleId::UnusedSignal => unused_signal(ctx),
        RuleId::GatewayCondition => gateway_condition(ctx),
        RuleId::DefaultFlowCondition => default_flow_condition(ctx),
        RuleId::DefaultFlowRef => default_flow_ref(ctx),
        RuleId::GatewayDirection => gateway_direction(ctx),
        RuleId::EventDefinitionPlacement => event_definition_placement(ctx),
        RuleId::EventDefinitionKind => event_definition_kind(ctx),
        RuleId::DisallowedAttribute => disallowed_attribute(ctx),
    }
}

fn missing_id(ctx: &CheckContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    if ctx.model.id.trim().is_empty() {
        findings.push(Finding::root("", "process has no id".to_string()));
    }
    for entry in ctx.index.elements() {
        if entry.element.id.trim().is_empty() {
            findings.push(Finding::at(
                "",
                &entry.scope,
                format!("{} element has no id", entry.element.kind.type_name()),
            ));
        }
    }
    for entry in ctx.index.flows() {
        let flow = entry.flow;
        if flow.id.trim().is_empty() {
            findings.push(Finding::at(
                "",
                &entry.scope,
                format!(
                    "sequence flow from `{}` to `{}` has no id",
                    flow.source().unwrap_or("?"),
                    flow.target().unwrap_or("?")
                ),
            ));
        }
    }
    for signal in &ctx.model.signals {
        if signal.id.trim().is_empty() {
            let name = signal.name.as_deref().unwrap_or("?");
            findings.push(Finding::root("", format!("signal `{name}` has no id")));
        }
    }
    findings
}

fn duplicate_id(ctx: &CheckContext<'_>) -> Vec<Finding> {
    ctx.index
        .duplicate_ids()
        .iter()
        .map(|id| {
            let scope = ctx
                .index
                .element(id)
                .map(|entry| entry.scope.clone())
                .or_else(|| {
                    ctx.index
                        .flows()
                        .iter()
                        .find(|entry| &entry.flow.id == id)
                        .map(|entry| entry.scope.clone())
                })
                .unwrap_or_default();
            Finding::at(id, &scope, format!("id `{id}` is declared more than once"))
        })
        .collect()
}

fn unknown_element(ctx: &CheckContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for entry in ctx.index.elements() {
        let ElementKind::Unknown { type_name, raw } = &entry.element.kind else {
            continue;
        };
        let message = match type_name.as_deref() {
            Some(name) if PASSIVE_TYPES.contains(&name) => continue,
            Some(name) if ROOT_TYPES.contains(&name) => {
                format!("`{name}` is a root element and cannot appear inside a process")
            }
            Some(name) => format!("unrecognised element type `{name}`"),
            None if raw.is_object() => "flow element has no `$type`".to_string(),
            None => format!("flow element entry is not an object: {raw}"),
        };
        findings.push(Finding::at(&entry.element.id, &entry.scope, message));
    }
    findings
}

fn missing_flow_ref(ctx: &CheckContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for entry in ctx.index.flows() {
        let flow = entry.flow;
        let mut missing = Vec::new();
        if is_blank(flow.source()) {
            missing.push("sourceRef");
        }
        if is_blank(flow.target()) {
            missing.push("targetRef");
        }
        if !missing.is_empty() {
            findings.push(Finding::at(
                &flow.id,
                &entry.scope,
                format!("flow `{}` has no {}", flow.id, missing.join(" and ")),
            ));
        }
    }
    findings
}

fn missing_attachment(ctx: &CheckContext<'_>) -> Vec<Finding> {
    boundaries(ctx)
        .filter(|(entry, _)| {
            entry
                .element
                .kind
                .as_boundary()
                .map(|boundary| is_blank(boundary.attached_to_ref.as_deref()))
                .unwrap_or(false)
        })
        .map(|(entry, id)| {
            Finding::at(
                id,
                &entry.scope,
                format!("boundary event `{id}` has no attachedToRef"),
            )
        })
        .collect()
}

fn missing_signal_ref(ctx: &CheckContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for entry in ctx.index.elements() {
        let element = entry.element;
        for definition in &element.event_definitions {
            if definition.kind == EventDefinitionKind::Signal
                && is_blank(definition.signal_ref.as_deref())
            {
                findings.push(Finding::at(
                    &element.id,
                    &entry.scope,
                    format!(
                        "signal event definition on `{}` has no signalRef",
                        element.id
                    ),
                ));
            }
        }
    }
    findings
}

fn missing_body_event(ctx: &CheckContext<'_>, start: bool) -> Vec<Finding> {
    let found = ctx.model.body.elements.iter().any(|element| {
        if start {
            matches!(element.kind, ElementKind::StartEvent)
        } else {
            matches!(element.kind, ElementKind::EndEvent)
        }
    });
    if found {
        return Vec::new();
    }
    let what = if start { "start" } else { "end" };
    vec![Finding::root(
        &ctx.model.id,
        format!("process `{}` has no {what} event", ctx.model.id),
    )]
}

fn dangling_flow_ref(ctx: &CheckContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for entry in ctx.index.flows() {
        let flow = entry.flow;
        let dangling: Vec<String> = [("sourceRef", flow.source()), ("targetRef", flow.target())]
            .into_iter()
            .filter_map(|(field, value)| present(value).map(|id| (field, id)))
            .filter(|(_, id)| !ctx.index.contains(id))
            .map(|(field, id)| format!("{field} `{id}`"))
            .collect();
        if !dangling.is_empty() {
            findings.push(Finding::at(
                &flow.id,
                &entry.scope,
                format!(
                    "flow `{}` references undeclared {}",
                    flow.id,
                    dangling.join(" and ")
                ),
            ));
        }
    }
    findings
}

fn cross_scope_flow(ctx: &CheckContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for entry in ctx.index.flows() {
        let flow = entry.flow;
        let crosses = [flow.source(), flow.target()]
            .into_iter()
            .filter_map(present)
            .filter_map(|id| ctx.index.element(id))
            .any(|endpoint| endpoint.scope != entry.scope);
        if crosses {
            findings.push(Finding::at(
                &flow.id,
                &entry.scope,
                format!(
                    "flow `{}` connects `{}` and `{}` across sub-process boundaries",
                    flow.id,
                    flow.source().unwrap_or("?"),
                    flow.target().unwrap_or("?")
                ),
            ));
        }
    }
    findings
}

/// Boundary events in document order, paired with their id.
fn boundaries<'a>(
    ctx: &CheckContext<'a>,
) -> impl Iterator<Item = (&'a ElementEntry<'a>, &'a str)> + 'a {
    let index: &'a ModelIndex<'a> = ctx.index;
    index
        .elements()
        .iter()
        .filter(|entry| entry.element.kind.as_boundary().is_some())
        .map(|entry| (entry, entry.element.id.as_str()))
}

fn boundary_attachment(ctx: &CheckContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (entry, id) in boundaries(ctx) {
        let Some(boundary) = entry.element.kind.as_boundary() else {
            continue;
        };
        let Some(target) = present(boundary.attached_to_ref.as_deref()) else {
            continue;
        };
        match ctx.index.element(target) {
            None => findings.push(
                Finding::at(
                    id,
                    &entry.scope,
                    format!("boundary event `{id}` is attached to undeclared element `{target}`"),
                )
                .with_category(Category::Reference),
            ),
            Some(activity) if !activity.element.kind.is_activity() => findings.push(
                Finding::at(
                    id,
                    &entry.scope,
                    format!(
                        "boundary event `{id}` is attached to {} `{target}`, not to a task or sub-process",
                        activity.element.kind.type_name()
                    ),
                )
                .with_category(Category::Semantic),
            ),
            Some(activity) if activity.scope != entry.scope => findings.push(
                Finding::at(
                    id,
                    &entry.scope,
                    format!("boundary event `{id}` is attached to `{target}` in another scope"),
                )
                .with_category(Category::Semantic),
            ),
            Some(_) => {}
        }
    }
    findings
}

fn boundary_cancel_flag(ctx: &CheckContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (entry, id) in boundaries(ctx) {
        let Some(boundary) = entry.element.kind.as_boundary() else {
            continue;
        };
        let catches_error = entry
            .element
            .event_definitions
            .iter()
            .any(|definition| definition.kind == EventDefinitionKind::Error);
        let message = match boundary.cancel_activity {
            None => format!("boundary event `{id}` does not declare cancelActivity"),
            Some(false) if catches_error => {
                format!("error boundary event `{id}` must interrupt its activity")
            }
            Some(_) => continue,
        };
        findings.push(Finding::at(id, &entry.scope, message));
    }
    findings
}

fn boundary_definition(ctx: &CheckContext<'_>) -> Vec<Finding> {
    boundaries(ctx)
        .filter(|(entry, _)| entry.element.event_definitions.is_empty())
        .map(|(entry, id)| {
            Finding::at(
                id,
                &entry.scope,
                format!("boundary event `{id}` has no event definition"),
            )
        })
        .collect()
}

fn signal_reference(ctx: &CheckContext<'_>) -> Vec<Finding> {
    let declared = ctx.index.declared_signals();
    let mut findings = Vec::new();
    for entry in ctx.index.elements() {
        let element = entry.element;
        for definition in &element.event_definitions {
            let Some(signal) = present(definition.signal_ref.as_deref()) else {
                continue;
            };
            if !declared.contains(signal) {
                findings.push(Finding::at(
                    &element.id,
                    &entry.scope,
                    format!("`{}` references undeclared signal `{signal}`", element.id),
                ));
            }
        }
    }
    findings
}

fn unused_signal(ctx: &CheckContext<'_>) -> Vec<Finding> {
    let referenced = ctx.index.referenced_signals();
    ctx.model
        .signals
        .iter()
        .filter(|signal| !signal.id.trim().is_empty())
        .filter(|signal| !referenced.contains(signal.id.as_str()))
        .map(|signal| {
            Finding::root(
                &signal.id,
                format!("signal `{}` is declared but never referenced", signal.id),
            )
        })
        .collect()
}

fn gateway_condition(ctx: &CheckContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for entry in ctx.index.flows() {
        let flow = entry.flow;
        if flow.condition.is_none() {
            continue;
        }
        let Some(source) = present(flow.source()).and_then(|id| ctx.index.element(id)) else {
            continue;
        };
        let allowed = source
            .element
            .kind
            .as_gateway()
            .map(|gateway| gateway.kind.allows_conditions())
            .unwrap_or(false);
        if !allowed {
            findings.push(Finding::at(
                &flow.id,
                &entry.scope,
                format!(
                    "flow `{}` leaving {} `{}` carries a condition",
                    flow.id,
                    source.element.kind.type_name(),
                    source.element.id
                ),
            ));
        }
    }
    findings
}

fn default_flow_condition(ctx: &CheckContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for entry in ctx.index.elements() {
        let Some(default_flow) = entry
            .element
            .kind
            .as_gateway()
            .and_then(|gateway| present(gateway.default_flow.as_deref()))
        else {
            continue;
        };
        let gateway_id = entry.element.id.as_str();
        for flow_entry in ctx.index.flows() {
            let flow = flow_entry.flow;
            if flow.id == default_flow && flow.source() == Some(gateway_id) && flow.condition.is_some()
            {
                findings.push(Finding::at(
                    &flow.id,
                    &flow_entry.scope,
                    format!(
                        "default flow `{}` of gateway `{gateway_id}` carries a condition",
                        flow.id
                    ),
                ));
            }
        }
    }
    findings
}

fn default_flow_ref(ctx: &CheckContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for entry in ctx.index.elements() {
        let Some(default_flow) = entry
            .element
            .kind
            .as_gateway()
            .and_then(|gateway| present(gateway.default_flow.as_deref()))
        else {
            continue;
        };
        let id = entry.element.id.as_str();
        let outgoing = ctx
            .index
            .outgoing(id)
            .iter()
            .any(|flow| flow.id == default_flow);
        if !outgoing {
            findings.push(Finding::at(
                id,
                &entry.scope,
                format!("default flow `{default_flow}` is not an outgoing flow of gateway `{id}`"),
            ));
        }
    }
    findings
}

fn gateway_direction(ctx: &CheckContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for entry in ctx.index.elements() {
        let Some(gateway) = entry.element.kind.as_gateway() else {
            continue;
        };
        if gateway.direction == GatewayDirection::Unspecified {
            continue;
        }
        let id = entry.element.id.as_str();
        let incoming = ctx.index.incoming(id).len();
        let outgoing = ctx.index.outgoing(id).len();
        match GatewayDirection::from_flow_counts(incoming, outgoing) {
            Some(implied) if implied != gateway.direction => findings.push(Finding::at(
                id,
                &entry.scope,
                format!(
                    "gateway `{id}` is declared {} but has {incoming} incoming and {outgoing} outgoing flows",
                    gateway.direction.as_str()
                ),
            )),
            _ => {}
        }
    }
    findings
}

fn event_definition_placement(ctx: &CheckContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for entry in ctx.index.elements() {
        let element = entry.element;
        if matches!(element.kind, ElementKind::Unknown { .. })
            || element.kind.accepts_event_definitions()
            || element.event_definitions.is_empty()
        {
            continue;
        }
        let kinds: Vec<String> = element
            .event_definitions
            .iter()
            .map(|definition| definition.kind.type_name())
            .collect();
        findings.push(Finding::at(
            &element.id,
            &entry.scope,
            format!(
                "{} `{}` carries event definitions ({})",
                element.kind.type_name(),
                element.id,
                kinds.join(", ")
            ),
        ));
    }
    findings
}

fn event_definition_kind(ctx: &CheckContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for entry in ctx.index.elements() {
        let element = entry.element;
        if !element.kind.accepts_event_definitions() {
            continue;
        }
        for definition in &element.event_definitions {
            if !element.kind.allows_definition(&definition.kind) {
                findings.push(Finding::at(
                    &element.id,
                    &entry.scope,
                    format!(
                        "{} is not allowed on {} `{}`",
                        definition.kind,
                        element.kind.type_name(),
                        element.id
                    ),
                ));
            }
        }
    }
    findings
}

fn disallowed_attribute(ctx: &CheckContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for entry in ctx.index.elements() {
        let element = entry.element;
        if matches!(element.kind, ElementKind::Unknown { .. }) {
            continue;
        }
        for key in element.extra.keys() {
            if ctx.options.is_disallowed(key) {
                findings.push(Finding::at(
                    &element.id,
                    &entry.scope,
                    format!("`{}` carries disallowed attribute `{key}`", element.id),
                ));
            }
        }
    }
    for entry in ctx.index.flows() {
        let flow = entry.flow;
        for key in flow.extra.keys() {
            if ctx.options.is_disallowed(key) {
                findings.push(Finding::at(
                    &flow.id,
                    &entry.scope,
                    format!("flow `{}` carries disallowed attribute `{key}`", flow.id),
                ));
            }
        }
    }
    findings
}
