use std::collections::HashSet;

use bpmnguard_core::config::DEFAULT_MAX_REPAIR_PASSES;
use bpmnguard_model::{
    BoundaryEvent, ElementKind, FlowElement, GatewayDirection, ModelIndex, ProcessModel, Scope,
    SignalDefinition,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::RuleEngine;
use crate::outcome::{ValidationReport, Verdict};
use crate::rule::RuleId;
use crate::violation::{Category, Violation};

/// One change made by the repair step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairRecord {
    pub rule_id: RuleId,
    pub element_id: String,
    pub action: String,
}

/// Result of [`Repairer::repair`].
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub model: ProcessModel,
    pub records: Vec<RepairRecord>,
    /// Number of passes that changed the model.
    pub passes: usize,
    /// Validation of the repaired model.
    pub report: ValidationReport,
}

impl RepairOutcome {
    /// Violations still present after repair.
    pub fn remaining(&self) -> &[Violation] {
        &self.report.violations
    }

    pub fn changed(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn verdict(&self) -> Verdict {
        self.report.verdict
    }
}

/// Rewrites the offenders of reference and semantic violations.
///
/// Elements carrying a schema violation are left untouched, as is every
/// violation that cannot be pinned to an id.
#[derive(Debug, Clone)]
pub struct Repairer<'e> {
    engine: &'e RuleEngine,
    max_passes: usize,
}

impl<'e> Repairer<'e> {
    pub fn new(engine: &'e RuleEngine) -> Self {
        Self {
            engine,
            max_passes: DEFAULT_MAX_REPAIR_PASSES,
        }
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }

    /// Validates and repairs `model` until no repairable violation remains
    /// or the pass limit is reached.
    pub fn repair(&self, mut model: ProcessModel) -> RepairOutcome {
        let mut records = Vec::new();
        let mut passes = 0;
        let mut report = self.engine.validate(&model);

        while passes < self.max_passes {
            let applied = self.apply(&mut model, &report.violations);
            if applied.is_empty() {
                break;
            }
            passes += 1;
            records.extend(applied);
            report = self.engine.validate(&model);
        }

        if passes == self.max_passes && !self.repairable(&report.violations).is_empty() {
            warn!(
                process_id = %model.id,
                passes,
                "repair stopped at the pass limit with repairable violations left"
            );
        }
        debug!(
            process_id = %model.id,
            passes,
            changes = records.len(),
            remaining = report.violations.len(),
            "repaired process"
        );

        RepairOutcome {
            model,
            records,
            passes,
            report,
        }
    }

    /// Runs a single repair pass for `violations` over `model`.
    pub fn apply(&self, model: &mut ProcessModel, violations: &[Violation]) -> Vec<RepairRecord> {
        let mut taken = declared_ids(model);
        let mut records = Vec::new();

        for violation in self.repairable(violations) {
            let Some(action) = self.fix(model, violation, &mut taken) else {
                continue;
            };
            debug!(
                rule_id = %violation.rule_id,
                element_id = %violation.element_id,
                %action,
                "repaired violation"
            );
            records.push(RepairRecord {
                rule_id: violation.rule_id,
                element_id: violation.element_id.clone(),
                action,
            });
        }
        records
    }

    fn repairable<'v>(&self, violations: &'v [Violation]) -> Vec<&'v Violation> {
        let blocked: HashSet<&str> = violations
            .iter()
            .filter(|violation| violation.category == Category::Schema)
            .map(|violation| violation.element_id.as_str())
            .collect();
        violations
            .iter()
            .filter(|violation| violation.category.is_repairable())
            .filter(|violation| !violation.element_id.trim().is_empty())
            .filter(|violation| !blocked.contains(violation.element_id.as_str()))
            .collect()
    }

    fn fix(
        &self,
        model: &mut ProcessModel,
        violation: &Violation,
        taken: &mut HashSet<String>,
    ) -> Option<String> {
        let id = violation.element_id.as_str();
        let path = violation.scope.as_slice();

        match violation.rule_id {
            RuleId::GatewayCondition | RuleId::DefaultFlowCondition => {
                let flow = model.scope_mut(path)?.flow_mut(id)?;
                flow.condition.take()?;
                Some("removed condition expression".to_string())
            }
            RuleId::EventDefinitionPlacement => {
                relocate_definitions(model.scope_mut(path)?, id, taken)
            }
            RuleId::UnusedSignal => {
                // Earlier fixes of the same pass may have started using it.
                if ModelIndex::new(model).referenced_signals().contains(id) {
                    return None;
                }
                let position = model.signals.iter().position(|signal| signal.id == id)?;
                model.signals.remove(position);
                Some("removed unused signal".to_string())
            }
            RuleId::SignalReference => resolve_signals(model, path, id, taken),
            RuleId::DanglingFlowRef | RuleId::CrossScopeFlow => {
                let scope = model.scope_mut(path)?;
                let position = scope.flows.iter().position(|flow| flow.id == id)?;
                scope.flows.remove(position);
                Some("removed sequence flow".to_string())
            }
            RuleId::DefaultFlowRef => {
                let element = model.scope_mut(path)?.element_mut(id)?;
                let ElementKind::Gateway(gateway) = &mut element.kind else {
                    return None;
                };
                let previous = gateway.default_flow.take()?;
                Some(format!("cleared default flow `{previous}`"))
            }
            RuleId::BoundaryAttachment => reattach_boundary(model.scope_mut(path)?, id),
            RuleId::BoundaryCancelFlag => {
                let element = model.scope_mut(path)?.element_mut(id)?;
                let ElementKind::BoundaryEvent(boundary) = &mut element.kind else {
                    return None;
                };
                if boundary.cancel_activity == Some(true) {
                    return None;
                }
                boundary.cancel_activity = Some(true);
                Some("set cancelActivity to true".to_string())
            }
            RuleId::BoundaryDefinition => {
                let removed = remove_element(model.scope_mut(path)?, id)?;
                Some(format!(
                    "removed boundary event without definition and {removed} connected flow(s)"
                ))
            }
            RuleId::GatewayDirection => {
                let (incoming, outgoing) = {
                    let index = ModelIndex::new(model);
                    (index.incoming(id).len(), index.outgoing(id).len())
                };
                let implied = GatewayDirection::from_flow_counts(incoming, outgoing)?;
                let element = model.scope_mut(path)?.element_mut(id)?;
                let ElementKind::Gateway(gateway) = &mut element.kind else {
                    return None;
                };
                if gateway.direction == implied {
                    return None;
                }
                gateway.direction = implied;
                Some(format!("set gatewayDirection to {}", implied.as_str()))
            }
            RuleId::EventDefinitionKind => {
                let element = model.scope_mut(path)?.element_mut(id)?;
                let FlowElement {
                    kind,
                    event_definitions,
                    ..
                } = element;
                let before = event_definitions.len();
                event_definitions.retain(|definition| kind.allows_definition(&definition.kind));
                let dropped = before - event_definitions.len();
                (dropped > 0).then(|| {
                    format!(
                        "dropped {dropped} event definition(s) not allowed on {}",
                        kind.type_name()
                    )
                })
            }
            RuleId::DisallowedAttribute => {
                let options = self.engine.options();
                let scope = model.scope_mut(path)?;
                let extra = match scope.elements.iter().position(|element| element.id == id) {
                    Some(position) => &mut scope.elements[position].extra,
                    None => &mut scope.flow_mut(id)?.extra,
                };
                let removed: Vec<String> = extra
                    .keys()
                    .filter(|key| options.is_disallowed(key))
                    .cloned()
                    .collect();
                if removed.is_empty() {
                    return None;
                }
                extra.retain(|key, _| !options.is_disallowed(key));
                Some(format!("removed attribute(s) {}", removed.join(", ")))
            }
            RuleId::MissingId
            | RuleId::DuplicateId
            | RuleId::UnknownElement
            | RuleId::MissingFlowRef
            | RuleId::MissingAttachment
            | RuleId::MissingSignalRef
            | RuleId::MissingStartEvent
            | RuleId::MissingEndEvent => None,
        }
    }
}

/// Every id declared anywhere in the model.
fn declared_ids(model: &ProcessModel) -> HashSet<String> {
    let index = ModelIndex::new(model);
    index
        .elements()
        .iter()
        .map(|entry| entry.element.id.clone())
        .chain(index.flows().iter().map(|entry| entry.flow.id.clone()))
        .chain(model.signals.iter().map(|signal| signal.id.clone()))
        .collect()
}

/// `base`, or `base_2`, `base_3`, ... when taken. The result is reserved.
fn unique_id(base: String, taken: &mut HashSet<String>) -> String {
    let mut candidate = base.clone();
    let mut suffix = 2;
    while taken.contains(&candidate) {
        candidate = format!("{base}_{suffix}");
        suffix += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

/// Moves the event definitions of a task or sub-process into a new boundary
/// event attached to it. Definitions no boundary event accepts, and those of
/// any other element type, are dropped.
fn relocate_definitions(scope: &mut Scope, id: &str, taken: &mut HashSet<String>) -> Option<String> {
    let position = scope.elements.iter().position(|element| element.id == id)?;
    let element = &mut scope.elements[position];
    if element.event_definitions.is_empty() {
        return None;
    }
    let definitions = std::mem::take(&mut element.event_definitions);
    let count = definitions.len();
    if !element.kind.is_activity() {
        return Some(format!(
            "dropped {count} event definition(s) from {}",
            element.kind.type_name()
        ));
    }

    let probe = ElementKind::BoundaryEvent(BoundaryEvent {
        attached_to_ref: None,
        cancel_activity: Some(true),
    });
    let (kept, dropped): (Vec<_>, Vec<_>) = definitions
        .into_iter()
        .partition(|definition| probe.allows_definition(&definition.kind));
    if kept.is_empty() {
        return Some(format!(
            "dropped {} event definition(s) no boundary event accepts",
            dropped.len()
        ));
    }

    let boundary_id = unique_id(format!("{id}_boundary"), taken);
    let mut boundary = FlowElement::boundary(boundary_id.clone(), id);
    let moved = kept.len();
    boundary.event_definitions = kept;
    scope.elements.insert(position + 1, boundary);

    let mut action = format!("moved {moved} event definition(s) to boundary event `{boundary_id}`");
    if !dropped.is_empty() {
        action.push_str(&format!(", dropped {}", dropped.len()));
    }
    Some(action)
}

/// Points dangling `signalRef`s of element `id` at a declared signal with a
/// matching name, or declares the missing signal.
fn resolve_signals(
    model: &mut ProcessModel,
    path: &[String],
    id: &str,
    taken: &mut HashSet<String>,
) -> Option<String> {
    let references: Vec<String> = model
        .scope_mut(path)?
        .element(id)?
        .event_definitions
        .iter()
        .filter_map(|definition| definition.signal_ref.clone())
        .filter(|reference| !reference.trim().is_empty())
        .collect();

    let mut actions = Vec::new();
    let mut renames: Vec<(String, String)> = Vec::new();
    for reference in references {
        if model.signal(&reference).is_some()
            || renames.iter().any(|(from, _)| from == &reference)
        {
            continue;
        }
        let by_name = model.signals.iter().find(|signal| {
            signal
                .name
                .as_deref()
                .map(|name| name.eq_ignore_ascii_case(&reference))
                .unwrap_or(false)
        });
        match by_name {
            Some(signal) => {
                actions.push(format!("reattached `{reference}` to signal `{}`", signal.id));
                renames.push((reference, signal.id.clone()));
            }
            None if taken.contains(&reference) => {
                let signal_id = unique_id(format!("{reference}_signal"), taken);
                model
                    .signals
                    .push(SignalDefinition::new(signal_id.clone()).with_name(reference.clone()));
                actions.push(format!("declared signal `{signal_id}` for `{reference}`"));
                renames.push((reference, signal_id));
            }
            None => {
                taken.insert(reference.clone());
                model
                    .signals
                    .push(SignalDefinition::new(reference.clone()).with_name(reference.clone()));
                actions.push(format!("declared signal `{reference}`"));
            }
        }
    }

    if !renames.is_empty() {
        let element = model.scope_mut(path)?.element_mut(id)?;
        for definition in &mut element.event_definitions {
            let target = renames
                .iter()
                .find(|(from, _)| definition.signal_ref.as_deref() == Some(from.as_str()));
            if let Some((_, to)) = target {
                definition.signal_ref = Some(to.clone());
            }
        }
    }

    (!actions.is_empty()).then(|| actions.join("; "))
}

/// Attaches boundary `id` to the activity that has a sequence flow into it,
/// removing that flow. Without such an activity the boundary is removed.
fn reattach_boundary(scope: &mut Scope, id: &str) -> Option<String> {
    let candidate = scope.flows.iter().position(|flow| {
        flow.target() == Some(id)
            && flow
                .source()
                .and_then(|source| scope.element(source))
                .map(|source| source.kind.is_activity())
                .unwrap_or(false)
    });

    let Some(position) = candidate else {
        let removed = remove_element(scope, id)?;
        return Some(format!(
            "removed unattachable boundary event and {removed} connected flow(s)"
        ));
    };

    let flow = scope.flows.remove(position);
    let activity = flow.source_ref?;
    let element = scope.element_mut(id)?;
    let ElementKind::BoundaryEvent(boundary) = &mut element.kind else {
        return None;
    };
    boundary.attached_to_ref = Some(activity.clone());
    Some(format!(
        "attached to `{activity}` and removed flow `{}`",
        flow.id
    ))
}

/// Removes element `id` and every flow of the scope touching it. Returns the
/// number of removed flows.
fn remove_element(scope: &mut Scope, id: &str) -> Option<usize> {
    let position = scope.elements.iter().position(|element| element.id == id)?;
    scope.elements.remove(position);
    let before = scope.flows.len();
    scope.flows.retain(|flow| !flow.touches(id));
    Some(before - scope.flows.len())
}
