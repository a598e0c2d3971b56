use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::element::FlowElement;
use crate::flow::SequenceFlow;
use crate::model::{ProcessModel, Scope, ScopePath};

/// A flow element together with the path of the scope that declares it.
#[derive(Debug, Clone)]
pub struct ElementEntry<'a> {
    pub element: &'a FlowElement,
    pub scope: ScopePath,
}

#[derive(Debug, Clone)]
pub struct FlowEntry<'a> {
    pub flow: &'a SequenceFlow,
    pub scope: ScopePath,
}

/// Read-only lookup tables over a [`ProcessModel`].
///
/// Elements and flows are listed in document order. When an id is declared
/// more than once, lookups resolve to the first declaration and the id is
/// reported by [`ModelIndex::duplicate_ids`].
#[derive(Debug, Default)]
pub struct ModelIndex<'a> {
    elements: Vec<ElementEntry<'a>>,
    flows: Vec<FlowEntry<'a>>,
    by_id: HashMap<&'a str, usize>,
    incoming: HashMap<&'a str, Vec<&'a SequenceFlow>>,
    outgoing: HashMap<&'a str, Vec<&'a SequenceFlow>>,
    duplicates: Vec<String>,
    declared_signals: BTreeSet<&'a str>,
    referenced_signals: BTreeSet<&'a str>,
}

impl<'a> ModelIndex<'a> {
    pub fn new(model: &'a ProcessModel) -> Self {
        let mut index = ModelIndex::default();
        let mut seen: BTreeMap<&'a str, usize> = BTreeMap::new();
        let mut scopes: Vec<(ScopePath, &'a Scope)> = Vec::new();
        model.walk(&mut |path, scope| scopes.push((path.to_vec(), scope)));
        index
            .referenced_signals
            .extend(model.sibling_signal_refs.iter().map(String::as_str));

        for (path, scope) in scopes {
            for element in &scope.elements {
                index.elements.push(ElementEntry {
                    element,
                    scope: path.clone(),
                });
                for definition in &element.event_definitions {
                    if let Some(signal_ref) = definition.signal_ref.as_deref() {
                        index.referenced_signals.insert(signal_ref);
                    }
                }
            }
            for flow in &scope.flows {
                index.flows.push(FlowEntry {
                    flow,
                    scope: path.clone(),
                });
            }
        }

        for (position, entry) in index.elements.iter().enumerate() {
            let id = entry.element.id.as_str();
            if id.is_empty() {
                continue;
            }
            *seen.entry(id).or_default() += 1;
            index.by_id.entry(id).or_insert(position);
        }
        for entry in &index.flows {
            let flow = entry.flow;
            if !flow.id.is_empty() {
                *seen.entry(flow.id.as_str()).or_default() += 1;
            }
            if let Some(source) = flow.source() {
                index.outgoing.entry(source).or_default().push(flow);
            }
            if let Some(target) = flow.target() {
                index.incoming.entry(target).or_default().push(flow);
            }
        }
        for signal in &model.signals {
            if !signal.id.is_empty() {
                *seen.entry(signal.id.as_str()).or_default() += 1;
                index.declared_signals.insert(signal.id.as_str());
            }
        }

        // Report duplicates in the order they were first declared.
        let mut reported = BTreeSet::new();
        let ids = index
            .elements
            .iter()
            .map(|entry| entry.element.id.as_str())
            .chain(index.flows.iter().map(|entry| entry.flow.id.as_str()))
            .chain(model.signals.iter().map(|signal| signal.id.as_str()));
        for id in ids {
            if seen.get(id).copied().unwrap_or(0) > 1 && reported.insert(id) {
                index.duplicates.push(id.to_string());
            }
        }

        index
    }

    pub fn element(&self, id: &str) -> Option<&ElementEntry<'a>> {
        self.by_id.get(id).map(|position| &self.elements[*position])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Elements in document order, outer scopes before nested ones.
    pub fn elements(&self) -> &[ElementEntry<'a>] {
        &self.elements
    }

    pub fn flows(&self) -> &[FlowEntry<'a>] {
        &self.flows
    }

    pub fn incoming(&self, id: &str) -> &[&'a SequenceFlow] {
        self.incoming.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn outgoing(&self, id: &str) -> &[&'a SequenceFlow] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Ids declared more than once across elements, flows and signals.
    pub fn duplicate_ids(&self) -> &[String] {
        &self.duplicates
    }

    pub fn declared_signals(&self) -> &BTreeSet<&'a str> {
        &self.declared_signals
    }

    /// Signal ids referenced by any event definition of the model or of a
    /// sibling process in the same document.
    pub fn referenced_signals(&self) -> &BTreeSet<&'a str> {
        &self.referenced_signals
    }
}
