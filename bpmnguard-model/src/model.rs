use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::element::{ElementKind, FlowElement};
use crate::flow::SequenceFlow;

/// Attributes kept verbatim for round-tripping, keyed by their JSON name.
pub type Attributes = BTreeMap<String, Value>;

/// Ids of the sub-processes enclosing a scope, outermost first. The process
/// body has an empty path.
pub type ScopePath = Vec<String>;

/// Signal declared at the document root.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDefinition {
    pub id: String,
    pub name: Option<String>,
    pub extra: Attributes,
}

impl SignalDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            extra: Attributes::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Flow elements and sequence flows sharing one level of nesting: the
/// process body or the inside of a sub-process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub elements: Vec<FlowElement>,
    pub flows: Vec<SequenceFlow>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(mut self, element: FlowElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn with_flow(mut self, flow: SequenceFlow) -> Self {
        self.flows.push(flow);
        self
    }

    pub fn element(&self, id: &str) -> Option<&FlowElement> {
        self.elements.iter().find(|element| element.id == id)
    }

    pub fn element_mut(&mut self, id: &str) -> Option<&mut FlowElement> {
        self.elements.iter_mut().find(|element| element.id == id)
    }

    pub fn flow_mut(&mut self, id: &str) -> Option<&mut SequenceFlow> {
        self.flows.iter_mut().find(|flow| flow.id == id)
    }

    /// Visits this scope and every nested sub-process scope, depth first.
    pub fn walk<'a, F>(&'a self, path: &mut ScopePath, visit: &mut F)
    where
        F: FnMut(&[String], &'a Scope),
    {
        visit(path.as_slice(), self);
        for element in &self.elements {
            if let ElementKind::SubProcess(inner) = &element.kind {
                path.push(element.id.clone());
                inner.walk(path, visit);
                path.pop();
            }
        }
    }

    /// Mutable counterpart of [`Scope::walk`]. The callback runs before the
    /// scope's children are visited, so it may add or remove sub-processes.
    pub fn walk_mut<F>(&mut self, path: &mut ScopePath, visit: &mut F)
    where
        F: FnMut(&[String], &mut Scope),
    {
        visit(path.as_slice(), self);
        for element in &mut self.elements {
            let id = element.id.clone();
            if let ElementKind::SubProcess(inner) = &mut element.kind {
                path.push(id);
                inner.walk_mut(path, visit);
                path.pop();
            }
        }
    }

    /// Resolves the scope at `path`, following sub-process ids.
    pub fn scope_mut(&mut self, path: &[String]) -> Option<&mut Scope> {
        let Some((head, rest)) = path.split_first() else {
            return Some(self);
        };
        match &mut self.element_mut(head)?.kind {
            ElementKind::SubProcess(inner) => inner.scope_mut(rest),
            _ => None,
        }
    }

    /// Number of flow elements including nested ones.
    pub fn element_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut ScopePath::new(), &mut |_, scope| {
            count += scope.elements.len();
        });
        count
    }
}

/// Root container of a loaded document: one process plus the signals
/// declared next to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessModel {
    /// Id of the enclosing definitions element, when there was one.
    pub definitions_id: Option<String>,
    /// Process id.
    pub id: String,
    pub name: Option<String>,
    pub signals: Vec<SignalDefinition>,
    pub body: Scope,
    /// Other root elements (messages, errors, collaborations, ...), kept verbatim.
    pub other_root_elements: Vec<Value>,
    pub definitions_extra: Attributes,
    pub process_extra: Attributes,
    /// Signal ids referenced by the other processes of the same document.
    /// Not written back; the sibling processes carry the references.
    pub sibling_signal_refs: BTreeSet<String>,
}

impl ProcessModel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_signal(mut self, signal: SignalDefinition) -> Self {
        self.signals.push(signal);
        self
    }

    pub fn with_element(mut self, element: FlowElement) -> Self {
        self.body.elements.push(element);
        self
    }

    pub fn with_flow(mut self, flow: SequenceFlow) -> Self {
        self.body.flows.push(flow);
        self
    }

    pub fn signal(&self, id: &str) -> Option<&SignalDefinition> {
        self.signals.iter().find(|signal| signal.id == id)
    }

    /// Visits every scope of the model, starting with the process body.
    pub fn walk<'a, F>(&'a self, visit: &mut F)
    where
        F: FnMut(&[String], &'a Scope),
    {
        self.body.walk(&mut ScopePath::new(), visit);
    }

    pub fn walk_mut<F>(&mut self, visit: &mut F)
    where
        F: FnMut(&[String], &mut Scope),
    {
        self.body.walk_mut(&mut ScopePath::new(), visit);
    }

    pub fn scope_mut(&mut self, path: &[String]) -> Option<&mut Scope> {
        self.body.scope_mut(path)
    }

    /// Finds an element anywhere in the model.
    pub fn find_element(&self, id: &str) -> Option<&FlowElement> {
        let mut found = None;
        self.walk(&mut |_, scope| {
            if found.is_none() {
                found = scope.element(id);
            }
        });
        found
    }

    pub fn element_count(&self) -> usize {
        self.body.element_count()
    }

    /// Signal ids referenced by event definitions of this process.
    pub fn signal_refs(&self) -> BTreeSet<String> {
        let mut refs = BTreeSet::new();
        self.walk(&mut |_, scope| {
            for element in &scope.elements {
                refs.extend(
                    element
                        .event_definitions
                        .iter()
                        .filter_map(|definition| definition.signal_ref.clone()),
                );
            }
        });
        refs
    }

    /// Deterministic SHA-256 of the model's canonical BPMN-JSON form.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};

        let json = crate::json::to_json_value(self).to_string();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Records, on every process of one document, the signals its sibling
/// processes reference.
pub(crate) fn link_sibling_signals(models: &mut [ProcessModel]) {
    if models.len() < 2 {
        return;
    }
    let refs: Vec<BTreeSet<String>> = models.iter().map(ProcessModel::signal_refs).collect();
    for (position, model) in models.iter_mut().enumerate() {
        model.sibling_signal_refs = refs
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != position)
            .flat_map(|(_, refs)| refs.iter().cloned())
            .collect();
    }
}
