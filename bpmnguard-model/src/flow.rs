use crate::model::Attributes;

/// Guard expression on a sequence flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub body: String,
    pub language: Option<String>,
}

impl Condition {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            language: None,
        }
    }
}

/// Directed edge between two flow elements.
///
/// The endpoints are optional because generated documents regularly omit
/// them; schema rules report such flows instead of the loader rejecting the
/// whole document.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceFlow {
    pub id: String,
    pub name: Option<String>,
    pub source_ref: Option<String>,
    pub target_ref: Option<String>,
    pub condition: Option<Condition>,
    pub extra: Attributes,
}

impl SequenceFlow {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            source_ref: Some(source.into()),
            target_ref: Some(target.into()),
            condition: None,
            extra: Attributes::new(),
        }
    }

    pub fn with_condition(mut self, body: impl Into<String>) -> Self {
        self.condition = Some(Condition::new(body));
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.source_ref.as_deref()
    }

    pub fn target(&self) -> Option<&str> {
        self.target_ref.as_deref()
    }

    /// Whether the flow touches `element_id` at either end.
    pub fn touches(&self, element_id: &str) -> bool {
        self.source() == Some(element_id) || self.target() == Some(element_id)
    }
}
