//! In-memory BPMN process model used by the bpmnguard rule engine.
//!
//! Documents are loaded from the loose BPMN-JSON shape emitted by LLM
//! generators (`$type`, `rootElements`, `flowElements`, ...) or from BPMN 2.0
//! XML. Loading is tolerant: structural defects inside a readable document
//! are kept in the model so that schema rules can report them, and only
//! unreadable input fails with a [`ModelError`].

mod element;
mod error;
mod flow;
mod index;
mod json;
mod loader;
mod model;
mod xml;

pub use element::{
    BoundaryEvent, ElementKind, EventDefinition, EventDefinitionKind, FlowElement, Gateway,
    GatewayDirection, GatewayKind, TaskKind,
};
pub use error::ModelError;
pub use flow::{Condition, SequenceFlow};
pub use index::{ElementEntry, FlowEntry, ModelIndex};
pub use json::{
    all_from_json_value, document_to_json_string, document_to_json_value, from_json_str,
    from_json_value, to_json_string, to_json_value,
};
pub use loader::{load, load_all, parse_all, DocumentFormat};
pub use model::{Attributes, ProcessModel, Scope, ScopePath, SignalDefinition};
pub use xml::{all_from_xml_str, from_xml_str};

pub mod prelude {
    pub use crate::{
        ElementKind, FlowElement, GatewayKind, ModelIndex, ProcessModel, Scope, SequenceFlow,
    };
}
