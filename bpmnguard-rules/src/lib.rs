//! Rule engine and repair step for BPMN process models.
//!
//! The engine checks a [`bpmnguard_model::ProcessModel`] against a fixed
//! catalogue of schema, reference and semantic rules. Rules can be disabled,
//! re-prioritised or re-graded through YAML/JSON settings documents. The
//! [`Repairer`] rewrites the offenders of every reference and semantic
//! violation and leaves schema violations in place.

mod checks;
mod engine;
mod error;
mod loader;
mod outcome;
mod repair;
mod rule;
mod violation;

pub use engine::RuleEngine;
pub use error::RuleError;
pub use loader::{load_settings, parse_settings};
pub use outcome::{ValidationReport, Verdict};
pub use repair::{RepairOutcome, RepairRecord, Repairer};
pub use rule::{
    CheckOptions, Rule, RuleId, RuleSetting, RuleSettings, DEFAULT_DISALLOWED_ATTRIBUTES,
};
pub use violation::{Category, Severity, Violation};
