//! bpmnguard: rule-based validation and repair of LLM-generated BPMN models.
//!
//! The workspace is split into several crates, re-exported here:
//!
//! * [`common`]: configuration, logging setup and shared errors
//! * [`model`]: the in-memory process model and its JSON/XML loaders
//! * [`rules`]: the rule catalogue, rule engine and repair step
//! * [`report`]: token-usage and schema reports over experiment outputs
//!
//! The functions below cover the common path of loading a document from
//! disk and running the engine or the repairer on every process it holds.

use std::path::Path;

use tracing::debug;

pub mod errors;

pub use bpmnguard_core as common;
pub use bpmnguard_model as model;
pub use bpmnguard_report as report;
pub use bpmnguard_rules as rules;

pub use bpmnguard_core::CoreConfig;
pub use bpmnguard_model::ProcessModel;
pub use bpmnguard_rules::{RepairOutcome, Repairer, RuleEngine, ValidationReport, Verdict};
pub use errors::{GuardError, Result};

/// Builds the rule engine described by the `BPMNGUARD_*` environment.
pub fn engine_from_env() -> Result<RuleEngine> {
    let config = CoreConfig::from_env()?;
    Ok(RuleEngine::from_config(&config)?)
}

/// Validates every process of the document at `path`.
pub fn validate_file(engine: &RuleEngine, path: impl AsRef<Path>) -> Result<Vec<ValidationReport>> {
    let models = bpmnguard_model::load_all(path.as_ref())?;
    Ok(models.iter().map(|model| engine.validate(model)).collect())
}

/// Repairs every process of the document at `path`.
pub fn repair_file(
    engine: &RuleEngine,
    path: impl AsRef<Path>,
    max_passes: usize,
) -> Result<Vec<RepairOutcome>> {
    let path = path.as_ref();
    let repairer = Repairer::new(engine).with_max_passes(max_passes);
    let outcomes: Vec<RepairOutcome> = bpmnguard_model::load_all(path)?
        .into_iter()
        .map(|model| repairer.repair(model))
        .collect();
    debug!(path = %path.display(), processes = outcomes.len(), "repaired document");
    Ok(outcomes)
}

/// Strongest verdict over a set of reports.
pub fn overall_verdict<'a>(reports: impl IntoIterator<Item = &'a ValidationReport>) -> Verdict {
    reports
        .into_iter()
        .fold(Verdict::Valid, |verdict, report| verdict.merge(report.verdict))
}
