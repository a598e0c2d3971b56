use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

use crate::rule::RuleId;
use crate::violation::{Category, Severity, Violation};

/// Overall judgement of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    #[default]
    Valid,
    /// Only reference or semantic violations: the repair step can fix it.
    Repairable,
    /// At least one schema violation.
    Invalid,
}

impl Verdict {
    /// The stronger of both verdicts.
    pub fn merge(self, other: Verdict) -> Verdict {
        self.max(other)
    }

    /// Verdict contribution of a single violation. Info findings never
    /// change the verdict.
    pub fn of(violation: &Violation) -> Verdict {
        match (violation.severity, violation.category) {
            (Severity::Info, _) => Verdict::Valid,
            (_, Category::Schema) => Verdict::Invalid,
            _ => Verdict::Repairable,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Valid => "valid",
            Verdict::Repairable => "repairable",
            Verdict::Invalid => "invalid",
        }
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Aggregated view of how the rules judged one process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub process_id: String,
    pub verdict: Verdict,
    pub applied_rules: Vec<RuleId>,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn new(process_id: impl Into<String>) -> Self {
        Self {
            process_id: process_id.into(),
            ..Self::default()
        }
    }

    pub fn record_rule(&mut self, id: RuleId) {
        self.applied_rules.push(id);
    }

    pub fn push(&mut self, violation: Violation) {
        self.verdict = self.verdict.merge(Verdict::of(&violation));
        self.violations.push(violation);
    }

    pub fn is_valid(&self) -> bool {
        self.verdict == Verdict::Valid
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.violations
            .iter()
            .filter(|violation| violation.severity == severity)
            .count()
    }

    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(move |violation| violation.category == category)
    }

    pub fn has_schema_violations(&self) -> bool {
        self.in_category(Category::Schema).next().is_some()
    }
}
