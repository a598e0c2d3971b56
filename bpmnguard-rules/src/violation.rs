use std::fmt::{Display, Formatter, Result as FmtResult};

use bpmnguard_model::ScopePath;
use serde::{Deserialize, Serialize};

use crate::rule::RuleId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Violation taxonomy.
///
/// Schema violations are structural (missing or malformed fields) and are
/// never repaired; reference and semantic violations are auto-repairable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Schema,
    Reference,
    Semantic,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Schema => "schema",
            Category::Reference => "reference",
            Category::Semantic => "semantic",
        }
    }

    pub fn is_repairable(self) -> bool {
        !matches!(self, Category::Schema)
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// One rule failure on one element, flow or signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: RuleId,
    /// Id of the offending element, flow or signal. Empty when the offender
    /// has no id; the process id for process-level findings.
    pub element_id: String,
    /// Sub-process path of the scope holding the offender.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: ScopePath,
    pub severity: Severity,
    pub category: Category,
    pub message: String,
}

impl Display for Violation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{} [{}/{}] {}",
            self.severity, self.category, self.rule_id, self.message
        )
    }
}
