use std::error::Error;
use std::fmt;

use bpmnguard_core::ConfigError;
use bpmnguard_model::ModelError;
use bpmnguard_report::ReportError;
use bpmnguard_rules::RuleError;

/// Any failure surfaced by the facade entry points.
#[derive(Debug)]
pub enum GuardError {
    Config(ConfigError),
    Model(ModelError),
    Rules(RuleError),
    Report(ReportError),
}

impl From<ConfigError> for GuardError {
    fn from(err: ConfigError) -> Self {
        GuardError::Config(err)
    }
}

impl From<ModelError> for GuardError {
    fn from(err: ModelError) -> Self {
        GuardError::Model(err)
    }
}

impl From<RuleError> for GuardError {
    fn from(err: RuleError) -> Self {
        GuardError::Rules(err)
    }
}

impl From<ReportError> for GuardError {
    fn from(err: ReportError) -> Self {
        GuardError::Report(err)
    }
}

impl fmt::Display for GuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardError::Config(err) => write!(f, "configuration error: {}", err),
            GuardError::Model(err) => write!(f, "model error: {}", err),
            GuardError::Rules(err) => write!(f, "rule error: {}", err),
            GuardError::Report(err) => write!(f, "report error: {}", err),
        }
    }
}

impl Error for GuardError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GuardError::Config(err) => Some(err),
            GuardError::Model(err) => Some(err),
            GuardError::Rules(err) => Some(err),
            GuardError::Report(err) => Some(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, GuardError>;
