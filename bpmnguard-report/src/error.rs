use std::path::{Path, PathBuf};

use bpmnguard_core::CoreError;
use thiserror::Error;

/// Result alias used by the report builders.
pub type Result<T> = std::result::Result<T, ReportError>;

/// Failures while scanning experiment outputs or writing reports.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to access {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("required input not found: {0}")]
    MissingInput(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ReportError {
    pub fn from_io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        ReportError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn from_json(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        ReportError::Json {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn missing(path: impl Into<PathBuf>) -> Self {
        ReportError::MissingInput(path.into().display().to_string())
    }
}
