use std::path::PathBuf;

use thiserror::Error;

/// Errors raised when a document cannot be turned into a process model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid BPMN XML: {0}")]
    Xml(String),
    #[error("document root must be an object, found {0}")]
    InvalidRoot(&'static str),
    #[error("document does not contain a process")]
    NoProcess,
}

impl ModelError {
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ModelError::Io {
            path: path.into().display().to_string(),
            source,
        }
    }
}

impl From<quick_xml::DeError> for ModelError {
    fn from(err: quick_xml::DeError) -> Self {
        ModelError::Xml(err.to_string())
    }
}
