use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while loading rule settings. A settings problem never
/// reaches validation: the engine is only built from settings that parsed
/// and name built-in rules exactly once.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule settings not found at {}", .0.display())]
    SettingsNotFound(PathBuf),
    #[error("cannot read rule settings {}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is not a settings document, rule list or single rule", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("rule `{id}` is configured more than once")]
    DuplicateRule { id: String },
    #[error("no built-in rule is named `{id}`; run `bpmnguard rules` for the catalogue")]
    UnknownRule { id: String },
}

impl RuleError {
    pub fn unreadable(path: &Path, source: std::io::Error) -> Self {
        RuleError::Unreadable {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn malformed(path: &Path, source: serde_yaml::Error) -> Self {
        RuleError::Malformed {
            path: path.to_path_buf(),
            source,
        }
    }
}
