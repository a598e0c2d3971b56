use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::RuleError;
use crate::rule::{RuleId, RuleSetting, RuleSettings};

/// Loads rule settings from a file or from every `.json`/`.yaml`/`.yml`
/// file of a directory (in file name order).
pub fn load_settings(path: impl AsRef<Path>) -> Result<RuleSettings, RuleError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RuleError::SettingsNotFound(path.to_path_buf()));
    }

    let settings = if path.is_dir() {
        load_from_directory(path)?
    } else {
        load_from_file(path)?
    };

    validate_entries(&settings.rules)?;
    debug!(
        path = %path.display(),
        entries = settings.rules.len(),
        "loaded rule settings"
    );
    Ok(settings)
}

fn load_from_directory(path: &Path) -> Result<RuleSettings, RuleError> {
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(path).map_err(|err| RuleError::unreadable(path, err))? {
        let entry = entry.map_err(|err| RuleError::unreadable(path, err))?;
        let file_type = entry
            .file_type()
            .map_err(|err| RuleError::unreadable(&entry.path(), err))?;
        if file_type.is_dir() {
            continue;
        }

        let entry_path = entry.path();
        if let Some(ext) = entry_path.extension().and_then(|value| value.to_str()) {
            if matches!(ext, "json" | "yaml" | "yml") {
                files.push(entry_path);
            }
        }
    }
    files.sort();

    let mut settings = RuleSettings::default();
    for file in files {
        settings.merge(load_from_file(&file)?);
    }
    Ok(settings)
}

fn load_from_file(path: &Path) -> Result<RuleSettings, RuleError> {
    let raw = fs::read_to_string(path).map_err(|err| RuleError::unreadable(path, err))?;
    parse_settings(&raw, path)
}

/// Accepts a full settings document, a bare list of rule entries or a
/// single rule entry. YAML is a superset of JSON, so both parse here.
pub fn parse_settings(raw: &str, path: &Path) -> Result<RuleSettings, RuleError> {
    if raw.trim().is_empty() {
        return Ok(RuleSettings::default());
    }

    let document_error = match serde_yaml::from_str::<RuleSettings>(raw) {
        Ok(document) => return Ok(document),
        Err(err) => err,
    };

    if let Ok(rules) = serde_yaml::from_str::<Vec<RuleSetting>>(raw) {
        return Ok(RuleSettings {
            rules,
            ..RuleSettings::default()
        });
    }

    if let Ok(rule) = serde_yaml::from_str::<RuleSetting>(raw) {
        return Ok(RuleSettings {
            rules: vec![rule],
            ..RuleSettings::default()
        });
    }

    Err(RuleError::malformed(path, document_error))
}

fn validate_entries(rules: &[RuleSetting]) -> Result<(), RuleError> {
    let mut seen = HashSet::new();
    for rule in rules {
        rule.id.parse::<RuleId>()?;
        if !seen.insert(rule.id.as_str()) {
            return Err(RuleError::DuplicateRule {
                id: rule.id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violation::Severity;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn parses_document_list_and_single_entry() {
        let path = Path::new("inline.yaml");
        let document = parse_settings(
            "rules:\n  - id: gateway-direction\n    severity: error\ndisallowed_attributes: [color]\n",
            path,
        )
        .expect("document");
        assert_eq!(document.rules[0].severity, Some(Severity::Error));
        assert_eq!(document.disallowed_attributes, Some(vec!["color".to_string()]));

        let list = parse_settings("- id: unused-signal\n  enabled: false\n", path).expect("list");
        assert!(!list.rules[0].enabled);

        let single = parse_settings(r#"{"id": "missing-id", "priority": 1}"#, path).expect("single");
        assert_eq!(single.rules[0].priority, Some(1));

        assert!(matches!(
            parse_settings("rules: 12", path),
            Err(RuleError::Malformed { .. })
        ));
    }

    #[test]
    fn loads_directory_and_rejects_duplicates() {
        let dir = tempdir().expect("temp dir");
        fs::write(dir.path().join("a.yaml"), "- id: gateway-condition\n").expect("write");
        fs::write(dir.path().join("b.json"), r#"[{"id": "unused-signal"}]"#).expect("write");
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let settings = load_settings(dir.path()).expect("settings");
        let ids: Vec<&str> = settings.rules.iter().map(|rule| rule.id.as_str()).collect();
        assert_eq!(ids, vec!["gateway-condition", "unused-signal"]);

        fs::write(dir.path().join("c.yml"), "id: gateway-condition\n").expect("write");
        assert!(matches!(
            load_settings(dir.path()),
            Err(RuleError::DuplicateRule { .. })
        ));
    }

    #[test]
    fn rejects_unknown_rules_and_missing_paths() {
        let dir = tempdir().expect("temp dir");
        let file = dir.path().join("rules.yaml");
        fs::write(&file, "- id: made-up\n").expect("write");

        assert!(matches!(
            load_settings(&file),
            Err(RuleError::UnknownRule { .. })
        ));
        assert!(matches!(
            load_settings(dir.path().join("absent.yaml")),
            Err(RuleError::SettingsNotFound(_))
        ));
    }
}
