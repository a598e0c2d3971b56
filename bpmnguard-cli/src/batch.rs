use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bpmnguard_model::{load_all, DocumentFormat};
use bpmnguard_rules::{RuleEngine, ValidationReport, Verdict};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Validation result of one input document.
#[derive(Debug, Serialize)]
pub struct DocumentResult {
    pub path: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reports: Vec<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentResult {
    /// Unreadable documents count as invalid.
    pub fn verdict(&self) -> Verdict {
        if self.error.is_some() {
            return Verdict::Invalid;
        }
        self.reports
            .iter()
            .fold(Verdict::Valid, |verdict, report| verdict.merge(report.verdict))
    }
}

/// Expands directories into the supported documents they contain. Files
/// named explicitly are kept whatever their extension.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(false) {
                let entry = entry.with_context(|| format!("failed to scan {}", path.display()))?;
                if entry.file_type().is_file() && DocumentFormat::is_supported(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        } else if path.exists() {
            files.push(path.clone());
        } else {
            warn!(path = %path.display(), "skipping missing input");
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn validate_document(engine: &RuleEngine, path: &Path) -> DocumentResult {
    let display_path = path.display().to_string();
    match load_all(path) {
        Ok(models) => {
            let reports: Vec<ValidationReport> =
                models.iter().map(|model| engine.validate(model)).collect();
            for report in &reports {
                info!(
                    path = %display_path,
                    process_id = %report.process_id,
                    verdict = %report.verdict,
                    violations = report.violations.len(),
                    "validated document"
                );
            }
            DocumentResult {
                path: display_path,
                reports,
                error: None,
            }
        }
        Err(err) => {
            warn!(path = %display_path, error = %err, "failed to load document");
            DocumentResult {
                path: display_path,
                reports: Vec::new(),
                error: Some(err.to_string()),
            }
        }
    }
}

/// Validates every file on the blocking pool. Results come back sorted by
/// path regardless of completion order.
pub async fn validate_all(engine: Arc<RuleEngine>, files: Vec<PathBuf>) -> Result<Vec<DocumentResult>> {
    let mut tasks = JoinSet::new();
    for path in files {
        let engine = Arc::clone(&engine);
        tasks.spawn_blocking(move || validate_document(&engine, &path));
    }

    let mut results = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        results.push(joined.context("validation task panicked")?);
    }
    results.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const VALID: &str = r#"{"$type": "bpmn:Process", "id": "P", "flowElements": [
        {"$type": "bpmn:StartEvent", "id": "s"},
        {"$type": "bpmn:EndEvent", "id": "e"},
        {"$type": "bpmn:SequenceFlow", "id": "f", "sourceRef": "s", "targetRef": "e"}
    ]}"#;

    #[test]
    fn collects_supported_files_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("b.json"), VALID).expect("write");
        fs::write(dir.path().join("a.bpmn"), "<definitions/>").expect("write");
        fs::write(dir.path().join("notes.txt"), "x").expect("write");

        let files = collect_inputs(&[dir.path().to_path_buf()]).expect("inputs");
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, vec!["a.bpmn", "b.json"]);
    }

    #[tokio::test]
    async fn validates_batch_in_path_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("z.json"), VALID).expect("write");
        fs::write(dir.path().join("a.json"), "{ broken").expect("write");

        let files = collect_inputs(&[dir.path().to_path_buf()]).expect("inputs");
        let results = validate_all(Arc::new(RuleEngine::builtin()), files)
            .await
            .expect("validate");

        assert_eq!(results.len(), 2);
        assert!(results[0].path.ends_with("a.json"));
        assert_eq!(results[0].verdict(), Verdict::Invalid);
        assert_eq!(results[1].verdict(), Verdict::Valid);
    }
}
