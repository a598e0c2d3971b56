//! JSON paths that only one file of a folder contains.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ReportError, Result};
use crate::io;
use crate::schema::SchemaReport;

/// Characters of context kept on each side of the key.
pub const SNIPPET_CONTEXT: usize = 80;

const REPORT_SUFFIX: &str = "_schema_report";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniquePath {
    pub path: String,
    pub types: Vec<String>,
    pub file: String,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniquePaths {
    pub folder: String,
    pub unique_paths: Vec<UniquePath>,
}

/// Last member name of a JSON path: `$.a[].b[]` gives `b`.
pub fn key_name(path: &str) -> String {
    let path = path.trim();
    path.rsplit('.').next().unwrap_or(path).replace("[]", "")
}

/// Text around the first occurrence of `"key"` (or the bare key), with
/// newlines flattened to spaces.
pub fn snippet_around(text: &str, key: &str, context: usize) -> Option<String> {
    let quoted = format!("\"{key}\"");
    let snippet = [quoted.as_str(), key].into_iter().find_map(|target| {
        let found = text.find(target)?;
        let start = text[..found]
            .char_indices()
            .rev()
            .take(context)
            .last()
            .map_or(found, |(i, _)| i);
        let after = found + target.len();
        let end = text[after..]
            .char_indices()
            .nth(context)
            .map_or(text.len(), |(i, _)| after + i);
        Some(text[start..end].replace('\n', " "))
    });
    snippet
}

fn snippet_from_file(file: &Path, key: &str) -> Option<String> {
    let text = io::read_lossy(file).ok()?;
    snippet_around(&text, key, SNIPPET_CONTEXT)
}

pub fn collect_unique_paths(report: &SchemaReport, snippets: bool) -> Vec<UniquePath> {
    report
        .merged_schema
        .iter()
        .filter(|(_, entry)| entry.files.len() == 1)
        .map(|(path, entry)| {
            let file = entry.files[0].clone();
            let snippet = if snippets {
                snippet_from_file(Path::new(&file), &key_name(path))
            } else {
                None
            };
            UniquePath {
                path: path.clone(),
                types: entry.types.clone(),
                file,
                snippet,
            }
        })
        .collect()
}

fn folder_name(report: &SchemaReport, report_path: &Path) -> String {
    if !report.folder.is_empty() {
        return report.folder.clone();
    }
    report_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().replace(REPORT_SUFFIX, ""))
        .unwrap_or_default()
}

/// Schema reports in `reports_dir`, sorted, optionally restricted to the
/// given folders.
pub fn find_reports(reports_dir: &Path, folders: &[String]) -> Result<Vec<PathBuf>> {
    let pattern = reports_dir.join(format!("*{REPORT_SUFFIX}.json"));
    let mut reports = Vec::new();
    for entry in glob::glob(&pattern.display().to_string())? {
        let path = entry.map_err(|err| {
            let path = err.path().to_path_buf();
            ReportError::from_io(path, err.into_error())
        })?;
        let name = io::file_name(&path);
        if folders.is_empty() || folders.iter().any(|f| name.starts_with(&format!("{f}_"))) {
            reports.push(path);
        }
    }
    reports.sort();
    Ok(reports)
}

/// Writes the unique paths of one schema report as JSON and CSV.
pub fn process_report(
    report: &SchemaReport,
    report_path: &Path,
    out_dir: &Path,
    snippets: bool,
) -> Result<UniquePaths> {
    let folder = folder_name(report, report_path);
    let unique = UniquePaths {
        unique_paths: collect_unique_paths(report, snippets),
        folder,
    };

    let json_path = out_dir.join(format!("{}_unique_paths.json", unique.folder));
    io::write_json(&json_path, &unique)?;

    let csv_path = out_dir.join(format!("{}_unique_paths.csv", unique.folder));
    let mut writer = io::csv_writer(&csv_path)?;
    writer.write_record(["path", "types", "file", "snippet"])?;
    for entry in &unique.unique_paths {
        writer.write_record([
            entry.path.as_str(),
            entry.types.join(";").as_str(),
            entry.file.as_str(),
            entry.snippet.as_deref().unwrap_or(""),
        ])?;
    }
    writer
        .flush()
        .map_err(|err| ReportError::from_io(&csv_path, err))?;

    info!(
        folder = %unique.folder,
        entries = unique.unique_paths.len(),
        out = %json_path.display(),
        "wrote unique paths"
    );
    Ok(unique)
}

/// Unique paths of every schema report in `reports_dir`. Reports that cannot
/// be read or parsed are logged and skipped.
pub fn run(
    reports_dir: &Path,
    out_dir: Option<&Path>,
    folders: &[String],
    snippets: bool,
) -> Result<Vec<UniquePaths>> {
    let reports = find_reports(reports_dir, folders)?;
    if reports.is_empty() {
        warn!(reports = %reports_dir.display(), "no schema reports found");
        return Err(ReportError::missing(reports_dir.join(format!("*{REPORT_SUFFIX}.json"))));
    }
    let out_dir = out_dir.unwrap_or(reports_dir);
    let mut results = Vec::with_capacity(reports.len());
    for report_path in &reports {
        let report: SchemaReport = match io::read_json(report_path) {
            Ok(report) => report,
            Err(err) => {
                warn!(
                    report = %report_path.display(),
                    error = %err,
                    "skipping unreadable schema report"
                );
                continue;
            }
        };
        results.push(process_report(&report, report_path, out_dir, snippets)?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FileSchema, SchemaReport};
    use serde_json::json;
    use std::fs;
    use test_case::test_case;

    #[test_case("$.rootElements[].flowElements[].description", "description")]
    #[test_case("$.items[]", "items")]
    #[test_case("$", "$")]
    fn derives_key_names(path: &str, expected: &str) {
        assert_eq!(key_name(path), expected);
    }

    #[test]
    fn snippet_prefers_quoted_key_and_flattens_newlines() {
        let text = "{\n  \"name\": \"x\",\n  \"nameRef\": 1\n}";
        assert_eq!(
            snippet_around(text, "name", 4).as_deref(),
            Some("{   \"name\": \"x")
        );
        assert_eq!(snippet_around("abc", "zzz", 4), None);
    }

    #[test]
    fn snippet_respects_multibyte_text() {
        let text = format!("{}\"k\"{}", "é".repeat(100), "ü".repeat(100));
        let snippet = snippet_around(&text, "k", 3).expect("snippet");
        assert_eq!(snippet, "ééé\"k\"üüü");
    }

    #[test]
    fn extracts_unique_paths_from_reports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        fs::write(&a, r#"{"id": 1, "extra": true}"#).expect("write");
        fs::write(&b, r#"{"id": 2}"#).expect("write");

        let schemas = [
            FileSchema::from_value(a.clone(), &json!({"id": 1, "extra": true})),
            FileSchema::from_value(b, &json!({"id": 2})),
        ];
        let report = SchemaReport::build("full", &schemas);
        io::write_json(&dir.path().join("full_schema_report.json"), &report).expect("report");
        io::write_json(
            &dir.path().join("single_agent_schema_report.json"),
            &SchemaReport::build("single_agent", &[]),
        )
        .expect("report");

        let results = run(dir.path(), None, &["full".to_string()], true).expect("run");
        assert_eq!(results.len(), 1);

        let unique = &results[0].unique_paths;
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].path, "$.extra");
        assert_eq!(unique[0].file, a.display().to_string());
        assert!(unique[0].snippet.as_deref().unwrap_or("").contains("\"extra\""));
        assert!(dir.path().join("full_unique_paths.csv").exists());
    }

    #[test]
    fn corrupt_report_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("broken_schema_report.json"), "{ not json").expect("write");
        io::write_json(
            &dir.path().join("full_schema_report.json"),
            &SchemaReport::build("full", &[]),
        )
        .expect("report");

        let results = run(dir.path(), None, &[], false).expect("run");
        let folders: Vec<&str> = results.iter().map(|r| r.folder.as_str()).collect();
        assert_eq!(folders, vec!["full"]);
        assert!(dir.path().join("full_unique_paths.json").exists());
        assert!(!dir.path().join("broken_unique_paths.json").exists());
    }

    #[test]
    fn missing_reports_are_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            run(dir.path(), None, &[], false),
            Err(ReportError::MissingInput(_))
        ));
    }
}
