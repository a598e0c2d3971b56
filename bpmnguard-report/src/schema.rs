//! Structural comparison of the JSON outputs inside an experiment folder.
//!
//! Every file is reduced to the set of `(path, type)` pairs it contains.
//! Paths start at `$`, object members append `.key` and array elements
//! append `[]`. The per-file sets are merged per folder so type conflicts,
//! paths missing from some files and paths unique to a single file stand
//! out.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{ReportError, Result};
use crate::index::{has_json_extension, FolderIndex};
use crate::io;

/// Array elements inspected per array.
pub const ARRAY_SAMPLE: usize = 5;

/// Examples kept per summary list.
pub const SUMMARY_EXAMPLES: usize = 20;

pub const INVALID_JSON: &str = "invalid_json";

pub const DEFAULT_FOLDERS: [&str; 3] = ["full", "no_few_shot_no_constraints", "single_agent"];

/// File names skipped by default: metadata, modeler/parser and
/// full-response files are not model outputs.
pub const DEFAULT_IGNORE_PATTERNS: [&str; 7] = [
    "*_full_response.json",
    "*full_response*.json",
    "*metadata*.json",
    "modeler.json",
    "parser.json",
    "*parser*.json",
    "*modeler_metadata*.json",
];

pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Every `(path, type)` pair of `value`, rooted at `base`.
pub fn walk_json(value: &Value, base: &str) -> Vec<(String, &'static str)> {
    let mut pairs = Vec::new();
    collect_paths(value, base, &mut pairs);
    pairs
}

fn collect_paths(value: &Value, base: &str, out: &mut Vec<(String, &'static str)>) {
    out.push((base.to_string(), json_type(value)));
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                collect_paths(child, &format!("{base}.{key}"), out);
            }
        }
        Value::Array(items) => {
            let element_path = format!("{base}[]");
            for item in items.iter().take(ARRAY_SAMPLE) {
                collect_paths(item, &element_path, out);
            }
        }
        _ => {}
    }
}

/// Observed types per path of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSchema {
    pub path: PathBuf,
    pub path_types: BTreeMap<String, BTreeSet<String>>,
}

impl FileSchema {
    pub fn from_value(path: PathBuf, value: &Value) -> Self {
        let mut path_types: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (json_path, kind) in walk_json(value, "$") {
            path_types
                .entry(json_path)
                .or_default()
                .insert(kind.to_string());
        }
        Self { path, path_types }
    }

    fn invalid(path: PathBuf) -> Self {
        let mut path_types = BTreeMap::new();
        path_types.insert(
            "$".to_string(),
            BTreeSet::from([INVALID_JSON.to_string()]),
        );
        Self { path, path_types }
    }

    /// Parses a file; unreadable or malformed files get the single type
    /// `invalid_json` at `$`.
    pub fn analyze(path: &Path) -> Self {
        let parsed = io::read_text(path).and_then(|raw| {
            serde_json::from_str::<Value>(&raw).map_err(|err| ReportError::from_json(path, err))
        });
        match parsed {
            Ok(value) => Self::from_value(path.to_path_buf(), &value),
            Err(err) => {
                warn!(file = %path.display(), error = %err, "failed to parse JSON output");
                Self::invalid(path.to_path_buf())
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedPath {
    pub types: Vec<String>,
    pub files: Vec<String>,
    pub missing_in_files: Vec<String>,
}

pub type MergedSchema = BTreeMap<String, MergedPath>;

pub fn merge_schemas(schemas: &[FileSchema]) -> MergedSchema {
    let all_files: BTreeSet<String> = schemas
        .iter()
        .map(|schema| schema.path.display().to_string())
        .collect();

    let mut seen: BTreeMap<&str, (BTreeSet<&str>, BTreeSet<String>)> = BTreeMap::new();
    for schema in schemas {
        let file = schema.path.display().to_string();
        for (json_path, types) in &schema.path_types {
            let (path_types, files) = seen.entry(json_path.as_str()).or_default();
            path_types.extend(types.iter().map(String::as_str));
            files.insert(file.clone());
        }
    }

    seen.into_iter()
        .map(|(json_path, (types, files))| {
            let missing_in_files = all_files.difference(&files).cloned().collect();
            let merged = MergedPath {
                types: types.into_iter().map(str::to_string).collect(),
                files: files.into_iter().collect(),
                missing_in_files,
            };
            (json_path.to_string(), merged)
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub total_paths: usize,
    pub paths_with_type_conflict_count: usize,
    pub paths_with_type_conflict: Vec<String>,
    pub paths_missing_count: usize,
    pub paths_missing_examples: Vec<String>,
    pub unique_paths_count: usize,
    pub unique_paths_examples: Vec<String>,
}

fn matching_paths(merged: &MergedSchema, keep: impl Fn(&MergedPath) -> bool) -> Vec<String> {
    merged
        .iter()
        .filter(|(_, entry)| keep(entry))
        .map(|(path, _)| path.clone())
        .collect()
}

pub fn summarize(merged: &MergedSchema) -> SchemaSummary {
    let conflicts = matching_paths(merged, |entry| entry.types.len() > 1);
    let missing = matching_paths(merged, |entry| !entry.missing_in_files.is_empty());
    let unique = matching_paths(merged, |entry| entry.files.len() == 1);
    let examples =
        |paths: &[String]| -> Vec<String> { paths.iter().take(SUMMARY_EXAMPLES).cloned().collect() };

    SchemaSummary {
        total_paths: merged.len(),
        paths_with_type_conflict_count: conflicts.len(),
        paths_with_type_conflict: examples(&conflicts),
        paths_missing_count: missing.len(),
        paths_missing_examples: examples(&missing),
        unique_paths_count: unique.len(),
        unique_paths_examples: examples(&unique),
    }
}

/// Content of `<folder>_schema_report.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaReport {
    pub folder: String,
    pub files_count: usize,
    pub files: Vec<String>,
    pub merged_schema: MergedSchema,
    pub summary: SchemaSummary,
}

impl SchemaReport {
    pub fn build(folder: &str, schemas: &[FileSchema]) -> Self {
        let merged_schema = merge_schemas(schemas);
        let summary = summarize(&merged_schema);
        Self {
            folder: folder.to_string(),
            files_count: schemas.len(),
            files: schemas
                .iter()
                .map(|schema| schema.path.display().to_string())
                .collect(),
            merged_schema,
            summary,
        }
    }

    pub fn render_markdown(&self) -> String {
        let summary = &self.summary;
        let lines = [
            format!("# Schema report for {}\n", self.folder),
            format!("Files analyzed: {}\n", self.files_count),
            format!("- Total unique JSON paths: {}\n", summary.total_paths),
            format!(
                "- Paths with type conflicts: {} (examples: {})\n",
                summary.paths_with_type_conflict_count,
                example_list(&summary.paths_with_type_conflict)
            ),
            format!(
                "- Paths missing in some files: {} (examples: {})\n",
                summary.paths_missing_count,
                example_list(&summary.paths_missing_examples)
            ),
            format!(
                "- Unique paths (present in only 1 file): {} (examples: {})\n",
                summary.unique_paths_count,
                example_list(&summary.unique_paths_examples)
            ),
        ];
        lines.join("\n")
    }
}

fn example_list(paths: &[String]) -> String {
    format!("[{}]", paths.join(", "))
}

pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|pattern| Pattern::new(pattern).map_err(ReportError::from))
        .collect()
}

pub fn default_ignore_patterns() -> Vec<String> {
    DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect()
}

/// JSON files of a folder: the entries of its index when one is given,
/// otherwise a directory scan. Files whose name matches an ignore pattern
/// are dropped.
pub fn find_json_files(
    folder: &Path,
    index: Option<&FolderIndex>,
    ignore: &[Pattern],
) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = match index {
        Some(index) => index
            .entries
            .iter()
            .map(|entry| PathBuf::from(&entry.file))
            .filter(|path| path.exists())
            .collect(),
        None if folder.is_dir() => {
            let mut found = Vec::new();
            for entry in WalkDir::new(folder) {
                let entry = entry?;
                if entry.file_type().is_file() && has_json_extension(entry.path()) {
                    found.push(entry.into_path());
                }
            }
            found
        }
        None => {
            warn!(folder = %folder.display(), "folder does not exist");
            Vec::new()
        }
    };

    files.sort();
    files.dedup();
    files.retain(|path| {
        let name = io::file_name(path);
        !ignore.iter().any(|pattern| pattern.matches(&name))
    });
    Ok(files)
}

fn load_index(path: &Path) -> Option<FolderIndex> {
    if !path.exists() {
        return None;
    }
    match io::read_json(path) {
        Ok(index) => Some(index),
        Err(err) => {
            warn!(index = %path.display(), error = %err, "ignoring unreadable folder index");
            None
        }
    }
}

/// Builds and writes the schema report of `root/<folder>`.
pub fn process_folder(
    root: &Path,
    folder: &str,
    reports_dir: &Path,
    ignore: &[Pattern],
) -> Result<SchemaReport> {
    let index = load_index(&reports_dir.join(format!("{folder}_index.json")));
    let files = find_json_files(&root.join(folder), index.as_ref(), ignore)?;
    debug!(folder, files = files.len(), "comparing JSON schemas");

    let schemas: Vec<FileSchema> = files.iter().map(|path| FileSchema::analyze(path)).collect();
    let report = SchemaReport::build(folder, &schemas);

    let json_path = reports_dir.join(format!("{folder}_schema_report.json"));
    io::write_json(&json_path, &report)?;
    let md_path = reports_dir.join(format!("{folder}_schema_summary.md"));
    io::write_text(&md_path, &report.render_markdown())?;

    info!(
        folder,
        files = report.files_count,
        paths = report.summary.total_paths,
        report = %json_path.display(),
        "wrote schema report"
    );
    Ok(report)
}

/// Schema reports for every folder, written to `reports_dir`.
pub fn run(
    root: &Path,
    reports_dir: &Path,
    folders: &[String],
    ignore_patterns: &[String],
) -> Result<Vec<SchemaReport>> {
    let ignore = compile_patterns(ignore_patterns)?;
    folders
        .iter()
        .map(|folder| process_folder(root, folder, reports_dir, &ignore))
        .collect()
}
