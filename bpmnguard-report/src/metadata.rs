//! Token usage, model and generation counts read from LLM metadata files.
//!
//! Two-stage runs leave a `modeler` and a `parser` metadata file per process,
//! single-agent runs leave one `full_response` file. Each file becomes one
//! [`MetadataRecord`]; records are then aggregated per experiment folder.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{ReportError, Result};
use crate::io;

/// File name patterns that identify metadata and response files.
pub const METADATA_PATTERNS: [&str; 6] = [
    "*modeler_metadata.json",
    "*parser_metadata.json",
    "modeler.json",
    "parser.json",
    "*_full_response.json",
    "*full_response.json",
];

pub const DETAILS_CSV: &str = "metadata_details.csv";
pub const SUMMARY_JSON: &str = "metadata_summary.json";

const UNKNOWN_MODEL: &str = "<unknown>";

const CAMEL_KEYS: [&str; 3] = ["promptTokens", "completionTokens", "totalTokens"];
const SNAKE_KEYS: [&str; 3] = ["prompt_tokens", "completion_tokens", "total_tokens"];

/// Prompt, completion and total token counts of one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

impl TokenUsage {
    fn assign(&mut self, source: &Map<String, Value>, keys: [&str; 3]) {
        let slots = [
            &mut self.prompt_tokens,
            &mut self.completion_tokens,
            &mut self.total_tokens,
        ];
        for (slot, key) in slots.into_iter().zip(keys) {
            if let Some(count) = source.get(key).and_then(as_count) {
                *slot = Some(count);
            }
        }
    }
}

/// One analysed metadata file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub file: String,
    pub folder: String,
    pub basename: String,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub generation_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MetadataRecord {
    fn unreadable(path: &Path) -> Self {
        Self {
            file: path.display().to_string(),
            folder: folder_of(path),
            basename: io::file_name(path),
            model: None,
            temperature: None,
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            generation_count: None,
            error: Some("invalid_json".to_string()),
        }
    }
}

/// Row layout of `metadata_details.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    pub file: String,
    pub folder: String,
    pub basename: String,
    pub model: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub temperature: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub prompt_tokens: Option<u64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub completion_tokens: Option<u64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub total_tokens: Option<u64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub generation_count: Option<usize>,
}

impl From<&MetadataRecord> for DetailRow {
    fn from(record: &MetadataRecord) -> Self {
        Self {
            file: record.file.clone(),
            folder: record.folder.clone(),
            basename: record.basename.clone(),
            model: record.model.clone(),
            temperature: record.temperature,
            prompt_tokens: record.prompt_tokens,
            completion_tokens: record.completion_tokens,
            total_tokens: record.total_tokens,
            generation_count: record.generation_count,
        }
    }
}

/// Aggregated statistics of one experiment folder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderSummary {
    pub files_count: usize,
    pub models: BTreeMap<String, usize>,
    pub prompt_tokens_total: u64,
    pub completion_tokens_total: u64,
    pub total_tokens_total: u64,
    pub prompt_tokens_count: usize,
    pub completion_tokens_count: usize,
    pub total_tokens_count: usize,
    pub generation_count_total: usize,
    pub prompt_tokens_avg: Option<f64>,
    pub completion_tokens_avg: Option<f64>,
    pub total_tokens_avg: Option<f64>,
    pub files: Vec<MetadataRecord>,
}

impl FolderSummary {
    fn add(&mut self, record: &MetadataRecord) {
        let model = record.model.as_deref().unwrap_or(UNKNOWN_MODEL);
        *self.models.entry(model.to_string()).or_insert(0) += 1;

        accumulate(
            record.prompt_tokens,
            &mut self.prompt_tokens_total,
            &mut self.prompt_tokens_count,
        );
        accumulate(
            record.completion_tokens,
            &mut self.completion_tokens_total,
            &mut self.completion_tokens_count,
        );
        accumulate(
            record.total_tokens,
            &mut self.total_tokens_total,
            &mut self.total_tokens_count,
        );
        self.generation_count_total = self
            .generation_count_total
            .saturating_add(record.generation_count.unwrap_or(0));

        self.files_count += 1;
        self.files.push(record.clone());
    }

    fn finish(&mut self) {
        self.prompt_tokens_avg = average(self.prompt_tokens_total, self.prompt_tokens_count);
        self.completion_tokens_avg =
            average(self.completion_tokens_total, self.completion_tokens_count);
        self.total_tokens_avg = average(self.total_tokens_total, self.total_tokens_count);
    }
}

fn accumulate(value: Option<u64>, total: &mut u64, count: &mut usize) {
    if let Some(value) = value {
        *total = total.saturating_add(value);
        *count += 1;
    }
}

fn average(total: u64, count: usize) -> Option<f64> {
    (count > 0).then(|| total as f64 / count as f64)
}

/// Content of `metadata_summary.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataSummary {
    pub folders: BTreeMap<String, FolderSummary>,
}

/// Result of a full metadata analysis run.
#[derive(Debug, Clone)]
pub struct MetadataAnalysis {
    pub records: Vec<MetadataRecord>,
    pub summary: MetadataSummary,
}

/// Accepts integers, floats (truncated) and numeric strings.
fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f.trunc() as u64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map_or(true, |f| f != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Token usage from every known metadata shape. Later shapes overwrite
/// counts found by earlier ones.
pub fn extract_token_usage(doc: &Value) -> TokenUsage {
    let mut usage = TokenUsage::default();

    for key in ["tokenUsage", "tokenUsageEstimate"] {
        if let Some(source) = doc.get(key).and_then(Value::as_object) {
            usage.assign(source, CAMEL_KEYS);
        }
    }

    if let Some(response) = doc
        .get("modeler_metadata")
        .and_then(|meta| meta.get("response_metadata"))
        .and_then(Value::as_object)
    {
        if let Some(source) = response.get("token_usage").and_then(Value::as_object) {
            usage.assign(source, SNAKE_KEYS);
        }
        usage.assign(response, CAMEL_KEYS);
    }

    for key in ["tokenUsage", "tokenUsageEstimate", "token_usage", "usage"] {
        if let Some(source) = doc.get(key).and_then(Value::as_object) {
            usage.assign(source, SNAKE_KEYS);
            usage.assign(source, CAMEL_KEYS);
        }
    }

    usage
}

/// Model name and sampling temperature, when the file records them.
pub fn extract_model_info(doc: &Value) -> (Option<String>, Option<f64>) {
    let mut model = None;
    let mut temperature = None;

    if let Some(meta) = doc.get("modeler_metadata").filter(|v| v.is_object()) {
        model = meta
            .get("model")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        temperature = meta.get("temperature").and_then(|value| match value {
            Value::String(text) => text.trim().parse().ok(),
            other => other.as_f64(),
        });
    }

    let fallbacks = [
        doc.get("model"),
        doc.get("response")
            .and_then(|r| r.get("generationInfo"))
            .and_then(|info| info.get("model_name")),
        doc.get("response_metadata")
            .and_then(|meta| meta.get("model_name")),
    ];
    for candidate in fallbacks {
        if model.is_some() {
            break;
        }
        model = candidate.and_then(Value::as_str).map(str::to_string);
    }

    (model, temperature)
}

/// Number of generated texts: `generations` entries of the response when
/// present, otherwise every string-valued `text` field in the document.
pub fn count_generations(doc: &Value) -> usize {
    if !is_truthy(doc) {
        return 0;
    }

    let response = ["response", "responseMetadata"]
        .iter()
        .filter_map(|key| doc.get(*key))
        .find(|value| is_truthy(value))
        .unwrap_or(doc);

    let mut count = 0;
    if let Some(generations) = response.get("generations").and_then(Value::as_array) {
        for generation in generations {
            match generation {
                Value::Array(items) => {
                    count += items
                        .iter()
                        .filter(|item| item.get("text").is_some())
                        .count();
                }
                Value::Object(map) if map.contains_key("text") => count += 1,
                _ => {}
            }
        }
    }

    if count == 0 {
        count = count_text_fields(doc);
    }
    count
}

fn count_text_fields(value: &Value) -> usize {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, child)| match child {
                Value::String(_) if key == "text" => 1,
                _ => count_text_fields(child),
            })
            .sum(),
        Value::Array(items) => items.iter().map(count_text_fields).sum(),
        _ => 0,
    }
}

/// Name of the directory two levels above the file (the experiment folder).
pub fn folder_of(path: &Path) -> String {
    let parent = path.parent();
    parent
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .or_else(|| parent.and_then(Path::file_name))
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Metadata files under `root`, sorted by path. When `folders` is not empty
/// only paths with one of those directory names are kept.
pub fn find_metadata_files(root: &Path, folders: &[String]) -> Result<Vec<PathBuf>> {
    let patterns = METADATA_PATTERNS
        .iter()
        .map(|pattern| Pattern::new(pattern))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if patterns.iter().any(|pattern| pattern.matches(&name)) {
            files.push(entry.into_path());
        }
    }
    files.sort();

    if !folders.is_empty() {
        files.retain(|path| {
            path.components()
                .any(|part| folders.iter().any(|f| part.as_os_str() == f.as_str()))
        });
    }
    Ok(files)
}

/// Builds the record of an already parsed document.
pub fn analyze_value(path: &Path, doc: &Value) -> MetadataRecord {
    let usage = extract_token_usage(doc);
    let (model, temperature) = extract_model_info(doc);
    MetadataRecord {
        file: path.display().to_string(),
        folder: folder_of(path),
        basename: io::file_name(path),
        model,
        temperature,
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
        generation_count: Some(count_generations(doc)),
        error: None,
    }
}

/// Analyses one file. Unreadable or malformed files yield a record marked
/// `invalid_json` instead of an error.
pub fn analyze_file(path: &Path) -> MetadataRecord {
    let parsed = io::read_text(path).and_then(|raw| {
        serde_json::from_str::<Value>(&raw)
            .map_err(|err| ReportError::from_json(path, err))
    });
    match parsed {
        Ok(doc) => analyze_value(path, &doc),
        Err(err) => {
            warn!(file = %path.display(), error = %err, "skipping unreadable metadata file");
            MetadataRecord::unreadable(path)
        }
    }
}

pub fn aggregate_by_folder(records: &[MetadataRecord]) -> MetadataSummary {
    let mut folders: BTreeMap<String, FolderSummary> = BTreeMap::new();
    for record in records {
        folders.entry(record.folder.clone()).or_default().add(record);
    }
    for summary in folders.values_mut() {
        summary.finish();
    }
    MetadataSummary { folders }
}

/// Writes `metadata_details.csv`, `metadata_summary.json` and one
/// `<folder>_metadata.json` per folder.
pub fn write_outputs(analysis: &MetadataAnalysis, out_dir: &Path) -> Result<()> {
    io::ensure_dir(out_dir)?;

    let csv_path = out_dir.join(DETAILS_CSV);
    let mut writer = io::csv_writer(&csv_path)?;
    for record in &analysis.records {
        writer.serialize(DetailRow::from(record))?;
    }
    writer.flush().map_err(|err| ReportError::from_io(&csv_path, err))?;

    let summary_path = out_dir.join(SUMMARY_JSON);
    io::write_json(&summary_path, &analysis.summary)?;

    for (folder, summary) in &analysis.summary.folders {
        io::write_json(&out_dir.join(format!("{folder}_metadata.json")), summary)?;
    }

    info!(
        csv = %csv_path.display(),
        summary = %summary_path.display(),
        "wrote metadata reports"
    );
    Ok(())
}

/// Finds, analyses and aggregates every metadata file under `root`, then
/// writes the reports to `out_dir`.
pub fn run(root: &Path, out_dir: &Path, folders: &[String]) -> Result<MetadataAnalysis> {
    let files = find_metadata_files(root, folders)?;
    info!(count = files.len(), root = %root.display(), "analysing metadata files");

    let records: Vec<MetadataRecord> = files.iter().map(|path| analyze_file(path)).collect();
    debug!(records = records.len(), "analysed metadata files");

    let summary = aggregate_by_folder(&records);
    let analysis = MetadataAnalysis { records, summary };
    write_outputs(&analysis, out_dir)?;
    Ok(analysis)
}
