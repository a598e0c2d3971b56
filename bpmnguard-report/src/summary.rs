//! Per-folder summary table built from `metadata_summary.json`.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use tracing::info;

use crate::error::{ReportError, Result};
use crate::io;
use crate::metadata::{FolderSummary, MetadataRecord, MetadataSummary, SUMMARY_JSON};

pub const TABLE_CSV: &str = "metadata_summary_table.csv";
pub const TABLE_MD: &str = "metadata_summary_table.md";

/// Per-file value used to pick the largest and smallest file of a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    PromptTokens,
    CompletionTokens,
    #[default]
    TotalTokens,
    GenerationCount,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::PromptTokens => "prompt_tokens",
            Metric::CompletionTokens => "completion_tokens",
            Metric::TotalTokens => "total_tokens",
            Metric::GenerationCount => "generation_count",
        }
    }

    fn value(self, record: &MetadataRecord) -> Option<u64> {
        match self {
            Metric::PromptTokens => record.prompt_tokens,
            Metric::CompletionTokens => record.completion_tokens,
            Metric::TotalTokens => record.total_tokens,
            Metric::GenerationCount => record.generation_count.map(|count| count as u64),
        }
    }
}

impl Display for Metric {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "prompt_tokens" => Ok(Metric::PromptTokens),
            "completion_tokens" => Ok(Metric::CompletionTokens),
            "total_tokens" => Ok(Metric::TotalTokens),
            "generation_count" => Ok(Metric::GenerationCount),
            other => Err(format!("unknown metric `{other}`")),
        }
    }
}

/// A file of the folder together with its metric value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extreme {
    pub file: String,
    pub value: u64,
}

impl Extreme {
    fn cell(&self) -> String {
        let name = io::file_name(Path::new(&self.file));
        format!("{} ({name})", self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub folder: String,
    pub files_count: usize,
    pub models: String,
    pub prompt_tokens_avg: Option<f64>,
    pub completion_tokens_avg: Option<f64>,
    pub total_tokens_avg: Option<f64>,
    pub generation_count_total: usize,
    pub max: Option<Extreme>,
    pub min: Option<Extreme>,
}

impl SummaryRow {
    pub fn new(folder: &str, summary: &FolderSummary, metric: Metric) -> Self {
        let models = summary
            .models
            .iter()
            .map(|(model, count)| format!("{model}:{count}"))
            .collect::<Vec<_>>()
            .join(";");

        // Ties keep the first file as minimum and the last one as maximum.
        let mut max: Option<Extreme> = None;
        let mut min: Option<Extreme> = None;
        for record in &summary.files {
            let Some(value) = metric.value(record) else {
                continue;
            };
            if min.as_ref().map_or(true, |m| value < m.value) {
                min = Some(Extreme {
                    file: record.file.clone(),
                    value,
                });
            }
            if max.as_ref().map_or(true, |m| value >= m.value) {
                max = Some(Extreme {
                    file: record.file.clone(),
                    value,
                });
            }
        }

        Self {
            folder: folder.to_string(),
            files_count: summary.files_count,
            models,
            prompt_tokens_avg: summary.prompt_tokens_avg,
            completion_tokens_avg: summary.completion_tokens_avg,
            total_tokens_avg: summary.total_tokens_avg,
            generation_count_total: summary.generation_count_total,
            max,
            min,
        }
    }

    fn csv_record(&self) -> Vec<String> {
        let extreme = |e: &Option<Extreme>| {
            e.as_ref()
                .map(|e| (e.file.clone(), e.value.to_string()))
                .unwrap_or_default()
        };
        let (max_file, max_value) = extreme(&self.max);
        let (min_file, min_value) = extreme(&self.min);
        vec![
            self.folder.clone(),
            self.files_count.to_string(),
            self.models.clone(),
            format_avg(self.prompt_tokens_avg),
            format_avg(self.completion_tokens_avg),
            format_avg(self.total_tokens_avg),
            self.generation_count_total.to_string(),
            max_file,
            max_value,
            min_file,
            min_value,
        ]
    }

    fn markdown_line(&self) -> String {
        let cells = [
            self.folder.clone(),
            self.files_count.to_string(),
            self.models.clone(),
            format_avg(self.prompt_tokens_avg),
            format_avg(self.completion_tokens_avg),
            format_avg(self.total_tokens_avg),
            self.generation_count_total.to_string(),
            self.max.as_ref().map(Extreme::cell).unwrap_or_default(),
            self.min.as_ref().map(Extreme::cell).unwrap_or_default(),
        ];
        format!("| {} |", cells.join(" | "))
    }
}

/// Averages print with one decimal, absent values as an empty cell.
pub fn format_avg(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.1}")).unwrap_or_default()
}

pub fn build_rows(summary: &MetadataSummary, metric: Metric) -> Vec<SummaryRow> {
    summary
        .folders
        .iter()
        .map(|(folder, info)| SummaryRow::new(folder, info, metric))
        .collect()
}

pub fn render_markdown(rows: &[SummaryRow], metric: Metric) -> String {
    let header = [
        "Folder".to_string(),
        "Files".to_string(),
        "Models".to_string(),
        "Prompt avg".to_string(),
        "Completion avg".to_string(),
        "Total avg".to_string(),
        "Gen count".to_string(),
        format!("Max {metric}"),
        format!("Min {metric}"),
    ];
    let mut lines = vec![
        format!("# Metadata summary table (metric: {metric})\n"),
        format!("| {} |", header.join(" | ")),
        format!("|{}", "---|".repeat(header.len())),
    ];
    lines.extend(rows.iter().map(SummaryRow::markdown_line));
    lines.join("\n")
}

pub fn write_outputs(rows: &[SummaryRow], metric: Metric, out_dir: &Path) -> Result<()> {
    let csv_path = out_dir.join(TABLE_CSV);
    let mut writer = io::csv_writer(&csv_path)?;
    writer.write_record([
        "folder",
        "files_count",
        "models",
        "prompt_tokens_avg",
        "completion_tokens_avg",
        "total_tokens_avg",
        "generation_count_total",
        "max_metric_file",
        "max_metric_value",
        "min_metric_file",
        "min_metric_value",
    ])?;
    for row in rows {
        writer.write_record(row.csv_record())?;
    }
    writer
        .flush()
        .map_err(|err| ReportError::from_io(&csv_path, err))?;

    let md_path = out_dir.join(TABLE_MD);
    io::write_text(&md_path, &render_markdown(rows, metric))?;

    info!(csv = %csv_path.display(), markdown = %md_path.display(), %metric, "wrote summary table");
    Ok(())
}

/// Reads `metadata_summary.json` from `reports_dir` and writes the table to
/// `out_dir`.
pub fn run(reports_dir: &Path, out_dir: &Path, metric: Metric) -> Result<Vec<SummaryRow>> {
    let summary_path = reports_dir.join(SUMMARY_JSON);
    if !summary_path.exists() {
        return Err(ReportError::missing(summary_path));
    }
    let summary: MetadataSummary = io::read_json(&summary_path)?;
    let rows = build_rows(&summary, metric);
    write_outputs(&rows, metric, out_dir)?;
    Ok(rows)
}
