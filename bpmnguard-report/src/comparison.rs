//! Per-process comparison of modeler, parser and full-response token usage.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::{ReportError, Result};
use crate::io;
use crate::metadata::{DetailRow, DETAILS_CSV};

pub const COMPARISON_CSV: &str = "metadata_process_comparison.csv";
pub const COMPARISON_MD: &str = "metadata_process_comparison.md";

pub const SINGLE_AGENT_FOLDER: &str = "single_agent";

const CSV_HEADERS: [&str; 15] = [
    "folder",
    "process",
    "modeler_file",
    "modeler_prompt",
    "modeler_completion",
    "modeler_total",
    "parser_file",
    "parser_prompt",
    "parser_completion",
    "parser_total",
    "combined_prompt",
    "combined_completion",
    "combined_total",
    "full_file",
    "full_total",
];

/// Which LLM call produced a metadata file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Modeler,
    Parser,
    Full,
    Other,
}

impl CallKind {
    pub fn of_basename(basename: &str) -> Self {
        if basename.contains("modeler") {
            CallKind::Modeler
        } else if basename.contains("parser") {
            CallKind::Parser
        } else if basename.contains("full_response")
            || basename.contains("fullresponse")
            || basename.ends_with("full.json")
        {
            CallKind::Full
        } else {
            CallKind::Other
        }
    }
}

/// Process identifier of a metadata file. Single-agent files are named
/// `<process>_full_response.json`; every other layout keeps one directory
/// per process.
pub fn process_id(folder: &str, file: &str, basename: &str) -> String {
    if folder == SINGLE_AGENT_FOLDER {
        return basename
            .split_once('_')
            .map_or(basename, |(prefix, _)| prefix)
            .to_string();
    }
    Path::new(file)
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallTokens {
    pub file: String,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

impl From<&DetailRow> for CallTokens {
    fn from(row: &DetailRow) -> Self {
        Self {
            file: row.file.clone(),
            prompt_tokens: row.prompt_tokens,
            completion_tokens: row.completion_tokens,
            total_tokens: row.total_tokens,
        }
    }
}

/// Calls recorded for one process, keyed by kind. A later file of the same
/// kind replaces an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessCalls {
    calls: BTreeMap<CallKind, CallTokens>,
}

impl ProcessCalls {
    pub fn get(&self, kind: CallKind) -> Option<&CallTokens> {
        self.calls.get(&kind)
    }

    fn tokens(&self, kind: CallKind, pick: fn(&CallTokens) -> Option<u64>) -> Option<u64> {
        self.get(kind).and_then(pick)
    }

    fn combined(&self, pick: fn(&CallTokens) -> Option<u64>) -> u64 {
        self.tokens(CallKind::Modeler, pick)
            .unwrap_or(0)
            .saturating_add(self.tokens(CallKind::Parser, pick).unwrap_or(0))
    }
}

/// One line of the comparison table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonRow {
    pub folder: String,
    pub process: String,
    pub modeler: Option<CallTokens>,
    pub parser: Option<CallTokens>,
    pub full: Option<CallTokens>,
    pub combined_prompt: u64,
    pub combined_completion: u64,
    pub combined_total: u64,
}

impl ComparisonRow {
    fn new(folder: &str, process: &str, calls: &ProcessCalls) -> Self {
        Self {
            folder: folder.to_string(),
            process: process.to_string(),
            modeler: calls.get(CallKind::Modeler).cloned(),
            parser: calls.get(CallKind::Parser).cloned(),
            full: calls.get(CallKind::Full).cloned(),
            combined_prompt: calls.combined(|t| t.prompt_tokens),
            combined_completion: calls.combined(|t| t.completion_tokens),
            combined_total: calls.combined(|t| t.total_tokens),
        }
    }

    fn csv_record(&self) -> Vec<String> {
        let empty = CallTokens::default();
        let modeler = self.modeler.as_ref().unwrap_or(&empty);
        let parser = self.parser.as_ref().unwrap_or(&empty);
        let full = self.full.as_ref().unwrap_or(&empty);
        vec![
            self.folder.clone(),
            self.process.clone(),
            modeler.file.clone(),
            cell(modeler.prompt_tokens),
            cell(modeler.completion_tokens),
            cell(modeler.total_tokens),
            parser.file.clone(),
            cell(parser.prompt_tokens),
            cell(parser.completion_tokens),
            cell(parser.total_tokens),
            self.combined_prompt.to_string(),
            self.combined_completion.to_string(),
            self.combined_total.to_string(),
            full.file.clone(),
            cell(full.total_tokens),
        ]
    }

    fn total_of(call: &Option<CallTokens>) -> Option<u64> {
        call.as_ref().and_then(|c| c.total_tokens)
    }

    fn markdown_line(&self) -> String {
        format!(
            "| {} | {} | {} | {} | {} | {} |",
            self.folder,
            self.process,
            cell(Self::total_of(&self.modeler)),
            cell(Self::total_of(&self.parser)),
            self.combined_total,
            cell(Self::total_of(&self.full)),
        )
    }
}

fn cell(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Folder -> process -> calls, both levels sorted.
pub type ProcessTable = BTreeMap<String, BTreeMap<String, ProcessCalls>>;

pub fn read_details(csv_path: &Path) -> Result<Vec<DetailRow>> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let rows = reader
        .deserialize()
        .collect::<std::result::Result<Vec<DetailRow>, csv::Error>>()?;
    Ok(rows)
}

pub fn group_rows(rows: &[DetailRow]) -> ProcessTable {
    let mut table = ProcessTable::new();
    for row in rows {
        let process = process_id(&row.folder, &row.file, &row.basename);
        let kind = CallKind::of_basename(&row.basename);
        table
            .entry(row.folder.clone())
            .or_default()
            .entry(process)
            .or_default()
            .calls
            .insert(kind, CallTokens::from(row));
    }
    table
}

pub fn comparison_rows(table: &ProcessTable) -> Vec<ComparisonRow> {
    table
        .iter()
        .flat_map(|(folder, processes)| {
            processes
                .iter()
                .map(move |(process, calls)| ComparisonRow::new(folder, process, calls))
        })
        .collect()
}

pub fn render_markdown(rows: &[ComparisonRow]) -> String {
    let mut lines = vec![
        "# Per-process metadata comparison\n".to_string(),
        "| Folder | Process | Modeler total | Parser total | Combined total | Full total (if present) |"
            .to_string(),
        "|---|---:|---:|---:|---:|---:|".to_string(),
    ];
    lines.extend(rows.iter().map(ComparisonRow::markdown_line));
    lines.join("\n")
}

pub fn write_outputs(rows: &[ComparisonRow], out_dir: &Path) -> Result<()> {
    io::ensure_dir(out_dir)?;

    let csv_path = out_dir.join(COMPARISON_CSV);
    let mut writer = io::csv_writer(&csv_path)?;
    writer.write_record(CSV_HEADERS)?;
    for row in rows {
        writer.write_record(row.csv_record())?;
    }
    writer
        .flush()
        .map_err(|err| ReportError::from_io(&csv_path, err))?;

    let md_path = out_dir.join(COMPARISON_MD);
    io::write_text(&md_path, &render_markdown(rows))?;

    info!(csv = %csv_path.display(), markdown = %md_path.display(), "wrote process comparison");
    Ok(())
}

/// Reads `metadata_details.csv` from `reports_dir` and writes the
/// comparison table to `out_dir`.
pub fn run(reports_dir: &Path, out_dir: &Path) -> Result<Vec<ComparisonRow>> {
    let details = reports_dir.join(DETAILS_CSV);
    if !details.exists() {
        return Err(ReportError::missing(details));
    }
    let rows = comparison_rows(&group_rows(&read_details(&details)?));
    write_outputs(&rows, out_dir)?;
    Ok(rows)
}

/// A row of the comparison table that breaks one of its invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableIssue {
    /// 1-based line number in the markdown file.
    pub line: usize,
    pub folder: String,
    pub process: String,
    pub message: String,
}

impl Display for TableIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "line {}: {}/{}: {}",
            self.line, self.folder, self.process, self.message
        )
    }
}

fn parse_total(cell: &str) -> Option<u64> {
    cell.trim().parse().ok()
}

/// Checks a rendered comparison table: Combined must equal Modeler +
/// Parser when both are present, and single-agent rows carry only a Full
/// total.
pub fn check_table(markdown: &str) -> Vec<TableIssue> {
    let mut issues = Vec::new();

    for (number, line) in markdown.lines().enumerate() {
        let line = line.trim();
        if !line.starts_with('|') || line.starts_with("| Folder") || line.starts_with("|---") {
            continue;
        }
        let cells: Vec<&str> = line.trim_matches('|').split('|').map(str::trim).collect();
        if cells.len() < 6 {
            continue;
        }

        let (folder, process) = (cells[0], cells[1]);
        let modeler = parse_total(cells[2]);
        let parser = parse_total(cells[3]);
        let combined = parse_total(cells[4]);
        let full = parse_total(cells[5]);
        let mut report = |message: String| {
            issues.push(TableIssue {
                line: number + 1,
                folder: folder.to_string(),
                process: process.to_string(),
                message,
            })
        };

        if let (Some(m), Some(p)) = (modeler, parser) {
            match m.checked_add(p) {
                Some(sum) if combined == Some(sum) => {}
                Some(_) => report(format!(
                    "combined total {} differs from modeler {m} + parser {p}",
                    cells[4]
                )),
                None => report(format!("modeler {m} + parser {p} overflows")),
            }
        }

        if folder == SINGLE_AGENT_FOLDER {
            if modeler.is_some() || parser.is_some() {
                report("single-agent row carries modeler or parser totals".to_string());
            }
            if full.is_none() {
                report("single-agent row has no full total".to_string());
            }
        }
    }

    issues
}

/// Reads a markdown comparison table and checks it.
pub fn check_table_file(path: &Path) -> Result<Vec<TableIssue>> {
    Ok(check_table(&io::read_text(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn row(file: &str, folder: &str, total: Option<u64>) -> DetailRow {
        DetailRow {
            file: file.to_string(),
            folder: folder.to_string(),
            basename: io::file_name(Path::new(file)),
            model: None,
            temperature: None,
            prompt_tokens: total.map(|t| t / 2),
            completion_tokens: None,
            total_tokens: total,
            generation_count: Some(1),
        }
    }

    #[test_case("full", "/r/full/07/modeler_metadata.json", "modeler_metadata.json", "07" ; "two stage")]
    #[test_case("no_few_shot_no_constraints", "/r/nf/03/parser.json", "parser.json", "03" ; "ablation")]
    #[test_case("single_agent", "/r/sa/full_response/12_full_response.json", "12_full_response.json", "12" ; "single agent")]
    fn derives_process_ids(folder: &str, file: &str, basename: &str, expected: &str) {
        assert_eq!(process_id(folder, file, basename), expected);
    }

    #[test_case("modeler.json", CallKind::Modeler)]
    #[test_case("01_parser_metadata.json", CallKind::Parser)]
    #[test_case("01_full_response.json", CallKind::Full)]
    #[test_case("run_full.json", CallKind::Full)]
    #[test_case("notes.json", CallKind::Other)]
    fn classifies_calls(basename: &str, expected: CallKind) {
        assert_eq!(CallKind::of_basename(basename), expected);
    }

    #[test]
    fn builds_sorted_rows_with_combined_totals() {
        let details = vec![
            row("/r/single_agent/full_response/02_full_response.json", "single_agent", Some(40)),
            row("/r/full/02/parser_metadata.json", "full", Some(5)),
            row("/r/full/01/parser_metadata.json", "full", Some(10)),
            row("/r/full/01/modeler_metadata.json", "full", Some(30)),
        ];
        let rows = comparison_rows(&group_rows(&details));

        let keys: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.folder.as_str(), r.process.as_str()))
            .collect();
        assert_eq!(keys, vec![("full", "01"), ("full", "02"), ("single_agent", "02")]);
        assert_eq!(rows[0].combined_total, 40);
        assert_eq!(rows[0].combined_prompt, 20);
        assert_eq!(rows[1].combined_total, 5);

        let markdown = render_markdown(&rows);
        assert!(markdown.contains("| full | 01 | 30 | 10 | 40 |  |"));
        assert!(markdown.contains("| single_agent | 02 |  |  | 0 | 40 |"));
        assert!(check_table(&markdown).is_empty());
    }

    #[test]
    fn reports_inconsistent_rows() {
        let markdown = "# Per-process metadata comparison\n\n\
            | Folder | Process | Modeler total | Parser total | Combined total | Full total (if present) |\n\
            |---|---:|---:|---:|---:|---:|\n\
            | full | 01 | 30 | 10 | 41 |  |\n\
            | single_agent | 02 | 5 |  | 5 |  |";

        let issues = check_table(markdown);
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0].line, 5);
        assert_eq!(issues[0].process, "01");
        assert!(issues[1].message.contains("modeler or parser"));
        assert!(issues[2].message.contains("no full total"));
    }

    #[test]
    fn oversized_totals_are_reported_not_added() {
        let issues = check_table("| full | 01 | 18446744073709551615 | 1 | 0 |  |");
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("overflows"));

        let details = vec![
            row("/r/full/01/modeler_metadata.json", "full", Some(u64::MAX)),
            row("/r/full/01/parser_metadata.json", "full", Some(1)),
        ];
        let rows = comparison_rows(&group_rows(&details));
        assert_eq!(rows[0].combined_total, u64::MAX);
    }

    #[test]
    fn run_requires_details_csv() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = run(dir.path(), dir.path()).expect_err("missing input");
        assert!(matches!(err, ReportError::MissingInput(_)));
    }
}
