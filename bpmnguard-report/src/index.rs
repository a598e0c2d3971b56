//! Inventory of the JSON files under an experiment folder.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use walkdir::WalkDir;

use crate::error::{ReportError, Result};
use crate::io;

pub const DEFAULT_PREVIEW_LEN: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Path relative to the parent of the indexed folder.
    pub relpath: String,
    pub file: String,
    pub size_bytes: u64,
    pub is_valid_json: bool,
    pub top_level_keys: Vec<String>,
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderIndex {
    pub root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    pub files_count: usize,
    pub entries: Vec<IndexEntry>,
}

pub(crate) fn has_json_extension(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.to_string_lossy().eq_ignore_ascii_case("json"))
}

fn index_entry(path: &Path, base: &Path, preview_len: usize) -> Result<IndexEntry> {
    let size_bytes = fs::metadata(path)
        .map_err(|err| ReportError::from_io(path, err))?
        .len();
    let text = io::read_lossy(path)?;

    let (is_valid_json, top_level_keys) = match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => (true, map.keys().cloned().collect()),
        Ok(_) => (true, Vec::new()),
        Err(_) => (false, Vec::new()),
    };

    Ok(IndexEntry {
        relpath: path
            .strip_prefix(base)
            .unwrap_or(path)
            .display()
            .to_string(),
        file: path.display().to_string(),
        size_bytes,
        is_valid_json,
        top_level_keys,
        preview: text.chars().take(preview_len).collect(),
    })
}

/// Indexes every `.json` file below `folder`, in file-name order.
pub fn index_folder(folder: &Path, preview_len: usize) -> Result<FolderIndex> {
    let folder = fs::canonicalize(folder).map_err(|err| ReportError::from_io(folder, err))?;
    let base = folder.parent().unwrap_or(&folder).to_path_buf();

    let mut entries = Vec::new();
    for entry in WalkDir::new(&folder).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && has_json_extension(entry.path()) {
            entries.push(index_entry(entry.path(), &base, preview_len)?);
        }
    }

    Ok(FolderIndex {
        root: folder.display().to_string(),
        generated_at: Some(Utc::now()),
        files_count: entries.len(),
        entries,
    })
}

/// Indexes `folder` and writes the result as JSON to `out`.
pub fn run(folder: &Path, out: &Path) -> Result<FolderIndex> {
    if !folder.is_dir() {
        return Err(ReportError::missing(folder));
    }
    let index = index_folder(folder, DEFAULT_PREVIEW_LEN)?;
    io::write_json(out, &index)?;
    info!(out = %out.display(), files = index.files_count, "wrote folder index");
    Ok(index)
}
