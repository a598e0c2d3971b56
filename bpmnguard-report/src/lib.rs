//! Reports over the outputs of bpmnguard modelling experiments.
//!
//! Each experiment folder (`full`, `no_few_shot_no_constraints`,
//! `single_agent`, ...) holds the generated process models together with the
//! LLM metadata of the calls that produced them. The modules here turn those
//! folders into CSV, JSON and markdown reports:
//!
//! - [`metadata`]: token usage, model and generation counts per file and folder
//! - [`comparison`]: modeler vs parser vs full-response totals per process,
//!   plus a consistency check of the rendered table
//! - [`summary`]: one summary row per folder
//! - [`schema`]: merged JSON structure of the generated models
//! - [`unique_paths`]: JSON paths found in exactly one file
//! - [`index`]: inventory of the JSON files of a folder

pub mod comparison;
pub mod error;
pub mod index;
mod io;
pub mod metadata;
pub mod schema;
pub mod summary;
pub mod unique_paths;

pub use comparison::{check_table, check_table_file, ComparisonRow, TableIssue};
pub use error::{ReportError, Result};
pub use index::{FolderIndex, IndexEntry};
pub use metadata::{MetadataAnalysis, MetadataRecord, MetadataSummary, TokenUsage};
pub use schema::{SchemaReport, SchemaSummary};
pub use summary::{Metric, SummaryRow};
pub use unique_paths::UniquePaths;
