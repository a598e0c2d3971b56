use std::fs;
use std::path::Path;

use bpmnguard::report::{
    check_table, check_table_file, comparison, index, metadata, schema, summary, unique_paths,
    Metric,
};
use serde_json::json;

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("dirs");
    fs::write(path, body).expect("write");
}

fn usage(model: &str, prompt: u64, completion: u64) -> String {
    json!({
        "modeler_metadata": {"model": model, "temperature": 0.2},
        "tokenUsage": {
            "promptTokens": prompt,
            "completionTokens": completion,
            "totalTokens": prompt + completion
        },
        "generations": [[{"text": "first"}, {"text": "second"}]]
    })
    .to_string()
}

/// Two-stage runs under `full/`, a single-agent run under `single_agent/`.
fn experiment_tree(root: &Path) {
    write(root, "full/order/modeler_metadata.json", &usage("gpt-4o", 20, 10));
    write(root, "full/order/parser_metadata.json", &usage("gpt-4o", 8, 4));
    write(
        root,
        "full/order/order.json",
        r#"{"id": "Process_order", "documentation": "generated", "flowElements": [{"id": "start"}]}"#,
    );
    write(root, "full/claims/modeler_metadata.json", &usage("gpt-4o", 15, 5));
    write(root, "full/claims/claims.json", r#"{"id": "Process_claims", "flowElements": []}"#);
    write(
        root,
        "single_agent/full_response/order_full_response.json",
        &usage("gpt-4o-mini", 25, 25),
    );
    write(root, "single_agent/output/order.json", r#"{"id": 7}"#);
    write(root, "single_agent/output/notes.txt", "not json");
}

#[test]
fn token_reports_are_consistent() {
    let root = tempfile::tempdir().expect("tempdir");
    let reports = tempfile::tempdir().expect("tempdir");
    experiment_tree(root.path());

    let analysis = metadata::run(root.path(), reports.path(), &[]).expect("metadata");
    assert_eq!(analysis.records.len(), 4);
    assert!(analysis.records.iter().all(|r| r.error.is_none()));
    assert!(reports.path().join(metadata::DETAILS_CSV).exists());
    assert!(reports.path().join(metadata::SUMMARY_JSON).exists());

    let full = &analysis.summary.folders["full"];
    assert_eq!(full.files_count, 3);
    assert_eq!(full.total_tokens_total, 62);

    let rows = comparison::run(reports.path(), reports.path()).expect("comparison");
    let keys: Vec<(&str, &str)> = rows
        .iter()
        .map(|row| (row.folder.as_str(), row.process.as_str()))
        .collect();
    assert_eq!(
        keys,
        vec![("full", "claims"), ("full", "order"), ("single_agent", "order")]
    );
    assert_eq!(rows[0].combined_total, 20);
    assert_eq!(rows[1].combined_total, 42);
    assert!(rows[2].full.is_some());
    assert!(rows[2].modeler.is_none() && rows[2].parser.is_none());

    let issues = check_table_file(&reports.path().join(comparison::COMPARISON_MD)).expect("check");
    assert!(issues.is_empty(), "{issues:?}");

    let table = summary::run(reports.path(), reports.path(), Metric::TotalTokens).expect("summary");
    assert_eq!(table.len(), 2);
    assert_eq!(table[0].folder, "full");
    assert_eq!(table[0].min.as_ref().map(|e| e.value), Some(12));
    assert_eq!(table[0].max.as_ref().map(|e| e.value), Some(30));
    assert!(reports.path().join(summary::TABLE_MD).exists());
}

#[test]
fn table_check_flags_tampered_rows() {
    let root = tempfile::tempdir().expect("tempdir");
    let reports = tempfile::tempdir().expect("tempdir");
    experiment_tree(root.path());
    metadata::run(root.path(), reports.path(), &[]).expect("metadata");
    comparison::run(reports.path(), reports.path()).expect("comparison");

    let rendered =
        fs::read_to_string(reports.path().join(comparison::COMPARISON_MD)).expect("table");
    let tampered = rendered.replace("| 42 |", "| 41 |");
    assert_ne!(rendered, tampered);

    let issues = check_table(&tampered);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].process, "order");
}

#[test]
fn schema_reports_follow_the_folder_index() {
    let root = tempfile::tempdir().expect("tempdir");
    let reports = tempfile::tempdir().expect("tempdir");
    experiment_tree(root.path());

    let full_index = index::run(
        &root.path().join("full"),
        &reports.path().join("full_index.json"),
    )
    .expect("index");
    assert_eq!(full_index.files_count, 5);

    let folders = vec!["full".to_string(), "single_agent".to_string()];
    let results = schema::run(
        root.path(),
        reports.path(),
        &folders,
        &schema::default_ignore_patterns(),
    )
    .expect("schemas");
    assert_eq!(results.len(), 2);

    // metadata and response files are ignored
    assert_eq!(results[0].files_count, 2);
    assert_eq!(results[1].files_count, 1);
    assert!(results[0].merged_schema.contains_key("$.documentation"));
    assert!(reports.path().join("full_schema_summary.md").exists());

    let unique = unique_paths::run(reports.path(), None, &folders[..1], true).expect("unique");
    assert_eq!(unique.len(), 1);
    let documentation = unique[0]
        .unique_paths
        .iter()
        .find(|entry| entry.path == "$.documentation")
        .expect("documentation is unique to one file");
    assert!(documentation.file.ends_with("order.json"));
    assert!(documentation
        .snippet
        .as_deref()
        .unwrap_or_default()
        .contains("generated"));
    assert!(reports.path().join("full_unique_paths.csv").exists());
}
