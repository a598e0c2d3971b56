use colored::*;

use bpmnguard_report::{ComparisonRow, SchemaReport, SummaryRow, TableIssue, UniquePaths};
use bpmnguard_rules::{RepairOutcome, Rule, Severity, Verdict, Violation};

use crate::batch::DocumentResult;

fn verdict_label(verdict: Verdict) -> ColoredString {
    match verdict {
        Verdict::Valid => "VALID".green().bold(),
        Verdict::Repairable => "REPAIRABLE".yellow().bold(),
        Verdict::Invalid => "INVALID".red().bold(),
    }
}

fn print_violation(violation: &Violation) {
    let severity = match violation.severity {
        Severity::Error => violation.severity.as_str().red(),
        Severity::Warning => violation.severity.as_str().yellow(),
        Severity::Info => violation.severity.as_str().blue(),
    };
    let location = if violation.scope.is_empty() {
        violation.element_id.clone()
    } else {
        format!("{}/{}", violation.scope.join("/"), violation.element_id)
    };
    println!(
        "    {:<7} {:<28} {} {}",
        severity,
        violation.rule_id.as_str().dimmed(),
        location.bold(),
        violation.message
    );
}

pub fn print_results(results: &[DocumentResult]) {
    for result in results {
        println!("{} {}", verdict_label(result.verdict()), result.path.bold());
        if let Some(error) = &result.error {
            println!("    {}", error.red());
            continue;
        }
        for report in &result.reports {
            println!(
                "  process {} ({} violation(s))",
                report.process_id.bold(),
                report.violations.len()
            );
            for violation in &report.violations {
                print_violation(violation);
            }
        }
    }

    let invalid = results
        .iter()
        .filter(|r| r.verdict() == Verdict::Invalid)
        .count();
    let repairable = results
        .iter()
        .filter(|r| r.verdict() == Verdict::Repairable)
        .count();
    println!(
        "\n{} document(s): {} valid, {} repairable, {} invalid",
        results.len(),
        results.len() - invalid - repairable,
        repairable,
        invalid
    );
}

/// Repair log, written to stderr so the repaired document can go to stdout.
pub fn print_repair_log(outcome: &RepairOutcome) {
    eprintln!(
        "{} process {} after {} pass(es)",
        "✔ Repaired".green().bold(),
        outcome.model.id.bold(),
        outcome.passes
    );
    for record in &outcome.records {
        eprintln!(
            "  {:<28} {:<20} {}",
            record.rule_id.as_str().dimmed(),
            record.element_id,
            record.action
        );
    }
    let remaining = outcome.remaining();
    if !remaining.is_empty() {
        eprintln!(
            "{} {} violation(s) remain ({})",
            "!".yellow().bold(),
            remaining.len(),
            verdict_label(outcome.verdict())
        );
        for violation in remaining {
            eprintln!("    {violation}");
        }
    }
}

pub fn print_rules(rules: &[Rule]) {
    println!(
        "{:<28} {:>8} {:<8} {:<10} {:<8} {}",
        "RULE".bold(),
        "PRIORITY".bold(),
        "SEVERITY".bold(),
        "CATEGORY".bold(),
        "ENABLED".bold(),
        "DESCRIPTION".bold()
    );
    for rule in rules {
        let enabled = if rule.enabled {
            "yes".green()
        } else {
            "no".red()
        };
        println!(
            "{:<28} {:>8} {:<8} {:<10} {:<8} {}",
            rule.id.as_str(),
            rule.priority,
            rule.severity.as_str(),
            rule.category.as_str(),
            enabled,
            rule.description
        );
    }
}

pub fn print_comparison(rows: &[ComparisonRow]) {
    println!(
        "{} {} process row(s)",
        "✔ Process comparison written:".green().bold(),
        rows.len()
    );
}

pub fn print_summary_rows(rows: &[SummaryRow]) {
    println!("{}", "✔ Summary table written:".green().bold());
    for row in rows {
        println!("  {:<32} {} file(s), models {}", row.folder.bold(), row.files_count, row.models);
    }
}

pub fn print_schema_reports(reports: &[SchemaReport]) {
    println!("{}", "✔ Schema reports written:".green().bold());
    for report in reports {
        let summary = &report.summary;
        println!(
            "  {:<32} {} file(s), {} path(s), {} conflict(s), {} unique",
            report.folder.bold(),
            report.files_count,
            summary.total_paths,
            summary.paths_with_type_conflict_count,
            summary.unique_paths_count
        );
    }
}

pub fn print_unique_paths(results: &[UniquePaths]) {
    println!("{}", "✔ Unique paths written:".green().bold());
    for result in results {
        println!("  {:<32} {} path(s)", result.folder.bold(), result.unique_paths.len());
    }
}

pub fn print_table_issues(issues: &[TableIssue]) {
    if issues.is_empty() {
        println!("{}", "✔ Table is consistent".green().bold());
        return;
    }
    println!("{} {} issue(s)", "✘ Table check failed:".red().bold(), issues.len());
    for issue in issues {
        println!("  {issue}");
    }
}
