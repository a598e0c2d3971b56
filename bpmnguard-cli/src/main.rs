use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bpmnguard_core::{logging::init_tracing, CoreConfig};
use bpmnguard_model::{document_to_json_string, load_all};
use bpmnguard_report::{comparison, index, metadata, schema, summary, unique_paths, Metric};
use bpmnguard_rules::{RuleEngine, Repairer, Verdict};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use tracing::{info, warn};

mod batch;
mod output;

#[derive(Parser)]
#[command(name = "bpmnguard")]
#[command(about = "Rule-based validation and repair of LLM-generated BPMN process models", long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, env = "BPMNGUARD_LOG")]
    log_level: Option<String>,
    /// Rule settings file or directory (YAML/JSON)
    #[arg(long, global = true, env = "BPMNGUARD_RULES")]
    rules: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate BPMN documents (files or directories)
    Validate(ValidateArgs),
    /// Repair a BPMN document and write it back as BPMN-JSON
    Repair(RepairArgs),
    /// List the effective rule catalogue
    Rules,
    /// Build reports over experiment outputs
    #[command(subcommand)]
    Report(ReportCommands),
    /// Show version information
    Version,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Args)]
struct ValidateArgs {
    #[arg(required = true)]
    paths: Vec<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Report every attribute the model does not interpret
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Args)]
struct RepairArgs {
    file: PathBuf,
    /// Destination of the repaired document (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long, env = "BPMNGUARD_MAX_REPAIR_PASSES")]
    max_passes: Option<usize>,
}

#[derive(Subcommand)]
enum ReportCommands {
    /// Token usage, model and generation counts of metadata files
    Metadata {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, num_args = 1..)]
        folders: Vec<String>,
    },
    /// Per-process modeler/parser/full comparison table
    Compare {
        #[arg(long)]
        reports: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Per-folder summary table
    Summary {
        #[arg(long)]
        reports: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value = "total_tokens")]
        metric: Metric,
    },
    /// Merged JSON schema of each experiment folder
    Schemas {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long)]
        reports: Option<PathBuf>,
        #[arg(long, num_args = 1..)]
        folders: Vec<String>,
        #[arg(long, num_args = 1..)]
        ignore_patterns: Vec<String>,
    },
    /// JSON paths present in exactly one file
    UniquePaths {
        #[arg(long)]
        reports: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, num_args = 1..)]
        folders: Vec<String>,
        /// Include a short snippet of the containing file
        #[arg(long, default_value_t = false)]
        snippets: bool,
    },
    /// Index the JSON files of a folder
    Index {
        #[arg(long)]
        folder: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Check a rendered per-process comparison table
    CheckTable { file: PathBuf },
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn build_engine(config: &CoreConfig, strict: bool) -> Result<RuleEngine> {
    let engine = RuleEngine::from_config(config).with_context(|| match config.rules_path() {
        Some(path) => format!("failed to load rule settings from {}", path.display()),
        None => "failed to build rule engine".to_string(),
    })?;
    Ok(if strict { engine.strict(true) } else { engine })
}

async fn validate(config: &CoreConfig, args: ValidateArgs) -> Result<ExitCode> {
    let engine = Arc::new(build_engine(config, args.strict)?);
    let files = batch::collect_inputs(&args.paths)?;
    if files.is_empty() {
        bail!("no BPMN documents found");
    }
    info!(documents = files.len(), "validating documents");

    let results = batch::validate_all(engine, files).await?;
    match args.format {
        OutputFormat::Text => output::print_results(&results),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
    }
    Ok(exit_code(
        results.iter().all(|result| result.verdict() == Verdict::Valid),
    ))
}

fn repair(config: &CoreConfig, args: RepairArgs) -> Result<ExitCode> {
    let engine = build_engine(config, false)?;
    let repairer = Repairer::new(&engine)
        .with_max_passes(args.max_passes.unwrap_or(config.max_repair_passes));

    let models = load_all(&args.file)
        .with_context(|| format!("failed to load {}", args.file.display()))?;
    let mut repaired = Vec::with_capacity(models.len());
    let mut all_valid = true;
    for model in models {
        let outcome = repairer.repair(model);
        output::print_repair_log(&outcome);
        all_valid &= outcome.verdict() == Verdict::Valid;
        repaired.push(outcome.model);
    }

    let document = document_to_json_string(&repaired);
    match &args.output {
        Some(path) => {
            fs::write(path, &document)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(output = %path.display(), "wrote repaired document");
        }
        None => println!("{document}"),
    }
    Ok(exit_code(all_valid))
}

fn report(config: &CoreConfig, command: ReportCommands) -> Result<ExitCode> {
    let reports_dir = |dir: Option<PathBuf>| dir.unwrap_or_else(|| config.reports_dir.clone());

    match command {
        ReportCommands::Metadata { root, out, folders } => {
            let analysis = metadata::run(&root, &reports_dir(out), &folders)
                .context("metadata analysis failed")?;
            println!(
                "{} {} file(s) in {} folder(s)",
                "✔ Metadata analysed:".green().bold(),
                analysis.records.len(),
                analysis.summary.folders.len()
            );
        }
        ReportCommands::Compare { reports, out } => {
            let reports = reports_dir(reports);
            let out = out.unwrap_or_else(|| reports.clone());
            let rows = comparison::run(&reports, &out).context("process comparison failed")?;
            output::print_comparison(&rows);
        }
        ReportCommands::Summary {
            reports,
            out,
            metric,
        } => {
            let reports = reports_dir(reports);
            let out = out.unwrap_or_else(|| reports.clone());
            let rows = summary::run(&reports, &out, metric).context("summary table failed")?;
            output::print_summary_rows(&rows);
        }
        ReportCommands::Schemas {
            root,
            reports,
            folders,
            ignore_patterns,
        } => {
            let folders = if folders.is_empty() {
                schema::DEFAULT_FOLDERS.iter().map(|f| f.to_string()).collect()
            } else {
                folders
            };
            let ignore = if ignore_patterns.is_empty() {
                schema::default_ignore_patterns()
            } else {
                ignore_patterns
            };
            let results = schema::run(&root, &reports_dir(reports), &folders, &ignore)
                .context("schema comparison failed")?;
            output::print_schema_reports(&results);
        }
        ReportCommands::UniquePaths {
            reports,
            out,
            folders,
            snippets,
        } => {
            let reports = reports_dir(reports);
            let results = unique_paths::run(&reports, out.as_deref(), &folders, snippets)
                .context("unique path extraction failed")?;
            output::print_unique_paths(&results);
        }
        ReportCommands::Index { folder, out } => {
            let index = index::run(&folder, &out)
                .with_context(|| format!("failed to index {}", folder.display()))?;
            println!(
                "{} {} file(s) -> {}",
                "✔ Index written:".green().bold(),
                index.files_count,
                out.display()
            );
        }
        ReportCommands::CheckTable { file } => {
            let issues = bpmnguard_report::check_table_file(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            output::print_table_issues(&issues);
            return Ok(exit_code(issues.is_empty()));
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = CoreConfig::from_env().context("invalid configuration")?;
    if let Some(level) = cli.log_level {
        config.log_level = Some(level);
    }
    if let Some(rules) = cli.rules {
        config.rules_path = Some(rules);
    }
    if let Err(err) = init_tracing(config.log_level.as_deref()) {
        eprintln!("failed to initialise logging: {err}");
    }
    if config.is_production() && config.rules_path.is_none() {
        warn!("running in production with the built-in rule settings");
    }

    match cli.command {
        Commands::Validate(args) => validate(&config, args).await,
        Commands::Repair(args) => repair(&config, args),
        Commands::Rules => {
            let engine = build_engine(&config, false)?;
            output::print_rules(engine.rules());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Report(command) => report(&config, command),
        Commands::Version => {
            println!("bpmnguard v{}", env!("CARGO_PKG_VERSION"));
            println!("Rule-based validation and repair for BPMN process models");
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpmnguard_model::ModelIndex;

    const TWO_PROCESSES: &str = r#"{"$type": "bpmn:Definitions", "id": "Defs", "rootElements": [
        {"$type": "bpmn:Signal", "id": "Go"},
        {"$type": "bpmn:Signal", "id": "Orphan"},
        {"$type": "bpmn:Process", "id": "Sender", "flowElements": [
            {"$type": "bpmn:StartEvent", "id": "s1"},
            {"$type": "bpmn:IntermediateThrowEvent", "id": "throw",
             "eventDefinitions": [{"$type": "bpmn:SignalEventDefinition", "signalRef": "Go"}]},
            {"$type": "bpmn:EndEvent", "id": "e1"},
            {"$type": "bpmn:SequenceFlow", "id": "a1", "sourceRef": "s1", "targetRef": "throw"},
            {"$type": "bpmn:SequenceFlow", "id": "a2", "sourceRef": "throw", "targetRef": "e1"}
        ]},
        {"$type": "bpmn:Process", "id": "Worker", "flowElements": [
            {"$type": "bpmn:StartEvent", "id": "s2"},
            {"$type": "bpmn:Task", "id": "work"},
            {"$type": "bpmn:EndEvent", "id": "e2"},
            {"$type": "bpmn:SequenceFlow", "id": "b1", "sourceRef": "s2", "targetRef": "work"},
            {"$type": "bpmn:SequenceFlow", "id": "b2", "sourceRef": "work", "targetRef": "e2"},
            {"$type": "bpmn:SequenceFlow", "id": "b3", "sourceRef": "work", "targetRef": "ghost"}
        ]}
    ]}"#;

    #[test]
    fn repaired_multi_process_document_loads_back() {
        let dir = tempfile::tempdir().expect("temp dir");
        let input = dir.path().join("two.json");
        let output = dir.path().join("two.repaired.json");
        fs::write(&input, TWO_PROCESSES).expect("write input");

        let args = RepairArgs {
            file: input,
            output: Some(output.clone()),
            max_passes: None,
        };
        repair(&CoreConfig::default(), args).expect("repair");

        let models = load_all(&output).expect("repaired document loads");
        let ids: Vec<&str> = models.iter().map(|model| model.id.as_str()).collect();
        assert_eq!(ids, vec!["Sender", "Worker"]);

        let signals: Vec<&str> = models[1].signals.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(signals, vec!["Go"]);
        assert!(models[1].find_element("work").is_some());
        assert!(models[1].body.flows.iter().all(|flow| flow.id != "b3"));
        assert!(ModelIndex::new(&models[0]).referenced_signals().contains("Go"));
    }
}
