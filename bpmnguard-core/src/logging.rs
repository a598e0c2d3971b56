//! Logging setup for the `bpmnguard` binary.
//!
//! Rule matches and repair actions are logged at `debug`, documents and
//! report outputs at `info`. A bare level such as `debug` is applied to the
//! bpmnguard crates only so that dependencies stay at `warn`.

use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt::SubscriberBuilder;

use crate::errors::{CoreError, Result};

/// Log targets of the workspace crates, the binary included.
const WORKSPACE_TARGETS: &[&str] = &[
    "bpmnguard",
    "bpmnguard_cli",
    "bpmnguard_core",
    "bpmnguard_model",
    "bpmnguard_report",
    "bpmnguard_rules",
];

const DEFAULT_LEVEL: &str = "info";

/// Turns a configured log level into filter directives. Anything that is
/// not a bare level is taken as directives verbatim.
pub fn directives(level: &str) -> String {
    let level = level.trim();
    match level.parse::<LevelFilter>() {
        Ok(parsed) => std::iter::once("warn".to_string())
            .chain(
                WORKSPACE_TARGETS
                    .iter()
                    .map(|target| format!("{target}={parsed}")),
            )
            .collect::<Vec<_>>()
            .join(","),
        Err(_) => level.to_string(),
    }
}

/// `RUST_LOG` wins over `level`; without either the workspace logs at `info`.
pub fn log_filter(level: Option<&str>) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = directives(level.unwrap_or(DEFAULT_LEVEL));
    EnvFilter::try_new(&directives)
        .map_err(|err| CoreError::Logging(format!("invalid log level `{directives}`: {err}")))
}

/// Installs the global subscriber. Logs go to stderr so that reports and
/// repaired documents on stdout stay machine readable.
pub fn init_tracing(level: Option<&str>) -> Result<()> {
    SubscriberBuilder::default()
        .with_env_filter(log_filter(level)?)
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .try_init()
        .map_err(|err| CoreError::Logging(err.to_string()))
}
