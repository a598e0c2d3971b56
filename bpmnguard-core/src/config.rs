use std::env;
use std::path::PathBuf;

use crate::errors::ConfigError;

/// Default number of repair passes before the repairer gives up.
pub const DEFAULT_MAX_REPAIR_PASSES: usize = 8;

/// Runtime environment used by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    fn from_str(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Development,
        }
    }
}

/// Settings shared by the CLI and the library entry points.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub environment: Environment,
    /// Rule settings file or directory. Built-in defaults apply when unset.
    pub rules_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub reports_dir: PathBuf,
    pub max_repair_passes: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            rules_path: None,
            log_level: None,
            reports_dir: PathBuf::from("reports"),
            max_repair_passes: DEFAULT_MAX_REPAIR_PASSES,
        }
    }
}

impl CoreConfig {
    /// Loads configuration from the process environment (`BPMNGUARD_*`).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env_with_prefix("BPMNGUARD_")
    }

    /// Loads configuration from env vars prefixed with the provided value.
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let key = |suffix: &str| format!("{}{}", prefix, suffix);

        let environment = env::var(key("ENV"))
            .map(|raw| Environment::from_str(&raw))
            .unwrap_or_default();

        let rules_path = env::var(key("RULES"))
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from);

        let log_level = env::var(key("LOG")).ok();

        let reports_dir = env::var(key("REPORTS_DIR"))
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("reports"));

        let passes_key = key("MAX_REPAIR_PASSES");
        let max_repair_passes = match env::var(&passes_key) {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|passes| *passes > 0)
                .ok_or(ConfigError::InvalidEnvVar {
                    key: passes_key,
                    value: raw,
                })?,
            Err(_) => DEFAULT_MAX_REPAIR_PASSES,
        };

        Ok(Self {
            environment,
            rules_path,
            log_level,
            reports_dir,
            max_repair_passes,
        })
    }

    /// Whether the process is running in production.
    pub fn is_production(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }

    pub fn rules_path(&self) -> Option<&std::path::Path> {
        self.rules_path.as_deref()
    }
}
