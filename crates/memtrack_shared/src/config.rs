use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Environment variable holding an explicit settings file path
pub const SETTINGS_ENV: &str = "MEMTRACK_SETTINGS";
/// Environment variable overriding where the memory report goes
pub const REPORT_ENV: &str = "MEMTRACK_REPORT";
/// Environment variable overriding the log file
pub const LOG_FILE_ENV: &str = "MEMTRACK_LOG_FILE";
/// Environment variable holding the `env_logger` filter
pub const LOG_LEVEL_ENV: &str = "MEMTRACK_LOG";

const SETTINGS_FILE_NAME: &str = "settings.toml";
const DEFAULT_LOG_LEVEL: &str = "warn";

/// Where the memory report is written when a device is destroyed
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum ReportTarget {
    #[default]
    Stdout,
    Stderr,
    File(PathBuf),
}

impl From<String> for ReportTarget {
    fn from(value: String) -> Self {
        match value.as_str() {
            "stdout" | "-" => ReportTarget::Stdout,
            "stderr" => ReportTarget::Stderr,
            path => ReportTarget::File(PathBuf::from(path)),
        }
    }
}

/// Layer settings
///
/// Values are taken from, in increasing precedence, the built in defaults, the settings file and the
/// environment. The settings file is TOML with the same keys as the fields below.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayerConfig {
    /// Where the memory report is written
    pub report: ReportTarget,
    /// Log file, `None` logs to stderr
    pub log_file: Option<PathBuf>,
    /// `env_logger` filter string
    pub log_level: String,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            report: ReportTarget::Stdout,
            log_file: None,
            log_level: String::from(DEFAULT_LOG_LEVEL),
        }
    }
}

impl LayerConfig {
    /// Loads the configuration from the settings file and the process environment.
    pub fn load() -> anyhow::Result<Self> {
        let settings = match Self::settings_path() {
            Some(path) => Some(
                fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read settings file {}", path.display()))?,
            ),
            None => None,
        };

        Self::from_sources(settings.as_deref(), |key| env::var(key).ok())
    }

    /// Loads the configuration from the process environment alone, ignoring any settings file.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_sources(None, |key| env::var(key).ok())
    }

    /// Builds a configuration from the contents of a settings file and an environment lookup.
    pub fn from_sources(
        settings: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let mut config = match settings {
            Some(settings) => {
                toml::from_str::<Self>(settings).context("Failed to parse settings file")?
            }
            None => Self::default(),
        };

        if let Some(report) = env(REPORT_ENV) {
            config.report = ReportTarget::from(report);
        }
        if let Some(log_file) = env(LOG_FILE_ENV) {
            config.log_file = Some(PathBuf::from(log_file));
        }
        if let Some(log_level) = env(LOG_LEVEL_ENV) {
            config.log_level = log_level;
        }
        // An empty path means stderr
        config.log_file = config
            .log_file
            .filter(|path| !path.as_os_str().is_empty());

        Ok(config)
    }

    /// Path of the settings file, if one exists.
    fn settings_path() -> Option<PathBuf> {
        if let Some(path) = env::var_os(SETTINGS_ENV) {
            return Some(PathBuf::from(path));
        }

        xdg::BaseDirectories::with_prefix("memtrack").find_config_file(Path::new(SETTINGS_FILE_NAME))
    }
}
