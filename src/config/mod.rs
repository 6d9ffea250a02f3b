//! Configuration loading and management.

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::reader::{ProcessingMode, ReportFilter, DEFAULT_MAX_LOG_LINES};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Report reading.
    pub reader: ReaderConfig,
    /// Quality gate thresholds.
    pub gate: GateConfig,
    /// Output configuration.
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from an explicit file path.
    ///
    /// Errors if the file does not exist. Use this for explicit `--config` flags.
    /// Env vars with `COVMODEL_` prefix override file values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file_exact(path))
            .merge(Env::prefixed("COVMODEL_").split("__"))
            .extract()
            .map_err(|e| Error::config(e.to_string()))
    }

    /// Load configuration from directory, looking for covmodel.toml or
    /// .covmodel/covmodel.toml.
    ///
    /// Missing files are skipped and defaults are used.
    pub fn load_default(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(dir.join("covmodel.toml")))
            .merge(Toml::file(dir.join(".covmodel/covmodel.toml")))
            .merge(Env::prefixed("COVMODEL_").split("__"))
            .extract()
            .map_err(|e| Error::config(e.to_string()))
    }

    /// Content of a commented default config file.
    pub fn default_toml() -> &'static str {
        include_str!("default_config.toml")
    }
}

/// Report reader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Reaction to malformed records.
    pub mode: ProcessingMode,
    /// Number of error lines kept per read.
    pub max_log_lines: usize,
    /// Globs of report files picked up from directories.
    pub include: Vec<String>,
    /// Globs of files skipped in directories.
    pub exclude: Vec<String>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            mode: ProcessingMode::FailFast,
            max_log_lines: DEFAULT_MAX_LOG_LINES,
            include: vec!["**/*.json".to_string()],
            exclude: Vec::new(),
        }
    }
}

impl ReaderConfig {
    pub fn filter(&self) -> Result<ReportFilter> {
        ReportFilter::new(&self.include, &self.exclude)
    }
}

/// Minimum coverage in percent, checked by `covmodel check`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub min_line_coverage: Option<f64>,
    pub min_branch_coverage: Option<f64>,
    pub min_mutation_coverage: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format.
    pub format: OutputFormat,
    /// Color output.
    pub color: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            color: true,
        }
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON format.
    Json,
    /// Markdown format.
    Markdown,
}
