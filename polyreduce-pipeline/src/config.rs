//! Configuration for processing jobs

use crate::analyzer::AnalyzerConfig;
use polyreduce_simplification::ProgressiveConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable names read by [`PipelineConfig::from_env`]
pub mod env {
    pub const TEMP_DIR: &str = "POLYREDUCE_TEMP_DIR";
    pub const OUTPUT_DIR: &str = "POLYREDUCE_OUTPUT_DIR";
    pub const ARCHIVE_DIR: &str = "POLYREDUCE_ARCHIVE_DIR";
    pub const RETOPOLOGY_BIN: &str = "POLYREDUCE_RETOPOLOGY_BIN";
    pub const RETOPOLOGY_TIMEOUT_SECS: &str = "POLYREDUCE_RETOPOLOGY_TIMEOUT_SECS";
    pub const RETAIN_DIAGNOSTICS: &str = "POLYREDUCE_RETAIN_DIAGNOSTICS";
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root for per-job working directories; jobs sharing it are serialized
    pub temp_dir: PathBuf,
    /// Where processed models are written
    pub output_dir: PathBuf,
    /// Root of the archive tree
    pub archive_dir: PathBuf,
    /// Path to the Instant Meshes compatible executable
    pub retopology_bin: PathBuf,
    /// Wall-clock budget for one retopology run
    pub retopology_timeout: Duration,
    /// Keep job working directories after the job ends
    pub retain_diagnostics: bool,
    pub analyzer: AnalyzerConfig,
    pub progressive: ProgressiveConfig,
}

impl PipelineConfig {
    /// Load configuration from `POLYREDUCE_*` environment variables
    pub fn from_env() -> Self {
        let temp_dir = std::env::var(env::TEMP_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("polyreduce"));

        Self {
            temp_dir,
            output_dir: path_var(env::OUTPUT_DIR, "output"),
            archive_dir: path_var(env::ARCHIVE_DIR, "archives"),
            retopology_bin: path_var(env::RETOPOLOGY_BIN, "Instant Meshes"),
            retopology_timeout: Duration::from_secs(parsed_var(env::RETOPOLOGY_TIMEOUT_SECS, 300)),
            retain_diagnostics: std::env::var(env::RETAIN_DIAGNOSTICS)
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            analyzer: AnalyzerConfig::default(),
            progressive: ProgressiveConfig::default(),
        }
    }

    /// Configuration with every directory under `root`, ignoring the environment
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            temp_dir: root.join("temp"),
            output_dir: root.join("output"),
            archive_dir: root.join("archives"),
            retopology_bin: PathBuf::from("Instant Meshes"),
            retopology_timeout: Duration::from_secs(300),
            retain_diagnostics: false,
            analyzer: AnalyzerConfig::default(),
            progressive: ProgressiveConfig::default(),
        }
    }

    /// Default destination root for archive copies
    pub fn extract_dir(&self) -> PathBuf {
        self.output_dir.join("extracted")
    }

    pub fn with_retopology_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.retopology_bin = bin.into();
        self
    }

    pub fn with_retopology_timeout(mut self, timeout: Duration) -> Self {
        self.retopology_timeout = timeout;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn path_var(key: &str, default: &str) -> PathBuf {
    PathBuf::from(std::env::var(key).unwrap_or_else(|_| default.to_string()))
}

fn parsed_var<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
