//! Processing requests

use crate::error::{ProcessError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Operation asked for by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestedOperation {
    #[default]
    Auto,
    Simplify,
    Remesh,
}

/// Reduction strategy that actually modifies the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Simplify,
    Remesh,
}

/// Retopology flavour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemeshMode {
    #[default]
    Balanced,
    Fine,
    Coarse,
    FixHoles,
}

impl RemeshMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RemeshMode::Balanced => "balanced",
            RemeshMode::Fine => "fine",
            RemeshMode::Coarse => "coarse",
            RemeshMode::FixHoles => "fix_holes",
        }
    }
}

impl fmt::Display for RemeshMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemeshMode {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "balanced" => Ok(RemeshMode::Balanced),
            "fine" => Ok(RemeshMode::Fine),
            "coarse" => Ok(RemeshMode::Coarse),
            "fix_holes" | "fix-holes" => Ok(RemeshMode::FixHoles),
            other => Err(ProcessError::InvalidRequest(format!("unknown remesh mode '{other}'"))),
        }
    }
}

impl FromStr for RequestedOperation {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(RequestedOperation::Auto),
            "simplify" => Ok(RequestedOperation::Simplify),
            "remesh" => Ok(RequestedOperation::Remesh),
            other => Err(ProcessError::InvalidRequest(format!("unknown operation '{other}'"))),
        }
    }
}

/// A command-line flag forwarded verbatim to the retopology binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraOption {
    pub flag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ExtraOption {
    pub fn flag(flag: impl Into<String>) -> Self {
        Self { flag: flag.into(), value: None }
    }

    pub fn with_value(flag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            value: Some(value.into()),
        }
    }
}

/// Everything a caller specifies for one processing job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRequest {
    /// Local path of the model to process
    pub input: PathBuf,
    pub target_faces: usize,
    #[serde(default)]
    pub operation: RequestedOperation,
    /// Mode hint for remeshing; overrides the automatic choice
    #[serde(default)]
    pub mode: Option<RemeshMode>,
    pub preserve_boundaries: bool,
    pub preserve_uv: bool,
    pub create_archive: bool,
    #[serde(default)]
    pub extra_options: Vec<ExtraOption>,
    /// Keep the job's working directory after it finishes
    #[serde(default)]
    pub retain_diagnostics: bool,
}

impl ProcessingRequest {
    pub fn new(input: impl Into<PathBuf>, target_faces: usize) -> Self {
        Self {
            input: input.into(),
            target_faces,
            operation: RequestedOperation::Auto,
            mode: None,
            preserve_boundaries: true,
            preserve_uv: true,
            create_archive: true,
            extra_options: Vec::new(),
            retain_diagnostics: false,
        }
    }

    pub fn with_operation(mut self, operation: RequestedOperation) -> Self {
        self.operation = operation;
        self
    }

    pub fn with_mode(mut self, mode: RemeshMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_archive(mut self, create_archive: bool) -> Self {
        self.create_archive = create_archive;
        self
    }

    pub fn with_extra_option(mut self, option: ExtraOption) -> Self {
        self.extra_options.push(option);
        self
    }

    /// Reject requests that cannot be processed regardless of the input
    pub fn validate(&self) -> Result<()> {
        if self.target_faces == 0 {
            return Err(ProcessError::InvalidRequest(
                "target_faces must be at least 1".to_string(),
            ));
        }
        if self.input.as_os_str().is_empty() {
            return Err(ProcessError::InvalidRequest("input path is empty".to_string()));
        }
        if let Some(bad) = self.extra_options.iter().find(|o| o.flag.trim().is_empty()) {
            return Err(ProcessError::InvalidRequest(format!(
                "extra option with empty flag (value {:?})",
                bad.value
            )));
        }
        Ok(())
    }
}
