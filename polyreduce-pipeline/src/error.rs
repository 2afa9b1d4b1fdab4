//! Error types for the processing pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Fatal problems found while analysing a decoded mesh
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("mesh has no faces")]
    EmptyMesh,

    #[error("face {face} references vertex {vertex} but the mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        face: usize,
        vertex: usize,
        vertex_count: usize,
    },

    #[error("inconsistent mesh attributes: {0}")]
    Inconsistent(String),
}

/// Failures while creating or managing archives
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive not found: {id}")]
    NotFound { id: String },

    #[error("archive I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl ArchiveError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| ArchiveError::Io { path, source }
    }
}

/// Main error type for processing jobs and tool calls
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("decode error: {0}")]
    Decode(#[source] polyreduce_core::Error),

    #[error("analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("retopology timed out after {seconds}s")]
    ExternalToolTimeout { seconds: u64 },

    #[error("retopology tool failed: {0}")]
    ExternalTool(String),

    #[error("retopology result rejected: {0}")]
    RetopologyRejected(String),

    #[error("archive error: {0}")]
    Archive(ArchiveError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("job cancelled before {stage}")]
    Cancelled { stage: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("mesh error: {0}")]
    Mesh(polyreduce_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<polyreduce_core::Error> for ProcessError {
    fn from(err: polyreduce_core::Error) -> Self {
        match err {
            polyreduce_core::Error::Io(e) => ProcessError::Io(e),
            e if e.is_decode() => ProcessError::Decode(e),
            e => ProcessError::Mesh(e),
        }
    }
}

impl From<ArchiveError> for ProcessError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::NotFound { id } => ProcessError::NotFound(format!("archive '{id}'")),
            e => ProcessError::Archive(e),
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ProcessError>;
