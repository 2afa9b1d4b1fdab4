//! Quality-driven polygon reduction pipeline
//!
//! This crate ties the polyreduce crates into jobs:
//! - Mesh quality analysis and topology diagnosis
//! - Strategy selection between simplification and retopology
//! - Progressive simplification and external retopology with re-validation
//! - Material resolution and reference rewriting
//! - Versioned archives of finished jobs
//!
//! [`Processor`] is the entry point; it exposes `process_model`,
//! `analyze_model` and `manage_archives`.

pub mod analyzer;
pub mod archive;
pub mod config;
pub mod context;
pub mod error;
pub mod issue;
pub mod materials;
pub mod processor;
pub mod request;
pub mod retopology;
pub mod selector;

pub use analyzer::{
    quality_score, recommended_target_faces, AnalyzerConfig, Complexity, EdgeLengthStats, MeshAnalyzer,
    MeshDescriptor, QualityReport, ReductionSuggestions,
};
pub use archive::{
    ArchiveInfo, ArchiveJob, ArchiveListing, ArchiveManager, ArchiveMetadata, ArchiveRecord, ArchiveSummary,
    CleanupEntry, CleanupReport, CopyResult,
};
pub use config::PipelineConfig;
pub use context::{CancellationToken, JobContext, StageTiming, WorkspaceLock};
pub use error::{AnalysisError, ArchiveError, ProcessError, Result};
pub use issue::{Issue, IssueKind, Severity};
pub use materials::{
    FolderAnalysis, MaterialResolver, MaterialSet, TextureRef, TextureRole, ValidationReport,
};
pub use processor::{
    AnalysisType, ArchiveAction, ArchiveActionResult, JobTiming, ModelAnalysis, ProcessOutcome,
    ProcessingInfo, Processor,
};
pub use request::{ExtraOption, OperationKind, ProcessingRequest, RemeshMode, RequestedOperation};
pub use retopology::{
    InstantMeshesBackend, RetopologyBackend, RetopologyInvoker, RetopologyOutcome, RetopologyParams,
};
pub use selector::{decide, Strategy, StrategyDecision};
