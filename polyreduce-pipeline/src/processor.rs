//! The tool surface: process a model, analyse a model, manage archives

use crate::analyzer::{MeshAnalyzer, QualityReport};
use crate::archive::{
    ArchiveInfo, ArchiveJob, ArchiveListing, ArchiveManager, ArchiveRecord, CleanupReport, CopyResult,
};
use crate::config::PipelineConfig;
use crate::context::{CancellationToken, JobContext, StageTiming};
use crate::error::{ProcessError, Result};
use crate::issue::{Issue, IssueKind, Severity};
use crate::materials::{analyze_folder, validate_model, FolderAnalysis, MaterialResolver, ValidationReport};
use crate::request::ProcessingRequest;
use crate::retopology::{InstantMeshesBackend, RetopologyBackend, RetopologyInvoker, RetopologyParams};
use crate::selector::{decide, Strategy, StrategyDecision};
use chrono::{DateTime, Local};
use polyreduce_core::TriangleMesh;
use polyreduce_io::{MeshWriter, ObjWriter};
use polyreduce_simplification::{
    EdgeCollapseSimplifier, MeshSimplifier, ProgressiveSimplifier, SimplificationStep,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTiming {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub duration_ms: u64,
    pub stages: Vec<StageTiming>,
}

/// Decision trail recorded in archive metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingInfo {
    pub request: ProcessingRequest,
    pub decision: StrategyDecision,
    pub input_quality: QualityReport,
    pub output_quality: Option<QualityReport>,
    pub steps: Vec<SimplificationStep>,
    pub retopology: Option<RetopologyParams>,
    pub timing: JobTiming,
    pub issues: Vec<Issue>,
}

/// Result of [`Processor::process_model`]
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub job_id: String,
    /// Processed model in the output directory
    pub output_path: PathBuf,
    /// Set when archiving was requested and succeeded
    pub archive: Option<ArchiveRecord>,
    pub info: ProcessingInfo,
}

impl ProcessOutcome {
    /// Archive directory if one was created, else the output model
    pub fn result_path(&self) -> &Path {
        self.archive
            .as_ref()
            .map(|a| a.root.as_path())
            .unwrap_or(&self.output_path)
    }

    pub fn issues(&self) -> &[Issue] {
        &self.info.issues
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.info.issues.iter().filter(|i| i.severity >= Severity::Warning)
    }

    pub fn has_issue(&self, kind: IssueKind) -> bool {
        self.info.issues.iter().any(|i| i.kind == kind)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    #[default]
    Auto,
    Quality,
    Folder,
    Validation,
    Full,
}

impl FromStr for AnalysisType {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(AnalysisType::Auto),
            "quality" => Ok(AnalysisType::Quality),
            "folder" => Ok(AnalysisType::Folder),
            "validation" => Ok(AnalysisType::Validation),
            "full" => Ok(AnalysisType::Full),
            other => Err(ProcessError::InvalidRequest(format!("unknown analysis type '{other}'"))),
        }
    }
}

/// Result of [`Processor::analyze_model`]
#[derive(Debug, Clone, Serialize)]
pub struct ModelAnalysis {
    pub path: PathBuf,
    pub analysis_type: AnalysisType,
    /// Model the quality and validation sections describe
    pub model: Option<PathBuf>,
    pub quality: Option<QualityReport>,
    pub folder: Option<FolderAnalysis>,
    pub validation: Option<ValidationReport>,
    /// Failures of individual analyses, keyed by analysis name
    pub errors: BTreeMap<String, String>,
}

fn default_limit() -> Option<usize> {
    Some(20)
}

fn default_days() -> u32 {
    30
}

fn default_dry_run() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ArchiveAction {
    List {
        #[serde(default = "default_limit")]
        limit: Option<usize>,
    },
    Clean {
        #[serde(default = "default_days")]
        days_to_keep: u32,
        #[serde(default = "default_dry_run")]
        dry_run: bool,
    },
    Copy {
        archive_name: String,
        #[serde(default)]
        copy_to: Option<PathBuf>,
    },
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "result", rename_all = "snake_case")]
pub enum ArchiveActionResult {
    List(ArchiveListing),
    Clean(CleanupReport),
    Copy(CopyResult),
    Info(ArchiveInfo),
}

/// Runs jobs against one configuration
pub struct Processor {
    config: PipelineConfig,
    analyzer: MeshAnalyzer,
    simplifier: Box<dyn MeshSimplifier + Send + Sync>,
    retopology: Box<dyn RetopologyBackend>,
    archives: ArchiveManager,
}

impl Processor {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            analyzer: MeshAnalyzer::new(config.analyzer.clone()),
            simplifier: Box::new(EdgeCollapseSimplifier::new()),
            retopology: Box::new(InstantMeshesBackend::new(&config.retopology_bin)),
            archives: ArchiveManager::from_config(&config),
            config,
        }
    }

    pub fn with_retopology_backend(mut self, backend: impl RetopologyBackend + 'static) -> Self {
        self.retopology = Box::new(backend);
        self
    }

    pub fn with_simplifier(mut self, simplifier: impl MeshSimplifier + Send + Sync + 'static) -> Self {
        self.simplifier = Box::new(simplifier);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn archives(&self) -> &ArchiveManager {
        &self.archives
    }

    /// Reduce one model end to end
    ///
    /// The job's working directory is removed on every exit path unless
    /// diagnostics are retained.
    pub fn process_model(&self, request: &ProcessingRequest, cancel: &CancellationToken) -> Result<ProcessOutcome> {
        request.validate()?;
        if !request.input.is_file() {
            return Err(ProcessError::NotFound(format!("input model {}", request.input.display())));
        }

        let retain = request.retain_diagnostics || self.config.retain_diagnostics;
        let mut ctx = JobContext::begin(&self.config, cancel.clone(), retain)?;
        info!(job = ctx.id(), input = %request.input.display(), target = request.target_faces, "processing model");

        let result = self.run_job(request, &mut ctx);
        match &result {
            Ok(outcome) => info!(job = ctx.id(), output = %outcome.result_path().display(), "job finished"),
            Err(e) => {
                warn!(job = ctx.id(), error = %e, "job failed");
                ctx.log(format_args!("job failed: {e}"));
            }
        }
        result
    }

    fn run_job(&self, request: &ProcessingRequest, ctx: &mut JobContext) -> Result<ProcessOutcome> {
        ctx.checkpoint("decode")?;
        let mesh = polyreduce_io::read_mesh(&request.input)?;
        ctx.log(format_args!(
            "decoded {} vertices, {} faces from {}",
            mesh.vertex_count(),
            mesh.face_count(),
            request.input.display()
        ));

        ctx.checkpoint("analysis")?;
        let input_report = self.analyzer.analyze(&mesh)?;
        let materials = MaterialResolver::resolve(&mesh, &request.input);
        let mut issues = input_report.issues.clone();
        issues.extend(materials.issues.iter().cloned());
        ctx.log(format_args!(
            "quality score {:.1}, watertight {}, {} issues",
            input_report.quality_score,
            input_report.descriptor.watertight,
            input_report.issues.len()
        ));

        ctx.checkpoint("selection")?;
        let decision = decide(&input_report, request);
        info!(job = ctx.id(), operation = decision.strategy.name(), justification = %decision.justification, "strategy selected");
        ctx.log(format_args!("decision {}: {}", decision.strategy.name(), decision.justification));
        issues.extend(decision.issues.iter().cloned());

        let mut steps = Vec::new();
        let mut retopology = None;
        let output_mesh = match decision.strategy {
            Strategy::NoOp => mesh,
            Strategy::Simplify {
                target_faces,
                constraints,
            } => {
                ctx.checkpoint("simplify")?;
                let progressive = ProgressiveSimplifier::new(self.simplifier.as_ref(), self.config.progressive.clone());
                let token = ctx.cancellation().clone();
                let outcome = progressive
                    .run_until(&mesh, target_faces, &constraints, || token.is_cancelled())
                    .map_err(mesh_error)?;
                if outcome.interrupted() {
                    return Err(ProcessError::Cancelled {
                        stage: "simplify".to_string(),
                    });
                }
                for step in &outcome.steps {
                    ctx.log(format_args!(
                        "step {}: {} -> {} faces (target {}, uv retained {}, fallback {})",
                        step.index, step.input_faces, step.output_faces, step.target_faces, step.uv_retained, step.uv_fallback
                    ));
                }
                issues.extend(outcome.warnings.iter().map(Issue::from));
                steps = outcome.steps;
                outcome.mesh
            }
            Strategy::Remesh { target_faces, mode } => {
                ctx.checkpoint("remesh")?;
                let params = RetopologyParams::new(target_faces, mode, input_report.descriptor.bbox_diagonal)
                    .with_extra_options(request.extra_options.clone());
                let invoker = RetopologyInvoker::new(self.retopology.as_ref(), &self.analyzer, self.config.retopology_timeout);
                let outcome = invoker.run(&mesh, &input_report, params, ctx)?;
                issues.extend(outcome.issues.iter().cloned());

                let mut remeshed = outcome.mesh;
                if mesh.has_uvs() && !remeshed.has_uvs() {
                    issues.push(Issue::warning(
                        IssueKind::UvLost,
                        "retopology output carries no texture coordinates",
                    ));
                }
                if remeshed.material_libs.is_empty() {
                    remeshed.material_libs = mesh.material_libs.clone();
                }
                retopology = Some(outcome.params);
                remeshed
            }
        };

        ctx.checkpoint("output")?;
        let (output_path, output_library, output_mesh) =
            self.write_output(request, decision.strategy.name(), output_mesh, &materials)?;
        ctx.log(format_args!("wrote {}", output_path.display()));
        let output_quality = match decision.strategy {
            Strategy::NoOp => None,
            _ => self.recheck_output(&output_mesh, ctx),
        };
        ctx.finish_stage();

        let mut info = ProcessingInfo {
            request: request.clone(),
            decision,
            input_quality: input_report,
            output_quality,
            steps,
            retopology,
            timing: JobTiming {
                started_at: ctx.started_at(),
                finished_at: Local::now(),
                duration_ms: ctx.elapsed().as_millis() as u64,
                stages: ctx.timings().to_vec(),
            },
            issues,
        };

        let mut archive = None;
        if request.create_archive {
            ctx.checkpoint("archive")?;
            ctx.flush_log();
            let job = ArchiveJob {
                original_input: &request.input,
                model: &output_path,
                material_library: output_library.as_deref(),
                logs_dir: Some(ctx.logs_dir()),
                processing_info: serde_json::to_value(&info)?,
            };
            match self.archives.create(&job) {
                Ok(record) => {
                    ctx.log(format_args!("archived as {}", record.id));
                    archive = Some(record);
                }
                Err(e) => {
                    warn!(job = ctx.id(), error = %e, "archiving failed; returning output path");
                    ctx.log(format_args!("archiving failed: {e}"));
                    info.issues.push(Issue::error(IssueKind::ArchiveFailed, e.to_string()));
                }
            }
            ctx.finish_stage();
        }

        Ok(ProcessOutcome {
            job_id: ctx.id().to_string(),
            output_path,
            archive,
            info,
        })
    }

    /// Quality of the written result; a failed analysis is logged and skipped
    fn recheck_output(&self, mesh: &TriangleMesh, ctx: &JobContext) -> Option<QualityReport> {
        match self.analyzer.analyze(mesh) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(job = ctx.id(), error = %e, "output mesh analysis failed");
                ctx.log(format_args!("output analysis failed: {e}"));
                None
            }
        }
    }

    /// Write `<stem>_<operation>.obj` and, when the input had a library, a
    /// rewritten `<stem>_<operation>.mtl` pointing at the original textures
    fn write_output(
        &self,
        request: &ProcessingRequest,
        operation: &str,
        mut mesh: TriangleMesh,
        materials: &crate::materials::MaterialSet,
    ) -> Result<(PathBuf, Option<PathBuf>, TriangleMesh)> {
        let output_dir = &self.config.output_dir;
        fs::create_dir_all(output_dir)?;
        let stem = request
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        let output_path = output_dir.join(format!("{stem}_{operation}.obj"));

        let mut library_path = None;
        if let Some(text) = materials.rewrite(output_dir, |t| t.resolved.clone()) {
            let name = format!("{stem}_{operation}.mtl");
            let path = output_dir.join(&name);
            fs::write(&path, text)?;
            mesh.material_libs = vec![name];
            library_path = Some(path);
        }

        ObjWriter::write_mesh(&mesh, &output_path).map_err(mesh_error)?;
        Ok((output_path, library_path, mesh))
    }

    /// Inspect a model file or folder without modifying anything
    pub fn analyze_model(&self, path: &Path, analysis_type: AnalysisType) -> Result<ModelAnalysis> {
        if !path.exists() {
            return Err(ProcessError::NotFound(format!("model path {}", path.display())));
        }
        let is_dir = path.is_dir();
        let mut analysis = ModelAnalysis {
            path: path.to_path_buf(),
            analysis_type,
            model: (!is_dir).then(|| path.to_path_buf()),
            quality: None,
            folder: None,
            validation: None,
            errors: BTreeMap::new(),
        };

        let want_folder = match analysis_type {
            AnalysisType::Folder | AnalysisType::Full => true,
            AnalysisType::Auto => is_dir,
            _ => false,
        };
        if want_folder || is_dir {
            let folder = if is_dir {
                path
            } else {
                path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."))
            };
            match analyze_folder(folder) {
                Ok(result) => {
                    if is_dir {
                        analysis.model = result.obj_files.first().map(|name| folder.join(name));
                    }
                    if want_folder {
                        analysis.folder = Some(result);
                    }
                }
                Err(e) => {
                    analysis.errors.insert("folder".to_string(), e.to_string());
                }
            }
        }

        let is_obj = analysis
            .model
            .as_ref()
            .and_then(|m| m.extension())
            .is_some_and(|e| e.eq_ignore_ascii_case("obj"));
        let want_quality = matches!(
            analysis_type,
            AnalysisType::Auto | AnalysisType::Quality | AnalysisType::Full
        );
        let want_validation = match analysis_type {
            AnalysisType::Validation | AnalysisType::Full => true,
            AnalysisType::Auto => is_obj,
            _ => false,
        };

        if want_quality {
            match &analysis.model {
                Some(model) => match self.quality_of(model) {
                    Ok(report) => analysis.quality = Some(report),
                    Err(e) => {
                        analysis.errors.insert("quality".to_string(), e.to_string());
                    }
                },
                None => {
                    analysis
                        .errors
                        .insert("quality".to_string(), "no OBJ file found in folder".to_string());
                }
            }
        }
        if want_validation {
            let outcome = match &analysis.model {
                Some(model) if is_obj => Ok(validate_model(model)),
                Some(_) => Err("validation supports OBJ files only".to_string()),
                None => Err("no OBJ file found in folder".to_string()),
            };
            match outcome {
                Ok(report) => analysis.validation = Some(report),
                Err(e) => {
                    analysis.errors.insert("validation".to_string(), e);
                }
            }
        }

        info!(path = %path.display(), ?analysis_type, errors = analysis.errors.len(), "model analysed");
        Ok(analysis)
    }

    fn quality_of(&self, model: &Path) -> Result<QualityReport> {
        let mesh = polyreduce_io::read_mesh(model)?;
        Ok(self.analyzer.analyze(&mesh)?)
    }

    /// List, clean, copy or describe archives
    pub fn manage_archives(&self, action: &ArchiveAction) -> Result<ArchiveActionResult> {
        let result = match action {
            ArchiveAction::List { limit } => ArchiveActionResult::List(self.archives.list(*limit)?),
            ArchiveAction::Clean { days_to_keep, dry_run } => {
                ArchiveActionResult::Clean(self.archives.clean(*days_to_keep, *dry_run)?)
            }
            ArchiveAction::Copy { archive_name, copy_to } => {
                ArchiveActionResult::Copy(self.archives.copy(archive_name, copy_to.as_deref())?)
            }
            ArchiveAction::Info => ArchiveActionResult::Info(self.archives.info()?),
        };
        Ok(result)
    }
}

fn mesh_error(err: polyreduce_core::Error) -> ProcessError {
    match err {
        polyreduce_core::Error::Io(e) => ProcessError::Io(e),
        e => ProcessError::Mesh(e),
    }
}
